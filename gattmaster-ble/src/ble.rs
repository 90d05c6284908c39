//! btleplug implementation of [`Transport`]
//!
//! Service and characteristic ids are accepted in the forms a GATT dump
//! usually shows them: 16-bit (`1800`) and 32-bit (`0000fff0`) SIG aliases,
//! 32 hex digits without dashes, or the canonical dashed form.

use std::collections::HashMap;
use std::time::Duration;

use btleplug::api::bleuuid::{uuid_from_u16, uuid_from_u32};
use btleplug::api::{Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use gattmaster_proto::{
    Notification, NotificationStream, SubscribeConfirmation, Transport, TransportError,
    WriteMode, normalize_peripheral_id,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bluetooth SIG base uuid, `0000xxxx-0000-1000-8000-00805f9b34fb`
const SIG_BASE: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;
const SIG_ALIAS_MASK: u128 = 0xffff_ffff << 96;

/// How to find the peripheral to drive
#[derive(Debug, Clone)]
pub struct BleOptions {
    /// Peripheral MAC or platform id, with or without colons
    pub peripheral_id: String,
    /// Local adapter to use; the first adapter when not given or not matched
    pub local_address: Option<String>,
    pub scan_duration: Duration,
}

impl BleOptions {
    pub fn new(peripheral_id: &str) -> Self {
        Self {
            peripheral_id: normalize_peripheral_id(peripheral_id),
            local_address: None,
            scan_duration: Duration::from_secs(5),
        }
    }
}

pub struct BleTransport {
    peripheral_id: String,
    local_address: Option<String>,
    peripheral: Peripheral,
    connected: bool,
}

fn ble(e: btleplug::Error) -> TransportError {
    TransportError::Ble(e.to_string())
}

/// Pick the adapter whose description mentions `wanted`, else the first one
pub async fn get_adapter(wanted: Option<&str>) -> Result<Adapter, TransportError> {
    let manager = Manager::new().await.map_err(ble)?;
    let adapters = manager.adapters().await.map_err(ble)?;

    if let Some(wanted) = wanted {
        let wanted = normalize_peripheral_id(wanted);
        for adapter in &adapters {
            let description = adapter.adapter_info().await.map_err(ble)?;
            if normalize_peripheral_id(&description).contains(&wanted) {
                info!(%description, "using matching adapter");
                return Ok(adapter.clone());
            }
        }
        warn!(address = %wanted, "no adapter matches the master address, using the first one");
    }

    adapters.into_iter().next().ok_or(TransportError::AdapterNotFound)
}

impl BleTransport {
    /// Scan for the peripheral; does not connect
    pub async fn find(options: BleOptions) -> Result<Self, TransportError> {
        let adapter = get_adapter(options.local_address.as_deref()).await?;

        info!(
            peripheral = %options.peripheral_id,
            seconds = options.scan_duration.as_secs(),
            "scanning"
        );
        adapter.start_scan(ScanFilter::default()).await.map_err(ble)?;
        tokio::time::sleep(options.scan_duration).await;

        let peripherals = adapter.peripherals().await.map_err(ble)?;
        let found = peripherals.into_iter().find(|p| {
            matches_peripheral(
                &p.address().to_string(),
                &p.id().to_string(),
                &options.peripheral_id,
            )
        });

        adapter.stop_scan().await.map_err(ble)?;

        let peripheral =
            found.ok_or_else(|| TransportError::PeripheralNotFound(options.peripheral_id.clone()))?;
        debug!(address = %peripheral.address(), "found peripheral");

        Ok(Self {
            peripheral_id: options.peripheral_id,
            local_address: options.local_address,
            peripheral,
            connected: false,
        })
    }

    fn characteristic(
        &self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Characteristic, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected(self.peripheral_id.clone()));
        }

        let service = parse_uuid(service_id)?;
        let characteristic = parse_uuid(characteristic_id)?;

        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.service_uuid == service && c.uuid == characteristic)
            .ok_or_else(|| TransportError::UnknownCharacteristic {
                service_id: service_id.to_string(),
                characteristic_id: characteristic_id.to_string(),
            })
    }
}

impl Transport for BleTransport {
    fn peripheral_id(&self) -> &str {
        &self.peripheral_id
    }

    fn local_address(&self) -> Option<&str> {
        self.local_address.as_deref()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if !self.peripheral.is_connected().await.map_err(ble)? {
            self.peripheral.connect().await.map_err(ble)?;
        }
        self.peripheral.discover_services().await.map_err(ble)?;
        self.connected = true;

        info!(
            peripheral = %self.peripheral_id,
            characteristics = self.peripheral.characteristics().len(),
            "connected"
        );
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        if self.peripheral.is_connected().await.map_err(ble)? {
            self.peripheral.disconnect().await.map_err(ble)?;
        }
        info!(peripheral = %self.peripheral_id, "disconnected");
        Ok(())
    }

    async fn read(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Vec<u8>, TransportError> {
        let characteristic = self.characteristic(service_id, characteristic_id)?;
        self.peripheral.read(&characteristic).await.map_err(ble)
    }

    async fn write(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        let characteristic = self.characteristic(service_id, characteristic_id)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        self.peripheral
            .write(&characteristic, value, write_type)
            .await
            .map_err(ble)
    }

    async fn subscribe(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<SubscribeConfirmation, TransportError> {
        let characteristic = self.characteristic(service_id, characteristic_id)?;
        self.peripheral.subscribe(&characteristic).await.map_err(ble)?;

        Ok(SubscribeConfirmation {
            service_id: format_uuid(characteristic.service_uuid),
            characteristic_id: format_uuid(characteristic.uuid),
            enabled: true,
        })
    }

    async fn notifications(&mut self) -> Result<NotificationStream, TransportError> {
        let stream = self.peripheral.notifications().await.map_err(ble)?;
        let services = service_index(
            self.peripheral
                .characteristics()
                .iter()
                .map(|c| (c.service_uuid, c.uuid)),
        );
        let peripheral_id = self.peripheral_id.clone();

        Ok(Box::pin(stream.map(move |notification| {
            // notifications only carry the characteristic uuid
            let service_id = services
                .get(&notification.uuid)
                .copied()
                .flatten()
                .map(format_uuid)
                .unwrap_or_default();

            Notification {
                peripheral_id: peripheral_id.clone(),
                service_id,
                characteristic_id: format_uuid(notification.uuid),
                value: notification.value,
            }
        })))
    }
}

/// `wanted` is already normalized; backends without real MACs only expose the id
pub fn matches_peripheral(address: &str, id: &str, wanted: &str) -> bool {
    normalize_peripheral_id(address) == wanted || normalize_peripheral_id(id) == wanted
}

/// Owning service per characteristic uuid, `None` when several services share it
fn service_index(pairs: impl Iterator<Item = (Uuid, Uuid)>) -> HashMap<Uuid, Option<Uuid>> {
    let mut index = HashMap::new();
    for (service, characteristic) in pairs {
        index
            .entry(characteristic)
            .and_modify(|owner: &mut Option<Uuid>| {
                if *owner != Some(service) {
                    *owner = None;
                }
            })
            .or_insert(Some(service));
    }
    index
}

/// Parse a service or characteristic id as written in a command table
pub fn parse_uuid(id: &str) -> Result<Uuid, TransportError> {
    let id = id.trim();
    let invalid = || TransportError::InvalidUuid(id.to_string());

    if !id.is_empty() && id.len() <= 8 && id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return match id.len() {
            4 => u16::from_str_radix(id, 16).map(uuid_from_u16).map_err(|_| invalid()),
            8 => u32::from_str_radix(id, 16).map(uuid_from_u32).map_err(|_| invalid()),
            _ => Err(invalid()),
        };
    }

    Uuid::parse_str(id).map_err(|_| invalid())
}

/// Short form for SIG aliases, 32 lowercase hex digits otherwise
pub fn format_uuid(uuid: Uuid) -> String {
    let value = uuid.as_u128();
    if value & !SIG_ALIAS_MASK != SIG_BASE {
        return uuid.simple().to_string();
    }

    let alias = (value >> 96) as u32;
    if alias <= 0xffff {
        format!("{alias:04x}")
    } else {
        format!("{alias:08x}")
    }
}
