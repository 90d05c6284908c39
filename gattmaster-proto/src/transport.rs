//! The capability the interactive master drives: one connected peripheral

use std::pin::Pin;

use futures::Stream;

/// A value pushed by the peripheral after a successful subscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub peripheral_id: String,
    pub service_id: String,
    pub characteristic_id: String,
    pub value: Vec<u8>,
}

pub type NotificationStream = Pin<Box<dyn Stream<Item = Notification> + Send>>;

/// Subscription state as confirmed by the peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeConfirmation {
    pub service_id: String,
    pub characteristic_id: String,
    pub enabled: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("bluetooth error: {0}")]
    Ble(String),
    #[error("no Bluetooth adapter found")]
    AdapterNotFound,
    #[error("peripheral {0} not found")]
    PeripheralNotFound(String),
    #[error("peripheral {0} is not connected")]
    NotConnected(String),
    #[error("invalid uuid `{0}`")]
    InvalidUuid(String),
    #[error("characteristic {service_id}:{characteristic_id} not found on peripheral")]
    UnknownCharacteristic {
        service_id: String,
        characteristic_id: String,
    },
}

/// Session lifecycle, GATT read/write/subscribe and the notification stream
///
/// Service and characteristic ids are passed through exactly as the operator
/// wrote them; resolving them is up to the implementation.
#[allow(async_fn_in_trait)]
pub trait Transport {
    fn peripheral_id(&self) -> &str;

    /// Address of the local adapter impersonating the master, when known
    fn local_address(&self) -> Option<&str>;

    async fn connect(&mut self) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    async fn read(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Vec<u8>, TransportError>;

    async fn write(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
        value: &[u8],
        mode: crate::WriteMode,
    ) -> Result<(), TransportError>;

    /// Enable notifications and wait for the peripheral to confirm
    async fn subscribe(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<SubscribeConfirmation, TransportError>;

    /// Every notification from this peripheral, from now on
    async fn notifications(&mut self) -> Result<NotificationStream, TransportError>;
}
