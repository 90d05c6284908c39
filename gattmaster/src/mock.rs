//! Recording transport for tests

use std::collections::VecDeque;

use futures::stream::{self, StreamExt};
use gattmaster_proto::{
    Notification, NotificationStream, SubscribeConfirmation, Transport, TransportError, WriteMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Disconnect,
    Read {
        service_id: String,
        characteristic_id: String,
    },
    Write {
        service_id: String,
        characteristic_id: String,
        value: Vec<u8>,
        mode: WriteMode,
    },
    Subscribe {
        service_id: String,
        characteristic_id: String,
    },
    Notifications,
}

pub struct MockTransport {
    pub calls: Vec<Call>,
    /// Answers for successive reads; empty reads return no bytes
    pub reads: VecDeque<Result<Vec<u8>, TransportError>>,
    pub fail_writes: bool,
    pub fail_subscribe: bool,
    /// Delivered on the next notification stream, which then stays open
    pub notifications: Vec<Notification>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            reads: VecDeque::new(),
            fail_writes: false,
            fail_subscribe: false,
            notifications: Vec::new(),
        }
    }
}

impl Transport for MockTransport {
    fn peripheral_id(&self) -> &str {
        "ecfe7e123456"
    }

    fn local_address(&self) -> Option<&str> {
        None
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.calls.push(Call::Disconnect);
        Ok(())
    }

    async fn read(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.push(Call::Read {
            service_id: service_id.to_string(),
            characteristic_id: characteristic_id.to_string(),
        });
        self.reads.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn write(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<(), TransportError> {
        self.calls.push(Call::Write {
            service_id: service_id.to_string(),
            characteristic_id: characteristic_id.to_string(),
            value: value.to_vec(),
            mode,
        });
        if self.fail_writes {
            return Err(TransportError::Ble("write rejected".to_string()));
        }
        Ok(())
    }

    async fn subscribe(
        &mut self,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<SubscribeConfirmation, TransportError> {
        self.calls.push(Call::Subscribe {
            service_id: service_id.to_string(),
            characteristic_id: characteristic_id.to_string(),
        });
        if self.fail_subscribe {
            return Err(TransportError::Ble("subscribe rejected".to_string()));
        }
        Ok(SubscribeConfirmation {
            service_id: service_id.to_string(),
            characteristic_id: characteristic_id.to_string(),
            enabled: true,
        })
    }

    async fn notifications(&mut self) -> Result<NotificationStream, TransportError> {
        self.calls.push(Call::Notifications);
        let items = std::mem::take(&mut self.notifications);
        Ok(Box::pin(stream::iter(items).chain(stream::pending())))
    }
}
