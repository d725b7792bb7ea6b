//! In-memory conduits.
//!
//! [`CapturingConduit`] stores what it is given. [`LoopbackConduit`] wires a
//! client straight to a server endpoint: requests go to the endpoint's
//! [`ChainInitiationObserver`] and responses come back to the client's
//! [`ResponseObserver`] on the same thread (or the worker thread, when the
//! service runs on an executor).

use crate::error::TestError;
use parking_lot::{Mutex, RwLock};
use phasebus_core::{keys, Fault, Payload};
use phasebus_pipeline::{
    ChainInitiationObserver, Conduit, Endpoint, Exchange, Message, ResponseObserver,
};
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::debug;

/// A message as a conduit saw it.
#[derive(Debug, Clone)]
pub struct Captured {
    /// The wire body.
    pub payload: Option<Payload>,
    /// The `content-type` header.
    pub content_type: Option<String>,
    /// The `message-id` header.
    pub message_id: Option<String>,
    /// The `relates-to` header.
    pub relates_to: Option<String>,
    /// The fault the message carries, for fault responses.
    pub fault: Option<Fault>,
}

impl Captured {
    fn from_message(message: &Message) -> Self {
        Self {
            payload: message.content::<Payload>().cloned(),
            content_type: message.property(&keys::CONTENT_TYPE).cloned(),
            message_id: message.property(&keys::MESSAGE_ID).cloned(),
            relates_to: message.property(&keys::RELATES_TO).cloned(),
            fault: message.content::<Fault>().cloned(),
        }
    }

    /// Parses the payload as JSON.
    pub fn json(&self) -> Result<Value, TestError> {
        let payload = self.payload.as_ref().ok_or(TestError::MissingPayload)?;
        Ok(serde_json::from_slice(payload.as_bytes())?)
    }

    /// Returns the payload as text.
    #[must_use]
    pub fn text(&self) -> String {
        self.payload
            .as_ref()
            .map(Payload::to_text_lossy)
            .unwrap_or_default()
    }
}

/// A conduit that records every message sent through it.
#[derive(Debug, Default)]
pub struct CapturingConduit {
    sent: Mutex<Vec<Captured>>,
    failure: Option<Fault>,
}

impl CapturingConduit {
    /// Creates a conduit that accepts everything.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a conduit that records and then rejects every message.
    #[must_use]
    pub fn failing(fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(fault),
        })
    }

    /// Returns the messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Captured> {
        self.sent.lock().clone()
    }

    /// Returns the last message sent.
    #[must_use]
    pub fn last(&self) -> Option<Captured> {
        self.sent.lock().last().cloned()
    }

    /// Returns the number of messages sent.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl Conduit for CapturingConduit {
    fn send(&self, message: &mut Message) -> Result<(), Fault> {
        self.sent.lock().push(Captured::from_message(message));
        match &self.failure {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }
}

// Copies what a real transport would put on the wire.
fn wire_copy(message: &Message) -> Message {
    let mut received = Message::inbound();
    if let Some(payload) = message.content::<Payload>() {
        received.set_content(payload.clone());
    }
    for key in [keys::CONTENT_TYPE, keys::MESSAGE_ID, keys::RELATES_TO] {
        if let Some(value) = message.property(&key) {
            received.set_property(&key, value.clone());
        }
    }
    received
}

/// Connects a client to a server endpoint in memory.
pub struct LoopbackConduit {
    server: ChainInitiationObserver,
    observer: RwLock<Option<Weak<dyn ResponseObserver>>>,
    requests: Mutex<Vec<Captured>>,
    exchanges: Mutex<Vec<Exchange>>,
}

impl LoopbackConduit {
    /// Creates a conduit delivering requests to `endpoint`.
    #[must_use]
    pub fn new(endpoint: Arc<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            server: ChainInitiationObserver::new(endpoint),
            observer: RwLock::new(None),
            requests: Mutex::new(Vec::new()),
            exchanges: Mutex::new(Vec::new()),
        })
    }

    /// Returns the requests delivered so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().clone()
    }

    /// Returns the server-side exchanges created so far.
    #[must_use]
    pub fn server_exchanges(&self) -> Vec<Exchange> {
        self.exchanges.lock().clone()
    }
}

impl Conduit for LoopbackConduit {
    fn send(&self, message: &mut Message) -> Result<(), Fault> {
        let client_exchange = message
            .exchange()
            .ok_or_else(|| Fault::transport("request is not bound to an exchange"))?;
        let observer = self
            .observer
            .read()
            .clone()
            .ok_or_else(|| Fault::transport("no response observer registered"))?;

        self.requests.lock().push(Captured::from_message(message));
        let back_channel: Arc<dyn Conduit> = Arc::new(BackChannel {
            client_exchange,
            observer,
        });

        let exchange = self
            .server
            .on_message(wire_copy(message), Some(back_channel))
            .map_err(|err| Fault::transport(err.to_string()))?;
        debug!(exchange_id = %exchange.id(), "Request delivered over loopback");
        self.exchanges.lock().push(exchange);
        Ok(())
    }

    fn set_response_observer(&self, observer: Weak<dyn ResponseObserver>) {
        *self.observer.write() = Some(observer);
    }
}

struct BackChannel {
    client_exchange: Exchange,
    observer: Weak<dyn ResponseObserver>,
}

impl Conduit for BackChannel {
    fn send(&self, message: &mut Message) -> Result<(), Fault> {
        let observer = self
            .observer
            .upgrade()
            .ok_or_else(|| Fault::transport("client is gone"))?;

        let mut response = wire_copy(message);
        if message.content::<Fault>().is_some() {
            response.set_property(&keys::FAULT_RESPONSE, true);
        }
        observer.on_response(&self.client_exchange, response);
        Ok(())
    }
}
