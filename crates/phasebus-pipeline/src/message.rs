//! The message state container.
//!
//! A [`Message`] carries the metadata ([`Properties`]) and body
//! ([`Contents`]) of one logical message, the error condition interceptors
//! attach when processing fails, and the interceptor chain driving it.
//!
//! Messages bound to an [`Exchange`] are stored as [`SharedMessage`]
//! handles. The mutex around a shared message is the suspend/resume
//! handoff point: the thread that drives a chain holds the lock, and a
//! worker resuming a suspended chain must acquire it first.

use crate::chain::{ChainState, InterceptorChain};
use crate::error::{PipelineError, PipelineResult};
use crate::exchange::{Exchange, ExchangeInner};
use crate::provider::Flow;
use parking_lot::Mutex;
use phasebus_core::{Contents, Fault, MessageId, Properties, PropertyKey};
use std::fmt;
use std::sync::{Arc, Weak};

/// A message bound to an exchange, shared between the exchange and the
/// threads that drive it.
pub type SharedMessage = Arc<Mutex<Message>>;

/// Which way a message travels relative to the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Received from a transport.
    Inbound,
    /// Produced locally, to be sent.
    Outbound,
}

impl Direction {
    /// Returns the direction name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// One logical message of an exchange.
///
/// ```
/// use phasebus_core::{keys, Parameters};
/// use phasebus_pipeline::Message;
/// use serde_json::json;
///
/// let mut message = Message::inbound();
/// message.set_property(&keys::OPERATION, "add".to_string());
/// message.set_content(Parameters::new(vec![json!(1), json!(2)]));
///
/// assert_eq!(message.property(&keys::OPERATION).map(String::as_str), Some("add"));
/// assert_eq!(message.content::<Parameters>().map(Parameters::len), Some(2));
/// ```
pub struct Message {
    id: MessageId,
    direction: Direction,
    requestor: bool,
    properties: Properties,
    contents: Contents,
    error: Option<Fault>,
    exchange: Weak<ExchangeInner>,
    chain: Option<InterceptorChain>,
}

impl Message {
    /// Creates an empty message travelling in `direction`.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            id: MessageId::new(),
            direction,
            requestor: false,
            properties: Properties::new(),
            contents: Contents::new(),
            error: None,
            exchange: Weak::new(),
            chain: None,
        }
    }

    /// Creates an empty inbound message.
    #[must_use]
    pub fn inbound() -> Self {
        Self::new(Direction::Inbound)
    }

    /// Creates an empty outbound message.
    #[must_use]
    pub fn outbound() -> Self {
        Self::new(Direction::Outbound)
    }

    /// Returns the message ID.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        self.id
    }

    /// Returns the direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns `true` on the side that initiated the exchange (a client).
    #[must_use]
    pub const fn is_requestor(&self) -> bool {
        self.requestor
    }

    /// Marks the message as belonging to the requesting side.
    pub fn set_requestor(&mut self, requestor: bool) {
        self.requestor = requestor;
    }

    // --- properties -------------------------------------------------------

    /// Returns the property map.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns the property map mutably.
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    /// Returns a property stored on this message.
    #[must_use]
    pub fn property<T: 'static>(&self, key: &PropertyKey<T>) -> Option<&T> {
        self.properties.get(key)
    }

    /// Stores a property on this message.
    pub fn set_property<T: Send + Sync + 'static>(&mut self, key: &PropertyKey<T>, value: T) {
        self.properties.insert(key, value);
    }

    /// Looks a property up on the message, then the exchange, then the
    /// endpoint, returning the narrowest value found.
    #[must_use]
    pub fn contextual_property<T: Clone + Send + Sync + 'static>(
        &self,
        key: &PropertyKey<T>,
    ) -> Option<T> {
        if let Some(value) = self.properties.get_cloned(key) {
            return Some(value);
        }
        let exchange = self.exchange()?;
        exchange.property(key).or_else(|| {
            exchange
                .endpoint()
                .and_then(|endpoint| endpoint.properties().get_cloned(key))
        })
    }

    // --- contents ---------------------------------------------------------

    /// Returns the content slot of type `T`.
    #[must_use]
    pub fn content<T: Send + 'static>(&self) -> Option<&T> {
        self.contents.get()
    }

    /// Returns the content slot of type `T` mutably.
    pub fn content_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.contents.get_mut()
    }

    /// Replaces the content slot of type `T`, returning the previous value.
    pub fn set_content<T: Send + 'static>(&mut self, value: T) -> Option<T> {
        self.contents.set(value)
    }

    /// Removes and returns the content slot of type `T`.
    pub fn take_content<T: Send + 'static>(&mut self) -> Option<T> {
        self.contents.take()
    }

    /// Returns the type names of the occupied content slots.
    #[must_use]
    pub fn content_formats(&self) -> Vec<&'static str> {
        self.contents.formats()
    }

    // --- error condition --------------------------------------------------

    /// Returns the error attached to this message.
    #[must_use]
    pub const fn error(&self) -> Option<&Fault> {
        self.error.as_ref()
    }

    /// Attaches an error. The chain unwinds at the next step boundary.
    pub fn set_error(&mut self, fault: Fault) {
        self.error = Some(fault);
    }

    /// Removes and returns the attached error.
    pub fn take_error(&mut self) -> Option<Fault> {
        self.error.take()
    }

    // --- exchange & chain -------------------------------------------------

    /// Returns the exchange this message is bound to, if it is still alive.
    #[must_use]
    pub fn exchange(&self) -> Option<Exchange> {
        self.exchange.upgrade().map(Exchange::from_inner)
    }

    pub(crate) fn bind(&mut self, exchange: Weak<ExchangeInner>) {
        self.exchange = exchange;
    }

    /// Returns the attached chain.
    #[must_use]
    pub const fn chain(&self) -> Option<&InterceptorChain> {
        self.chain.as_ref()
    }

    /// Attaches a chain, replacing any previous one.
    pub fn set_chain(&mut self, chain: InterceptorChain) {
        self.chain = Some(chain);
    }

    /// Detaches and returns the chain.
    pub fn take_chain(&mut self) -> Option<InterceptorChain> {
        self.chain.take()
    }

    /// Returns the state of the attached chain.
    #[must_use]
    pub fn chain_state(&self) -> Option<ChainState> {
        self.chain.as_ref().map(InterceptorChain::state)
    }

    /// Runs the attached chain from its cursor.
    ///
    /// An outbound response chain of a one-way exchange is inert: driving it
    /// fails with [`PipelineError::OneWayExchange`] and nothing runs.
    pub fn drive(&mut self) -> PipelineResult<ChainState> {
        let mut chain = self.take_chain().ok_or(PipelineError::NoChain { message: self.id })?;

        if chain.flow() == Flow::Out && !self.requestor {
            if let Some(exchange) = self.exchange().filter(Exchange::is_one_way) {
                self.chain = Some(chain);
                return Err(PipelineError::OneWayExchange {
                    exchange: exchange.id(),
                });
            }
        }

        let result = chain.run(self);
        self.chain = Some(chain);
        result
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::inbound()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("requestor", &self.requestor)
            .field("properties", &self.properties)
            .field("contents", &self.contents)
            .field("error", &self.error)
            .field("chain", &self.chain_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phasebus_core::{keys, Payload};

    const TENANT: PropertyKey<String> = PropertyKey::application("tenant");

    #[test]
    fn test_content_slots_replace_per_type() {
        let mut message = Message::inbound();
        assert!(message.set_content(Payload::from("raw")).is_none());
        message.set_content(7_u32);

        let previous = message.set_content(Payload::from("decoded"));
        assert_eq!(previous.map(|p| p.to_text_lossy()), Some("raw".to_string()));
        assert_eq!(message.content_formats().len(), 2);

        assert_eq!(message.take_content::<u32>(), Some(7));
        assert!(message.content::<u32>().is_none());
    }

    #[test]
    fn test_error_is_separate_from_fault_slot() {
        let mut message = Message::outbound();
        message.set_content(Fault::client("carried"));
        assert!(message.error().is_none());

        message.set_error(Fault::server("raised"));
        assert_eq!(message.take_error(), Some(Fault::server("raised")));
        assert!(message.content::<Fault>().is_some());
    }

    #[test]
    fn test_contextual_property_without_exchange() {
        let mut message = Message::inbound();
        assert_eq!(message.contextual_property(&TENANT), None);
        message.set_property(&TENANT, "acme".to_string());
        assert_eq!(message.contextual_property(&TENANT), Some("acme".to_string()));
    }

    #[test]
    fn test_contextual_property_falls_back_to_exchange() {
        let exchange = Exchange::new();
        exchange.set_property(&TENANT, "from-exchange".to_string());
        let shared = exchange.set_in_message(Message::inbound());

        let mut message = shared.lock();
        assert_eq!(
            message.contextual_property(&TENANT),
            Some("from-exchange".to_string())
        );

        message.set_property(&TENANT, "from-message".to_string());
        assert_eq!(
            message.contextual_property(&TENANT),
            Some("from-message".to_string())
        );
    }

    #[test]
    fn test_drive_without_chain() {
        let mut message = Message::inbound();
        let id = message.id();
        assert_eq!(message.drive(), Err(PipelineError::NoChain { message: id }));
    }

    #[test]
    fn test_detached_message_has_no_exchange() {
        let message = Message::outbound();
        assert!(message.exchange().is_none());
        assert_eq!(message.direction(), Direction::Outbound);
        assert!(message.property(&keys::OPERATION).is_none());
    }
}
