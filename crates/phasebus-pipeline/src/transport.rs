//! Transport seams.
//!
//! Transports are outside the pipeline. They meet it at two points: a
//! [`Conduit`] accepts outbound messages from the `send` phase, and a
//! [`ResponseObserver`] receives the messages a conduit gets back.

use crate::exchange::Exchange;
use crate::message::Message;
use phasebus_core::Fault;
use std::sync::Weak;

/// Delivers outbound messages to the wire.
pub trait Conduit: Send + Sync {
    /// Sends a fully marshalled message.
    ///
    /// # Errors
    ///
    /// Returns a [`Fault`] (usually [`Fault::Transport`]) when the message
    /// could not be delivered.
    fn send(&self, message: &mut Message) -> Result<(), Fault>;

    /// Registers the observer responses are delivered to. Conduits without
    /// a response path ignore it.
    fn set_response_observer(&self, _observer: Weak<dyn ResponseObserver>) {}
}

/// Receives messages coming back through a conduit.
pub trait ResponseObserver: Send + Sync {
    /// Handles the response to `exchange`.
    fn on_response(&self, exchange: &Exchange, message: Message);
}
