//! Message correlation.
//!
//! Every exchange gets a correlation ID, a UUID v7, stored under
//! [`keys::CORRELATION_ID`]. On the receiving side it is taken from the
//! sender's `message-id` header when incoming IDs are trusted, and
//! generated otherwise. Because the key is application-scoped, setup copies
//! it onto the response and fault messages, where the outbound interceptor
//! turns it into a `relates-to` header.
//!
//! Requests sent by a client get a fresh `message-id`.

use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use phasebus_core::{keys, phases};
use uuid::Uuid;

/// Assigns the correlation ID of inbound messages.
#[derive(Debug)]
pub struct CorrelationInInterceptor {
    descriptor: InterceptorDescriptor,
    trust_incoming: bool,
}

impl CorrelationInInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.correlation-in";

    /// Creates an interceptor that always generates correlation IDs.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::RECEIVE),
            trust_incoming: false,
        }
    }

    /// Creates an interceptor that reuses a valid incoming `message-id`.
    ///
    /// Use this for peers that already assign IDs worth keeping.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self {
            trust_incoming: true,
            ..Self::new()
        }
    }

    fn incoming_id(&self, message: &Message) -> Option<Uuid> {
        if !self.trust_incoming {
            return None;
        }
        message
            .property(&keys::MESSAGE_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

impl Default for CorrelationInInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for CorrelationInInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        let id = self.incoming_id(message).unwrap_or_else(Uuid::now_v7);
        message.set_property(&keys::CORRELATION_ID, id);
        Ok(Control::Continue)
    }
}

/// Writes correlation headers on outbound messages.
#[derive(Debug)]
pub struct CorrelationOutInterceptor {
    descriptor: InterceptorDescriptor,
}

impl CorrelationOutInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.correlation-out";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::SETUP),
        }
    }
}

impl Default for CorrelationOutInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for CorrelationOutInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        if message.is_requestor() {
            if message.property(&keys::MESSAGE_ID).is_none() {
                message.set_property(&keys::MESSAGE_ID, Uuid::now_v7().to_string());
            }
        } else if let Some(id) = message.contextual_property(&keys::CORRELATION_ID) {
            message.set_property(&keys::RELATES_TO, id.to_string());
        }
        Ok(Control::Continue)
    }
}
