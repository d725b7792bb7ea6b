use super::bound_exchange;
use crate::error::PipelineError;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use phasebus_core::phases;
use tracing::trace;

/// Drives the outbound chain attached by setup once the service returned.
///
/// A failure of the outbound chain is handled by its own fault observer;
/// only an error producing the fault response comes back here, and it
/// fails the inbound chain.
#[derive(Debug)]
pub struct OutgoingChainInterceptor {
    descriptor: InterceptorDescriptor,
}

impl OutgoingChainInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.outgoing-chain";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::POST_INVOKE),
        }
    }
}

impl Default for OutgoingChainInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for OutgoingChainInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        if message.is_requestor() {
            return Ok(Control::Continue);
        }
        let exchange = bound_exchange(message)?;
        if exchange.is_one_way() {
            return Ok(Control::Continue);
        }

        let state = exchange.drive_outbound().map_err(PipelineError::into_fault)?;
        trace!(exchange_id = %exchange.id(), state = state.as_str(), "Outbound chain finished");
        Ok(Control::Continue)
    }
}
