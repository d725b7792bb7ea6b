//! Stock interceptors.
//!
//! | Interceptor | Flow | Phase |
//! |---|---|---|
//! | [`CorrelationInInterceptor`] | in | `receive` |
//! | [`LoggingInInterceptor`] | in, in-fault | `receive` |
//! | [`JsonInInterceptor`] | in, in-fault | `unmarshal` |
//! | [`ServiceInvokerInterceptor`] | in | `invoke` |
//! | [`OutgoingChainInterceptor`] | in | `post-invoke` |
//! | [`CorrelationOutInterceptor`] | out, out-fault | `setup` |
//! | [`JsonOutInterceptor`] | out | `marshal` |
//! | [`FaultOutInterceptor`] | out-fault | `marshal` |
//! | [`LoggingOutInterceptor`] | out, out-fault | `write` |
//! | [`MessageSenderInterceptor`] | out, out-fault | `send` |
//!
//! The setup interceptor of the `pre-logical` phase lives in
//! [`crate::setup`].

mod correlation;
mod fault_out;
mod invoker;
mod json;
mod logging;
mod outgoing;
mod sender;

pub use correlation::{CorrelationInInterceptor, CorrelationOutInterceptor};
pub use fault_out::{FaultOutInterceptor, DEFAULT_REDACTED_MESSAGE};
pub use invoker::ServiceInvokerInterceptor;
pub use json::{JsonInInterceptor, JsonOutInterceptor, JSON_CONTENT_TYPE};
pub use logging::{LoggingInInterceptor, LoggingOutInterceptor, DEFAULT_PAYLOAD_LIMIT};
pub use outgoing::OutgoingChainInterceptor;
pub use sender::MessageSenderInterceptor;

use crate::error::PipelineError;
use crate::exchange::Exchange;
use crate::message::Message;
use phasebus_core::Fault;

fn bound_exchange(message: &Message) -> Result<Exchange, Fault> {
    message
        .exchange()
        .ok_or_else(|| PipelineError::Detached { message: message.id() }.into_fault())
}
