//! Outgoing chain setup.
//!
//! Runs early in the inbound `pre-logical` phase. For an exchange that
//! expects a response it creates the outbound message with its resolved
//! chain already attached, plus the fault message placeholder, before the
//! service is invoked. Whichever thread produces the response only has to
//! drive what is already there.

use crate::chain::InterceptorChain;
use crate::error::PipelineError;
use crate::fault::FaultChainInitiator;
use crate::interceptor::{Control, Interceptor, InterceptorDescriptor, InterceptorResult};
use crate::message::Message;
use crate::provider::Flow;
use phasebus_core::{phases, Scope};
use std::sync::Arc;
use tracing::debug;

/// Creates the outbound and fault messages of a two-way exchange.
#[derive(Debug)]
pub struct OutgoingChainSetupInterceptor {
    descriptor: InterceptorDescriptor,
}

impl OutgoingChainSetupInterceptor {
    /// ID of this interceptor.
    pub const ID: &'static str = "phasebus.outgoing-chain-setup";

    /// Creates the interceptor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            descriptor: InterceptorDescriptor::new(Self::ID, phases::PRE_LOGICAL),
        }
    }
}

impl Default for OutgoingChainSetupInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for OutgoingChainSetupInterceptor {
    fn descriptor(&self) -> &InterceptorDescriptor {
        &self.descriptor
    }

    fn handle_message(&self, message: &mut Message) -> InterceptorResult {
        if message.is_requestor() {
            return Ok(Control::Continue);
        }
        let exchange = message
            .exchange()
            .ok_or_else(|| PipelineError::Detached { message: message.id() }.into_fault())?;
        if exchange.is_one_way() {
            debug!(exchange_id = %exchange.id(), "One-way exchange; no outbound chain");
            return Ok(Control::Continue);
        }
        let endpoint = exchange
            .endpoint()
            .ok_or_else(|| PipelineError::NoEndpoint { exchange: exchange.id() }.into_fault())?;

        if exchange.out_message().is_none() {
            let resolved = endpoint
                .resolve_chain(Flow::Out)
                .map_err(PipelineError::into_fault)?;
            let mut out = Message::outbound();
            message
                .properties()
                .copy_scope_into(Scope::Application, out.properties_mut());
            out.set_chain(
                InterceptorChain::new(resolved, Flow::Out)
                    .with_fault_observer(Arc::new(FaultChainInitiator::new(Arc::clone(&endpoint)))),
            );
            exchange.set_out_message(out);
            debug!(exchange_id = %exchange.id(), "Outbound chain attached");
        }

        if exchange.fault_message().is_none() {
            let mut fault = Message::outbound();
            message
                .properties()
                .copy_scope_into(Scope::Application, fault.properties_mut());
            exchange.set_fault_message(fault);
        }

        Ok(Control::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainState;
    use crate::endpoint::{Binding, Bus, Endpoint, OperationInfo, Service};
    use crate::exchange::Exchange;
    use phasebus_core::{keys, Fault};

    fn endpoint() -> Arc<Endpoint> {
        let service = Service::from_fn("svc", |_, _, p| Ok(p)).operation(OperationInfo::two_way("op"));
        Endpoint::builder(
            "local://svc",
            Bus::builder().default_interceptors(false).build(),
            Arc::new(service),
            Arc::new(Binding::new("test")),
        )
        .build()
    }

    fn request(exchange: &Exchange) -> crate::message::SharedMessage {
        let mut message = Message::inbound();
        message.set_property(&keys::OPERATION, "op".to_string());
        message.set_property(&keys::CONTENT_TYPE, "application/json".to_string());
        exchange.set_in_message(message)
    }

    #[test]
    fn test_creates_out_and_fault_messages() {
        let exchange = Exchange::new();
        exchange.set_endpoint(endpoint());
        let request = request(&exchange);

        let result = OutgoingChainSetupInterceptor::new().handle_message(&mut request.lock());
        assert_eq!(result, Ok(Control::Continue));

        let out = exchange.out_message().unwrap();
        let out = out.lock();
        assert_eq!(out.chain_state(), Some(ChainState::Pending));
        assert_eq!(out.property(&keys::OPERATION).map(String::as_str), Some("op"));
        assert!(out.property(&keys::CONTENT_TYPE).is_none());
        assert!(exchange.fault_message().is_some());
    }

    #[test]
    fn test_existing_out_message_kept() {
        let exchange = Exchange::new();
        exchange.set_endpoint(endpoint());
        let existing = exchange.set_out_message(Message::outbound());
        let request = request(&exchange);

        OutgoingChainSetupInterceptor::new()
            .handle_message(&mut request.lock())
            .unwrap();
        assert!(Arc::ptr_eq(&existing, &exchange.out_message().unwrap()));
    }

    #[test]
    fn test_one_way_gets_no_outbound_chain() {
        let exchange = Exchange::new();
        exchange.set_endpoint(endpoint());
        exchange.set_one_way(true);
        let request = request(&exchange);

        OutgoingChainSetupInterceptor::new()
            .handle_message(&mut request.lock())
            .unwrap();
        assert!(exchange.out_message().is_none());
        assert!(exchange.fault_message().is_none());
    }

    #[test]
    fn test_requires_endpoint() {
        let exchange = Exchange::new();
        let request = request(&exchange);
        let result = OutgoingChainSetupInterceptor::new().handle_message(&mut request.lock());
        assert!(matches!(result, Err(Fault::Server { .. })));
    }
}
