//! Transport entry point.
//!
//! A transport hands each received message to the
//! [`ChainInitiationObserver`] of the endpoint it arrived on. The observer
//! creates the exchange, resolves the inbound chain, attaches the fault
//! chain initiator and drives the chain on the calling thread.

use crate::chain::InterceptorChain;
use crate::endpoint::Endpoint;
use crate::error::PipelineResult;
use crate::exchange::Exchange;
use crate::fault::FaultChainInitiator;
use crate::message::Message;
use crate::provider::Flow;
use crate::transport::Conduit;
use std::sync::Arc;
use tracing::{debug, debug_span};

/// Starts server-side processing of received messages.
#[derive(Debug, Clone)]
pub struct ChainInitiationObserver {
    endpoint: Arc<Endpoint>,
}

impl ChainInitiationObserver {
    /// Creates an observer for `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint }
    }

    /// Returns the endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Processes a received message.
    ///
    /// `back_channel` is the conduit responses and faults are sent through;
    /// it may be omitted for one-way traffic. Returns the exchange, which
    /// completes once the response was sent (or, for one-way exchanges,
    /// once the inbound chain finished).
    ///
    /// # Errors
    ///
    /// Returns configuration errors from resolving the inbound chain, and
    /// [`crate::PipelineError::FaultChain`] when no fault response could be
    /// produced.
    pub fn on_message(
        &self,
        message: Message,
        back_channel: Option<Arc<dyn Conduit>>,
    ) -> PipelineResult<Exchange> {
        let exchange = Exchange::new();
        let span = debug_span!("exchange", exchange_id = %exchange.id());
        let _entered = span.enter();

        exchange.set_endpoint(Arc::clone(&self.endpoint));
        if let Some(conduit) = back_channel {
            exchange.set_conduit(conduit);
        }

        let resolved = self.endpoint.resolve_chain(Flow::In)?;
        let initiator = Arc::new(FaultChainInitiator::new(Arc::clone(&self.endpoint)));

        let mut message = message;
        message.set_requestor(false);
        message.set_chain(InterceptorChain::new(resolved, Flow::In).with_fault_observer(initiator));
        let shared = exchange.set_in_message(message);

        let state = {
            let mut request = shared.lock();
            request.drive()?
        };
        debug!(state = state.as_str(), "Inbound chain returned");

        exchange.finish_inbound(state);
        Ok(exchange)
    }
}
