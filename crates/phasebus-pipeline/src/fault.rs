//! Fault chain initiation.
//!
//! When a server-side chain unwinds, [`FaultChainInitiator`] takes over: it
//! copies the error onto the exchange's fault message, resolves a fresh
//! out-fault chain from the bus, endpoint, binding and service scopes, and
//! drives it so the peer receives a fault response.
//!
//! The fault chain itself has no fault observer. If it fails, the failure
//! is logged and returned to whoever drove the original chain.

use crate::chain::{ChainState, FaultObserver, InterceptorChain};
use crate::endpoint::Endpoint;
use crate::error::{PipelineError, PipelineResult};
use crate::message::Message;
use crate::provider::Flow;
use phasebus_core::{Fault, Scope};
use phasebus_telemetry::metrics::record_fault;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Builds and drives the out-fault chain of an endpoint.
#[derive(Debug, Clone)]
pub struct FaultChainInitiator {
    endpoint: Arc<Endpoint>,
}

impl FaultChainInitiator {
    /// Creates an initiator for exchanges served by `endpoint`.
    #[must_use]
    pub const fn new(endpoint: Arc<Endpoint>) -> Self {
        Self { endpoint }
    }
}

impl FaultObserver for FaultChainInitiator {
    fn on_fault(&self, message: &mut Message) -> PipelineResult<()> {
        let fault = message
            .error()
            .cloned()
            .unwrap_or_else(|| Fault::server("processing failed"));
        let exchange = message
            .exchange()
            .ok_or(PipelineError::Detached { message: message.id() })?;

        record_fault(fault.category().as_str());

        if exchange.is_one_way() {
            warn!(
                exchange_id = %exchange.id(),
                fault = %fault,
                "Fault on one-way exchange; no fault response is sent"
            );
            exchange.complete();
            return Ok(());
        }
        if exchange.is_complete() {
            warn!(
                exchange_id = %exchange.id(),
                fault = %fault,
                "Fault after the exchange completed; dropped"
            );
            return Ok(());
        }

        let shared = exchange
            .fault_message()
            .unwrap_or_else(|| exchange.set_fault_message(Message::outbound()));
        let mut fault_message = shared.lock();

        match fault_message.chain_state() {
            None | Some(ChainState::Pending) => {}
            Some(ChainState::Aborted) => {
                return Err(PipelineError::FaultChain {
                    fault: fault_message.error().cloned().unwrap_or(fault),
                });
            }
            Some(state) => {
                debug!(
                    exchange_id = %exchange.id(),
                    state = state.as_str(),
                    "Fault chain already started"
                );
                return Ok(());
            }
        }

        message
            .properties()
            .copy_scope_into(Scope::Application, fault_message.properties_mut());
        fault_message.set_content(fault.clone());

        let chain = self.endpoint.resolve_chain(Flow::OutFault)?;
        fault_message.set_chain(InterceptorChain::new(chain, Flow::OutFault));

        debug!(
            exchange_id = %exchange.id(),
            fault = %fault,
            "Driving fault chain"
        );

        if fault_message.drive()? == ChainState::Aborted {
            let failure = fault_message.error().cloned().unwrap_or(fault);
            error!(
                exchange_id = %exchange.id(),
                fault = %failure,
                "Fault chain failed; no fault response was produced"
            );
            return Err(PipelineError::FaultChain { fault: failure });
        }
        Ok(())
    }
}
