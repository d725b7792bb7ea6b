//! Client-side invocation.
//!
//! A [`Client`] sends requests to an endpoint through a [`Conduit`]. The
//! request runs an outbound chain built from the bus, endpoint, client,
//! binding and service scopes. For two-way operations the client then waits
//! for the conduit to deliver the response to [`Client`]'s
//! [`ResponseObserver`] implementation, which runs the inbound (or
//! in-fault) chain and completes the exchange.

use crate::chain::{ChainState, InterceptorChain};
use crate::endpoint::Endpoint;
use crate::error::{PipelineError, PipelineResult};
use crate::exchange::Exchange;
use crate::interceptor::Interceptor;
use crate::message::Message;
use crate::provider::{Flow, InterceptorProvider};
use crate::resolver::ResolvedChain;
use crate::transport::{Conduit, ResponseObserver};
use parking_lot::RwLock;
use phasebus_core::{keys, Fault, Parameters};
use phasebus_telemetry::metrics::record_chain_resolution;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default time a two-way invocation waits for its response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by [`Client::invoke`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request chain could not be resolved or driven.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The service declares no such operation.
    #[error("service '{service}' has no operation '{operation}'")]
    UnknownOperation {
        /// The requested operation.
        operation: String,
        /// The service name.
        service: String,
    },

    /// No response arrived in time.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The request failed locally or the peer answered with a fault.
    #[error("request failed: {0}")]
    Fault(Fault),

    /// The exchange completed without a response message.
    #[error("exchange completed without a response")]
    NoResponse,
}

impl ClientError {
    /// Returns the fault for [`ClientError::Fault`].
    #[must_use]
    pub const fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Sends requests to an endpoint.
pub struct Client {
    endpoint: Arc<Endpoint>,
    interceptors: InterceptorProvider,
    conduit: Arc<dyn Conduit>,
    timeout: Duration,
    cache: RwLock<HashMap<Flow, Arc<ResolvedChain>>>,
}

impl Client {
    /// Starts building a client for `endpoint` sending through `conduit`.
    pub fn builder(endpoint: Arc<Endpoint>, conduit: Arc<dyn Conduit>) -> ClientBuilder {
        ClientBuilder {
            endpoint,
            conduit,
            interceptors: InterceptorProvider::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Returns the target endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Returns the response timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolve(&self, flow: Flow) -> PipelineResult<Arc<ResolvedChain>> {
        let cached = self.endpoint.bus().cache_resolved();
        if cached {
            if let Some(chain) = self.cache.read().get(&flow) {
                return Ok(Arc::clone(chain));
            }
        }

        let chain = Arc::new(self.endpoint.resolver(flow, Some(&self.interceptors)).resolve()?);
        record_chain_resolution(flow.as_str());

        if cached {
            let mut cache = self.cache.write();
            return Ok(Arc::clone(cache.entry(flow).or_insert(chain)));
        }
        Ok(chain)
    }

    /// Invokes `operation` with `params`.
    ///
    /// Returns `Ok(None)` for one-way operations once the request was sent,
    /// and the response parameters for two-way operations.
    ///
    /// # Errors
    ///
    /// See [`ClientError`].
    pub fn invoke(
        &self,
        operation: &str,
        params: Parameters,
    ) -> Result<Option<Parameters>, ClientError> {
        let service = self.endpoint.service();
        let one_way = service
            .find_operation(operation)
            .ok_or_else(|| ClientError::UnknownOperation {
                operation: operation.to_string(),
                service: service.name().to_string(),
            })?
            .is_one_way();

        let exchange = Exchange::new();
        exchange.set_endpoint(Arc::clone(&self.endpoint));
        exchange.set_conduit(Arc::clone(&self.conduit));
        exchange.set_one_way(one_way);

        let mut request = Message::outbound();
        request.set_requestor(true);
        request.set_property(&keys::OPERATION, operation.to_string());
        request.set_content(params);
        request.set_chain(InterceptorChain::new(self.resolve(Flow::Out)?, Flow::Out));
        let shared = exchange.set_out_message(request);

        {
            let mut request = shared.lock();
            if request.drive()? == ChainState::Aborted {
                let fault = request
                    .take_error()
                    .unwrap_or_else(|| Fault::server("request chain aborted"));
                return Err(ClientError::Fault(fault));
            }
        }

        if one_way {
            return Ok(None);
        }

        if !exchange.wait_for_completion(self.timeout) {
            exchange.cancel("response timed out");
            warn!(
                exchange_id = %exchange.id(),
                operation,
                timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                "Invocation timed out"
            );
            return Err(ClientError::Timeout(self.timeout));
        }

        let response = exchange.in_message().ok_or(ClientError::NoResponse)?;
        let mut response = response.lock();
        if let Some(fault) = response.take_error() {
            return Err(ClientError::Fault(fault));
        }
        Ok(Some(
            response
                .take_content::<Parameters>()
                .unwrap_or_else(Parameters::empty),
        ))
    }
}

impl ResponseObserver for Client {
    fn on_response(&self, exchange: &Exchange, mut message: Message) {
        message.set_requestor(true);
        let flow = if message.property(&keys::FAULT_RESPONSE).copied().unwrap_or(false) {
            Flow::InFault
        } else {
            Flow::In
        };
        debug!(exchange_id = %exchange.id(), flow = flow.as_str(), "Response received");

        match self.resolve(flow) {
            Ok(chain) => {
                message.set_chain(InterceptorChain::new(chain, flow));
                let shared = exchange.set_in_message(message);
                let mut response = shared.lock();
                if let Err(err) = response.drive() {
                    error!(exchange_id = %exchange.id(), error = %err, "Response chain failed");
                    response.set_error(err.into_fault());
                }
            }
            Err(err) => {
                message.set_error(err.into_fault());
                exchange.set_in_message(message);
            }
        }

        exchange.complete();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint.address())
            .field("interceptors", &self.interceptors)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    endpoint: Arc<Endpoint>,
    conduit: Arc<dyn Conduit>,
    interceptors: InterceptorProvider,
    timeout: Duration,
}

impl ClientBuilder {
    /// Adds a client-scope interceptor.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.add(flow, interceptor);
        self
    }

    /// Sets the response timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the client and registers it as the conduit's response
    /// observer.
    #[must_use]
    pub fn build(self) -> Arc<Client> {
        let client = Arc::new(Client {
            endpoint: self.endpoint,
            interceptors: self.interceptors,
            conduit: self.conduit,
            timeout: self.timeout,
            cache: RwLock::new(HashMap::new()),
        });
        let as_observer: Arc<dyn ResponseObserver> = client.clone();
        client
            .conduit
            .set_response_observer(Arc::downgrade(&as_observer));
        client
    }
}
