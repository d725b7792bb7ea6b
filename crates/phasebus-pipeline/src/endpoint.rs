//! Bus, service, binding and endpoint.
//!
//! These are the four interceptor scopes a server-side chain is assembled
//! from. Each owns an [`InterceptorProvider`] filled while it is built; an
//! [`Endpoint`] ties one service and one binding to a bus and resolves the
//! chains its exchanges run.

use crate::error::PipelineResult;
use crate::exchange::Exchange;
use crate::executor::{Executor, InlineExecutor};
use crate::interceptor::{BoxedInterceptor, Interceptor};
use crate::interceptors::{MessageSenderInterceptor, OutgoingChainInterceptor, ServiceInvokerInterceptor};
use crate::phase::PhaseManager;
use crate::provider::{Flow, InterceptorProvider, InterceptorScope};
use crate::resolver::{ChainResolver, ResolvedChain};
use crate::setup::OutgoingChainSetupInterceptor;
use parking_lot::RwLock;
use phasebus_core::{Fault, Parameters, Properties, PropertyKey};
use phasebus_telemetry::metrics::record_chain_resolution;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Bus
// ============================================================================

/// Process-wide pipeline configuration shared by endpoints and clients.
pub struct Bus {
    phases: PhaseManager,
    interceptors: InterceptorProvider,
    executor: Arc<dyn Executor>,
    cache_resolved: bool,
}

impl Bus {
    /// Starts building a bus.
    #[must_use]
    pub fn builder() -> BusBuilder {
        BusBuilder::default()
    }

    /// Returns the phase lists.
    #[must_use]
    pub const fn phases(&self) -> &PhaseManager {
        &self.phases
    }

    /// Returns the bus-scope interceptors.
    #[must_use]
    pub const fn interceptors(&self) -> &InterceptorProvider {
        &self.interceptors
    }

    /// Returns the default executor for service invocation.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    /// Returns `true` if resolved chains are cached and shared.
    #[must_use]
    pub const fn cache_resolved(&self) -> bool {
        self.cache_resolved
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("phases", &self.phases)
            .field("interceptors", &self.interceptors)
            .field("executor", &self.executor.name())
            .field("cache_resolved", &self.cache_resolved)
            .finish()
    }
}

/// Builder for [`Bus`].
pub struct BusBuilder {
    phases: PhaseManager,
    interceptors: InterceptorProvider,
    executor: Arc<dyn Executor>,
    cache_resolved: bool,
    default_interceptors: bool,
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self {
            phases: PhaseManager::default(),
            interceptors: InterceptorProvider::new(),
            executor: Arc::new(InlineExecutor),
            cache_resolved: true,
            default_interceptors: true,
        }
    }
}

impl BusBuilder {
    /// Sets the phase lists.
    #[must_use]
    pub fn phases(mut self, phases: PhaseManager) -> Self {
        self.phases = phases;
        self
    }

    /// Sets the default executor.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Enables or disables resolved chain caching.
    #[must_use]
    pub const fn cache_resolved(mut self, enabled: bool) -> Self {
        self.cache_resolved = enabled;
        self
    }

    /// Controls whether the built-in setup, invoke, outgoing and send
    /// interceptors are registered. Enabled by default.
    #[must_use]
    pub const fn default_interceptors(mut self, enabled: bool) -> Self {
        self.default_interceptors = enabled;
        self
    }

    /// Adds a bus-scope interceptor.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.add(flow, interceptor);
        self
    }

    /// Adds a shared bus-scope interceptor.
    #[must_use]
    pub fn shared_interceptor(mut self, flow: Flow, interceptor: BoxedInterceptor) -> Self {
        self.interceptors.add_shared(flow, interceptor);
        self
    }

    /// Builds the bus.
    #[must_use]
    pub fn build(self) -> Arc<Bus> {
        let mut interceptors = InterceptorProvider::new();
        if self.default_interceptors {
            let sender: BoxedInterceptor = Arc::new(MessageSenderInterceptor::new());
            interceptors
                .add(Flow::In, OutgoingChainSetupInterceptor::new())
                .add(Flow::In, ServiceInvokerInterceptor::new())
                .add(Flow::In, OutgoingChainInterceptor::new())
                .add_shared(Flow::Out, Arc::clone(&sender))
                .add_shared(Flow::OutFault, sender);
        }
        interceptors.extend(&self.interceptors);

        Arc::new(Bus {
            phases: self.phases,
            interceptors,
            executor: self.executor,
            cache_resolved: self.cache_resolved,
        })
    }
}

// ============================================================================
// Service
// ============================================================================

/// Calls application logic for an operation.
pub trait Invoker: Send + Sync {
    /// Invokes `operation` with `params` and returns the result parameters.
    ///
    /// # Errors
    ///
    /// Returns the fault the operation raised.
    fn invoke(
        &self,
        exchange: &Exchange,
        operation: &str,
        params: Parameters,
    ) -> Result<Parameters, Fault>;
}

impl<F> Invoker for F
where
    F: Fn(&Exchange, &str, Parameters) -> Result<Parameters, Fault> + Send + Sync,
{
    fn invoke(
        &self,
        exchange: &Exchange,
        operation: &str,
        params: Parameters,
    ) -> Result<Parameters, Fault> {
        self(exchange, operation, params)
    }
}

/// Describes one operation of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationInfo {
    name: String,
    one_way: bool,
}

impl OperationInfo {
    /// An operation with a response.
    pub fn two_way(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            one_way: false,
        }
    }

    /// An operation without a response.
    pub fn one_way(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            one_way: true,
        }
    }

    /// Returns the operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the operation has no response.
    #[must_use]
    pub const fn is_one_way(&self) -> bool {
        self.one_way
    }
}

/// Application logic exposed through endpoints.
///
/// ```
/// use phasebus_core::Parameters;
/// use phasebus_pipeline::{OperationInfo, Service};
///
/// let service = Service::from_fn("greeter", |_exchange, _operation, params| Ok(params))
///     .operation(OperationInfo::two_way("echo"))
///     .operation(OperationInfo::one_way("notify"));
///
/// assert!(service.find_operation("notify").unwrap().is_one_way());
/// assert!(service.find_operation("missing").is_none());
/// ```
pub struct Service {
    name: String,
    interceptors: InterceptorProvider,
    invoker: Arc<dyn Invoker>,
    executor: Option<Arc<dyn Executor>>,
    operations: Vec<OperationInfo>,
}

impl Service {
    /// Creates a service backed by `invoker`.
    pub fn new<I: Invoker + 'static>(name: impl Into<String>, invoker: I) -> Self {
        Self {
            name: name.into(),
            interceptors: InterceptorProvider::new(),
            invoker: Arc::new(invoker),
            executor: None,
            operations: Vec::new(),
        }
    }

    /// Creates a service backed by a closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Exchange, &str, Parameters) -> Result<Parameters, Fault> + Send + Sync + 'static,
    {
        Self::new(name, f)
    }

    /// Declares an operation.
    #[must_use]
    pub fn operation(mut self, operation: OperationInfo) -> Self {
        self.operations.push(operation);
        self
    }

    /// Adds a service-scope interceptor.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.add(flow, interceptor);
        self
    }

    /// Runs invocations on `executor` instead of the bus default.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the service-scope interceptors.
    #[must_use]
    pub const fn interceptors(&self) -> &InterceptorProvider {
        &self.interceptors
    }

    /// Returns the invoker.
    #[must_use]
    pub fn invoker(&self) -> Arc<dyn Invoker> {
        Arc::clone(&self.invoker)
    }

    /// Looks up an operation by name.
    #[must_use]
    pub fn find_operation(&self, name: &str) -> Option<&OperationInfo> {
        self.operations.iter().find(|op| op.name == name)
    }

    /// Returns the declared operations.
    #[must_use]
    pub fn operations(&self) -> &[OperationInfo] {
        &self.operations
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("operations", &self.operations)
            .field("interceptors", &self.interceptors)
            .field("executor", &self.executor.as_ref().map(|e| e.name()))
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Binding
// ============================================================================

/// A wire format: the interceptors that encode and decode messages.
#[derive(Debug, Clone)]
pub struct Binding {
    name: String,
    interceptors: InterceptorProvider,
}

impl Binding {
    /// Creates a binding with no interceptors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interceptors: InterceptorProvider::new(),
        }
    }

    /// Adds a binding-scope interceptor.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.add(flow, interceptor);
        self
    }

    /// Returns the binding name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the binding-scope interceptors.
    #[must_use]
    pub const fn interceptors(&self) -> &InterceptorProvider {
        &self.interceptors
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// A service exposed at an address through a binding.
pub struct Endpoint {
    address: String,
    bus: Arc<Bus>,
    service: Arc<Service>,
    binding: Arc<Binding>,
    interceptors: InterceptorProvider,
    properties: Properties,
    cache: RwLock<HashMap<Flow, Arc<ResolvedChain>>>,
}

impl Endpoint {
    /// Starts building an endpoint.
    pub fn builder(
        address: impl Into<String>,
        bus: Arc<Bus>,
        service: Arc<Service>,
        binding: Arc<Binding>,
    ) -> EndpointBuilder {
        EndpointBuilder {
            address: address.into(),
            bus,
            service,
            binding,
            interceptors: InterceptorProvider::new(),
            properties: Properties::new(),
        }
    }

    /// Returns the address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<Bus> {
        &self.bus
    }

    /// Returns the service.
    #[must_use]
    pub const fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Returns the binding.
    #[must_use]
    pub const fn binding(&self) -> &Arc<Binding> {
        &self.binding
    }

    /// Returns the endpoint-scope interceptors.
    #[must_use]
    pub const fn interceptors(&self) -> &InterceptorProvider {
        &self.interceptors
    }

    /// Returns the endpoint properties, the widest level of
    /// contextual property lookup.
    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Returns a clone of an endpoint property.
    #[must_use]
    pub fn property<T: Clone + 'static>(&self, key: &PropertyKey<T>) -> Option<T> {
        self.properties.get_cloned(key)
    }

    /// Returns the executor service invocations run on.
    #[must_use]
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.service
            .executor
            .clone()
            .unwrap_or_else(|| self.bus.executor())
    }

    /// Returns a resolver for `flow` loaded with the bus and endpoint
    /// scopes, then `extra` (a client), then the binding and service scopes.
    #[must_use]
    pub fn resolver(&self, flow: Flow, extra: Option<&InterceptorProvider>) -> ChainResolver {
        let mut resolver = ChainResolver::new(self.bus.phases().phases_for(flow).clone())
            .add_scope(InterceptorScope::Bus, self.bus.interceptors().interceptors(flow))
            .add_scope(InterceptorScope::Endpoint, self.interceptors.interceptors(flow));
        if let Some(client) = extra {
            resolver = resolver.add_scope(InterceptorScope::Client, client.interceptors(flow));
        }
        resolver
            .add_scope(InterceptorScope::Binding, self.binding.interceptors().interceptors(flow))
            .add_scope(InterceptorScope::Service, self.service.interceptors().interceptors(flow))
    }

    /// Resolves the server-side chain for `flow`, from the cache when
    /// caching is enabled.
    ///
    /// # Errors
    ///
    /// Returns the configuration error found while resolving.
    pub fn resolve_chain(&self, flow: Flow) -> PipelineResult<Arc<ResolvedChain>> {
        if self.bus.cache_resolved() {
            if let Some(chain) = self.cache.read().get(&flow) {
                return Ok(Arc::clone(chain));
            }
        }

        let chain = Arc::new(self.resolver(flow, None).resolve()?);
        record_chain_resolution(flow.as_str());
        debug!(
            endpoint = %self.address,
            flow = flow.as_str(),
            chain = ?chain.ids(),
            "Chain resolved"
        );

        if self.bus.cache_resolved() {
            let mut cache = self.cache.write();
            return Ok(Arc::clone(cache.entry(flow).or_insert(chain)));
        }
        Ok(chain)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("service", &self.service.name())
            .field("binding", &self.binding.name())
            .field("interceptors", &self.interceptors)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Endpoint`].
pub struct EndpointBuilder {
    address: String,
    bus: Arc<Bus>,
    service: Arc<Service>,
    binding: Arc<Binding>,
    interceptors: InterceptorProvider,
    properties: Properties,
}

impl EndpointBuilder {
    /// Adds an endpoint-scope interceptor.
    #[must_use]
    pub fn interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.add(flow, interceptor);
        self
    }

    /// Adds an endpoint-scope interceptor that is shared with other owners.
    #[must_use]
    pub fn shared_interceptor(mut self, flow: Flow, interceptor: BoxedInterceptor) -> Self {
        self.interceptors.add_shared(flow, interceptor);
        self
    }

    /// Stores an endpoint property.
    #[must_use]
    pub fn property<T: Send + Sync + 'static>(mut self, key: &PropertyKey<T>, value: T) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// Builds the endpoint.
    #[must_use]
    pub fn build(self) -> Arc<Endpoint> {
        Arc::new(Endpoint {
            address: self.address,
            bus: self.bus,
            service: self.service,
            binding: self.binding,
            interceptors: self.interceptors,
            properties: self.properties,
            cache: RwLock::new(HashMap::new()),
        })
    }
}
