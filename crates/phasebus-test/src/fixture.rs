//! Endpoint fixtures.

use phasebus_core::{Fault, Parameters};
use phasebus_pipeline::{
    Binding, BoxedInterceptor, Bus, BusBuilder, Endpoint, Executor, Flow, Interceptor,
    OperationInfo, Service,
};
use std::sync::Arc;

/// Address used when a fixture does not set one.
pub const DEFAULT_ADDRESS: &str = "local://test";

/// Builds a service with three operations:
///
/// - `echo` (two-way) returns its parameters
/// - `notify` (one-way) returns nothing
/// - `deny` (two-way) raises an application fault with code `DENIED`
pub fn echo_service() -> Service {
    Service::from_fn("echo", |_exchange, operation, params| match operation {
        "echo" => Ok(params),
        "notify" => Ok(Parameters::empty()),
        "deny" => Err(Fault::application("DENIED", "request denied")),
        other => Err(Fault::client(format!("unknown operation '{other}'"))),
    })
    .operation(OperationInfo::two_way("echo"))
    .operation(OperationInfo::one_way("notify"))
    .operation(OperationInfo::two_way("deny"))
}

/// Fluent builder for an endpoint on its own bus.
///
/// ```
/// use phasebus_test::EndpointFixture;
///
/// let endpoint = EndpointFixture::echo().address("local://orders").build();
/// assert_eq!(endpoint.address(), "local://orders");
/// assert_eq!(endpoint.binding().name(), "json");
/// ```
pub struct EndpointFixture {
    address: String,
    bus: BusBuilder,
    service: Service,
    binding: Binding,
    interceptors: Vec<(Flow, BoxedInterceptor)>,
}

impl EndpointFixture {
    /// Starts a fixture for `service` with the JSON binding and a default
    /// bus.
    pub fn new(service: Service) -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            bus: Bus::builder(),
            service,
            binding: Binding::json(),
            interceptors: Vec::new(),
        }
    }

    /// Starts a fixture for [`echo_service`].
    pub fn echo() -> Self {
        Self::new(echo_service())
    }

    /// Sets the endpoint address.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Replaces the binding.
    pub fn binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    /// Sets the bus executor.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.bus = self.bus.executor(executor);
        self
    }

    /// Disables the resolved chain cache.
    pub fn uncached(mut self) -> Self {
        self.bus = self.bus.cache_resolved(false);
        self
    }

    /// Adds a bus-scope interceptor.
    pub fn bus_interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.bus = self.bus.interceptor(flow, interceptor);
        self
    }

    /// Adds an endpoint-scope interceptor.
    pub fn endpoint_interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.interceptors.push((flow, Arc::new(interceptor)));
        self
    }

    /// Adds a service-scope interceptor.
    pub fn service_interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.service = self.service.interceptor(flow, interceptor);
        self
    }

    /// Adds a binding-scope interceptor.
    pub fn binding_interceptor<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.binding = self.binding.interceptor(flow, interceptor);
        self
    }

    /// Builds the endpoint.
    #[must_use]
    pub fn build(self) -> Arc<Endpoint> {
        let builder = Endpoint::builder(
            self.address,
            self.bus.build(),
            Arc::new(self.service),
            Arc::new(self.binding),
        );
        self.interceptors
            .into_iter()
            .fold(builder, |builder, (flow, interceptor)| {
                builder.shared_interceptor(flow, interceptor)
            })
            .build()
    }
}
