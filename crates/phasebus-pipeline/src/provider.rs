//! Interceptor providers.
//!
//! Interceptors are contributed to chains by scopes: the bus, an endpoint,
//! its binding, its service, or a client. Each scope owns an
//! [`InterceptorProvider`] holding one ordered list per [`Flow`]. Providers
//! are filled once while the owning component is built and read when chains
//! are resolved.

use crate::interceptor::{BoxedInterceptor, Interceptor};
use std::fmt;
use std::sync::Arc;

/// A message flow a chain is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Flow {
    /// Inbound messages: requests on a server, responses on a client.
    In,
    /// Outbound messages: responses on a server, requests on a client.
    Out,
    /// Inbound fault responses (client side).
    InFault,
    /// Outbound fault responses (server side).
    OutFault,
}

impl Flow {
    /// All flows.
    pub const ALL: [Self; 4] = [Self::In, Self::Out, Self::InFault, Self::OutFault];

    /// Returns the flow name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
            Self::InFault => "in_fault",
            Self::OutFault => "out_fault",
        }
    }

    /// Returns `true` for fault flows.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::InFault | Self::OutFault)
    }

    /// Returns `true` for flows that carry inbound messages.
    #[must_use]
    pub const fn is_inbound(self) -> bool {
        matches!(self, Self::In | Self::InFault)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The component that contributed interceptors to a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterceptorScope {
    /// Shared by every endpoint on the bus.
    Bus,
    /// One endpoint.
    Endpoint,
    /// The endpoint's binding (wire format).
    Binding,
    /// The endpoint's service.
    Service,
    /// A client proxy.
    Client,
}

impl InterceptorScope {
    /// Returns the scope name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bus => "bus",
            Self::Endpoint => "endpoint",
            Self::Binding => "binding",
            Self::Service => "service",
            Self::Client => "client",
        }
    }
}

/// Interceptor lists for the four flows.
#[derive(Clone, Default)]
pub struct InterceptorProvider {
    in_interceptors: Vec<BoxedInterceptor>,
    out_interceptors: Vec<BoxedInterceptor>,
    in_fault_interceptors: Vec<BoxedInterceptor>,
    out_fault_interceptors: Vec<BoxedInterceptor>,
}

impl InterceptorProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor to the list of `flow`.
    pub fn add<I: Interceptor>(&mut self, flow: Flow, interceptor: I) -> &mut Self {
        self.add_shared(flow, Arc::new(interceptor))
    }

    /// Appends an already shared interceptor to the list of `flow`.
    pub fn add_shared(&mut self, flow: Flow, interceptor: BoxedInterceptor) -> &mut Self {
        self.list_mut(flow).push(interceptor);
        self
    }

    /// Builder form of [`InterceptorProvider::add`].
    #[must_use]
    pub fn with<I: Interceptor>(mut self, flow: Flow, interceptor: I) -> Self {
        self.add(flow, interceptor);
        self
    }

    /// Builder form of [`InterceptorProvider::add_shared`].
    #[must_use]
    pub fn with_shared(mut self, flow: Flow, interceptor: BoxedInterceptor) -> Self {
        self.add_shared(flow, interceptor);
        self
    }

    /// Returns the list of `flow` in registration order.
    #[must_use]
    pub fn interceptors(&self, flow: Flow) -> &[BoxedInterceptor] {
        match flow {
            Flow::In => &self.in_interceptors,
            Flow::Out => &self.out_interceptors,
            Flow::InFault => &self.in_fault_interceptors,
            Flow::OutFault => &self.out_fault_interceptors,
        }
    }

    /// Appends every list of `other` to the matching list of `self`.
    pub fn extend(&mut self, other: &Self) {
        for flow in Flow::ALL {
            self.list_mut(flow)
                .extend(other.interceptors(flow).iter().cloned());
        }
    }

    /// Returns `true` if no flow has interceptors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Flow::ALL.iter().all(|flow| self.interceptors(*flow).is_empty())
    }

    fn list_mut(&mut self, flow: Flow) -> &mut Vec<BoxedInterceptor> {
        match flow {
            Flow::In => &mut self.in_interceptors,
            Flow::Out => &mut self.out_interceptors,
            Flow::InFault => &mut self.in_fault_interceptors,
            Flow::OutFault => &mut self.out_fault_interceptors,
        }
    }
}

impl fmt::Debug for InterceptorProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids = |flow: Flow| {
            self.interceptors(flow)
                .iter()
                .map(|i| i.id().to_string())
                .collect::<Vec<_>>()
        };
        f.debug_struct("InterceptorProvider")
            .field("in", &ids(Flow::In))
            .field("out", &ids(Flow::Out))
            .field("in_fault", &ids(Flow::InFault))
            .field("out_fault", &ids(Flow::OutFault))
            .finish()
    }
}
