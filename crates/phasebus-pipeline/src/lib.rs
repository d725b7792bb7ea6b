//! # Phasebus Pipeline
//!
//! Ordered interceptor pipeline runtime.
//!
//! Every message that passes through an endpoint, inbound or outbound, is
//! processed by an [`InterceptorChain`]: an ordered list of interceptors,
//! each assigned to a named [`Phase`] and optionally constrained to run
//! before or after other interceptors of the same phase.
//!
//! ## Message Flow
//!
//! ```text
//! transport → ChainInitiationObserver → in chain ─→ invoke ─→ out chain → Conduit
//!                                          │                     │
//!                                          └── fault ──→ out-fault chain → Conduit
//! ```
//!
//! ## Building Blocks
//!
//! | Type | Role |
//! |------|------|
//! | [`PhaseList`] / [`PhaseManager`] | Phase order per direction |
//! | [`ChainResolver`] | Orders contributed interceptors into a [`ResolvedChain`] |
//! | [`InterceptorChain`] | Runs a resolved chain, suspends, resumes and unwinds |
//! | [`Exchange`] | Request, response and fault messages of one interaction |
//! | [`Bus`] / [`Endpoint`] / [`Service`] / [`Binding`] | Interceptor scopes |
//! | [`FaultChainInitiator`] | Turns an unwound chain into a fault response |
//! | [`Client`] | Sends requests and waits for responses |
//!
//! ## Example
//!
//! ```
//! use phasebus_core::phases;
//! use phasebus_pipeline::{ChainResolver, FnInterceptor, InterceptorDescriptor, InterceptorScope, PhaseList};
//! use phasebus_pipeline::{Control, BoxedInterceptor};
//! use std::sync::Arc;
//!
//! let step = |id: &str| -> BoxedInterceptor {
//!     Arc::new(FnInterceptor::new(InterceptorDescriptor::new(id, phases::LOGICAL), |_| {
//!         Ok(Control::Continue)
//!     }))
//! };
//!
//! let chain = ChainResolver::new(PhaseList::from_names(phases::DEFAULT_INBOUND).unwrap())
//!     .add_scope(InterceptorScope::Bus, &[step("audit")])
//!     .add_scope(InterceptorScope::Service, &[step("authorize")])
//!     .resolve()
//!     .unwrap();
//! assert_eq!(chain.ids(), vec!["audit", "authorize"]);
//! ```

#![doc(html_root_url = "https://docs.rs/phasebus-pipeline/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod chain;
mod client;
mod endpoint;
mod error;
mod exchange;
mod executor;
mod fault;
mod interceptor;
pub mod interceptors;
mod message;
mod observer;
mod phase;
mod provider;
mod resolver;
mod setup;
mod transport;

pub use chain::{ChainState, FaultObserver, InterceptorChain};
pub use client::{Client, ClientBuilder, ClientError, DEFAULT_TIMEOUT};
pub use endpoint::{
    Binding, Bus, BusBuilder, Endpoint, EndpointBuilder, Invoker, OperationInfo, Service,
};
pub use error::{PipelineError, PipelineResult};
pub use exchange::Exchange;
pub use executor::{Executor, InlineExecutor, Job, TokioExecutor};
pub use fault::FaultChainInitiator;
pub use interceptor::{
    BoxedInterceptor, Control, FnInterceptor, Interceptor, InterceptorDescriptor,
    InterceptorResult,
};
pub use message::{Direction, Message, SharedMessage};
pub use observer::ChainInitiationObserver;
pub use phase::{Phase, PhaseList, PhaseManager};
pub use provider::{Flow, InterceptorProvider, InterceptorScope};
pub use resolver::{ChainResolver, ResolvedChain};
pub use setup::OutgoingChainSetupInterceptor;
pub use transport::{Conduit, ResponseObserver};
