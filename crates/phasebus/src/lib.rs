//! # Phasebus
//!
//! **Ordered interceptor pipelines for message exchanges**
//!
//! Phasebus processes every message that enters or leaves an endpoint by
//! running it through an ordered chain of interceptors:
//!
//! - **Phases** – Interceptors declare a named phase; chains follow the
//!   configured phase order
//! - **Constraints** – `before`/`after` refine ordering inside a phase
//! - **Scopes** – Bus, endpoint, client, binding and service interceptors
//!   merge into one chain per flow
//! - **Unwind** – A failure unwinds the interceptors that ran, in reverse,
//!   and hands the fault to the fault chain
//! - **Suspension** – Chains pause while a worker invokes the service and
//!   resume where they stopped
//!
//! ## Quick Start
//!
//! ```
//! use phasebus::prelude::*;
//! use phasebus_test::LoopbackConduit;
//! use serde_json::json;
//!
//! let runtime = Runtime::new(PhasebusConfig::default())?;
//!
//! let greeter = Service::from_fn("greeter", |_, _, params| {
//!     let name = params.get(0).and_then(|v| v.as_str()).unwrap_or("world");
//!     Ok(Parameters::single(json!(format!("hello, {name}"))))
//! })
//! .operation(OperationInfo::two_way("greet"));
//! let server = runtime.endpoint("local://greeter", greeter).build();
//!
//! let stub = Service::from_fn("greeter", |_, _, _| Ok(Parameters::empty()))
//!     .operation(OperationInfo::two_way("greet"));
//! let client = runtime
//!     .client(runtime.endpoint("local://greeter", stub).build(), LoopbackConduit::new(server))
//!     .build();
//!
//! let reply = client.invoke("greet", Parameters::single(json!("phasebus")))?;
//! assert_eq!(reply, Some(Parameters::single(json!("hello, phasebus"))));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! transport → receive → unmarshal → logical → invoke → post-invoke
//!                                                          ↓
//! transport ← send ← write ← marshal ← setup ←─────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/phasebus/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod runtime;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{Runtime, RuntimeBuilder, DEFAULT_CONFIG_FILE, ENV_PREFIX, SHUTDOWN_GRACE};

// Re-export core types
pub use phasebus_core as core;

// Re-export pipeline types
pub use phasebus_pipeline as pipeline;

// Re-export configuration types
pub use phasebus_config as config;

// Re-export telemetry
pub use phasebus_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use phasebus::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Runtime, RuntimeBuilder, RuntimeError};

    pub use phasebus_core::{keys, phases, Fault, FaultCategory, Parameters, Payload, PropertyKey};

    pub use phasebus_pipeline::{
        Binding, ChainInitiationObserver, ChainState, Client, ClientError, Conduit, Control,
        Endpoint, Exchange, FnInterceptor, Flow, Interceptor, InterceptorDescriptor,
        InterceptorResult, Message, OperationInfo, PipelineError, Service,
    };

    pub use phasebus_config::{ConfigLoader, ExecutorMode, PhasebusConfig};
}
