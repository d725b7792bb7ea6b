//! # Phasebus Test
//!
//! Test utilities for phasebus pipelines. Everything runs in memory; no
//! transport is involved.
//!
//! ## Key Features
//!
//! - **Journal**: [`Journal`] collects what interceptors did, in order
//! - **Recording interceptors**: [`RecordingInterceptor`] continues,
//!   suspends, fails or stops on demand and records its fault handling
//! - **Conduits**: [`CapturingConduit`] keeps sent messages,
//!   [`LoopbackConduit`] connects a client to a server endpoint
//! - **Fixtures**: [`EndpointFixture`] builds an endpoint on its own bus
//!
//! ## Example
//!
//! ```
//! use phasebus_core::{phases, Parameters};
//! use phasebus_pipeline::{Client, Flow};
//! use phasebus_test::{EndpointFixture, Journal, LoopbackConduit, RecordingInterceptor};
//! use serde_json::json;
//!
//! let journal = Journal::new();
//! let server = EndpointFixture::echo()
//!     .service_interceptor(Flow::In, RecordingInterceptor::new("audit", phases::LOGICAL, &journal))
//!     .build();
//! let client = Client::builder(EndpointFixture::echo().build(), LoopbackConduit::new(server)).build();
//!
//! let result = client.invoke("echo", Parameters::single(json!(42))).unwrap();
//! assert_eq!(result, Some(Parameters::single(json!(42))));
//! assert_eq!(journal.handled(), vec!["audit"]);
//! ```

#![doc(html_root_url = "https://docs.rs/phasebus-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod conduit;
mod error;
mod fixture;
mod interceptor;
mod journal;

pub use conduit::{Captured, CapturingConduit, LoopbackConduit};
pub use error::TestError;
pub use fixture::{echo_service, EndpointFixture, DEFAULT_ADDRESS};
pub use interceptor::{Behaviour, RecordingInterceptor};
pub use journal::{Journal, FAULT_PREFIX};
