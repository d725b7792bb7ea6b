//! # Phasebus Core
//!
//! Core types shared by every phasebus crate.
//!
//! This crate provides the leaf types the interceptor pipeline is built on:
//!
//! - [`Fault`] - Processing fault attached to a message, with a wire envelope
//! - [`MessageId`] / [`ExchangeId`] - UUID v7 identifiers
//! - [`Properties`] - Typed property map with visibility [`Scope`]s
//! - [`Contents`] - Typed content slots ([`Payload`], [`Parameters`], ...)
//! - [`phases`] - Canonical phase names for the inbound and outbound flows

#![doc(html_root_url = "https://docs.rs/phasebus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod content;
mod error;
mod ids;
pub mod phases;
mod properties;

pub use content::{Contents, Parameters, Payload};
pub use error::{Fault, FaultBody, FaultCategory, FaultEnvelope, FaultResult};
pub use ids::{ExchangeId, MessageId};
pub use properties::{keys, Properties, PropertyKey, Scope};
