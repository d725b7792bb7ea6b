//! Fault types for phasebus.
//!
//! A [`Fault`] is the typed error value an interceptor attaches to a message
//! when processing cannot continue. The chain executor is the only component
//! that interprets it: a message carrying a fault is unwound and handed to the
//! fault chain, which marshals the fault into a [`FaultEnvelope`] for the wire.
//!
//! # Fault codes
//!
//! | `FaultCategory` | Wire code | Typical cause |
//! |---|---|---|
//! | `Client` | `Client` | Malformed payload, unknown operation |
//! | `Server` | `Server` | Unexpected processing failure |
//! | `Application` | `Server` | Business fault raised by the service |
//! | `Aborted` | `Server` | Interceptor stopped processing explicitly |
//! | `Cancelled` | `Server` | Exchange cancelled by the surrounding layer |
//! | `Transport` | `Server` | Back channel could not deliver a message |

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using [`Fault`].
pub type FaultResult<T> = Result<T, Fault>;

/// Classification of a [`Fault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCategory {
    /// The sender supplied something the pipeline could not process.
    Client,
    /// Processing failed on the receiving side.
    Server,
    /// The service raised a business fault.
    Application,
    /// An interceptor requested that processing stop.
    Aborted,
    /// The exchange was cancelled.
    Cancelled,
    /// A transport back channel failed.
    Transport,
}

impl FaultCategory {
    /// Returns the wire-level fault code for this category.
    ///
    /// Only [`FaultCategory::Client`] is attributed to the sender; everything
    /// else is reported as a receiver-side fault.
    #[must_use]
    pub const fn fault_code(&self) -> &'static str {
        match self {
            Self::Client => "Client",
            _ => "Server",
        }
    }

    /// Returns the category name used in logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Application => "application",
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
            Self::Transport => "transport",
        }
    }
}

/// A processing fault attached to a message.
///
/// `Fault` is `Clone` because the fault chain copies the triggering fault onto
/// the exchange's fault message while the original stays on the message that
/// failed.
///
/// # Example
///
/// ```
/// use phasebus_core::{Fault, FaultCategory};
///
/// fn parse_quantity(raw: &str) -> Result<u32, Fault> {
///     raw.parse()
///         .map_err(|_| Fault::client(format!("'{raw}' is not a quantity")))
/// }
///
/// let fault = parse_quantity("many").unwrap_err();
/// assert_eq!(fault.category(), FaultCategory::Client);
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The request was malformed or referenced something unknown.
    #[error("client fault: {message}")]
    Client {
        /// Human-readable fault message.
        message: String,
        /// Additional detail for diagnostics.
        detail: Option<String>,
    },

    /// Processing failed on the receiving side.
    #[error("server fault: {message}")]
    Server {
        /// Human-readable fault message.
        message: String,
        /// Additional detail (not exposed to peers unless configured).
        detail: Option<String>,
    },

    /// A business fault raised by application logic.
    #[error("application fault [{code}]: {message}")]
    Application {
        /// Application-defined fault code.
        code: String,
        /// Human-readable fault message.
        message: String,
        /// Additional detail for the caller.
        detail: Option<String>,
    },

    /// An interceptor returned an explicit stop.
    #[error("processing aborted by interceptor '{interceptor}'")]
    Aborted {
        /// ID of the interceptor that stopped processing.
        interceptor: String,
    },

    /// The exchange was cancelled by the surrounding layer.
    #[error("exchange cancelled: {reason}")]
    Cancelled {
        /// Why the exchange was cancelled.
        reason: String,
    },

    /// The transport could not deliver a message.
    #[error("transport fault: {message}")]
    Transport {
        /// Human-readable fault message.
        message: String,
    },
}

impl Fault {
    /// Creates a client fault.
    #[must_use]
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            message: message.into(),
            detail: None,
        }
    }

    /// Creates a server fault.
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
            detail: None,
        }
    }

    /// Creates an application fault with a business code.
    #[must_use]
    pub fn application(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            code: code.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Creates an aborted fault naming the interceptor that stopped.
    #[must_use]
    pub fn aborted(interceptor: impl Into<String>) -> Self {
        Self::Aborted {
            interceptor: interceptor.into(),
        }
    }

    /// Creates a cancellation fault.
    #[must_use]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates a transport fault.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Converts an arbitrary error into a server fault.
    ///
    /// The top-level message becomes the fault message; the full cause chain
    /// is kept as detail.
    pub fn from_error(error: impl Into<anyhow::Error>) -> Self {
        let error = error.into();
        Self::Server {
            message: error.to_string(),
            detail: Some(format!("{error:#}")),
        }
    }

    /// Attaches detail to faults that carry it. Other variants are unchanged.
    #[must_use]
    pub fn with_detail(mut self, value: impl Into<String>) -> Self {
        match &mut self {
            Self::Client { detail, .. }
            | Self::Server { detail, .. }
            | Self::Application { detail, .. } => *detail = Some(value.into()),
            Self::Aborted { .. } | Self::Cancelled { .. } | Self::Transport { .. } => {}
        }
        self
    }

    /// Returns the fault category.
    #[must_use]
    pub const fn category(&self) -> FaultCategory {
        match self {
            Self::Client { .. } => FaultCategory::Client,
            Self::Server { .. } => FaultCategory::Server,
            Self::Application { .. } => FaultCategory::Application,
            Self::Aborted { .. } => FaultCategory::Aborted,
            Self::Cancelled { .. } => FaultCategory::Cancelled,
            Self::Transport { .. } => FaultCategory::Transport,
        }
    }

    /// Returns the fault message without the category prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Client { message, .. }
            | Self::Server { message, .. }
            | Self::Application { message, .. }
            | Self::Transport { message } => message.clone(),
            Self::Aborted { interceptor } => {
                format!("processing aborted by interceptor '{interceptor}'")
            }
            Self::Cancelled { reason } => reason.clone(),
        }
    }

    /// Returns the fault detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Client { detail, .. }
            | Self::Server { detail, .. }
            | Self::Application { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Converts this fault to its wire envelope.
    ///
    /// With `expose_details` off, server-side messages are replaced by
    /// `redacted_message` and detail is dropped; client and application
    /// faults always keep their message because it is meant for the caller.
    #[must_use]
    pub fn to_envelope(&self, expose_details: bool, redacted_message: &str) -> FaultEnvelope {
        let category = self.category();
        let caller_facing = matches!(
            category,
            FaultCategory::Client | FaultCategory::Application
        );

        let (message, detail) = if expose_details {
            (self.message(), self.detail().map(ToString::to_string))
        } else if caller_facing {
            let detail = match self {
                Self::Application { detail, .. } => detail.clone(),
                _ => None,
            };
            (self.message(), detail)
        } else {
            (redacted_message.to_string(), None)
        };

        FaultEnvelope {
            fault: FaultBody {
                code: category.fault_code().to_string(),
                category,
                message,
                application_code: match self {
                    Self::Application { code, .. } => Some(code.clone()),
                    _ => None,
                },
                detail,
            },
        }
    }

    /// Rebuilds a fault from a received envelope.
    #[must_use]
    pub fn from_envelope(envelope: FaultEnvelope) -> Self {
        let FaultBody {
            category,
            message,
            application_code,
            detail,
            ..
        } = envelope.fault;

        match category {
            FaultCategory::Client => Self::Client { message, detail },
            FaultCategory::Application => Self::Application {
                code: application_code.unwrap_or_default(),
                message,
                detail,
            },
            FaultCategory::Cancelled => Self::Cancelled { reason: message },
            FaultCategory::Transport => Self::Transport { message },
            FaultCategory::Server | FaultCategory::Aborted => Self::Server { message, detail },
        }
    }
}

/// Wire envelope for a fault response.
///
/// ```json
/// {
///   "fault": {
///     "code": "Server",
///     "category": "application",
///     "message": "insufficient funds",
///     "application_code": "FUNDS"
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEnvelope {
    /// The fault body.
    pub fault: FaultBody,
}

/// Body of a [`FaultEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultBody {
    /// Wire fault code (`Client` or `Server`).
    pub code: String,
    /// Fault category.
    pub category: FaultCategory,
    /// Human-readable message.
    pub message: String,
    /// Application fault code, for application faults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_code: Option<String>,
    /// Diagnostic detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
