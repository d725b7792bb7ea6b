//! Pipeline error types.
//!
//! [`PipelineError`] covers everything that is not a processing fault:
//! configuration errors found while resolving a chain, misuse of an
//! exchange, and failures of the fault chain itself. Processing faults are
//! [`Fault`] values carried on the message.

use phasebus_core::{ExchangeId, Fault, MessageId};
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised by chain resolution and chain driving.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// An interceptor names a phase that is not in the phase list.
    #[error("interceptor '{interceptor}' declares unknown phase '{phase}'")]
    UnknownPhase {
        /// Interceptor ID.
        interceptor: String,
        /// The phase it asked for.
        phase: String,
    },

    /// An interceptor declares no phase at all.
    #[error("interceptor '{interceptor}' declares no phase")]
    MissingPhase {
        /// Interceptor ID.
        interceptor: String,
    },

    /// Before/after constraints inside one phase form a cycle.
    #[error("ordering cycle in phase '{phase}' among [{}]", .members.join(", "))]
    OrderingCycle {
        /// Phase whose constraints cycle.
        phase: String,
        /// IDs on the cycle, sorted.
        members: Vec<String>,
    },

    /// Phase priorities are not strictly increasing.
    #[error("invalid phase order: {reason}")]
    InvalidPhaseOrder {
        /// What is wrong with the list.
        reason: String,
    },

    /// A phase name appears twice in one list.
    #[error("phase '{phase}' is declared more than once")]
    DuplicatePhase {
        /// The repeated name.
        phase: String,
    },

    /// The outbound chain of a one-way exchange was asked to run.
    #[error("exchange {exchange} is one-way and has no outbound chain")]
    OneWayExchange {
        /// The exchange.
        exchange: ExchangeId,
    },

    /// A message was driven without an attached chain.
    #[error("message {message} has no interceptor chain")]
    NoChain {
        /// The message.
        message: MessageId,
    },

    /// An exchange lacks the message a caller asked for.
    #[error("exchange {exchange} has no {role} message")]
    MissingMessage {
        /// The exchange.
        exchange: ExchangeId,
        /// "in", "out" or "fault".
        role: &'static str,
    },

    /// A message is not bound to a live exchange.
    #[error("message {message} is not bound to an exchange")]
    Detached {
        /// The message.
        message: MessageId,
    },

    /// An exchange has no endpoint to resolve chains from.
    #[error("exchange {exchange} has no endpoint")]
    NoEndpoint {
        /// The exchange.
        exchange: ExchangeId,
    },

    /// Producing the fault response failed.
    #[error("fault chain failed: {fault}")]
    FaultChain {
        /// The fault the fault chain ended with.
        fault: Fault,
    },
}

impl PipelineError {
    /// Creates an unknown phase error.
    pub fn unknown_phase(interceptor: impl Into<String>, phase: impl Into<String>) -> Self {
        Self::UnknownPhase {
            interceptor: interceptor.into(),
            phase: phase.into(),
        }
    }

    /// Creates an ordering cycle error. Members are sorted so the error is
    /// the same regardless of registration order.
    pub fn ordering_cycle(phase: impl Into<String>, mut members: Vec<String>) -> Self {
        members.sort();
        Self::OrderingCycle {
            phase: phase.into(),
            members,
        }
    }

    /// Creates an invalid phase order error.
    pub fn invalid_phase_order(reason: impl Into<String>) -> Self {
        Self::InvalidPhaseOrder {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors detected while resolving a chain.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownPhase { .. }
                | Self::MissingPhase { .. }
                | Self::OrderingCycle { .. }
                | Self::InvalidPhaseOrder { .. }
                | Self::DuplicatePhase { .. }
        )
    }

    /// Converts this error into a server fault for interceptors that must
    /// report it on a message.
    #[must_use]
    pub fn into_fault(self) -> Fault {
        match self {
            Self::FaultChain { fault } => fault,
            other => Fault::server(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_members_sorted() {
        let err = PipelineError::ordering_cycle(
            "invoke",
            vec!["b".to_string(), "a".to_string(), "c".to_string()],
        );
        assert_eq!(err.to_string(), "ordering cycle in phase 'invoke' among [a, b, c]");
    }

    #[test]
    fn test_is_configuration() {
        assert!(PipelineError::unknown_phase("x", "nowhere").is_configuration());
        assert!(!PipelineError::NoChain {
            message: MessageId::new()
        }
        .is_configuration());
    }

    #[test]
    fn test_into_fault() {
        let fault = Fault::client("bad");
        let err = PipelineError::FaultChain {
            fault: fault.clone(),
        };
        assert_eq!(err.into_fault(), fault);

        let fault = PipelineError::invalid_phase_order("empty").into_fault();
        assert_eq!(fault.message(), "invalid phase order: empty");
    }
}
