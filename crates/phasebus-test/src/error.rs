//! Test error types.

use thiserror::Error;

/// Errors raised by test helpers.
#[derive(Debug, Error)]
pub enum TestError {
    /// The captured message has no payload.
    #[error("captured message has no payload")]
    MissingPayload,

    /// The payload is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
