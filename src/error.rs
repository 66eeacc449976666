//! Error types crossing the coordinator boundary.
//!
//! Parser and protocol-level problems are absorbed below this layer; only
//! explicit command failures and session-state errors reach the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The debug session is not active (never started, or already torn down).
    #[error("debug session is not active")]
    SessionInactive,

    /// The backend returned nothing where a confirmation line was expected.
    #[error("empty response from backend")]
    EmptyResponse,

    /// The backend confirmation could not be classified.
    #[error("malformed response from backend: {0}")]
    MalformedResponse(String),

    /// The backend echoed a different breakpoint id than the one requested.
    #[error("backend confirmed breakpoint {returned}, expected {requested}")]
    ConfirmationMismatch { requested: u32, returned: u32 },

    /// Expression evaluation failed on the backend.
    #[error("failed to evaluate expression: {0}")]
    EvaluationFailed(String),

    /// The command channel is closed or the command could not be written.
    #[error("command channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, EngineError>;
