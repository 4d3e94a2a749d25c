//! Policy error types.

use thiserror::Error;

/// Errors raised while evaluating send policy.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Malformed blackout window string.
    #[error("Invalid blackout window {window:?}: {reason}")]
    InvalidWindow { window: String, reason: String },

    /// Settings storage failure.
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Result type alias using PolicyError.
pub type PolicyResult<T> = Result<T, PolicyError>;
