//! Worker error types.

use forward_store::StoreError;
use send_policy::PolicyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A batch could not be assembled.
    #[error("Batch error: {0}")]
    Batch(String),

    /// A blocking store task panicked or was cancelled.
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias using WorkerError.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WorkerError::Batch("message without id".to_string());
        assert_eq!(err.to_string(), "Batch error: message without id");

        let err: WorkerError = StoreError::InvalidData("negative retries".to_string()).into();
        assert_eq!(err.to_string(), "Store error: Invalid data: negative retries");
    }
}
