//! Delivery outcome classification.

use crate::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    PermanentError,
    TemporaryError,
}

/// Map an HTTP status code to an outcome.
///
/// 2xx succeed, 5xx are retried, everything else is final.
pub fn classify(status: u16) -> Outcome {
    match status {
        200..=299 => Outcome::Ok,
        300..=499 => Outcome::PermanentError,
        500..=599 => Outcome::TemporaryError,
        _ => Outcome::PermanentError,
    }
}

/// Map a transport failure to an outcome.
pub fn classify_transport_error(err: &TransportError) -> Outcome {
    if err.is_transient() {
        Outcome::TemporaryError
    } else {
        Outcome::PermanentError
    }
}
