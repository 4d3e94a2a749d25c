//! Transport abstraction.

use async_trait::async_trait;
use forward_store::Message;
use std::time::Duration;
use thiserror::Error;

/// A fully described POST request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: String,
    pub headers: Vec<(String, String)>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl OutboundRequest {
    pub fn from_message(message: &Message, timeout: Duration) -> Self {
        Self {
            url: message.url.clone(),
            query: Vec::new(),
            body: message.body.clone(),
            headers: message
                .headers
                .iter()
                .map(|h| (h.key.clone(), h.value.clone()))
                .collect(),
            username: message.username.clone(),
            password: message.password.clone(),
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Why a request produced no HTTP response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request could not be built (bad URL, bad header, bad credentials).
    /// Nothing was sent.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection refused, reset, or dropped.
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Connection(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Sends one request and reports the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &OutboundRequest) -> TransportResult<TransportResponse>;
}
