//! [`Transport`] over reqwest.

use crate::{OutboundRequest, Transport, TransportError, TransportResponse, TransportResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as StdError;
use std::io::ErrorKind;
use tracing::{debug, warn};

/// POSTs requests with a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> TransportResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn parse_url(raw: &str) -> TransportResult<Url> {
    let url = Url::parse(raw).map_err(|e| TransportError::InvalidRequest(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::InvalidRequest(format!(
            "unsupported scheme {other:?}"
        ))),
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &OutboundRequest) -> TransportResult<TransportResponse> {
        let url = parse_url(&request.url)?;

        let mut builder = self
            .client
            .post(url)
            .timeout(request.timeout)
            .body(request.body.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(username) = &request.username {
            builder = builder.basic_auth(username, request.password.as_ref());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                warn!(status, error = %err, "Failed to read response body");
                String::new()
            }
        };

        debug!(url = %request.url, status, "Request completed");
        Ok(TransportResponse { status, body })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() || has_transient_io_source(&err) {
            TransportError::Connection(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Walk the error chain looking for an I/O failure worth retrying.
fn has_transient_io_source(err: &(dyn StdError + 'static)) -> bool {
    let mut source = Some(err);
    while let Some(current) = source {
        if let Some(io) = current.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
                    | ErrorKind::UnexpectedEof
            ) {
                return true;
            }
        }
        source = current.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn request(url: &str) -> OutboundRequest {
        OutboundRequest {
            url: url.to_string(),
            query: Vec::new(),
            body: "{}".to_string(),
            headers: Vec::new(),
            username: None,
            password: None,
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn malformed_url_is_invalid_request() {
        let transport = ReqwestTransport::new().unwrap();
        let err = transport.send(&request("not a url")).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn non_http_scheme_is_invalid_request() {
        let transport = ReqwestTransport::new().unwrap();
        let err = transport
            .send(&request("ftp://files.example.com/upload"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn bad_header_name_is_invalid_request() {
        let transport = ReqwestTransport::new().unwrap();
        let mut req = request("http://127.0.0.1:9/");
        req.headers.push(("bad header".to_string(), "v".to_string()));
        let err = transport.send(&req).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn io_reset_in_chain_is_transient() {
        let reset = std::io::Error::new(ErrorKind::ConnectionReset, "peer reset");
        assert!(has_transient_io_source(&reset));
        let denied = std::io::Error::new(ErrorKind::PermissionDenied, "nope");
        assert!(!has_transient_io_source(&denied));
    }
}
