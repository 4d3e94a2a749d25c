//! Scripted transport for tests and dry runs.

use crate::{OutboundRequest, Transport, TransportError, TransportResponse, TransportResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Replays queued results in order and records every request it receives.
/// Once the script runs out every request gets `200`.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<VecDeque<TransportResult<TransportResponse>>>>,
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16) {
        self.push_response(status, "");
    }

    pub fn push_response(&self, status: u16, body: &str) {
        self.script
            .lock()
            .push_back(Ok(TransportResponse::new(status, body)));
    }

    pub fn push_error(&self, err: TransportError) {
        self.script.lock().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &OutboundRequest) -> TransportResult<TransportResponse> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "")))
    }
}
