//! Batched delivery.
//!
//! Pending messages are folded into one JSON document
//! `{"events":[{"url":…,"messageId":…,"payload":…}, …]}` and posted to a
//! single batch endpoint. A successful batch removes every message up to the
//! last one included.

use crate::{MessageProvider, WorkerError, WorkerResult};
use forward_store::{Message, MessageStore, DEFAULT_RETRIES};
use send_policy::BackoutGate;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Backout task tracking the last successful batch.
pub const BATCH_TASK: &str = "BatchProvider";

/// Bytes of `{"events":[]}` around the event list.
const ENVELOPE_BYTES: usize = 13;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Batch endpoint. Derived from the first message's URL when absent.
    pub url: Option<Url>,
    pub max_messages: usize,
    pub max_bytes: usize,
    /// A partial batch is sent at most this often.
    pub submit_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_messages: 100,
            max_bytes: 300 * 1024,
            submit_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchEvent {
    url: String,
    #[serde(rename = "messageId")]
    message_id: i64,
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct BatchBody {
    events: Vec<BatchEvent>,
}

impl BatchEvent {
    fn from_message(message: &Message) -> WorkerResult<Self> {
        let message_id = message
            .id
            .ok_or_else(|| WorkerError::Batch("stored message has no id".to_string()))?;
        // Bodies that are not JSON travel as strings.
        let payload = serde_json::from_str(&message.body)
            .unwrap_or_else(|_| serde_json::Value::String(message.body.clone()));
        Ok(Self {
            url: message.url.clone(),
            message_id,
            payload,
        })
    }
}

/// Resolve the batch endpoint next to a message URL:
/// `https://host/api/events` becomes `https://host/api/batch`.
pub fn derive_batch_url(message_url: &str) -> WorkerResult<Url> {
    Ok(Url::parse(message_url)?.join("batch")?)
}

pub struct BatchProvider {
    store: Arc<MessageStore>,
    gate: BackoutGate,
    config: BatchConfig,
}

impl BatchProvider {
    pub fn new(store: Arc<MessageStore>, gate: BackoutGate, config: BatchConfig) -> Self {
        Self {
            store,
            gate,
            config,
        }
    }
}

impl MessageProvider for BatchProvider {
    fn next(&mut self) -> WorkerResult<Option<Message>> {
        let mut events = Vec::new();
        let mut size = ENVELOPE_BYTES;
        let mut last_id = None;
        let mut first_url = None;

        let mut cursor = self.store.next()?;
        while let Some(message) = cursor {
            let event = BatchEvent::from_message(&message)?;
            let event_bytes = serde_json::to_vec(&event)?.len() + 1;
            if !events.is_empty() && size + event_bytes > self.config.max_bytes {
                break;
            }

            let message_id = event.message_id;
            size += event_bytes;
            last_id = Some(message_id);
            first_url.get_or_insert_with(|| message.url.clone());
            events.push(event);

            if events.len() >= self.config.max_messages {
                break;
            }
            cursor = self.store.next_after(message_id)?;
        }

        let (Some(last_id), Some(first_url)) = (last_id, first_url) else {
            return Ok(None);
        };

        let url = match &self.config.url {
            Some(url) => url.clone(),
            None => derive_batch_url(&first_url)?,
        };
        let count = events.len();
        let body = serde_json::to_string(&BatchBody { events })?;

        debug!(count, bytes = body.len(), last_id, url = %url, "Batch assembled");
        Ok(Some(
            Message {
                id: Some(last_id),
                url: url.to_string(),
                body,
                username: None,
                password: None,
                headers: Vec::new(),
                retries_left: DEFAULT_RETRIES,
            }
            .with_header("Content-Type", "application/json"),
        ))
    }

    fn delete(&mut self, message: &Message) -> WorkerResult<()> {
        let Some(last_id) = message.id else {
            return Ok(());
        };
        let removed = self.store.delete_through(last_id)?;
        info!(removed, last_id, "Batch delivered");
        if let Err(err) = self.gate.record(BATCH_TASK) {
            warn!(error = %err, "Failed to record batch time");
        }
        Ok(())
    }

    fn can_send(&mut self) -> bool {
        match self.store.count() {
            Ok(count) if count >= self.config.max_messages as u64 => return true,
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Could not count pending messages"),
        }
        self.gate
            .elapsed(BATCH_TASK, self.config.submit_interval.mul_f64(0.9))
    }

    fn record_temporary_error(&mut self, message: &Message) -> WorkerResult<()> {
        // The whole batch is retried on the next activation.
        debug!(last_id = ?message.id, "Batch failed temporarily");
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.store.close() {
            warn!(error = %err, "Failed to close message store");
        }
    }
}
