//! Eligibility check, send, classify.

use crate::classifier::{classify, classify_transport_error, Outcome};
use crate::{OutboundRequest, Transport};
use forward_store::Message;
use send_policy::{evaluate, Clock, Eligibility, Environment, Preferences};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-request timeout used unless configured otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Ok,
    PermanentError,
    TemporaryError,
    Blackout,
    NotConnected,
}

impl From<Outcome> for DispatchStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Ok => DispatchStatus::Ok,
            Outcome::PermanentError => DispatchStatus::PermanentError,
            Outcome::TemporaryError => DispatchStatus::TemporaryError,
        }
    }
}

impl From<Eligibility> for DispatchStatus {
    fn from(eligibility: Eligibility) -> Self {
        match eligibility {
            Eligibility::Ok => DispatchStatus::Ok,
            Eligibility::NotConnected => DispatchStatus::NotConnected,
            Eligibility::Blackout => DispatchStatus::Blackout,
        }
    }
}

/// Result of one delivery attempt. `data` carries the response body or error
/// text for failed attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub status: DispatchStatus,
    pub data: Option<String>,
}

impl DispatchResult {
    fn new(status: DispatchStatus, data: Option<String>) -> Self {
        Self { status, data }
    }
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    environment: Arc<dyn Environment>,
    clock: Arc<dyn Clock>,
    preferences: Preferences,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        environment: Arc<dyn Environment>,
        clock: Arc<dyn Clock>,
        preferences: Preferences,
    ) -> Self {
        Self {
            transport,
            environment,
            clock,
            preferences,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Current eligibility verdict.
    pub fn can_send(&self) -> Eligibility {
        evaluate(
            &self.clock.now(),
            &self.environment.connectivity(),
            &self.environment.power(),
            &self.preferences,
        )
    }

    /// Deliver `message` if sending is currently allowed.
    pub async fn send(&self, message: &Message) -> DispatchResult {
        let eligibility = self.can_send();
        if !eligibility.is_ok() {
            debug!(message_id = ?message.id, ?eligibility, "Not sending");
            return DispatchResult::new(eligibility.into(), None);
        }

        let request = OutboundRequest::from_message(message, self.timeout);
        match self.transport.send(&request).await {
            Ok(response) => {
                let outcome = classify(response.status);
                debug!(
                    message_id = ?message.id,
                    status = response.status,
                    ?outcome,
                    "Message dispatched"
                );
                let data = (outcome != Outcome::Ok).then_some(response.body);
                DispatchResult::new(outcome.into(), data)
            }
            Err(err) => {
                let outcome = classify_transport_error(&err);
                if outcome == Outcome::TemporaryError {
                    info!(message_id = ?message.id, error = %err, "Transient transport failure");
                } else {
                    warn!(message_id = ?message.id, error = %err, "Transport failure");
                }
                DispatchResult::new(outcome.into(), Some(err.to_string()))
            }
        }
    }
}
