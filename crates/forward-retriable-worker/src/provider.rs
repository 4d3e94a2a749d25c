//! Message providers feed the drain loop.

use crate::WorkerResult;
use forward_store::{Message, MessageStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of the next thing to send and sink for its outcome.
///
/// The drain loop only talks to a provider, so single-message and batched
/// delivery share one loop.
pub trait MessageProvider: Send {
    /// Oldest pending message, if any.
    fn next(&mut self) -> WorkerResult<Option<Message>>;

    /// Forget `message` after a success or a permanent failure.
    fn delete(&mut self, message: &Message) -> WorkerResult<()>;

    /// Whether the provider wants to send at all right now.
    fn can_send(&mut self) -> bool;

    /// Account for a temporary failure of `message`.
    fn record_temporary_error(&mut self, message: &Message) -> WorkerResult<()>;

    /// Release resources. Called once at the end of every drain.
    fn close(&mut self);
}

/// Sends stored messages one at a time.
pub struct SingleMessageProvider {
    store: Arc<MessageStore>,
}

impl SingleMessageProvider {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self { store }
    }
}

impl MessageProvider for SingleMessageProvider {
    fn next(&mut self) -> WorkerResult<Option<Message>> {
        Ok(self.store.next()?)
    }

    fn delete(&mut self, message: &Message) -> WorkerResult<()> {
        Ok(self.store.delete(message)?)
    }

    fn can_send(&mut self) -> bool {
        true
    }

    fn record_temporary_error(&mut self, message: &Message) -> WorkerResult<()> {
        if message.retries_left > 0 {
            let remaining = self.store.decrement_retries(message)?;
            debug!(message_id = ?message.id, retries_left = ?remaining, "Retry budget reduced");
        } else {
            warn!(message_id = ?message.id, url = %message.url, "Retry budget exhausted, dropping message");
            self.store.delete(message)?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Err(err) = self.store.close() {
            warn!(error = %err, "Failed to close message store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_error_decrements_then_deletes() {
        let store = Arc::new(MessageStore::open_in_memory().unwrap());
        store
            .insert(&Message::new("https://a.example", "a").with_retries(1))
            .unwrap();
        let mut provider = SingleMessageProvider::new(store.clone());

        let first = provider.next().unwrap().unwrap();
        provider.record_temporary_error(&first).unwrap();
        let again = provider.next().unwrap().unwrap();
        assert_eq!(again.retries_left, 0);
        assert_eq!(store.count().unwrap(), 1);

        provider.record_temporary_error(&again).unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(provider.next().unwrap().is_none());
    }

    #[test]
    fn always_willing_to_send() {
        let store = Arc::new(MessageStore::open_in_memory().unwrap());
        let mut provider = SingleMessageProvider::new(store);
        assert!(provider.can_send());
        provider.close();
    }
}
