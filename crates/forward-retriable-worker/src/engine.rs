//! Host-facing façade.

use crate::{
    BatchConfig, BatchProvider, DrainReport, ForwardWorker, ForwardWorkerConfig, MessageProvider,
    SingleMessageProvider, WorkerError, WorkerResult,
};
use forward_config_and_utils::{Config, QueueMode};
use forward_store::{Message, MessageStore};
use http_dispatcher::{DispatchStatus, Dispatcher, Transport, DEFAULT_REQUEST_TIMEOUT};
use send_policy::{BackoutGate, Clock, Environment, Preferences, SettingsHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Smallest storage limit accepted by [`StoreAndForward::set_storage_size_limit`].
pub const MINIMUM_STORAGE_LIMIT: i64 = 1_867_776;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub worker: ForwardWorkerConfig,
    pub request_timeout: Duration,
    pub queue_mode: QueueMode,
    pub batch: BatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker: ForwardWorkerConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            queue_mode: QueueMode::Single,
            batch: BatchConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> WorkerResult<Self> {
        let batch_url = config.batch_url.as_deref().map(Url::parse).transpose()?;
        Ok(Self {
            worker: ForwardWorkerConfig {
                inter_send_delay: config.inter_send_delay(),
                temporary_error_backout: config.temporary_error_backout(),
            },
            request_timeout: config.request_timeout(),
            queue_mode: config.queue_mode,
            batch: BatchConfig {
                url: batch_url,
                max_messages: config.batch_max_messages,
                max_bytes: config.batch_max_bytes,
                submit_interval: config.batch_submit_interval(),
            },
        })
    }
}

/// Result of [`StoreAndForward::send_or_enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Delivered immediately.
    Sent,
    /// Refused by the endpoint; not stored.
    Rejected(Option<String>),
    /// Stored for a later drain under this id.
    Queued(i64),
}

/// Store-and-forward engine: enqueue, drain, shrink, count.
pub struct StoreAndForward {
    store: Arc<MessageStore>,
    dispatcher: Arc<Dispatcher>,
    gate: BackoutGate,
    preferences: Preferences,
    config: EngineConfig,
}

impl StoreAndForward {
    pub fn new(
        store: Arc<MessageStore>,
        transport: Arc<dyn Transport>,
        environment: Arc<dyn Environment>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let settings: SettingsHandle = Arc::new(store.settings());
        let preferences = Preferences::new(settings.clone());
        let gate = BackoutGate::new(settings, clock.clone());
        let dispatcher = Arc::new(
            Dispatcher::new(transport, environment, clock, preferences.clone())
                .with_timeout(config.request_timeout),
        );

        Self {
            store,
            dispatcher,
            gate,
            preferences,
            config,
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn backout_gate(&self) -> &BackoutGate {
        &self.gate
    }

    /// Persist a message, evicting by destination when a storage limit is set.
    pub fn enqueue(&self, message: &Message) -> WorkerResult<i64> {
        store_message(&self.store, &self.preferences, message)
    }

    /// [`enqueue`](Self::enqueue) on the blocking pool, for async callers.
    pub async fn enqueue_async(&self, message: &Message) -> WorkerResult<i64> {
        let store = self.store.clone();
        let preferences = self.preferences.clone();
        let message = message.clone();
        tokio::task::spawn_blocking(move || store_message(&store, &preferences, &message))
            .await
            .map_err(|e| WorkerError::Task(format!("Enqueue task failed: {}", e)))?
    }

    /// Batch mode when enabled by preference, otherwise the configured mode.
    pub fn queue_mode(&self) -> QueueMode {
        if self.preferences.batch_upload() {
            QueueMode::Batch
        } else {
            self.config.queue_mode
        }
    }

    fn provider(&self) -> Box<dyn MessageProvider> {
        match self.queue_mode() {
            QueueMode::Single => Box::new(SingleMessageProvider::new(self.store.clone())),
            QueueMode::Batch => {
                let mut batch = self.config.batch.clone();
                if let Some(url) = self.preferences.batch_upload_url() {
                    match Url::parse(&url) {
                        Ok(url) => batch.url = Some(url),
                        Err(err) => warn!(url = %url, error = %err, "Ignoring invalid batch upload URL"),
                    }
                }
                if let Some(interval) = self.preferences.batch_upload_check_interval() {
                    batch.submit_interval = Duration::from_millis(interval as u64);
                }
                Box::new(BatchProvider::new(
                    self.store.clone(),
                    self.gate.clone(),
                    batch,
                ))
            }
        }
    }

    /// A worker for one drain activation.
    pub fn worker(&self) -> ForwardWorker {
        ForwardWorker::new(
            self.dispatcher.clone(),
            self.gate.clone(),
            self.provider(),
            self.config.worker.clone(),
        )
    }

    /// Run one drain activation.
    pub async fn drain(&self) -> DrainReport {
        self.worker().drain().await
    }

    /// Evict oldest messages until comfortably under `limit_bytes`.
    pub fn shrink(&self, limit_bytes: i64) -> WorkerResult<()> {
        Ok(self.store.shrink_to(limit_bytes)?)
    }

    pub fn pending_count(&self) -> WorkerResult<u64> {
        Ok(self.store.count()?)
    }

    /// Store a storage bound (raised to [`MINIMUM_STORAGE_LIMIT`] if lower)
    /// and shrink to it. Returns the bound actually applied.
    pub fn set_storage_size_limit(&self, limit: i64) -> WorkerResult<i64> {
        let limit = limit.max(MINIMUM_STORAGE_LIMIT);
        self.preferences.set_storage_size_limit(limit)?;
        self.store.shrink_to(limit)?;
        info!(limit, "Storage size limit set");
        Ok(limit)
    }

    pub fn reset_storage_size_limit(&self) -> WorkerResult<()> {
        self.preferences.reset_storage_size_limit()?;
        info!("Storage size limit removed");
        Ok(())
    }

    /// Deliver now if possible, otherwise store for later.
    pub async fn send_or_enqueue(&self, message: &Message) -> WorkerResult<SendOutcome> {
        if self.dispatcher.can_send().is_ok() {
            let result = self.dispatcher.send(message).await;
            match result.status {
                DispatchStatus::Ok => return Ok(SendOutcome::Sent),
                DispatchStatus::PermanentError => return Ok(SendOutcome::Rejected(result.data)),
                status => debug!(?status, "Immediate send failed, queueing"),
            }
        }
        Ok(SendOutcome::Queued(self.enqueue_async(message).await?))
    }
}

fn store_message(
    store: &MessageStore,
    preferences: &Preferences,
    message: &Message,
) -> WorkerResult<i64> {
    let id = match preferences.storage_size_limit() {
        Some(limit) => store.insert_bounded(message, limit)?,
        None => store.insert(message)?,
    };
    info!(message_id = id, url = %message.url, "Message enqueued");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use http_dispatcher::ScriptedTransport;
    use send_policy::{ConnectivityState, ManualClock, StaticEnvironment};

    fn engine(config: EngineConfig) -> (ScriptedTransport, Arc<StaticEnvironment>, StoreAndForward) {
        let transport = ScriptedTransport::new();
        let environment = Arc::new(StaticEnvironment::default());
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 4, 4, 4, 4, 0)
                .unwrap(),
        ));
        let engine = StoreAndForward::new(
            Arc::new(MessageStore::open_in_memory().unwrap()),
            Arc::new(transport.clone()),
            environment.clone(),
            clock,
            config,
        );
        (transport, environment, engine)
    }

    #[test]
    fn config_conversion() {
        let config = Config {
            inter_send_delay_ms: 10,
            queue_mode: QueueMode::Batch,
            batch_url: Some("https://collector.example.com/b".to_string()),
            ..Config::default()
        };
        let engine_config = EngineConfig::from_config(&config).unwrap();
        assert_eq!(engine_config.worker.inter_send_delay, Duration::from_millis(10));
        assert_eq!(engine_config.request_timeout, Duration::from_millis(5_000));
        assert_eq!(engine_config.queue_mode, QueueMode::Batch);
        assert_eq!(
            engine_config.batch.url.unwrap().as_str(),
            "https://collector.example.com/b"
        );

        let bad = Config {
            batch_url: Some("nope".to_string()),
            ..Config::default()
        };
        assert!(EngineConfig::from_config(&bad).is_err());
    }

    #[test]
    fn storage_limit_is_clamped_and_persisted() {
        let (_, _, engine) = engine(EngineConfig::default());
        assert_eq!(engine.set_storage_size_limit(10).unwrap(), MINIMUM_STORAGE_LIMIT);
        assert_eq!(
            engine.preferences().storage_size_limit(),
            Some(MINIMUM_STORAGE_LIMIT)
        );
        assert_eq!(engine.set_storage_size_limit(5_000_000).unwrap(), 5_000_000);

        engine.reset_storage_size_limit().unwrap();
        assert_eq!(engine.preferences().storage_size_limit(), None);
    }

    #[test]
    fn batch_preference_switches_mode() {
        let (_, _, engine) = engine(EngineConfig::default());
        assert_eq!(engine.queue_mode(), QueueMode::Single);
        engine.preferences().set_batch_upload(true).unwrap();
        assert_eq!(engine.queue_mode(), QueueMode::Batch);
    }

    #[tokio::test]
    async fn send_or_enqueue_paths() {
        let (transport, environment, engine) = engine(EngineConfig::default());

        transport.push_status(200);
        let sent = engine
            .send_or_enqueue(&Message::new("https://api.example.com/e", "a"))
            .await
            .unwrap();
        assert_eq!(sent, SendOutcome::Sent);

        transport.push_response(422, "bad payload");
        let rejected = engine
            .send_or_enqueue(&Message::new("https://api.example.com/e", "b"))
            .await
            .unwrap();
        assert_eq!(rejected, SendOutcome::Rejected(Some("bad payload".to_string())));

        transport.push_status(502);
        let queued = engine
            .send_or_enqueue(&Message::new("https://api.example.com/e", "c"))
            .await
            .unwrap();
        assert!(matches!(queued, SendOutcome::Queued(_)));

        environment.set_connectivity(ConnectivityState::disconnected());
        let queued = engine
            .send_or_enqueue(&Message::new("https://api.example.com/e", "d"))
            .await
            .unwrap();
        assert!(matches!(queued, SendOutcome::Queued(_)));

        assert_eq!(transport.request_count(), 3);
        assert_eq!(engine.pending_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn async_enqueue_honours_storage_limit() {
        let (transport, _, engine) = engine(EngineConfig::default());
        engine.set_storage_size_limit(MINIMUM_STORAGE_LIMIT).unwrap();

        let id = engine
            .enqueue_async(&Message::new("https://api.example.com/e", "a"))
            .await
            .unwrap();
        let again = engine
            .enqueue_async(&Message::new("https://api.example.com/e", "b"))
            .await
            .unwrap();

        assert!(again > id);
        assert_eq!(engine.pending_count().unwrap(), 2);
        assert_eq!(transport.request_count(), 0);
    }
}
