//! Configuration management for the forward engine.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_INTER_SEND_DELAY_MS: u64 = 1_000;
const DEFAULT_TEMPORARY_ERROR_BACKOUT_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_RETRIES: i64 = 100;
const DEFAULT_BATCH_MAX_MESSAGES: usize = 100;
const DEFAULT_BATCH_MAX_BYTES: usize = 300 * 1024;
const DEFAULT_BATCH_SUBMIT_INTERVAL_MS: u64 = 24 * 60 * 60 * 1_000;

/// How queued messages are handed to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueMode {
    /// One HTTP request per stored message.
    #[default]
    Single,
    /// Many stored messages folded into one JSON request.
    Batch,
}

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Per-request transport timeout.
    pub request_timeout_ms: u64,
    /// Pause before every send inside a drain.
    pub inter_send_delay_ms: u64,
    /// Cooldown after a temporary delivery failure.
    pub temporary_error_backout_ms: u64,
    /// Retry budget stamped on newly created messages.
    pub default_retries: i64,
    /// Single or batched delivery.
    pub queue_mode: QueueMode,
    /// Batch endpoint. When absent it is derived from the first message URL.
    pub batch_url: Option<String>,
    /// Maximum messages folded into one batch.
    pub batch_max_messages: usize,
    /// Maximum serialized batch size.
    pub batch_max_bytes: usize,
    /// Minimum spacing between partial batches.
    pub batch_submit_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            inter_send_delay_ms: DEFAULT_INTER_SEND_DELAY_MS,
            temporary_error_backout_ms: DEFAULT_TEMPORARY_ERROR_BACKOUT_MS,
            default_retries: DEFAULT_RETRIES,
            queue_mode: QueueMode::Single,
            batch_url: None,
            batch_max_messages: DEFAULT_BATCH_MAX_MESSAGES,
            batch_max_bytes: DEFAULT_BATCH_MAX_BYTES,
            batch_submit_interval_ms: DEFAULT_BATCH_SUBMIT_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("FORWARD_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(mode) = std::env::var("FORWARD_QUEUE_MODE") {
            match mode.to_ascii_lowercase().as_str() {
                "single" => self.queue_mode = QueueMode::Single,
                "batch" => self.queue_mode = QueueMode::Batch,
                _ => {}
            }
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.request_timeout_ms == 0 {
            return Err(CoreError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.default_retries < 0 {
            return Err(CoreError::Config(
                "default_retries must not be negative".to_string(),
            ));
        }
        if self.batch_max_messages == 0 || self.batch_max_bytes == 0 {
            return Err(CoreError::Config(
                "batch limits must be positive".to_string(),
            ));
        }
        self.batch_url()?;
        Ok(())
    }

    /// Get the batch URL as a parsed URL, if configured.
    pub fn batch_url(&self) -> CoreResult<Option<Url>> {
        self.batch_url
            .as_deref()
            .map(|raw| Url::parse(raw).map_err(CoreError::from))
            .transpose()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn inter_send_delay(&self) -> Duration {
        Duration::from_millis(self.inter_send_delay_ms)
    }

    pub fn temporary_error_backout(&self) -> Duration {
        Duration::from_millis(self.temporary_error_backout_ms)
    }

    pub fn batch_submit_interval(&self) -> Duration {
        Duration::from_millis(self.batch_submit_interval_ms)
    }
}
