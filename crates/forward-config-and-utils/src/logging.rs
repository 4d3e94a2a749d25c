//! Logging initialization.
//!
//! All forward processes write structured JSONL to `~/.forward/logs/forward.jsonl`
//! and, optionally, a compact human-readable stream to stderr.

use crate::Paths;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name recorded in the startup line.
    pub service_name: String,
    /// Level used when `RUST_LOG` is unset.
    pub default_level: String,
    /// JSONL destination. `None` disables file output.
    pub log_path: Option<PathBuf>,
    /// Mirror events to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "forward".to_string(),
            default_level: crate::DEFAULT_LOG_LEVEL.to_string(),
            log_path: Paths::new().ok().map(|paths| paths.log_file()),
            also_stderr: true,
        }
    }
}

/// Appends JSON lines to the forward log file.
///
/// Clones share one buffered handle. Every record is flushed as soon as it is
/// written so lines from concurrent processes never interleave.
#[derive(Clone)]
pub struct JsonlFileWriter {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlFileWriter {
    pub fn open(path: &Path) -> io::Result<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }
}

impl Write for JsonlFileWriter {
    fn write(&mut self, record: &[u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        let written = file.write(record)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for JsonlFileWriter {
    type Writer = JsonlFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Initialize logging with the default log file and the given level.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("engine started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_with(LogConfig {
        default_level: level.to_string(),
        ..LogConfig::default()
    });
}

/// Initialize logging from an explicit [`LogConfig`].
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_logging_with(config: LogConfig) {
    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.default_level))
    };

    let mut file_error = None;
    let json_layer = config.log_path.as_deref().and_then(|path| {
        match JsonlFileWriter::open(path) {
            Ok(writer) => Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(writer)
                    .with_filter(env_filter()),
            ),
            Err(err) => {
                file_error = Some(err);
                None
            }
        }
    });

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter())
    });

    if tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_err()
    {
        return;
    }

    if let Some(err) = file_error {
        tracing::warn!(error = %err, "log file unavailable, logging to stderr only");
    }

    tracing::info!(
        service = %config.service_name,
        log_path = ?config.log_path,
        "logging initialized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn clones_append_to_the_same_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs").join("forward.jsonl");

        let mut writer = JsonlFileWriter::open(&path).unwrap();
        let mut other = writer.make_writer();
        writer.write_all(b"{\"n\":1}\n").unwrap();
        other.write_all(b"{\"n\":2}\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().collect::<Vec<_>>(), vec![r#"{"n":1}"#, r#"{"n":2}"#]);
    }

    #[test]
    fn reopening_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forward.jsonl");
        JsonlFileWriter::open(&path).unwrap().write_all(b"a\n").unwrap();
        JsonlFileWriter::open(&path).unwrap().write_all(b"b\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            service_name: "test".to_string(),
            default_level: "debug".to_string(),
            log_path: Some(dir.path().join("forward.jsonl")),
            also_stderr: false,
        };
        init_logging_with(config.clone());
        init_logging_with(config);
    }
}
