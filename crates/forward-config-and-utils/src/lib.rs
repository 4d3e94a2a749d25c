//! Core configuration, paths, and logging for the forward engine.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, QueueMode, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_with, JsonlFileWriter, LogConfig};
pub use paths::Paths;
