//! Durable FIFO message queue backed by SQLite.
//!
//! Messages and their headers live in two tables linked by a foreign key.
//! Row ids are `AUTOINCREMENT`, so they follow insertion order and are never
//! reused. The same database file also carries the key/value settings table
//! used for preferences and backout records.

mod error;
mod migrations;
mod models;
mod settings;
mod store;

pub use error::{StoreError, StoreResult};
pub use migrations::CURRENT_VERSION;
pub use models::{Header, Message, DEFAULT_RETRIES};
pub use settings::SqliteSettings;
pub use store::{MessageStore, WriteLock, SIZE_DIFFERENCE_TO_START_CLEANING};
