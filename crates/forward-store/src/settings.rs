//! SQLite-backed [`SettingsStore`].

use crate::StoreError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use send_policy::{PolicyError, PolicyResult, SettingsStore};
use std::sync::Arc;

/// Settings persisted in the queue database's `settings` table.
///
/// Shares the connection of the [`MessageStore`](crate::MessageStore) it was
/// obtained from.
#[derive(Clone)]
pub struct SqliteSettings {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSettings {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

fn settings_error(err: rusqlite::Error) -> PolicyError {
    PolicyError::Settings(StoreError::from(err).to_string())
}

impl SettingsStore for SqliteSettings {
    fn get(&self, key: &str) -> PolicyResult<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(settings_error)
    }

    fn put(&self, key: &str, value: &str) -> PolicyResult<()> {
        self.conn
            .lock()
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value],
            )
            .map(|_| ())
            .map_err(settings_error)
    }

    fn remove(&self, key: &str) -> PolicyResult<()> {
        self.conn
            .lock()
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .map(|_| ())
            .map_err(settings_error)
    }
}
