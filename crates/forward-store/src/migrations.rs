//! Schema migrations.
//!
//! Migrations run in order and are tracked in the `migrations` table. A newer
//! schema is always reached by altering the existing tables, so queued
//! messages survive upgrades.

use crate::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 3;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current_version} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    debug!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_message_queue(conn)?;
    }
    if current_version < 2 {
        migrate_v2_settings(conn)?;
    }
    if current_version < 3 {
        migrate_v3_message_url_index(conn)?;
    }

    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: message and header tables.
fn migrate_v1_message_queue(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v1: message queue");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS message (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            body TEXT NOT NULL,
            username TEXT,
            password TEXT,
            retries_left INTEGER NOT NULL DEFAULT 100
        );

        CREATE TABLE IF NOT EXISTS header (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL REFERENCES message(id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_header_message_id ON header(message_id);
        ",
    )?;

    record_migration(conn, 1, "message_queue")
}

/// V2: key/value settings for preferences and backout records.
fn migrate_v2_settings(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v2: settings");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;

    record_migration(conn, 2, "settings")
}

/// V3: index for oldest-by-destination lookups during bounded inserts.
fn migrate_v3_message_url_index(conn: &Connection) -> StoreResult<()> {
    info!("Applying migration v3: message url index");

    conn.execute_batch("CREATE INDEX IF NOT EXISTS idx_message_url ON message(url, id);")?;

    record_migration(conn, 3, "message_url_index")
}
