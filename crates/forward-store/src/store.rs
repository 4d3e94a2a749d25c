//! Message queue operations.

use crate::{migrations, Header, Message, SqliteSettings, StoreError, StoreResult};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Headroom kept below a storage limit. Bounded inserts start evicting when the
/// store gets this close to the limit, and shrinking aims this far under it.
pub const SIZE_DIFFERENCE_TO_START_CLEANING: i64 = 300 * 1024;

/// Size the write-ahead log is cut back to after a checkpoint resets it.
const JOURNAL_SIZE_LIMIT: i64 = 64 * 1024;

static FILE_LOCKS: OnceLock<Mutex<HashMap<PathBuf, WriteLock>>> = OnceLock::new();

/// Serializes inserts and shrinks.
///
/// Every [`MessageStore`] opened on the same file shares one lock so a bounded
/// insert always sees a size that no concurrent shrink or insert is about to
/// change.
#[derive(Clone, Default)]
pub struct WriteLock(Arc<Mutex<()>>);

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock shared by every store opened on `path` in this process.
    pub fn for_path(path: &Path) -> Self {
        let key = path
            .parent()
            .and_then(|dir| std::fs::canonicalize(dir).ok())
            .zip(path.file_name())
            .map(|(dir, name)| dir.join(name))
            .unwrap_or_else(|| path.to_path_buf());

        FILE_LOCKS
            .get_or_init(Default::default)
            .lock()
            .entry(key)
            .or_default()
            .clone()
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.0.lock()
    }
}

/// Durable FIFO queue of [`Message`]s.
pub struct MessageStore {
    conn: Arc<Mutex<Connection>>,
    write_lock: WriteLock,
}

impl MessageStore {
    /// Open a store at the given path, sharing the write lock of any other
    /// store already open on the same file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with_lock(path, WriteLock::for_path(path))
    }

    /// Open a store at the given path guarded by an explicit `write_lock`.
    pub fn open_with_lock(path: &Path, write_lock: WriteLock) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA journal_size_limit = {JOURNAL_SIZE_LIMIT};
        "
        ))?;
        migrations::run_migrations(&conn)?;

        debug!(path = %path.display(), "Message store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock,
        })
    }

    /// Open an in-memory store for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            write_lock: WriteLock::new(),
        })
    }

    /// The lock guarding inserts and shrinks on this store's file.
    pub fn write_lock(&self) -> WriteLock {
        self.write_lock.clone()
    }

    /// Settings stored alongside the queue.
    pub fn settings(&self) -> SqliteSettings {
        SqliteSettings::new(self.conn.clone())
    }

    /// Insert a message and its headers, returning the assigned id.
    pub fn insert(&self, message: &Message) -> StoreResult<i64> {
        let _guard = self.write_lock.acquire();
        let mut conn = self.conn.lock();

        let tx = conn.transaction()?;
        let id = insert_message(&tx, message)?;
        tx.commit()?;

        debug!(message_id = id, url = %message.url, "Message stored");
        Ok(id)
    }

    /// Insert a message, first evicting the oldest message for the same URL
    /// when the store is within [`SIZE_DIFFERENCE_TO_START_CLEANING`] of
    /// `size_limit`.
    pub fn insert_bounded(&self, message: &Message, size_limit: i64) -> StoreResult<i64> {
        let _guard = self.write_lock.acquire();
        let mut conn = self.conn.lock();

        let size = size_in_use(&conn)?;
        let tx = conn.transaction()?;

        if approaches_limit(size, size_limit) {
            let oldest: Option<i64> = tx.query_row(
                "SELECT MIN(id) FROM message WHERE url = ?1",
                params![message.url],
                |row| row.get(0),
            )?;
            match oldest {
                Some(oldest) => {
                    delete_ids_through_range(&tx, oldest, oldest)?;
                    info!(
                        evicted_id = oldest,
                        url = %message.url,
                        size,
                        size_limit,
                        "Evicted oldest message for destination"
                    );
                }
                None => debug!(url = %message.url, size, size_limit, "Nothing to evict for destination"),
            }
        }

        let id = insert_message(&tx, message)?;
        tx.commit()?;

        debug!(message_id = id, url = %message.url, "Message stored with limit");
        Ok(id)
    }

    /// Oldest message, with its headers.
    pub fn next(&self) -> StoreResult<Option<Message>> {
        self.read_next(None)
    }

    /// Oldest message with an id strictly greater than `id`.
    pub fn next_after(&self, id: i64) -> StoreResult<Option<Message>> {
        self.read_next(Some(id))
    }

    fn read_next(&self, after: Option<i64>) -> StoreResult<Option<Message>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let message = tx
            .query_row(
                "SELECT id, url, body, username, password, retries_left
                 FROM message WHERE id > ?1 ORDER BY id LIMIT 1",
                params![after.unwrap_or(i64::MIN)],
                |row| {
                    Ok(Message {
                        id: Some(row.get(0)?),
                        url: row.get(1)?,
                        body: row.get(2)?,
                        username: row.get(3)?,
                        password: row.get(4)?,
                        headers: Vec::new(),
                        retries_left: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let Some(mut message) = message else {
            return Ok(None);
        };

        {
            let mut stmt =
                tx.prepare_cached("SELECT key, value FROM header WHERE message_id = ?1 ORDER BY id")?;
            let headers = stmt.query_map(params![message.id], |row| {
                Ok(Header {
                    key: row.get(0)?,
                    value: row.get(1)?,
                })
            })?;
            message.headers = headers.collect::<Result<Vec<_>, _>>()?;
        }

        tx.commit()?;
        Ok(Some(message))
    }

    /// Remove a message and its headers. Does nothing for unsaved or already
    /// removed messages.
    pub fn delete(&self, message: &Message) -> StoreResult<()> {
        let Some(id) = message.id else {
            return Ok(());
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = delete_ids_through_range(&tx, id, id)?;
        tx.commit()?;

        debug!(message_id = id, removed, "Message deleted");
        Ok(())
    }

    /// Remove every message with an id up to and including `id`.
    pub fn delete_through(&self, id: i64) -> StoreResult<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let removed = delete_ids_through_range(&tx, i64::MIN, id)?;
        tx.commit()?;

        debug!(through_id = id, removed, "Messages deleted");
        Ok(removed)
    }

    /// Decrement the stored retry budget, never below zero.
    ///
    /// Returns the remaining budget, or `None` if the message is not stored.
    pub fn decrement_retries(&self, message: &Message) -> StoreResult<Option<i64>> {
        let Some(id) = message.id else {
            return Ok(None);
        };

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE message SET retries_left = retries_left - 1 WHERE id = ?1 AND retries_left > 0",
            params![id],
        )?;
        let remaining: Option<i64> = tx
            .query_row(
                "SELECT retries_left FROM message WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;

        debug!(message_id = id, retries_left = ?remaining, "Retries decremented");
        Ok(remaining)
    }

    /// Number of stored messages.
    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        count_in(&conn)
    }

    /// Bytes of database pages currently holding data.
    pub fn size_bytes(&self) -> StoreResult<i64> {
        let conn = self.conn.lock();
        size_in_use(&conn)
    }

    /// Evict the oldest messages until the store is at least
    /// [`SIZE_DIFFERENCE_TO_START_CLEANING`] under `limit`, then compact.
    ///
    /// Each round removes a share of messages proportional to how far the
    /// store is over target, and always at least one.
    pub fn shrink_to(&self, limit: i64) -> StoreResult<()> {
        let _guard = self.write_lock.acquire();
        let mut conn = self.conn.lock();

        let target = limit - SIZE_DIFFERENCE_TO_START_CLEANING;
        let mut size = size_in_use(&conn)?;
        if size <= target {
            debug!(size, target, "Shrink not needed");
            return Ok(());
        }

        let mut rounds = 0u32;
        while size > target {
            let count = count_in(&conn)?;
            if count == 0 {
                warn!(size, target, "Store is empty but still above shrink target");
                break;
            }

            let excess = 1.0 - target as f64 / size as f64;
            let to_remove = ((count as f64 * excess).round() as u64).max(1);

            let tx = conn.transaction()?;
            let threshold: Option<i64> = tx
                .query_row(
                    "SELECT id FROM message ORDER BY id LIMIT 1 OFFSET ?1",
                    params![to_remove as i64],
                    |row| row.get(0),
                )
                .optional()?;
            let removed = match threshold {
                Some(threshold) => delete_ids_through_range(&tx, i64::MIN, threshold - 1)?,
                None => delete_ids_through_range(&tx, i64::MIN, i64::MAX)?,
            };
            tx.commit()?;

            rounds += 1;
            size = size_in_use(&conn)?;
            debug!(round = rounds, to_remove, removed, size, target, "Shrink round");
        }

        // VACUUM rewrites every page through the WAL; the space only comes
        // back once the log is checkpointed and truncated.
        conn.execute_batch("VACUUM;")?;
        checkpoint_truncate(&conn)?;
        info!(limit, rounds, size = size_in_use(&conn)?, "Store shrunk");
        Ok(())
    }

    /// Checkpoint the write-ahead log and truncate it to zero bytes.
    pub fn close(&self) -> StoreResult<()> {
        let conn = self.conn.lock();
        checkpoint_truncate(&conn)?;
        debug!("Message store closed");
        Ok(())
    }
}

/// A no-op for in-memory databases, which have no log.
fn checkpoint_truncate(conn: &Connection) -> StoreResult<()> {
    let (busy, log_frames, checkpointed): (i64, i64, i64) =
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
    if busy != 0 {
        warn!(log_frames, checkpointed, "WAL checkpoint blocked by another connection");
    }
    Ok(())
}

fn approaches_limit(size: i64, limit: i64) -> bool {
    limit > size && limit - size < SIZE_DIFFERENCE_TO_START_CLEANING
}

fn insert_message(conn: &Connection, message: &Message) -> StoreResult<i64> {
    if message.retries_left < 0 {
        return Err(StoreError::InvalidData(format!(
            "retries_left must not be negative, got {}",
            message.retries_left
        )));
    }
    conn.execute(
        "INSERT INTO message (url, body, username, password, retries_left)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.url,
            message.body,
            message.username,
            message.password,
            message.retries_left
        ],
    )?;
    let id = conn.last_insert_rowid();

    let mut stmt =
        conn.prepare_cached("INSERT INTO header (message_id, key, value) VALUES (?1, ?2, ?3)")?;
    for header in &message.headers {
        stmt.execute(params![id, header.key, header.value])?;
    }
    Ok(id)
}

/// Delete messages with `from <= id <= through` and their headers.
fn delete_ids_through_range(conn: &Connection, from: i64, through: i64) -> StoreResult<usize> {
    conn.execute(
        "DELETE FROM header WHERE message_id >= ?1 AND message_id <= ?2",
        params![from, through],
    )?;
    let removed = conn.execute(
        "DELETE FROM message WHERE id >= ?1 AND id <= ?2",
        params![from, through],
    )?;
    Ok(removed)
}

fn count_in(conn: &Connection) -> StoreResult<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM message", [], |row| row.get(0))?;
    Ok(count as u64)
}

fn size_in_use(conn: &Connection) -> StoreResult<i64> {
    let pragma = |name: &str| -> StoreResult<i64> {
        Ok(conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))?)
    };
    let page_count = pragma("page_count")?;
    let freelist_count = pragma("freelist_count")?;
    let page_size = pragma("page_size")?;
    Ok((page_count - freelist_count) * page_size)
}
