//! Persisted key/value settings.

use crate::{PolicyError, PolicyResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Durable string key/value storage for preferences and backout records.
///
/// Typed accessors are layered over the string form so implementations only
/// need to store text.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> PolicyResult<Option<String>>;
    fn put(&self, key: &str, value: &str) -> PolicyResult<()>;
    fn remove(&self, key: &str) -> PolicyResult<()>;

    fn get_i64(&self, key: &str) -> PolicyResult<Option<i64>> {
        self.get(key)?
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| {
                raw.trim().parse::<i64>().map_err(|e| {
                    PolicyError::Settings(format!("{key} is not an integer ({raw:?}): {e}"))
                })
            })
            .transpose()
    }

    fn put_i64(&self, key: &str, value: i64) -> PolicyResult<()> {
        self.put(key, &value.to_string())
    }

    fn get_bool(&self, key: &str) -> PolicyResult<Option<bool>> {
        match self.get(key)?.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(PolicyError::Settings(format!(
                "{key} is not a boolean ({other:?})"
            ))),
        }
    }

    fn put_bool(&self, key: &str, value: bool) -> PolicyResult<()> {
        self.put(key, if value { "true" } else { "false" })
    }
}

/// Shared handle to a settings store.
pub type SettingsHandle = Arc<dyn SettingsStore>;

/// Process-local settings, lost on exit.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> PolicyResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> PolicyResult<()> {
        self.values
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PolicyResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}
