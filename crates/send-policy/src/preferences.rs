//! Typed preferences over a [`SettingsStore`].
//!
//! Reads are lenient: a missing or unreadable value falls back to its default
//! and the failure is logged. Writes propagate errors.

use crate::blackout::{parse_windows, BlackoutWindow};
use crate::{PolicyResult, SettingsHandle};
use tracing::{info, warn};

/// Preference key names.
pub mod keys {
    pub const CAN_SEND_ON_CHARGE: &str = "can_send_on_charge";
    pub const CAN_SEND_OFF_CHARGE: &str = "can_send_off_charge";
    pub const CAN_SEND_ON_ROAMING: &str = "can_send_on_roaming";
    pub const WLAN_BLACKOUT: &str = "wlan_blackout";
    pub const WWAN_BLACKOUT: &str = "wwan_blackout";
    pub const NON_RECURRING_WWAN_BLACKOUT_START: &str = "non_recurring_wwan_blackout_start";
    pub const NON_RECURRING_WWAN_BLACKOUT_END: &str = "non_recurring_wwan_blackout_end";
    pub const STORAGE_SIZE_LIMIT: &str = "storage_size_limit";
    pub const CELLULAR_DATA_BLACKOUT_FROM: &str = "cellular_data_blackout_from";
    pub const CELLULAR_DATA_BLACKOUT_TO: &str = "cellular_data_blackout_to";
    pub const BATCH_UPLOAD: &str = "batch_upload";
    pub const BATCH_UPLOAD_URL: &str = "batch_upload_url";
    pub const BATCH_UPLOAD_CHECK_INTERVAL: &str = "batch_upload_check_interval";
}

/// Legacy cellular blackout range, minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinuteRange {
    pub from: u16,
    pub to: u16,
}

impl MinuteRange {
    /// Render as a zero-padded `HH:MM-HH:MM` window.
    pub fn to_window(&self) -> String {
        format!(
            "{:02}:{:02}-{:02}:{:02}",
            self.from / 60,
            self.from % 60,
            self.to / 60,
            self.to % 60
        )
    }
}

#[derive(Clone)]
pub struct Preferences {
    settings: SettingsHandle,
}

impl Preferences {
    pub fn new(settings: SettingsHandle) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    fn lenient<T>(&self, key: &str, value: PolicyResult<Option<T>>) -> Option<T> {
        match value {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "Unreadable preference, using default");
                None
            }
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.lenient(key, self.settings.get_bool(key))
            .unwrap_or(default)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.lenient(key, self.settings.get(key))
            .filter(|value| !value.trim().is_empty())
    }

    fn number(&self, key: &str) -> Option<i64> {
        self.lenient(key, self.settings.get_i64(key))
    }

    pub fn can_send_on_charge(&self) -> bool {
        self.flag(keys::CAN_SEND_ON_CHARGE, true)
    }

    pub fn can_send_off_charge(&self) -> bool {
        self.flag(keys::CAN_SEND_OFF_CHARGE, true)
    }

    pub fn can_send_on_roaming(&self) -> bool {
        self.flag(keys::CAN_SEND_ON_ROAMING, true)
    }

    pub fn set_can_send_on_charge(&self, value: bool) -> PolicyResult<()> {
        self.settings.put_bool(keys::CAN_SEND_ON_CHARGE, value)
    }

    pub fn set_can_send_off_charge(&self, value: bool) -> PolicyResult<()> {
        self.settings.put_bool(keys::CAN_SEND_OFF_CHARGE, value)
    }

    pub fn set_can_send_on_roaming(&self, value: bool) -> PolicyResult<()> {
        self.settings.put_bool(keys::CAN_SEND_ON_ROAMING, value)
    }

    pub fn wlan_blackout(&self) -> Option<String> {
        self.text(keys::WLAN_BLACKOUT)
    }

    pub fn wwan_blackout(&self) -> Option<String> {
        self.text(keys::WWAN_BLACKOUT)
    }

    /// Validate and store the Wi-Fi blackout window. Empty clears it.
    pub fn set_wlan_blackout(&self, window: &str) -> PolicyResult<()> {
        parse_windows(window)?;
        self.settings.put(keys::WLAN_BLACKOUT, window.trim())
    }

    /// Validate and store the cellular blackout window. Empty clears it.
    pub fn set_wwan_blackout(&self, window: &str) -> PolicyResult<()> {
        parse_windows(window)?;
        self.settings.put(keys::WWAN_BLACKOUT, window.trim())
    }

    /// `(start, end)` of the absolute cellular blackout, UTC milliseconds.
    pub fn non_recurring_wwan_blackout(&self) -> (Option<i64>, Option<i64>) {
        (
            self.number(keys::NON_RECURRING_WWAN_BLACKOUT_START),
            self.number(keys::NON_RECURRING_WWAN_BLACKOUT_END),
        )
    }

    pub fn set_non_recurring_wwan_blackout(&self, start: i64, end: i64) -> PolicyResult<()> {
        self.settings
            .put_i64(keys::NON_RECURRING_WWAN_BLACKOUT_START, start)?;
        self.settings
            .put_i64(keys::NON_RECURRING_WWAN_BLACKOUT_END, end)
    }

    pub fn clear_non_recurring_wwan_blackout(&self) -> PolicyResult<()> {
        self.settings
            .remove(keys::NON_RECURRING_WWAN_BLACKOUT_START)?;
        self.settings.remove(keys::NON_RECURRING_WWAN_BLACKOUT_END)
    }

    /// Storage bound in bytes. `None` means unbounded.
    pub fn storage_size_limit(&self) -> Option<i64> {
        self.number(keys::STORAGE_SIZE_LIMIT)
    }

    pub fn set_storage_size_limit(&self, limit: i64) -> PolicyResult<()> {
        self.settings.put_i64(keys::STORAGE_SIZE_LIMIT, limit)
    }

    pub fn reset_storage_size_limit(&self) -> PolicyResult<()> {
        self.settings.remove(keys::STORAGE_SIZE_LIMIT)
    }

    pub fn cellular_data_blackout(&self) -> Option<MinuteRange> {
        let from = self.number(keys::CELLULAR_DATA_BLACKOUT_FROM)?;
        let to = self.number(keys::CELLULAR_DATA_BLACKOUT_TO)?;
        let from = u16::try_from(from).ok()?;
        let to = u16::try_from(to).ok()?;
        BlackoutWindow::new(from, to).ok()?;
        Some(MinuteRange { from, to })
    }

    pub fn set_cellular_data_blackout(&self, range: MinuteRange) -> PolicyResult<()> {
        self.settings
            .put_i64(keys::CELLULAR_DATA_BLACKOUT_FROM, i64::from(range.from))?;
        self.settings
            .put_i64(keys::CELLULAR_DATA_BLACKOUT_TO, i64::from(range.to))
    }

    /// Copy the legacy cellular range into `wwan_blackout` if no cellular
    /// window has ever been stored.
    ///
    /// Once a value is written the key exists, so later calls do nothing.
    pub fn migrate_legacy_wwan_blackout(&self) {
        match self.settings.get(keys::WWAN_BLACKOUT) {
            Ok(Some(_)) => {}
            Ok(None) => {
                if let Some(range) = self.cellular_data_blackout() {
                    let window = range.to_window();
                    match self.settings.put(keys::WWAN_BLACKOUT, &window) {
                        Ok(()) => info!(window = %window, "Migrated legacy cellular blackout"),
                        Err(err) => warn!(error = %err, "Failed to migrate legacy cellular blackout"),
                    }
                }
            }
            Err(err) => warn!(error = %err, "Could not read cellular blackout"),
        }
    }

    pub fn batch_upload(&self) -> bool {
        self.flag(keys::BATCH_UPLOAD, false)
    }

    pub fn set_batch_upload(&self, enabled: bool) -> PolicyResult<()> {
        self.settings.put_bool(keys::BATCH_UPLOAD, enabled)
    }

    pub fn batch_upload_url(&self) -> Option<String> {
        self.text(keys::BATCH_UPLOAD_URL)
    }

    pub fn set_batch_upload_url(&self, url: &str) -> PolicyResult<()> {
        self.settings.put(keys::BATCH_UPLOAD_URL, url)
    }

    /// Minimum spacing between partial batches, milliseconds.
    pub fn batch_upload_check_interval(&self) -> Option<i64> {
        self.number(keys::BATCH_UPLOAD_CHECK_INTERVAL)
            .filter(|interval| *interval > 0)
    }

    pub fn set_batch_upload_check_interval(&self, interval_ms: i64) -> PolicyResult<()> {
        self.settings
            .put_i64(keys::BATCH_UPLOAD_CHECK_INTERVAL, interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySettings, PolicyError, SettingsStore};
    use std::sync::Arc;

    fn prefs() -> (Arc<MemorySettings>, Preferences) {
        let settings = Arc::new(MemorySettings::new());
        (settings.clone(), Preferences::new(settings))
    }

    #[test]
    fn defaults() {
        let (_, prefs) = prefs();
        assert!(prefs.can_send_on_charge());
        assert!(prefs.can_send_off_charge());
        assert!(prefs.can_send_on_roaming());
        assert_eq!(prefs.wlan_blackout(), None);
        assert_eq!(prefs.wwan_blackout(), None);
        assert_eq!(prefs.non_recurring_wwan_blackout(), (None, None));
        assert_eq!(prefs.storage_size_limit(), None);
        assert!(!prefs.batch_upload());
    }

    #[test]
    fn unreadable_flag_falls_back_to_default() {
        let (settings, prefs) = prefs();
        settings.put(keys::CAN_SEND_ON_ROAMING, "perhaps").unwrap();
        assert!(prefs.can_send_on_roaming());
    }

    #[test]
    fn window_setters_validate() {
        let (_, prefs) = prefs();
        prefs.set_wlan_blackout("01:00-02:00").unwrap();
        assert_eq!(prefs.wlan_blackout().as_deref(), Some("01:00-02:00"));

        assert!(matches!(
            prefs.set_wwan_blackout("1-2"),
            Err(PolicyError::InvalidWindow { .. })
        ));
        assert_eq!(prefs.wwan_blackout(), None);
    }

    #[test]
    fn storage_limit_set_and_reset() {
        let (_, prefs) = prefs();
        prefs.set_storage_size_limit(2_000_000).unwrap();
        assert_eq!(prefs.storage_size_limit(), Some(2_000_000));
        prefs.reset_storage_size_limit().unwrap();
        assert_eq!(prefs.storage_size_limit(), None);
    }

    #[test]
    fn legacy_range_migrates_once() {
        let (settings, prefs) = prefs();
        prefs
            .set_cellular_data_blackout(MinuteRange { from: 65, to: 1_410 })
            .unwrap();

        prefs.migrate_legacy_wwan_blackout();
        assert_eq!(prefs.wwan_blackout().as_deref(), Some("01:05-23:30"));

        // A later explicit change is never overwritten by the legacy value.
        settings.put(keys::WWAN_BLACKOUT, "").unwrap();
        prefs.migrate_legacy_wwan_blackout();
        assert_eq!(prefs.wwan_blackout(), None);
    }

    #[test]
    fn migration_without_legacy_range_writes_nothing() {
        let (settings, prefs) = prefs();
        prefs.migrate_legacy_wwan_blackout();
        assert_eq!(settings.get(keys::WWAN_BLACKOUT).unwrap(), None);
    }
}
