//! Minimum-interval gate keyed by task name.

use crate::{Clock, PolicyResult, SettingsHandle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Settings key prefix for backout timestamps.
pub const BACKOUT_KEY_PREFIX: &str = "backoutcheck:";

/// Remembers when a task last ran and answers whether enough time has passed.
///
/// Timestamps are UTC milliseconds stored under `backoutcheck:<task>`. A
/// timestamp in the future (the clock moved backwards) is treated as elapsed
/// and overwritten with the current time.
#[derive(Clone)]
pub struct BackoutGate {
    settings: SettingsHandle,
    clock: Arc<dyn Clock>,
}

impl BackoutGate {
    pub fn new(settings: SettingsHandle, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    fn key(task: &str) -> String {
        format!("{BACKOUT_KEY_PREFIX}{task}")
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Record that `task` ran now.
    pub fn record(&self, task: &str) -> PolicyResult<()> {
        self.record_at(task, self.now_millis())
    }

    pub fn record_at(&self, task: &str, now_millis: i64) -> PolicyResult<()> {
        debug!(task, at = now_millis, "Recording backout");
        self.settings.put_i64(&Self::key(task), now_millis)
    }

    /// Last recorded time for `task`, if any.
    pub fn last_recorded(&self, task: &str) -> PolicyResult<Option<i64>> {
        self.settings.get_i64(&Self::key(task))
    }

    /// True when `interval` has passed since the last record of `task`.
    pub fn elapsed(&self, task: &str, interval: Duration) -> bool {
        self.elapsed_at(task, interval, self.now_millis())
    }

    pub fn elapsed_at(&self, task: &str, interval: Duration, now_millis: i64) -> bool {
        let last = match self.last_recorded(task) {
            Ok(Some(last)) => last,
            Ok(None) => return true,
            Err(err) => {
                warn!(task, error = %err, "Unreadable backout record, treating as elapsed");
                return true;
            }
        };

        if last > now_millis {
            warn!(task, last, now = now_millis, "Backout record is in the future, resetting");
            if let Err(err) = self.record_at(task, now_millis) {
                warn!(task, error = %err, "Failed to reset backout record");
            }
            return true;
        }

        let interval_millis = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        now_millis.saturating_sub(last) >= interval_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MemorySettings, SettingsStore};
    use chrono::{Duration as ChronoDuration, FixedOffset, TimeZone};

    const TASK: &str = "TemporaryErrorBackout";
    const FIVE_MINUTES: Duration = Duration::from_secs(5 * 60);

    fn gate() -> (Arc<MemorySettings>, Arc<ManualClock>, BackoutGate) {
        let settings = Arc::new(MemorySettings::new());
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(3_600)
                .unwrap()
                .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
                .unwrap(),
        ));
        let gate = BackoutGate::new(settings.clone(), clock.clone());
        (settings, clock, gate)
    }

    #[test]
    fn no_record_is_elapsed() {
        let (_, _, gate) = gate();
        assert!(gate.elapsed(TASK, FIVE_MINUTES));
    }

    #[test]
    fn recent_record_blocks_until_interval_passes() {
        let (_, clock, gate) = gate();
        gate.record(TASK).unwrap();

        clock.advance(ChronoDuration::minutes(4));
        assert!(!gate.elapsed(TASK, FIVE_MINUTES));

        clock.advance(ChronoDuration::minutes(1));
        assert!(gate.elapsed(TASK, FIVE_MINUTES));
    }

    #[test]
    fn future_record_self_heals() {
        let (settings, clock, gate) = gate();
        let now = clock.now().timestamp_millis();
        gate.record_at(TASK, now + 60_000).unwrap();

        assert!(gate.elapsed(TASK, FIVE_MINUTES));
        assert_eq!(
            settings.get_i64("backoutcheck:TemporaryErrorBackout").unwrap(),
            Some(now)
        );
        assert!(!gate.elapsed(TASK, FIVE_MINUTES));
    }

    #[test]
    fn tasks_are_independent() {
        let (_, _, gate) = gate();
        gate.record("BatchProvider").unwrap();
        assert!(gate.elapsed(TASK, FIVE_MINUTES));
        assert!(!gate.elapsed("BatchProvider", FIVE_MINUTES));
    }

    #[test]
    fn garbage_record_is_elapsed() {
        let (settings, _, gate) = gate();
        settings.put("backoutcheck:TemporaryErrorBackout", "yesterday").unwrap();
        assert!(gate.elapsed(TASK, FIVE_MINUTES));
    }
}
