//! Time-of-day blackout windows.
//!
//! A window is written `"HH:MM-HH:MM"`. When the end is not after the start
//! the window wraps midnight and covers `[start, 1440) ∪ [0, end)`. Several
//! windows may be listed separated by commas; sending is blocked when any of
//! them covers the current minute.

use crate::{PolicyError, PolicyResult};
use chrono::Timelike;
use std::str::FromStr;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// A parsed blackout window expressed in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlackoutWindow {
    start: u16,
    end: u16,
}

impl BlackoutWindow {
    pub fn new(start: u16, end: u16) -> PolicyResult<Self> {
        if start >= MINUTES_PER_DAY || end >= MINUTES_PER_DAY {
            return Err(PolicyError::InvalidWindow {
                window: format!("{start}-{end}"),
                reason: "minute of day out of range".to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// True when `minute_of_day` falls inside the window.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        if self.wraps_midnight() {
            minute_of_day >= self.start || minute_of_day < self.end
        } else {
            minute_of_day >= self.start && minute_of_day < self.end
        }
    }
}

impl FromStr for BlackoutWindow {
    type Err = PolicyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| PolicyError::InvalidWindow {
            window: raw.to_string(),
            reason: reason.to_string(),
        };

        let (start, end) = raw
            .trim()
            .split_once('-')
            .ok_or_else(|| invalid("expected HH:MM-HH:MM"))?;
        let start = parse_minute_of_day(start).ok_or_else(|| invalid("bad start time"))?;
        let end = parse_minute_of_day(end).ok_or_else(|| invalid("bad end time"))?;
        Ok(Self { start, end })
    }
}

impl std::fmt::Display for BlackoutWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start / 60,
            self.start % 60,
            self.end / 60,
            self.end % 60
        )
    }
}

fn parse_minute_of_day(raw: &str) -> Option<u16> {
    let (hour, minute) = raw.trim().split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    let hour: u16 = hour.parse().ok()?;
    let minute: u16 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then_some(hour * 60 + minute)
}

/// Parse a comma-separated list of windows. Empty input yields no windows.
pub fn parse_windows(raw: &str) -> PolicyResult<Vec<BlackoutWindow>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(BlackoutWindow::from_str)
        .collect()
}

/// Decide whether sending is allowed at `now` given an optional window.
///
/// An absent or empty window always allows sending. A malformed window is an
/// error; callers decide how to treat it.
pub fn can_send_at<T: Timelike>(now: &T, window: Option<&str>) -> PolicyResult<bool> {
    let Some(window) = window else {
        return Ok(true);
    };
    let minute_of_day = (now.hour() * 60 + now.minute()) as u16;
    let blocked = parse_windows(window)?
        .iter()
        .any(|w| w.contains(minute_of_day));
    Ok(!blocked)
}

/// True iff both bounds are present and `start <= now < end`.
pub fn is_non_recurring_blackout(now_utc_millis: i64, start: Option<i64>, end: Option<i64>) -> bool {
    match (start, end) {
        (Some(start), Some(end)) => start <= now_utc_millis && now_utc_millis < end,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn empty_or_absent_window_allows() {
        assert!(can_send_at(&at(3, 0), None).unwrap());
        assert!(can_send_at(&at(3, 0), Some("")).unwrap());
        assert!(can_send_at(&at(3, 0), Some("  ")).unwrap());
    }

    #[test]
    fn same_day_window_is_half_open() {
        let window = Some("09:00-17:30");
        assert!(can_send_at(&at(8, 59), window).unwrap());
        assert!(!can_send_at(&at(9, 0), window).unwrap());
        assert!(!can_send_at(&at(17, 29), window).unwrap());
        assert!(can_send_at(&at(17, 30), window).unwrap());
    }

    #[test]
    fn wrapping_window_blocks_exactly_both_tails() {
        let window: BlackoutWindow = "22:15-06:45".parse().unwrap();
        assert!(window.wraps_midnight());
        for minute in 0..MINUTES_PER_DAY {
            let expected = minute >= 22 * 60 + 15 || minute < 6 * 60 + 45;
            assert_eq!(window.contains(minute), expected, "minute {minute}");
        }
        assert!(!can_send_at(&at(23, 59), Some("22:15-06:45")).unwrap());
        assert!(!can_send_at(&at(0, 0), Some("22:15-06:45")).unwrap());
        assert!(can_send_at(&at(6, 45), Some("22:15-06:45")).unwrap());
        assert!(can_send_at(&at(22, 14), Some("22:15-06:45")).unwrap());
    }

    #[test]
    fn equal_bounds_cover_whole_day() {
        let window: BlackoutWindow = "10:00-10:00".parse().unwrap();
        assert!((0..MINUTES_PER_DAY).all(|m| window.contains(m)));
    }

    #[test]
    fn multiple_windows() {
        let window = Some("00:00-01:00, 12:00-13:00");
        assert!(!can_send_at(&at(0, 30), window).unwrap());
        assert!(can_send_at(&at(6, 0), window).unwrap());
        assert!(!can_send_at(&at(12, 59), window).unwrap());
    }

    #[test]
    fn malformed_windows_error() {
        for bad in ["9-17", "09:00", "25:00-01:00", "09:60-10:00", "aa:bb-cc:dd", "09:00-"] {
            assert!(
                matches!(
                    can_send_at(&at(0, 0), Some(bad)),
                    Err(PolicyError::InvalidWindow { .. })
                ),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn display_is_zero_padded() {
        let window = BlackoutWindow::new(5, 7 * 60 + 3).unwrap();
        assert_eq!(window.to_string(), "00:05-07:03");
        assert!(BlackoutWindow::new(1440, 0).is_err());
    }

    #[test]
    fn non_recurring_bounds() {
        assert!(!is_non_recurring_blackout(50, None, Some(100)));
        assert!(!is_non_recurring_blackout(50, Some(0), None));
        assert!(is_non_recurring_blackout(0, Some(0), Some(100)));
        assert!(is_non_recurring_blackout(99, Some(0), Some(100)));
        assert!(!is_non_recurring_blackout(100, Some(0), Some(100)));
        assert!(!is_non_recurring_blackout(-1, Some(0), Some(100)));
    }
}
