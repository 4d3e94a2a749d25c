//! Send eligibility.
//!
//! Rules are checked in order and the first match wins:
//!
//! 1. no usable connection: `NotConnected`
//! 2. cellular inside a non-recurring blackout: `Blackout`
//! 3. charging and sending on charge disabled: `Blackout`
//! 4. not charging and sending off charge disabled: `Blackout`
//! 5. roaming and sending on roaming disabled: `Blackout`
//! 6. Wi-Fi inside the WLAN window: `Blackout`
//! 7. cellular inside the WWAN window: `Blackout`
//! 8. otherwise `Ok`
//!
//! A window that fails to parse at steps 6 or 7 yields `Ok`.

use crate::blackout::{can_send_at, is_non_recurring_blackout};
use crate::{ConnectivityState, NetworkKind, PowerState, Preferences};
use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Ok,
    NotConnected,
    Blackout,
}

impl Eligibility {
    pub fn is_ok(&self) -> bool {
        matches!(self, Eligibility::Ok)
    }
}

pub fn evaluate(
    now: &DateTime<FixedOffset>,
    connectivity: &ConnectivityState,
    power: &PowerState,
    prefs: &Preferences,
) -> Eligibility {
    if !connectivity.is_connected() {
        debug!("not connected");
        return Eligibility::NotConnected;
    }

    let cellular = connectivity.kind == NetworkKind::Cellular;
    let wifi = connectivity.kind == NetworkKind::Wifi;

    let (start, end) = prefs.non_recurring_wwan_blackout();
    if cellular && is_non_recurring_blackout(now.timestamp_millis(), start, end) {
        debug!("blackout: cellular inside non-recurring window");
        return Eligibility::Blackout;
    }

    prefs.migrate_legacy_wwan_blackout();

    if power.charging && !prefs.can_send_on_charge() {
        debug!("blackout: charging");
        return Eligibility::Blackout;
    }
    if !power.charging && !prefs.can_send_off_charge() {
        debug!("blackout: not charging");
        return Eligibility::Blackout;
    }
    if connectivity.roaming && !prefs.can_send_on_roaming() {
        debug!("blackout: roaming");
        return Eligibility::Blackout;
    }

    let windows = [
        (wifi, prefs.wlan_blackout(), "wlan"),
        (cellular, prefs.wwan_blackout(), "wwan"),
    ];
    for (applies, window, name) in windows {
        if !applies {
            continue;
        }
        match can_send_at(now, window.as_deref()) {
            Ok(true) => {}
            Ok(false) => {
                debug!(network = name, window = ?window, "blackout: inside window");
                return Eligibility::Blackout;
            }
            Err(err) => {
                warn!(network = name, error = %err, "ignoring malformed blackout window");
                return Eligibility::Ok;
            }
        }
    }

    Eligibility::Ok
}
