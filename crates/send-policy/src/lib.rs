//! # send-policy
//!
//! Decides whether the forward engine may send right now.
//!
//! - [`blackout`]: time-of-day windows (`"HH:MM-HH:MM"`, wrapping midnight)
//!   and absolute non-recurring blackouts.
//! - [`eligibility`]: the ordered rule chain combining connectivity, power,
//!   roaming, and blackout windows into one [`Eligibility`] verdict.
//! - [`BackoutGate`]: "has enough time passed since the last failure" per task,
//!   persisted through a [`SettingsStore`].
//! - [`Preferences`]: typed access to the persisted preference keys.
//!
//! Host sensors and wall time come in through the [`Environment`] and
//! [`Clock`] traits so every rule can be exercised deterministically.

mod backout;
pub mod blackout;
mod clock;
mod device;
pub mod eligibility;
mod error;
mod preferences;
mod settings;

pub use backout::{BackoutGate, BACKOUT_KEY_PREFIX};
pub use blackout::{can_send_at, is_non_recurring_blackout, BlackoutWindow};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    ConnectivityState, Environment, NetworkKind, PowerSource, PowerState, StaticEnvironment,
};
pub use eligibility::{evaluate, Eligibility};
pub use error::{PolicyError, PolicyResult};
pub use preferences::{keys, MinuteRange, Preferences};
pub use settings::{MemorySettings, SettingsHandle, SettingsStore};
