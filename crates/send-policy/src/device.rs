//! Host sensor types.

use parking_lot::Mutex;

/// Active network type as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Wifi,
    Cellular,
    Other,
    /// No active network.
    None,
}

/// Snapshot of the active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub kind: NetworkKind,
    pub connected_or_connecting: bool,
    pub roaming: bool,
}

impl ConnectivityState {
    pub fn disconnected() -> Self {
        Self {
            kind: NetworkKind::None,
            connected_or_connecting: false,
            roaming: false,
        }
    }

    pub fn wifi() -> Self {
        Self {
            kind: NetworkKind::Wifi,
            connected_or_connecting: true,
            roaming: false,
        }
    }

    pub fn cellular(roaming: bool) -> Self {
        Self {
            kind: NetworkKind::Cellular,
            connected_or_connecting: true,
            roaming,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.kind != NetworkKind::None && self.connected_or_connecting
    }
}

/// What the device is plugged into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    Ac,
    Usb,
    Wireless,
    /// Plugged into something the host cannot identify.
    Unknown,
    Unplugged,
}

impl PowerSource {
    pub fn is_charging(&self) -> bool {
        !matches!(self, PowerSource::Unplugged)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub charging: bool,
}

impl From<PowerSource> for PowerState {
    fn from(source: PowerSource) -> Self {
        Self {
            charging: source.is_charging(),
        }
    }
}

/// Live view of the host sensors.
pub trait Environment: Send + Sync {
    fn connectivity(&self) -> ConnectivityState;
    fn power(&self) -> PowerState;
}

/// An [`Environment`] whose readings are set explicitly.
///
/// Used by hosts that learn sensor state out of band (the CLI takes it from
/// flags) and by tests.
#[derive(Debug)]
pub struct StaticEnvironment {
    state: Mutex<(ConnectivityState, PowerState)>,
}

impl StaticEnvironment {
    pub fn new(connectivity: ConnectivityState, power: PowerState) -> Self {
        Self {
            state: Mutex::new((connectivity, power)),
        }
    }

    pub fn set_connectivity(&self, connectivity: ConnectivityState) {
        self.state.lock().0 = connectivity;
    }

    pub fn set_power(&self, power: PowerState) {
        self.state.lock().1 = power;
    }
}

impl Default for StaticEnvironment {
    fn default() -> Self {
        Self::new(ConnectivityState::wifi(), PowerSource::Ac.into())
    }
}

impl Environment for StaticEnvironment {
    fn connectivity(&self) -> ConnectivityState {
        self.state.lock().0
    }

    fn power(&self) -> PowerState {
        self.state.lock().1
    }
}
