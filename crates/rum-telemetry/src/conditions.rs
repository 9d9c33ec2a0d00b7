//! System conditions gating uploads.
//!
//! [`UploadConditions`] turns a fresh snapshot of platform signals into the
//! list of reasons an upload cannot happen right now. The snapshot comes from a
//! [`SystemSignalProvider`] on every call; nothing is cached.

use crate::config::ConditionsConfig;
use std::fmt;
use std::sync::Arc;

/// Charging state reported by the platform.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryState {
    /// State could not be determined.
    Unknown,
    /// Running on battery.
    Unplugged,
    /// Plugged in and charging.
    Charging,
    /// Plugged in and fully charged.
    Full,
}

impl fmt::Display for BatteryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Unplugged => "unplugged",
            Self::Charging => "charging",
            Self::Full => "full",
        };
        f.write_str(label)
    }
}

/// Battery snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Charging state.
    pub state: BatteryState,
    /// Charge level in percent, 0 to 100.
    pub level: u8,
    /// Whether the OS low power mode is enabled.
    pub is_low_power_mode_enabled: bool,
}

/// Network reachability reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    /// The collector is reachable.
    Yes,
    /// Reachability is undetermined; uploads are attempted.
    Maybe,
    /// No route to the network.
    No,
}

impl Reachability {
    /// Returns the human-readable descriptor used in diagnostics.
    pub fn description(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::Maybe => "maybe",
            Self::No => "no",
        }
    }
}

/// Source of platform power and connectivity signals.
///
/// Implementations are polled at the start of every upload cycle.
pub trait SystemSignalProvider: Send + Sync {
    /// Returns the current battery snapshot, or `None` when the platform
    /// exposes no battery (desktops, simulators).
    fn battery_status(&self) -> Option<BatteryStatus>;

    /// Returns the current network reachability.
    fn reachability(&self) -> Reachability;
}

/// A provider returning a fixed snapshot.
#[derive(Debug, Clone, Copy)]
pub struct StaticSignalProvider {
    battery: Option<BatteryStatus>,
    reachability: Reachability,
}

impl StaticSignalProvider {
    /// Creates a provider reporting the given snapshot.
    pub fn new(battery: Option<BatteryStatus>, reachability: Reachability) -> Self {
        Self {
            battery,
            reachability,
        }
    }

    /// Creates a provider that never blocks uploads.
    pub fn always_ready() -> Self {
        Self::new(None, Reachability::Yes)
    }
}

impl SystemSignalProvider for StaticSignalProvider {
    fn battery_status(&self) -> Option<BatteryStatus> {
        self.battery
    }

    fn reachability(&self) -> Reachability {
        self.reachability
    }
}

/// A reason preventing upload in the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
    /// Battery too low and not charging.
    Battery {
        /// Charge level in percent.
        level: u8,
        /// Charging state.
        state: BatteryState,
    },
    /// OS low power mode is enabled.
    LowPowerModeOn,
    /// The network is not reachable.
    NetworkReachability {
        /// Reachability descriptor reported by the platform.
        description: String,
    },
}

impl fmt::Display for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Battery { level, state } => {
                write!(f, "battery state is {} ({}%)", state, level)
            }
            Self::LowPowerModeOn => f.write_str("low power mode is enabled"),
            Self::NetworkReachability { description } => {
                write!(f, "network reachability is {}", description)
            }
        }
    }
}

/// Renders a blocker list for diagnostics.
///
/// An empty list renders as `ready`; otherwise the reasons are joined with
/// `AND`.
pub struct BlockerList<'a>(pub &'a [Blocker]);

impl fmt::Display for BlockerList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("ready");
        }

        f.write_str("upload was skipped because: ")?;
        for (index, blocker) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{}", blocker)?;
        }
        Ok(())
    }
}

/// Evaluates whether system conditions permit an upload.
#[derive(Clone)]
pub struct UploadConditions {
    provider: Arc<dyn SystemSignalProvider>,
    min_battery_level: u8,
}

impl UploadConditions {
    /// Creates an evaluator reading from `provider`.
    pub fn new(provider: Arc<dyn SystemSignalProvider>, config: &ConditionsConfig) -> Self {
        Self {
            provider,
            min_battery_level: config.min_battery_level,
        }
    }

    /// Creates an evaluator with default thresholds.
    pub fn with_defaults(provider: Arc<dyn SystemSignalProvider>) -> Self {
        Self::new(provider, &ConditionsConfig::default())
    }

    /// Returns the reasons an upload cannot happen now, in the order battery,
    /// low power mode, reachability. Empty means the system is ready.
    pub fn blockers_for_upload(&self) -> Vec<Blocker> {
        let mut blockers = Vec::new();

        if let Some(battery) = self.provider.battery_status() {
            let is_plugged_in = matches!(battery.state, BatteryState::Charging | BatteryState::Full);
            if !is_plugged_in && battery.level <= self.min_battery_level {
                blockers.push(Blocker::Battery {
                    level: battery.level,
                    state: battery.state,
                });
            }

            if battery.is_low_power_mode_enabled {
                blockers.push(Blocker::LowPowerModeOn);
            }
        }

        let reachability = self.provider.reachability();
        if reachability == Reachability::No {
            blockers.push(Blocker::NetworkReachability {
                description: reachability.description().to_string(),
            });
        }

        blockers
    }
}

impl fmt::Debug for UploadConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConditions")
            .field("min_battery_level", &self.min_battery_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(state: BatteryState, level: u8, low_power: bool) -> Option<BatteryStatus> {
        Some(BatteryStatus {
            state,
            level,
            is_low_power_mode_enabled: low_power,
        })
    }

    fn conditions(
        battery: Option<BatteryStatus>,
        reachability: Reachability,
    ) -> UploadConditions {
        UploadConditions::with_defaults(Arc::new(StaticSignalProvider::new(
            battery,
            reachability,
        )))
    }

    #[test]
    fn test_ready_system_has_no_blockers() {
        let conditions = conditions(
            battery(BatteryState::Unplugged, 80, false),
            Reachability::Yes,
        );
        assert!(conditions.blockers_for_upload().is_empty());
    }

    #[test]
    fn test_missing_battery_is_not_a_blocker() {
        let conditions = conditions(None, Reachability::Maybe);
        assert!(conditions.blockers_for_upload().is_empty());
    }

    #[test]
    fn test_low_battery_blocks_only_when_unplugged() {
        let blocked = conditions(battery(BatteryState::Unplugged, 5, false), Reachability::Yes);
        assert_eq!(
            blocked.blockers_for_upload(),
            vec![Blocker::Battery {
                level: 5,
                state: BatteryState::Unplugged
            }]
        );

        let charging = conditions(battery(BatteryState::Charging, 5, false), Reachability::Yes);
        assert!(charging.blockers_for_upload().is_empty());

        let full = conditions(battery(BatteryState::Full, 5, false), Reachability::Yes);
        assert!(full.blockers_for_upload().is_empty());
    }

    #[test]
    fn test_blockers_are_ordered() {
        let conditions = conditions(battery(BatteryState::Unplugged, 3, true), Reachability::No);

        assert_eq!(
            conditions.blockers_for_upload(),
            vec![
                Blocker::Battery {
                    level: 3,
                    state: BatteryState::Unplugged
                },
                Blocker::LowPowerModeOn,
                Blocker::NetworkReachability {
                    description: "no".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_custom_battery_threshold() {
        let provider = Arc::new(StaticSignalProvider::new(
            battery(BatteryState::Unplugged, 30, false),
            Reachability::Yes,
        ));
        let conditions = UploadConditions::new(
            provider,
            &ConditionsConfig {
                min_battery_level: 50,
            },
        );

        assert_eq!(conditions.blockers_for_upload().len(), 1);
    }

    #[test]
    fn test_blocker_list_display() {
        assert_eq!(BlockerList(&[]).to_string(), "ready");

        let blockers = [
            Blocker::Battery {
                level: 5,
                state: BatteryState::Unplugged,
            },
            Blocker::LowPowerModeOn,
        ];
        assert_eq!(
            BlockerList(&blockers).to_string(),
            "upload was skipped because: battery state is unplugged (5%) AND low power mode is enabled"
        );
    }
}
