//! Background synchronization: the refresh orchestrator and its scheduler.

mod orchestrator;
mod scheduler;

pub use orchestrator::{CycleOutcome, RefreshOrchestrator};
pub use scheduler::{CycleRunner, RefreshScheduler};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// RefreshInterval
// ============================================================================

/// How often automatic refresh cycles run. `Manual` disables the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshInterval {
    #[default]
    Manual,
    M10,
    M30,
    H1,
    H2,
    H4,
    H8,
}

impl RefreshInterval {
    /// Duration between automatic cycles, or `None` for manual-only.
    pub fn duration(&self) -> Option<Duration> {
        let secs = match self {
            RefreshInterval::Manual => return None,
            RefreshInterval::M10 => 10 * 60,
            RefreshInterval::M30 => 30 * 60,
            RefreshInterval::H1 => 60 * 60,
            RefreshInterval::H2 => 2 * 60 * 60,
            RefreshInterval::H4 => 4 * 60 * 60,
            RefreshInterval::H8 => 8 * 60 * 60,
        };
        Some(Duration::from_secs(secs))
    }

    /// Stable string form used for persistence and config.
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshInterval::Manual => "manual",
            RefreshInterval::M10 => "10m",
            RefreshInterval::M30 => "30m",
            RefreshInterval::H1 => "1h",
            RefreshInterval::H2 => "2h",
            RefreshInterval::H4 => "4h",
            RefreshInterval::H8 => "8h",
        }
    }
}

impl fmt::Display for RefreshInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid intervals are rejected here, at the configuration boundary,
/// so a bad value can never reach the timer.
impl FromStr for RefreshInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(RefreshInterval::Manual),
            "10m" => Ok(RefreshInterval::M10),
            "30m" => Ok(RefreshInterval::M30),
            "1h" => Ok(RefreshInterval::H1),
            "2h" => Ok(RefreshInterval::H2),
            "4h" => Ok(RefreshInterval::H4),
            "8h" => Ok(RefreshInterval::H8),
            other => Err(format!(
                "invalid refresh interval '{}' (expected manual, 10m, 30m, 1h, 2h, 4h, or 8h)",
                other
            )),
        }
    }
}

// ============================================================================
// CycleState
// ============================================================================

/// Progress of the current (or most recent) refresh cycle.
///
/// Exactly one cycle executes at a time; overlapping triggers coalesce
/// into a no-op while the state is anything but `Idle`/`Done`/`Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Triggering,
    Polling,
    Reconciling,
    Done,
    Failed(String),
}

impl CycleState {
    /// True while a cycle occupies the single-flight slot.
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            CycleState::Triggering | CycleState::Polling | CycleState::Reconciling
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_string_round_trip() {
        for interval in [
            RefreshInterval::Manual,
            RefreshInterval::M10,
            RefreshInterval::M30,
            RefreshInterval::H1,
            RefreshInterval::H2,
            RefreshInterval::H4,
            RefreshInterval::H8,
        ] {
            assert_eq!(interval.as_str().parse::<RefreshInterval>(), Ok(interval));
        }
    }

    #[test]
    fn test_invalid_interval_rejected() {
        assert!("45m".parse::<RefreshInterval>().is_err());
        assert!("".parse::<RefreshInterval>().is_err());
        assert!("10".parse::<RefreshInterval>().is_err());
    }

    #[test]
    fn test_manual_has_no_duration() {
        assert!(RefreshInterval::Manual.duration().is_none());
        assert_eq!(
            RefreshInterval::M30.duration(),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_in_flight_states() {
        assert!(!CycleState::Idle.in_flight());
        assert!(CycleState::Triggering.in_flight());
        assert!(CycleState::Polling.in_flight());
        assert!(CycleState::Reconciling.in_flight());
        assert!(!CycleState::Done.in_flight());
        assert!(!CycleState::Failed("x".into()).in_flight());
    }
}
