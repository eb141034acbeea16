use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::api::hand::DEFAULT_COMMAND_TIMEOUT_MS;

/// Delays used while driving a hand.
///
/// Every settle delay in the test programs is a multiple of `base_delay_ms`,
/// which keeps the whole schedule tunable from one knob (and lets tests run
/// with zero delays).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Base settle unit in milliseconds.
    pub base_delay_ms: u64,
    /// Device command timeout applied when a session is configured.
    pub command_timeout_ms: u16,
    /// Dwell after a gesture before motor currents are sampled (motor-current test).
    pub current_dwell_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            current_dwell_ms: 5000,
        }
    }
}

impl Timing {
    /// No delays at all; for simulated runs and tests.
    pub fn instant() -> Self {
        Self {
            base_delay_ms: 0,
            current_dwell_ms: 0,
            ..Self::default()
        }
    }

    /// `times` base units.
    pub fn base(&self, times: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(times as u64))
    }

    pub fn current_dwell(&self) -> Duration {
        Duration::from_millis(self.current_dwell_ms)
    }
}

/// Block the current (worker) thread; zero durations return immediately.
pub fn settle(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}
