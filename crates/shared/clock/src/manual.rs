use chrono::{DateTime, Duration, Utc};
use hermes_core::Timestamp;
use parking_lot::Mutex;

use crate::Clock;

/// Manually controlled clock for deterministic tests
///
/// Time only moves when the test advances it, which makes nonce and
/// timestamp assertions exact.
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock frozen at the given Unix millisecond timestamp
    pub fn at_millis(millis: i64) -> Self {
        ManualClock {
            now: Mutex::new(
                DateTime::from_timestamp_millis(millis).unwrap_or_else(|| Utc::now()),
            ),
        }
    }

    /// Create a clock frozen at the current wall-clock time
    pub fn from_system() -> Self {
        ManualClock {
            now: Mutex::new(Utc::now()),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump the clock to an absolute time
    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }

    fn name(&self) -> &str {
        "ManualClock"
    }
}
