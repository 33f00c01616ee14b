use chrono::Utc;
use hermes_core::Timestamp;

use crate::Clock;

/// Wall-clock time source, used everywhere outside of tests
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }

    fn name(&self) -> &str {
        "SystemClock"
    }
}
