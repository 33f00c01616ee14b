//! Clock abstraction for the Hermes connectivity stack
//!
//! Request signing needs a time source that tests can freeze, so all
//! time reads go through the `Clock` port:
//! - `SystemClock` - real wall-clock time for production
//! - `ManualClock` - explicitly advanced time for deterministic tests

mod manual;
mod system;

pub use manual::ManualClock;
pub use system::SystemClock;

use hermes_core::Timestamp;

/// Port for time abstraction
pub trait Clock: Send + Sync {
    /// Get the current time according to this clock
    fn now(&self) -> Timestamp;

    /// Current time as Unix milliseconds (nonce granularity)
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Get the clock's name/identifier for debugging
    fn name(&self) -> &str {
        "Clock"
    }
}
