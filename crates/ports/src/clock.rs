//! Monotonic time source.

use std::time::Duration;

/// Boundary contract for a monotonic clock.
///
/// `now` returns the time elapsed since an arbitrary fixed origin; only
/// differences between readings are meaningful.
pub trait ClockPort: Send + Sync {
    /// Current reading.
    fn now(&self) -> Duration;

    /// Time elapsed since an earlier reading, saturating at zero.
    fn elapsed_since(&self, earlier: Duration) -> Duration {
        self.now().saturating_sub(earlier)
    }
}
