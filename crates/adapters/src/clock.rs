//! Monotonic clock backed by the tokio time driver.

use clinic_monitor_ports::ClockPort;
use std::time::Duration;
use tokio::time::Instant;

/// Clock measuring time since its creation.
///
/// Readings follow `tokio::time`, so a paused test runtime advances it
/// deterministically.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_runtime_time() {
        let clock = SystemClock::new();
        let start = clock.now();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.elapsed_since(start), Duration::from_millis(250));
    }

    #[test]
    fn elapsed_saturates_for_future_readings() {
        let clock = SystemClock::new();
        let future = clock.now() + Duration::from_secs(60);
        assert_eq!(clock.elapsed_since(future), Duration::ZERO);
    }
}
