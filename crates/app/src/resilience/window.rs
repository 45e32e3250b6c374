//! Count-based sliding window of call outcomes.

use clinic_monitor_domain::CallOutcome;
use std::collections::VecDeque;

/// The last `capacity` outcomes of a dependency.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    outcomes: VecDeque<CallOutcome>,
    capacity: usize,
    failures: usize,
}

impl SlidingWindow {
    /// Window holding at most `capacity` outcomes (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            outcomes: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
        }
    }

    /// Push an outcome, returning the one that fell out of the window.
    pub fn record(&mut self, outcome: CallOutcome) -> Option<CallOutcome> {
        let evicted = if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front()
        } else {
            None
        };
        if evicted.is_some_and(CallOutcome::is_failure) {
            self.failures -= 1;
        }
        if outcome.is_failure() {
            self.failures += 1;
        }
        self.outcomes.push_back(outcome);
        evicted
    }

    /// Outcomes currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true when nothing has been recorded since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Failures currently held.
    #[must_use]
    pub const fn failures(&self) -> usize {
        self.failures
    }

    /// Maximum number of outcomes held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true when at least `minimum_calls` outcomes are held and the
    /// failure rate is at or above `threshold_pct`.
    #[must_use]
    pub fn failure_rate_reached(&self, threshold_pct: u32, minimum_calls: usize) -> bool {
        let calls = self.outcomes.len();
        if calls == 0 || calls < minimum_calls {
            return false;
        }
        let threshold = usize::try_from(threshold_pct).unwrap_or(usize::MAX);
        self.failures.saturating_mul(100) >= threshold.saturating_mul(calls)
    }

    /// Forget every outcome.
    pub fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}
