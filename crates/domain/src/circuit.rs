//! Circuit breaker states and call outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Breaker state of one dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass and outcomes are recorded.
    Closed,
    /// Calls are rejected until the wait elapses.
    Open,
    /// A bounded number of trial calls pass.
    HalfOpen,
}

impl CircuitState {
    /// Tag value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Value reported by the `circuit.state` gauge.
    #[must_use]
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::Open => 1.0,
            Self::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome of one attempted call, as fed to the sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallOutcome {
    /// The dependency answered.
    Success,
    /// The dependency failed or timed out.
    Failure,
}

impl CallOutcome {
    /// Returns true for failures.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failure)
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub dependency: String,
    /// Current state.
    pub state: CircuitState,
    /// Outcomes currently in the window.
    pub window_calls: u32,
    /// Failures currently in the window.
    pub window_failures: u32,
    /// Failures in a row, across window resets.
    pub consecutive_failures: u32,
    /// Trial calls admitted in the current half-open period.
    pub half_open_in_flight: u32,
    /// Trial successes in the current half-open period.
    pub half_open_successes: u32,
    /// Milliseconds since the breaker last opened, if it is open.
    pub open_for_ms: Option<u64>,
}

impl BreakerSnapshot {
    /// Failure rate of the window in percent, 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "ratios of event counts tolerate f64 rounding")]
    pub fn failure_rate_pct(&self) -> f64 {
        if self.window_calls == 0 {
            0.0
        } else {
            f64::from(self.window_failures) * 100.0 / f64::from(self.window_calls)
        }
    }
}
