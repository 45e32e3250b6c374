//! Responses of guarded remote calls, live or degraded.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a degraded value was returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum FallbackReason {
    /// The breaker was open.
    CircuitOpen,
    /// The breaker was half-open and every trial slot was taken.
    HalfOpenSaturated,
    /// The call exceeded its deadline.
    Timeout,
    /// The dependency failed.
    Failure {
        /// Error code of the last failure.
        code: String,
        /// Error message of the last failure.
        message: String,
    },
    /// The fallback producer itself failed; the value is an empty default.
    ProducerDefect,
}

impl FallbackReason {
    /// Tag value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::HalfOpenSaturated => "half_open_saturated",
            Self::Timeout => "timeout",
            Self::Failure { .. } => "failure",
            Self::ProducerDefect => "producer_defect",
        }
    }

    /// Returns true when the call never reached the dependency.
    #[must_use]
    pub const fn is_short_circuit(&self) -> bool {
        matches!(self, Self::CircuitOpen | Self::HalfOpenSaturated)
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure { code, message } => write!(formatter, "failure ({code}): {message}"),
            other => formatter.write_str(other.as_str()),
        }
    }
}

/// Provenance of a [`DependencyResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseOrigin {
    /// Answered by the dependency.
    Live,
    /// Produced by the fallback.
    Fallback(FallbackReason),
}

/// Value returned by a guarded call, marked live or fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyResponse<T> {
    /// Payload.
    pub value: T,
    /// Provenance.
    pub origin: ResponseOrigin,
}

impl<T> DependencyResponse<T> {
    /// Live response.
    pub const fn live(value: T) -> Self {
        Self {
            value,
            origin: ResponseOrigin::Live,
        }
    }

    /// Degraded response.
    pub const fn fallback(value: T, reason: FallbackReason) -> Self {
        Self {
            value,
            origin: ResponseOrigin::Fallback(reason),
        }
    }

    /// Returns true when the value came from the fallback producer.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self.origin, ResponseOrigin::Fallback(_))
    }

    /// Fallback reason, if any.
    #[must_use]
    pub const fn fallback_reason(&self) -> Option<&FallbackReason> {
        match &self.origin {
            ResponseOrigin::Live => None,
            ResponseOrigin::Fallback(reason) => Some(reason),
        }
    }

    /// Take the payload.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Map the payload, keeping the provenance.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DependencyResponse<U> {
        DependencyResponse {
            value: f(self.value),
            origin: self.origin,
        }
    }
}
