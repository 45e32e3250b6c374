//! Resilience around remote dependencies.
//!
//! Each dependency gets one [`CircuitBreaker`] (count-based sliding window),
//! shared through the [`CircuitBreakerRegistry`]. A [`ResilientClient`] runs
//! every call through breaker admission, a per-attempt timeout, bounded
//! retries for idempotent calls, and finally a [`FallbackProducer`].

mod breaker;
mod client;
mod registry;
mod window;

pub use breaker::{
    BreakerSettings, CIRCUIT_STATE_METRIC, CIRCUIT_TRANSITIONS_METRIC, CallPermit, CircuitBreaker,
    Transition,
};
pub use client::{
    CallOptions, CallPolicy, DEPENDENCY_CALL_METRIC, DEPENDENCY_FALLBACK_METRIC, FallbackProducer,
    RETRY_ATTEMPT_METRIC, ResilienceDeps, ResilientClient, TIMEOUT_TRIGGERED_METRIC,
};
pub use registry::{CircuitBreakerRegistry, DependencySettings};
pub use window::SlidingWindow;
