//! # clinic-monitor-app
//!
//! Monitoring use cases: method interception, cache instrumentation, and
//! resilient dependency calls.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod cache;
pub mod interceptor;
pub mod resilience;

/// Crate version, used by the CLI `info` command.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub use cache::{CacheMonitor, InstrumentedCache, PeriodicReporter, SizeProbe};
pub use interceptor::{InterceptorDeps, MethodInterceptor, MonitoredMethod, PolicyTable};
pub use resilience::{
    BreakerSettings, CallOptions, CallPolicy, CircuitBreaker, CircuitBreakerRegistry,
    DependencySettings, FallbackProducer, ResilienceDeps, ResilientClient,
};
