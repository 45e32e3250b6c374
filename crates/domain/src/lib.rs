//! # clinic-monitor-domain
//!
//! Value objects for method instrumentation and remote-call resilience.
//!
//! - **Primitives** - `MethodId`, `PolicyTarget`, `DependencyName`, `RegionName`
//! - **Layer** - architectural layer tag of a wrapped method
//! - **Policy** - `MonitorPolicy`, `LayerDefaults`, `ResolvedPolicy`
//! - **Metrics** - series snapshots and the timer histogram layout
//! - **Circuit** - breaker states, call outcomes, snapshots
//! - **Cache** - lookup classification and region statistics
//! - **Fallback** - `DependencyResponse` with live/fallback provenance
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No I/O, no clocks, no async

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub use clinic_monitor_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod cache;
pub mod circuit;
pub mod fallback;
pub mod layer;
pub mod metrics;
pub mod policy;
pub mod primitives;

pub use cache::{CacheLookup, CacheRegionStats, UNKNOWN_SIZE};
pub use circuit::{BreakerSnapshot, CallOutcome, CircuitState};
pub use fallback::{DependencyResponse, FallbackReason, ResponseOrigin};
pub use layer::Layer;
pub use metrics::{
    MetricSample, MetricTags, SeriesKind, SeriesSnapshot, SeriesValue, TIMER_BUCKET_SLOTS,
    TIMER_BUCKETS_MS, TimerSnapshot, timer_bucket_index,
};
pub use policy::{
    DEFAULT_LAYER_METRIC, DEFAULT_MONITORED_METRIC, DEFAULT_POLICY_THRESHOLD_MS,
    InvocationStatus, LayerDefaults, MonitorPolicy, PolicySource, ResolvedPolicy,
    default_layer_threshold_ms,
};
pub use primitives::{DependencyName, MethodId, PolicyTarget, PrimitiveError, RegionName};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================
