//! Telemetry boundary contract (counters, timings, gauges).

use std::sync::Arc;

pub use clinic_monitor_domain::MetricTags as TelemetryTags;

/// Gauge value computed on read.
pub type GaugeSupplier = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Timer handle.
pub trait TelemetryTimer: Send + Sync {
    /// Stop the timer and record its duration.
    fn stop(&self);
}

/// Boundary contract for telemetry writes.
///
/// No method may fail or panic; an unavailable backend turns calls into
/// no-ops. Keep tags low-cardinality.
pub trait TelemetryPort: Send + Sync {
    /// Increment a counter by `value` (default should be 1 at call sites).
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>);

    /// Record a duration (in milliseconds) for an operation.
    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>);

    /// Set a gauge to `value`.
    fn set_gauge(&self, name: &str, value: f64, tags: Option<&TelemetryTags>);

    /// Register a gauge evaluated on every read.
    ///
    /// Backends without pull-based reads store the current value once.
    fn register_gauge(&self, name: &str, tags: Option<&TelemetryTags>, supplier: GaugeSupplier) {
        self.set_gauge(name, supplier(), tags);
    }

    /// Start a timer and return a handle that records on `stop()`.
    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer>;
}

/// Build a tag set from key/value pairs.
#[must_use]
pub fn telemetry_tags<I, K, V>(pairs: I) -> TelemetryTags
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Box<str>>,
    V: Into<Box<str>>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
