//! Metric series snapshots as read back from a registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered tag set; keys are unique by construction.
pub type MetricTags = BTreeMap<Box<str>, Box<str>>;

/// Upper bounds (inclusive, milliseconds) of the timer histogram buckets.
///
/// A final overflow bucket catches everything above the last bound.
pub const TIMER_BUCKETS_MS: [u64; 11] = [5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

/// Number of histogram slots including the overflow bucket.
pub const TIMER_BUCKET_SLOTS: usize = TIMER_BUCKETS_MS.len() + 1;

/// Index of the bucket a duration falls into.
#[must_use]
pub fn timer_bucket_index(duration_ms: u64) -> usize {
    TIMER_BUCKETS_MS
        .iter()
        .position(|bound| duration_ms <= *bound)
        .unwrap_or(TIMER_BUCKETS_MS.len())
}

/// Kind of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SeriesKind {
    /// Monotonic counter.
    Counter,
    /// Duration accumulator.
    Timer,
    /// Point-in-time value.
    Gauge,
}

impl SeriesKind {
    /// Label used by exporters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Timer => "timer",
            Self::Gauge => "gauge",
        }
    }
}

/// Read-side view of a timer series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    /// Number of recorded durations.
    pub count: u64,
    /// Sum of recorded durations in milliseconds.
    pub total_ms: u64,
    /// Largest recorded duration in milliseconds.
    pub max_ms: u64,
    /// Per-bucket counts aligned with [`TIMER_BUCKETS_MS`] plus overflow.
    pub buckets: Vec<u64>,
}

impl TimerSnapshot {
    /// Mean duration, 0 when nothing was recorded.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "ratios of event counts tolerate f64 rounding")]
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }

    /// Durations strictly above `threshold_ms`.
    ///
    /// Exact when the threshold is a bucket bound; otherwise samples sharing
    /// the threshold's bucket are not counted. Thresholds beyond the last
    /// bound count nothing, since the overflow bucket is unbounded.
    #[must_use]
    pub fn count_above(&self, threshold_ms: u64) -> u64 {
        // A bucket counts only when its lower (exclusive) edge is at or above
        // the threshold.
        let first = TIMER_BUCKETS_MS
            .iter()
            .position(|bound| *bound >= threshold_ms)
            .map_or(TIMER_BUCKET_SLOTS, |index| index + 1);
        self.buckets.iter().skip(first).sum()
    }
}

/// Value of a series at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SeriesValue {
    /// Counter total.
    Counter {
        /// Current count.
        value: u64,
    },
    /// Timer statistics.
    Timer(TimerSnapshot),
    /// Gauge reading.
    Gauge {
        /// Current value.
        value: f64,
    },
}

impl SeriesValue {
    /// Kind of this value.
    #[must_use]
    pub const fn kind(&self) -> SeriesKind {
        match self {
            Self::Counter { .. } => SeriesKind::Counter,
            Self::Timer(_) => SeriesKind::Timer,
            Self::Gauge { .. } => SeriesKind::Gauge,
        }
    }
}

/// One series identified by name plus tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSnapshot {
    /// Metric name.
    pub name: String,
    /// Tag set.
    pub tags: MetricTags,
    /// Value at read time.
    pub value: SeriesValue,
}

impl SeriesSnapshot {
    /// Tag value by key.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(AsRef::as_ref)
    }

    /// Counter value, if this is a counter.
    #[must_use]
    pub const fn counter(&self) -> Option<u64> {
        match &self.value {
            SeriesValue::Counter { value } => Some(*value),
            _ => None,
        }
    }

    /// Timer statistics, if this is a timer.
    #[must_use]
    pub const fn timer(&self) -> Option<&TimerSnapshot> {
        match &self.value {
            SeriesValue::Timer(timer) => Some(timer),
            _ => None,
        }
    }

    /// Gauge value, if this is a gauge.
    #[must_use]
    pub const fn gauge(&self) -> Option<f64> {
        match &self.value {
            SeriesValue::Gauge { value } => Some(*value),
            _ => None,
        }
    }
}

/// A single observation as written by an exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSample {
    /// Series kind.
    pub metric_type: SeriesKind,
    /// Metric name.
    pub name: String,
    /// Observed value.
    pub value: f64,
    /// Unit label (`count`, `ms`, `value`).
    pub unit: String,
    /// Tag set.
    pub tags: MetricTags,
    /// Wall-clock time of the observation.
    pub timestamp_ms: u64,
}
