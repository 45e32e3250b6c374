//! In-memory metrics registry.
//!
//! Series are keyed by name plus tag set and stored in a `DashMap`; every
//! value is a set of atomics so concurrent writers never block each other on
//! the hot path. Writes never fail: a kind conflict or a full registry turns
//! the write into a no-op that warns once.

use clinic_monitor_domain::{
    SeriesSnapshot, SeriesValue, TIMER_BUCKET_SLOTS, TimerSnapshot, timer_bucket_index,
};
use clinic_monitor_ports::{
    GaugeSupplier, MetricsQueryPort, TelemetryPort, TelemetryTags, TelemetryTimer,
};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::telemetry::StopwatchTimer;

/// Default cap on distinct series.
pub const DEFAULT_MAX_SERIES: usize = 10_000;

type SeriesKey = (Box<str>, TelemetryTags);

enum SeriesCell {
    Counter(AtomicU64),
    Timer(TimerCell),
    Gauge(GaugeCell),
}

impl SeriesCell {
    const fn kind_label(&self) -> &'static str {
        match self {
            Self::Counter(_) => "counter",
            Self::Timer(_) => "timer",
            Self::Gauge(_) => "gauge",
        }
    }
}

struct TimerCell {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    buckets: [AtomicU64; TIMER_BUCKET_SLOTS],
}

impl TimerCell {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    fn record(&self, duration_ms: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(duration_ms, Ordering::Relaxed);
        self.max_ms.fetch_max(duration_ms, Ordering::Relaxed);
        if let Some(bucket) = self.buckets.get(timer_bucket_index(duration_ms)) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_ms: self.total_ms.load(Ordering::Relaxed),
            max_ms: self.max_ms.load(Ordering::Relaxed),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

struct GaugeCell {
    bits: AtomicU64,
    supplier: RwLock<Option<GaugeSupplier>>,
}

impl GaugeCell {
    fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            supplier: RwLock::new(None),
        }
    }
}

#[derive(Clone, Copy)]
enum CellKind {
    Counter,
    Timer,
    Gauge,
}

impl CellKind {
    fn create(self) -> SeriesCell {
        match self {
            Self::Counter => SeriesCell::Counter(AtomicU64::new(0)),
            Self::Timer => SeriesCell::Timer(TimerCell::new()),
            Self::Gauge => SeriesCell::Gauge(GaugeCell::new()),
        }
    }
}

/// Process-wide store of counters, timers, and gauges.
///
/// Cloning is cheap and every clone shares the same series.
#[derive(Clone)]
pub struct InMemoryMetricsRegistry {
    state: Arc<RegistryState>,
}

struct RegistryState {
    series: DashMap<SeriesKey, Arc<SeriesCell>>,
    series_count: AtomicUsize,
    max_series: usize,
    exporter: Option<Arc<dyn TelemetryPort>>,
    capacity_warned: AtomicBool,
    conflict_warned: AtomicBool,
    supplier_warned: AtomicBool,
}

impl Default for InMemoryMetricsRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SERIES)
    }
}

impl InMemoryMetricsRegistry {
    /// Registry holding at most `max_series` distinct series.
    #[must_use]
    pub fn new(max_series: usize) -> Self {
        Self::build(max_series, None)
    }

    /// Registry that also forwards every write to `exporter`.
    #[must_use]
    pub fn with_exporter(max_series: usize, exporter: Arc<dyn TelemetryPort>) -> Self {
        Self::build(max_series, Some(exporter))
    }

    fn build(max_series: usize, exporter: Option<Arc<dyn TelemetryPort>>) -> Self {
        Self {
            state: Arc::new(RegistryState {
                series: DashMap::new(),
                series_count: AtomicUsize::new(0),
                max_series,
                exporter,
                capacity_warned: AtomicBool::new(false),
                conflict_warned: AtomicBool::new(false),
                supplier_warned: AtomicBool::new(false),
            }),
        }
    }

    /// Number of distinct series.
    #[must_use]
    pub fn series_len(&self) -> usize {
        self.state.series_count.load(Ordering::Relaxed)
    }

    fn exporter(&self) -> Option<&Arc<dyn TelemetryPort>> {
        self.state.exporter.as_ref()
    }
}

impl RegistryState {
    fn cell(
        &self,
        name: &str,
        tags: Option<&TelemetryTags>,
        kind: CellKind,
    ) -> Option<Arc<SeriesCell>> {
        let key: SeriesKey = (name.into(), tags.cloned().unwrap_or_default());
        match self.series.entry(key) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if self.series_count.fetch_add(1, Ordering::Relaxed) >= self.max_series {
                    self.series_count.fetch_sub(1, Ordering::Relaxed);
                    if !self.capacity_warned.swap(true, Ordering::Relaxed) {
                        tracing::warn!(
                            metric = name,
                            max_series = self.max_series,
                            "metrics registry is full; new series are dropped"
                        );
                    }
                    return None;
                }
                let cell = Arc::new(kind.create());
                entry.insert(Arc::clone(&cell));
                Some(cell)
            },
        }
    }

    fn kind_conflict(&self, name: &str, existing: &SeriesCell, requested: &'static str) {
        if !self.conflict_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                metric = name,
                existing = existing.kind_label(),
                requested,
                "metric kind conflict; write dropped"
            );
        }
    }

    fn read_gauge(&self, name: &str, gauge: &GaugeCell) -> f64 {
        let supplier = gauge.supplier.read().clone();
        let Some(supplier) = supplier else {
            return f64::from_bits(gauge.bits.load(Ordering::Relaxed));
        };
        std::panic::catch_unwind(AssertUnwindSafe(|| supplier())).unwrap_or_else(|_| {
            if !self.supplier_warned.swap(true, Ordering::Relaxed) {
                tracing::warn!(metric = name, "gauge supplier panicked; reporting NaN");
            }
            f64::NAN
        })
    }
}

impl TelemetryPort for InMemoryMetricsRegistry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        if let Some(cell) = self.state.cell(name, tags, CellKind::Counter) {
            match cell.as_ref() {
                SeriesCell::Counter(counter) => {
                    counter.fetch_add(value, Ordering::Relaxed);
                },
                other => self.state.kind_conflict(name, other, "counter"),
            }
        }
        if let Some(exporter) = self.exporter() {
            exporter.increment_counter(name, value, tags);
        }
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        if let Some(cell) = self.state.cell(name, tags, CellKind::Timer) {
            match cell.as_ref() {
                SeriesCell::Timer(timer) => timer.record(duration_ms),
                other => self.state.kind_conflict(name, other, "timer"),
            }
        }
        if let Some(exporter) = self.exporter() {
            exporter.record_timer_ms(name, duration_ms, tags);
        }
    }

    fn set_gauge(&self, name: &str, value: f64, tags: Option<&TelemetryTags>) {
        if let Some(cell) = self.state.cell(name, tags, CellKind::Gauge) {
            match cell.as_ref() {
                SeriesCell::Gauge(gauge) => {
                    *gauge.supplier.write() = None;
                    gauge.bits.store(value.to_bits(), Ordering::Relaxed);
                },
                other => self.state.kind_conflict(name, other, "gauge"),
            }
        }
        if let Some(exporter) = self.exporter() {
            exporter.set_gauge(name, value, tags);
        }
    }

    fn register_gauge(&self, name: &str, tags: Option<&TelemetryTags>, supplier: GaugeSupplier) {
        if let Some(cell) = self.state.cell(name, tags, CellKind::Gauge) {
            match cell.as_ref() {
                SeriesCell::Gauge(gauge) => *gauge.supplier.write() = Some(supplier),
                other => self.state.kind_conflict(name, other, "gauge"),
            }
        }
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(StopwatchTimer::new(
            Arc::new(self.clone()),
            name,
            tags.cloned(),
        ))
    }
}

impl MetricsQueryPort for InMemoryMetricsRegistry {
    fn find(
        &self,
        name_prefix: &str,
        predicate: &dyn Fn(&TelemetryTags) -> bool,
    ) -> Vec<SeriesSnapshot> {
        // collect first: suppliers must not run while shard locks are held
        let matching: Vec<(SeriesKey, Arc<SeriesCell>)> = self
            .state
            .series
            .iter()
            .filter(|entry| entry.key().0.starts_with(name_prefix) && predicate(&entry.key().1))
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut snapshots: Vec<SeriesSnapshot> = matching
            .into_iter()
            .map(|((name, tags), cell)| {
                let value = match cell.as_ref() {
                    SeriesCell::Counter(counter) => SeriesValue::Counter {
                        value: counter.load(Ordering::Relaxed),
                    },
                    SeriesCell::Timer(timer) => SeriesValue::Timer(timer.snapshot()),
                    SeriesCell::Gauge(gauge) => SeriesValue::Gauge {
                        value: self.state.read_gauge(&name, gauge),
                    },
                };
                SeriesSnapshot {
                    name: name.into_string(),
                    tags,
                    value,
                }
            })
            .collect();
        snapshots.sort_by(|left, right| {
            left.name
                .cmp(&right.name)
                .then_with(|| left.tags.cmp(&right.tags))
        });
        snapshots
    }
}
