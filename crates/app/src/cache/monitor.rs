//! Per-region hit, miss, and eviction accounting.

use clinic_monitor_domain::{CacheLookup, CacheRegionStats, RegionName, UNKNOWN_SIZE};
use clinic_monitor_ports::{LoggerPort, TelemetryPort, TelemetryTags, log_fields};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counter of cache hits, tagged `cache`.
pub const CACHE_HIT_METRIC: &str = "cache.hit.count";
/// Counter of cache misses, tagged `cache`.
pub const CACHE_MISS_METRIC: &str = "cache.miss.count";
/// Counter of evicted entries, tagged `cache`.
pub const CACHE_EVICTION_METRIC: &str = "cache.eviction.count";
/// Gauge of the estimated entry count, set on each report.
pub const CACHE_SIZE_METRIC: &str = "cache.size";
/// Gauge of the cumulative hit ratio, set on each report.
pub const CACHE_HIT_RATIO_METRIC: &str = "cache.hit.ratio";

/// Best-effort size estimate of a region.
pub type SizeProbe = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

/// Shared statistics for every cache region of the process.
pub struct CacheMonitor {
    telemetry: Arc<dyn TelemetryPort>,
    logger: Option<Arc<dyn LoggerPort>>,
    regions: DashMap<RegionName, Arc<RegionCounters>>,
    probe_fault_reported: AtomicBool,
    fault_reported: AtomicBool,
}

struct RegionCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    size_probe: RwLock<Option<SizeProbe>>,
    tags: TelemetryTags,
}

impl RegionCounters {
    fn new(region: &RegionName) -> Self {
        let mut tags = TelemetryTags::new();
        tags.insert("cache".into(), region.as_str().into());
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            size_probe: RwLock::new(None),
            tags,
        }
    }
}

impl CacheMonitor {
    /// Monitor writing counters into `telemetry`.
    #[must_use]
    pub fn new(telemetry: Arc<dyn TelemetryPort>, logger: Option<Arc<dyn LoggerPort>>) -> Self {
        Self {
            telemetry,
            logger,
            regions: DashMap::new(),
            probe_fault_reported: AtomicBool::new(false),
            fault_reported: AtomicBool::new(false),
        }
    }

    /// Make `region` known so it shows up in reports before its first lookup.
    ///
    /// A later registration replaces the size probe.
    pub fn register_region(&self, region: &RegionName, size_probe: Option<SizeProbe>) {
        let counters = self.counters(region);
        *counters.size_probe.write() = size_probe;
    }

    /// Record one lookup and return its classification.
    pub fn on_get(&self, region: &RegionName, key: &str, present: bool) -> CacheLookup {
        let lookup = CacheLookup::from_present(present);
        let counters = self.counters(region);
        let metric = if lookup.is_hit() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            CACHE_HIT_METRIC
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            CACHE_MISS_METRIC
        };
        self.observe(|| {
            self.telemetry
                .increment_counter(metric, 1, Some(&counters.tags));
        });
        tracing::trace!(region = %region, key, hit = lookup.is_hit(), "cache lookup");
        lookup
    }

    /// Record the removal of one entry.
    pub fn on_evict(&self, region: &RegionName, key: &str) {
        self.on_evict_many(region, 1);
        tracing::trace!(region = %region, key, "cache eviction");
    }

    /// Record the removal of `count` entries at once (region clear).
    pub fn on_evict_many(&self, region: &RegionName, count: u64) {
        if count == 0 {
            return;
        }
        let counters = self.counters(region);
        counters.evictions.fetch_add(count, Ordering::Relaxed);
        self.observe(|| {
            self.telemetry
                .increment_counter(CACHE_EVICTION_METRIC, count, Some(&counters.tags));
        });
    }

    /// Current statistics of one region.
    #[must_use]
    pub fn stats(&self, region: &RegionName) -> Option<CacheRegionStats> {
        let counters = self.regions.get(region).map(|entry| Arc::clone(entry.value()))?;
        Some(self.read_stats(region, &counters))
    }

    /// Number of known regions.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Read every region, set the size and ratio gauges, and log one
    /// `cache.report` event per region. Regions are returned sorted by name.
    pub fn report_now(&self) -> Vec<CacheRegionStats> {
        self.sorted_regions()
            .into_iter()
            .map(|(region, counters)| {
                let stats = self.read_stats(&region, &counters);
                self.observe(|| self.publish(&stats, &counters.tags));
                stats
            })
            .collect()
    }

    /// Statistics of every region, sorted by name, without publishing them.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CacheRegionStats> {
        self.sorted_regions()
            .into_iter()
            .map(|(region, counters)| self.read_stats(&region, &counters))
            .collect()
    }

    fn sorted_regions(&self) -> Vec<(RegionName, Arc<RegionCounters>)> {
        let mut regions: Vec<(RegionName, Arc<RegionCounters>)> = self
            .regions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        regions.sort_by(|left, right| left.0.cmp(&right.0));
        regions
    }

    fn counters(&self, region: &RegionName) -> Arc<RegionCounters> {
        if let Some(existing) = self.regions.get(region) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.regions
                .entry(region.clone())
                .or_insert_with(|| Arc::new(RegionCounters::new(region)))
                .value(),
        )
    }

    fn read_stats(&self, region: &RegionName, counters: &RegionCounters) -> CacheRegionStats {
        CacheRegionStats {
            region: region.as_str().to_owned(),
            size: self.probe_size(region, counters),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            evictions: counters.evictions.load(Ordering::Relaxed),
        }
    }

    fn probe_size(&self, region: &RegionName, counters: &RegionCounters) -> i64 {
        let Some(probe) = counters.size_probe.read().clone() else {
            return UNKNOWN_SIZE;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| probe())) {
            Ok(Some(size)) => i64::try_from(size).unwrap_or(i64::MAX),
            Ok(None) => UNKNOWN_SIZE,
            Err(_) => {
                if !self.probe_fault_reported.swap(true, Ordering::Relaxed) {
                    tracing::warn!(region = %region, "cache size probe failed; reporting unknown size");
                }
                UNKNOWN_SIZE
            },
        }
    }

    fn observe(&self, report: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(report)).is_err()
            && !self.fault_reported.swap(true, Ordering::Relaxed)
        {
            tracing::error!("cache instrumentation failed; cache results unaffected");
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        reason = "cache sizes are far below the f64 mantissa limit"
    )]
    fn publish(&self, stats: &CacheRegionStats, tags: &TelemetryTags) {
        let ratio = stats.hit_ratio();
        self.telemetry
            .set_gauge(CACHE_SIZE_METRIC, stats.size as f64, Some(tags));
        self.telemetry
            .set_gauge(CACHE_HIT_RATIO_METRIC, ratio, Some(tags));

        if let Some(logger) = self.logger.as_ref() {
            logger.info(
                "cache.report",
                "Cache region statistics",
                Some(log_fields([
                    ("region", Value::from(stats.region.as_str())),
                    ("size", Value::from(stats.size)),
                    ("hits", Value::from(stats.hits)),
                    ("misses", Value::from(stats.misses)),
                    ("evictions", Value::from(stats.evictions)),
                    ("hitRatio", Value::from(ratio)),
                    ("hitRatioPct", Value::from((ratio * 10_000.0).round() / 100.0)),
                ])),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_adapters::InMemoryMetricsRegistry;
    use clinic_monitor_domain::PrimitiveError;
    use clinic_monitor_ports::SeriesQuery;
    use clinic_monitor_testkit::{CapturingLogger, PanickingTelemetry};

    fn region(name: &str) -> Result<RegionName, PrimitiveError> {
        RegionName::parse(name)
    }

    #[test]
    fn seven_hits_and_three_misses_report_a_ratio_of_point_seven() -> Result<(), PrimitiveError> {
        let registry = InMemoryMetricsRegistry::new(100);
        let logger = CapturingLogger::new();
        let monitor = CacheMonitor::new(Arc::new(registry.clone()), Some(logger.clone()));
        let professionals = region("professionals")?;

        for _ in 0..7 {
            assert_eq!(monitor.on_get(&professionals, "p:1", true), CacheLookup::Hit);
        }
        for _ in 0..3 {
            assert_eq!(monitor.on_get(&professionals, "p:2", false), CacheLookup::Miss);
        }

        let report = monitor.report_now();
        let stats = report.first().cloned().unwrap_or_else(|| CacheRegionStats {
            region: String::new(),
            size: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        });
        assert!((stats.hit_ratio() - 0.7).abs() < 1e-9);
        assert_eq!(stats.size, UNKNOWN_SIZE);

        let gauge = SeriesQuery::named(CACHE_HIT_RATIO_METRIC)
            .tag("cache", "professionals")
            .gauge(&registry);
        assert!(gauge.is_some_and(|value| (value - 0.7).abs() < 1e-9));
        assert_eq!(
            SeriesQuery::named(CACHE_HIT_METRIC).counter_total(&registry),
            7
        );

        let events = logger.events_named("cache.report");
        assert_eq!(
            events.first().and_then(|event| event.field("hitRatioPct")),
            Some(&Value::from(70.0))
        );
        Ok(())
    }

    #[test]
    fn registered_region_without_lookups_reports_zero_ratio() -> Result<(), PrimitiveError> {
        let monitor = CacheMonitor::new(Arc::new(InMemoryMetricsRegistry::new(100)), None);
        monitor.register_region(&region("services")?, Some(Arc::new(|| Some(12_u64))));

        let report = monitor.report_now();
        assert_eq!(report.len(), 1);
        let stats = report.first().map(|stats| (stats.size, stats.hit_ratio()));
        assert_eq!(stats, Some((12, 0.0)));
        Ok(())
    }

    #[test]
    fn reports_are_sorted_and_failing_probes_report_unknown() -> Result<(), PrimitiveError> {
        let monitor = CacheMonitor::new(Arc::new(InMemoryMetricsRegistry::new(100)), None);
        monitor.register_region(
            &region("services")?,
            Some(Arc::new(|| -> Option<u64> { panic!("store poisoned") })),
        );
        monitor.on_evict_many(&region("appointments")?, 4);
        monitor.on_evict(&region("appointments")?, "a:9");

        let report = monitor.report_now();
        let names: Vec<&str> = report.iter().map(|stats| stats.region.as_str()).collect();
        assert_eq!(names, ["appointments", "services"]);
        assert_eq!(report.first().map(|stats| stats.evictions), Some(5));
        assert_eq!(report.get(1).map(|stats| stats.size), Some(UNKNOWN_SIZE));
        assert_eq!(monitor.region_count(), 2);
        Ok(())
    }

    #[test]
    fn concurrent_lookups_are_all_counted() -> Result<(), PrimitiveError> {
        let monitor = Arc::new(CacheMonitor::new(
            Arc::new(InMemoryMetricsRegistry::new(100)),
            None,
        ));
        let clients = region("clients")?;

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let monitor = Arc::clone(&monitor);
                let clients = clients.clone();
                scope.spawn(move || {
                    for call in 0..500 {
                        monitor.on_get(&clients, "c", (worker + call) % 2 == 0);
                    }
                });
            }
        });

        let stats = monitor.stats(&clients);
        assert_eq!(stats.map(|stats| stats.lookups()), Some(4_000));
        Ok(())
    }

    #[test]
    fn failing_telemetry_never_reaches_cache_callers() -> Result<(), PrimitiveError> {
        let logger = CapturingLogger::new();
        let monitor = CacheMonitor::new(Arc::new(PanickingTelemetry), Some(logger.clone()));
        let patients = region("patients")?;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let hit = monitor.on_get(&patients, "p:1", true);
            let miss = monitor.on_get(&patients, "p:2", false);
            monitor.on_evict(&patients, "p:1");
            (hit, miss, monitor.report_now())
        }));

        let Ok((hit, miss, report)) = outcome else {
            panic!("instrumentation panic escaped to the caller");
        };
        assert_eq!((hit, miss), (CacheLookup::Hit, CacheLookup::Miss));
        assert_eq!(report.len(), 1);
        let counts = report
            .first()
            .map(|stats| (stats.hits, stats.misses, stats.evictions));
        assert_eq!(counts, Some((1, 1, 1)));
        // Gauges fail before the report event is logged.
        assert_eq!(logger.count("cache.report"), 0);
        Ok(())
    }
}
