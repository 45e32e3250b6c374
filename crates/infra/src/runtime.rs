//! Composition root: every monitoring component built from one validated config.

use crate::InfraResult;
use clinic_monitor_adapters::{
    InMemoryMetricsRegistry, JsonLogger, JsonTelemetry, LogSink, MemoryCacheStore, StderrLogSink,
    SystemClock, TaggedTelemetry, TracingLogger,
};
use clinic_monitor_app::{
    BreakerSettings, CacheMonitor, CallPolicy, CircuitBreakerRegistry, DependencySettings,
    InstrumentedCache, InterceptorDeps, MethodInterceptor, MonitoredMethod, PeriodicReporter,
    PolicyTable, ResilienceDeps, ResilientClient,
};
use clinic_monitor_config::{DependencyConfig, LogLevelConfig, ValidatedMonitoringConfig};
use clinic_monitor_domain::{
    BreakerSnapshot, CacheRegionStats, DependencyName, Layer, RegionName, SeriesSnapshot,
};
use clinic_monitor_ports::{
    ClockPort, LogLevel, LoggerPort, MetricsQueryPort, TelemetryPort, TelemetryTags, log_fields,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Gauge of seconds since the runtime was built.
pub const PROCESS_UPTIME_METRIC: &str = "process.uptime";

/// Overrides for the outer edges of the runtime.
#[derive(Clone, Default)]
pub struct RuntimeOptions {
    /// Write structured logs as JSON lines here; `None` forwards to `tracing`.
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Destination of the metric export when enabled; defaults to stderr.
    pub export_sink: Option<Arc<dyn LogSink>>,
    /// Clock for durations, cache expiry, and breaker waits.
    pub clock: Option<Arc<dyn ClockPort>>,
}

/// Point-in-time view of metrics, cache regions, and breakers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSnapshot {
    /// Every metric series, sorted by name then tags.
    pub metrics: Vec<SeriesSnapshot>,
    /// Every registered cache region, sorted by name.
    pub caches: Vec<CacheRegionStats>,
    /// Every breaker created so far, sorted by dependency.
    pub breakers: Vec<BreakerSnapshot>,
}

/// The wired monitoring layer of one process.
pub struct MonitoringRuntime {
    config: ValidatedMonitoringConfig,
    registry: InMemoryMetricsRegistry,
    telemetry: Arc<dyn TelemetryPort>,
    logger: Arc<dyn LoggerPort>,
    clock: Arc<dyn ClockPort>,
    interceptor: MethodInterceptor,
    cache_monitor: Arc<CacheMonitor>,
    breakers: CircuitBreakerRegistry,
    reporter: Mutex<Option<PeriodicReporter>>,
}

impl MonitoringRuntime {
    /// Build the registry, logger, interceptor, cache monitor, and breaker
    /// registry described by `config`.
    pub fn from_config(
        config: &ValidatedMonitoringConfig,
        options: RuntimeOptions,
    ) -> InfraResult<Self> {
        let application = &config.application;
        let mut common_tags = TelemetryTags::new();
        common_tags.insert("application".into(), application.name.as_str().into());
        common_tags.insert("environment".into(), application.environment.as_str().into());

        let max_series = usize::try_from(config.limits().max_series.get()).unwrap_or(usize::MAX);
        let registry = if config.registry.export.enabled {
            let sink = options
                .export_sink
                .clone()
                .unwrap_or_else(|| Arc::new(StderrLogSink));
            InMemoryMetricsRegistry::with_exporter(max_series, Arc::new(JsonTelemetry::new(sink)))
        } else {
            InMemoryMetricsRegistry::new(max_series)
        };
        let telemetry: Arc<dyn TelemetryPort> =
            Arc::new(TaggedTelemetry::new(Arc::new(registry.clone()), common_tags));

        let logger: Arc<dyn LoggerPort> = match options.log_sink.clone() {
            Some(sink) => Arc::new(
                JsonLogger::new(sink)
                    .with_min_level(log_level(config.logging.level))
                    .with_base_fields(log_fields([
                        ("application", Value::from(application.name.as_str())),
                        ("environment", Value::from(application.environment.as_str())),
                    ])),
            ),
            None => Arc::new(TracingLogger::new()),
        };
        let clock = options
            .clock
            .clone()
            .unwrap_or_else(|| Arc::new(SystemClock::new()));
        let started_at = clock.now();
        let uptime_clock = Arc::clone(&clock);
        telemetry.register_gauge(
            PROCESS_UPTIME_METRIC,
            None,
            Arc::new(move || uptime_clock.elapsed_since(started_at).as_secs_f64()),
        );

        let policies = PolicyTable::from_entries(
            config.layer_defaults(),
            config.policies().iter().cloned(),
        );
        let interceptor = MethodInterceptor::new(
            InterceptorDeps {
                telemetry: Arc::clone(&telemetry),
                logger: Some(Arc::clone(&logger)),
                clock: Arc::clone(&clock),
            },
            policies,
        );

        let cache_monitor = Arc::new(CacheMonitor::new(
            Arc::clone(&telemetry),
            Some(Arc::clone(&logger)),
        ));
        for name in config.cache.regions.keys() {
            cache_monitor.register_region(&RegionName::parse(name)?, None);
        }

        let mut breakers = CircuitBreakerRegistry::new(
            dependency_settings(&config.resilience.defaults),
            ResilienceDeps {
                telemetry: Arc::clone(&telemetry),
                logger: Some(Arc::clone(&logger)),
                clock: Arc::clone(&clock),
            },
        );
        for name in config.resilience.dependencies.keys() {
            breakers = breakers.with_override(
                DependencyName::parse(name)?,
                dependency_settings(&config.dependency_config(name)),
            );
        }

        tracing::debug!(
            application = %application.name,
            policies = config.policies().len(),
            regions = config.cache.regions.len(),
            "monitoring runtime built"
        );
        Ok(Self {
            config: config.clone(),
            registry,
            telemetry,
            logger,
            clock,
            interceptor,
            cache_monitor,
            breakers,
            reporter: Mutex::new(None),
        })
    }

    /// Config the runtime was built from.
    #[must_use]
    pub const fn config(&self) -> &ValidatedMonitoringConfig {
        &self.config
    }

    /// Queryable metrics registry.
    #[must_use]
    pub const fn registry(&self) -> &InMemoryMetricsRegistry {
        &self.registry
    }

    /// Telemetry port carrying the application tags.
    #[must_use]
    pub fn telemetry(&self) -> Arc<dyn TelemetryPort> {
        Arc::clone(&self.telemetry)
    }

    /// Structured logger.
    #[must_use]
    pub fn logger(&self) -> Arc<dyn LoggerPort> {
        Arc::clone(&self.logger)
    }

    /// Interceptor holding the configured policies.
    #[must_use]
    pub const fn interceptor(&self) -> &MethodInterceptor {
        &self.interceptor
    }

    /// Shared cache statistics.
    #[must_use]
    pub fn cache_monitor(&self) -> Arc<CacheMonitor> {
        Arc::clone(&self.cache_monitor)
    }

    /// Breakers keyed by dependency.
    #[must_use]
    pub const fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    /// Wrap `class.method` with the policy the config resolves for it.
    pub fn wrap(&self, class: &str, method: &str, layer: Layer) -> InfraResult<MonitoredMethod> {
        self.interceptor.wrap_named(class, method, layer)
    }

    /// Build an in-memory cache region sized by `cache.regions.<name>` (or the
    /// default region) and report it to the cache monitor.
    pub fn cache_region<V>(&self, name: &str) -> InfraResult<InstrumentedCache<V>>
    where
        V: Clone + Send + 'static,
    {
        let region = RegionName::parse(name)?;
        let settings = self.config.cache.region(region.as_str());
        let max_entries = usize::try_from(settings.max_entries).unwrap_or(usize::MAX);
        let store = MemoryCacheStore::new(max_entries, settings.ttl(), Arc::clone(&self.clock))?;
        Ok(InstrumentedCache::new(
            region,
            Arc::new(store),
            Arc::clone(&self.cache_monitor),
        ))
    }

    /// Resilient client of `dependency`, sharing its breaker.
    pub fn client(&self, dependency: &str) -> InfraResult<ResilientClient> {
        self.breakers.client_named(dependency)
    }

    /// Spawn the periodic cache reporter on the current tokio runtime.
    ///
    /// Returns false when a reporter is already running.
    pub fn start_reporter(&self) -> bool {
        let mut reporter = self.reporter.lock();
        if reporter.is_some() {
            return false;
        }
        let period = self.config.limits().cache_report_interval();
        *reporter = Some(PeriodicReporter::spawn(Arc::clone(&self.cache_monitor), period));
        true
    }

    /// Stop the reporter, if running, and publish one final cache report.
    pub async fn shutdown(&self) -> Vec<CacheRegionStats> {
        let reporter = self.reporter.lock().take();
        if let Some(reporter) = reporter {
            reporter.shutdown().await;
        }
        self.cache_monitor.report_now()
    }

    /// Current metrics, cache statistics, and breaker states.
    #[must_use]
    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            metrics: self.registry.snapshot(),
            caches: self.cache_monitor.snapshot(),
            breakers: self.breakers.snapshots(),
        }
    }
}

const fn log_level(level: LogLevelConfig) -> LogLevel {
    match level {
        LogLevelConfig::Debug => LogLevel::Debug,
        LogLevelConfig::Info => LogLevel::Info,
        LogLevelConfig::Warn => LogLevel::Warn,
        LogLevelConfig::Error => LogLevel::Error,
    }
}

fn dependency_settings(config: &DependencyConfig) -> DependencySettings {
    DependencySettings {
        breaker: BreakerSettings {
            failure_rate_threshold: config.failure_rate_threshold,
            sliding_window_size: config.sliding_window_size,
            minimum_calls: config.minimum_calls,
            wait_duration_in_open_state: config.wait_duration_in_open_state(),
            permitted_calls_in_half_open: config.permitted_calls_in_half_open,
        },
        call: CallPolicy {
            timeout: config.timeout(),
            retry_attempts: config.retry_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_millis),
        },
    }
}
