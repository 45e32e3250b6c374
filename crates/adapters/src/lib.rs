//! # clinic-monitor-adapters
//!
//! Adapter implementations for ports: the in-memory metrics registry, JSON
//! exporters and loggers, the monotonic clock, and in-memory cache regions.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod cache_store;
pub mod clock;
pub mod log_sink;
pub mod logger;
pub mod registry;
pub mod telemetry;

pub use cache_store::MemoryCacheStore;
pub use clock::SystemClock;
pub use log_sink::{LogSink, NullLogSink, StderrLogSink};
pub use logger::{JsonLogger, TracingLogger};
pub use registry::{DEFAULT_MAX_SERIES, InMemoryMetricsRegistry};
pub use telemetry::{JsonTelemetry, StopwatchTimer, TaggedTelemetry};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_ports::ports_crate_version;
    use clinic_monitor_shared::shared_crate_version;

    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
                continue;
            }
            if in_deps && line.starts_with("clinic-monitor-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_owned());
            }
        }

        deps
    }

    #[test]
    fn adapters_do_not_depend_on_app_or_infra() {
        let forbidden = ["clinic-monitor-app", "clinic-monitor-infra", "clinic-monitor-config"];
        for dep in workspace_deps() {
            assert!(!forbidden.contains(&dep.as_str()), "forbidden dependency found: {dep}");
        }
    }

    #[test]
    fn adapters_crate_compiles() {
        assert!(!adapters_crate_version().is_empty());
        assert!(!ports_crate_version().is_empty());
        assert!(!shared_crate_version().is_empty());
    }
}
