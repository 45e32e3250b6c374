//! Read side of the metrics registry.

use crate::telemetry::TelemetryTags;
use clinic_monitor_domain::{SeriesKind, SeriesSnapshot};

/// Boundary contract for reading recorded series.
pub trait MetricsQueryPort: Send + Sync {
    /// Series whose name starts with `name_prefix` and whose tags satisfy
    /// `predicate`, sorted by name then tags.
    fn find(
        &self,
        name_prefix: &str,
        predicate: &dyn Fn(&TelemetryTags) -> bool,
    ) -> Vec<SeriesSnapshot>;

    /// Every series, sorted by name then tags.
    fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.find("", &|_| true)
    }
}

/// Prefix plus tag-equality filter over a [`MetricsQueryPort`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesQuery {
    prefix: String,
    exact_name: bool,
    tags: Vec<(String, String)>,
    kind: Option<SeriesKind>,
}

impl SeriesQuery {
    /// Series whose name starts with `prefix`.
    #[must_use]
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Series with exactly this name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            prefix: name.into(),
            exact_name: true,
            ..Self::default()
        }
    }

    /// Require a tag value.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Require a series kind.
    #[must_use]
    pub const fn kind(mut self, kind: SeriesKind) -> Self {
        self.kind = Some(kind);
        self
    }

    fn matches_tags(&self, tags: &TelemetryTags) -> bool {
        self.tags
            .iter()
            .all(|(key, value)| tags.get(key.as_str()).is_some_and(|found| **found == **value))
    }

    /// Run against a registry.
    pub fn run(&self, registry: &dyn MetricsQueryPort) -> Vec<SeriesSnapshot> {
        registry
            .find(&self.prefix, &|tags| self.matches_tags(tags))
            .into_iter()
            .filter(|series| !self.exact_name || series.name == self.prefix)
            .filter(|series| self.kind.is_none_or(|kind| series.value.kind() == kind))
            .collect()
    }

    /// Sum of matching counters.
    pub fn counter_total(&self, registry: &dyn MetricsQueryPort) -> u64 {
        self.run(registry)
            .iter()
            .filter_map(SeriesSnapshot::counter)
            .sum()
    }

    /// Sum of recorded durations count across matching timers.
    pub fn timer_count(&self, registry: &dyn MetricsQueryPort) -> u64 {
        self.run(registry)
            .iter()
            .filter_map(|series| series.timer().map(|timer| timer.count))
            .sum()
    }

    /// First matching gauge value.
    pub fn gauge(&self, registry: &dyn MetricsQueryPort) -> Option<f64> {
        self.run(registry).iter().find_map(SeriesSnapshot::gauge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::telemetry_tags;
    use clinic_monitor_domain::SeriesValue;

    struct FixedRegistry(Vec<SeriesSnapshot>);

    impl MetricsQueryPort for FixedRegistry {
        fn find(
            &self,
            name_prefix: &str,
            predicate: &dyn Fn(&TelemetryTags) -> bool,
        ) -> Vec<SeriesSnapshot> {
            self.0
                .iter()
                .filter(|series| series.name.starts_with(name_prefix) && predicate(&series.tags))
                .cloned()
                .collect()
        }
    }

    fn counter(name: &str, cache: &str, value: u64) -> SeriesSnapshot {
        SeriesSnapshot {
            name: name.to_owned(),
            tags: telemetry_tags([("cache", cache)]),
            value: SeriesValue::Counter { value },
        }
    }

    #[test]
    fn query_filters_by_prefix_tags_and_exact_name() {
        let registry = FixedRegistry(vec![
            counter("cache.hit.count", "clients", 7),
            counter("cache.hit.count", "services", 2),
            counter("cache.hit.count.total", "clients", 100),
            counter("cache.miss.count", "clients", 3),
        ]);

        assert_eq!(SeriesQuery::prefix("cache.").counter_total(&registry), 112);
        assert_eq!(
            SeriesQuery::named("cache.hit.count")
                .tag("cache", "clients")
                .counter_total(&registry),
            7
        );
        assert_eq!(
            SeriesQuery::prefix("cache")
                .kind(SeriesKind::Gauge)
                .run(&registry)
                .len(),
            0
        );
        assert_eq!(registry.snapshot().len(), 4);
    }
}
