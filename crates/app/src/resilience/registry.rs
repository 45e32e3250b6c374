//! One breaker per dependency, shared by every client of that dependency.

use super::breaker::{BreakerSettings, CircuitBreaker};
use super::client::{CallPolicy, ResilienceDeps, ResilientClient};
use clinic_monitor_domain::{BreakerSnapshot, DependencyName};
use clinic_monitor_shared::Result;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Breaker thresholds plus call policy for one dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DependencySettings {
    /// Breaker thresholds.
    pub breaker: BreakerSettings,
    /// Deadline and retry budget.
    pub call: CallPolicy,
}

/// Lazily built breakers keyed by dependency name.
pub struct CircuitBreakerRegistry {
    defaults: DependencySettings,
    overrides: HashMap<DependencyName, DependencySettings>,
    deps: ResilienceDeps,
    breakers: DashMap<DependencyName, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Registry applying `defaults` to every dependency without an override.
    #[must_use]
    pub fn new(defaults: DependencySettings, deps: ResilienceDeps) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            deps,
            breakers: DashMap::new(),
        }
    }

    /// Use `settings` for `dependency` instead of the defaults.
    #[must_use]
    pub fn with_override(mut self, dependency: DependencyName, settings: DependencySettings) -> Self {
        self.overrides.insert(dependency, settings);
        self
    }

    /// Effective settings of `dependency`.
    #[must_use]
    pub fn settings_for(&self, dependency: &DependencyName) -> DependencySettings {
        self.overrides
            .get(dependency)
            .copied()
            .unwrap_or(self.defaults)
    }

    /// The breaker of `dependency`, created on first use.
    pub fn breaker(&self, dependency: &DependencyName) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(dependency) {
            return Arc::clone(existing.value());
        }
        let entry = self.breakers.entry(dependency.clone()).or_insert_with(|| {
            let settings = self.settings_for(dependency);
            tracing::debug!(%dependency, "creating circuit breaker");
            Arc::new(
                CircuitBreaker::new(dependency.clone(), settings.breaker, Arc::clone(&self.deps.clock))
                    .with_observers(Some(Arc::clone(&self.deps.telemetry)), self.deps.logger.clone()),
            )
        });
        Arc::clone(entry.value())
    }

    /// A client sharing the breaker of `dependency`.
    #[must_use]
    pub fn client(&self, dependency: &DependencyName) -> ResilientClient {
        ResilientClient::new(
            self.breaker(dependency),
            self.settings_for(dependency).call,
            self.deps.clone(),
        )
    }

    /// Like [`Self::client`], parsing the dependency name first.
    pub fn client_named(&self, dependency: &str) -> Result<ResilientClient> {
        let dependency = DependencyName::parse(dependency)?;
        Ok(self.client(&dependency))
    }

    /// Number of breakers created so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    /// Returns true when no breaker has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Current view of every breaker, sorted by dependency.
    #[must_use]
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots: Vec<BreakerSnapshot> = self
            .breakers
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|left, right| left.dependency.cmp(&right.dependency));
        snapshots
    }
}
