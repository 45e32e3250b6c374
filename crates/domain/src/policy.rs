//! Monitoring policies and their resolution into per-method settings.

use crate::layer::Layer;
use crate::primitives::MethodId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Metric name used by layer-default policies.
pub const DEFAULT_LAYER_METRIC: &str = "method.execution";
/// Metric name used by explicit policies that leave `value` empty.
pub const DEFAULT_MONITORED_METRIC: &str = "method.monitored.execution";
/// Default threshold of an explicit policy.
pub const DEFAULT_POLICY_THRESHOLD_MS: u64 = 500;

/// Declarative per-method (or per-type) monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorPolicy {
    /// Metric name override; empty selects the monitored-execution metric.
    pub value: String,
    /// Human-readable description; empty falls back to the method name.
    pub description: String,
    /// Log arguments and return values verbatim.
    ///
    /// Never enable for methods that handle credentials or personal data.
    pub log_parameters: bool,
    /// Latency threshold in milliseconds.
    pub threshold_millis: u64,
    /// Emit an error-level observation when the method fails.
    pub alert_on_error: bool,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            value: String::new(),
            description: String::new(),
            log_parameters: false,
            threshold_millis: DEFAULT_POLICY_THRESHOLD_MS,
            alert_on_error: false,
        }
    }
}

impl MonitorPolicy {
    /// Set the metric name.
    #[must_use]
    pub fn named(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the latency threshold.
    #[must_use]
    pub const fn with_threshold_millis(mut self, threshold_millis: u64) -> Self {
        self.threshold_millis = threshold_millis;
        self
    }

    /// Enable alerting on failure.
    #[must_use]
    pub const fn alerting(mut self) -> Self {
        self.alert_on_error = true;
        self
    }

    /// Enable verbose parameter logging.
    #[must_use]
    pub const fn logging_parameters(mut self) -> Self {
        self.log_parameters = true;
        self
    }
}

/// Built-in policy for every method of a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDefaults {
    metric_name: String,
    thresholds: BTreeMap<Layer, u64>,
}

impl Default for LayerDefaults {
    fn default() -> Self {
        let thresholds = Layer::ALL
            .into_iter()
            .map(|layer| (layer, default_layer_threshold_ms(layer)))
            .collect();
        Self {
            metric_name: DEFAULT_LAYER_METRIC.to_owned(),
            thresholds,
        }
    }
}

/// Built-in threshold for a layer in milliseconds.
#[must_use]
pub const fn default_layer_threshold_ms(layer: Layer) -> u64 {
    match layer {
        Layer::Controller => 1_000,
        Layer::Service => 500,
        Layer::Repository => 200,
        Layer::RemoteClient => 3_000,
    }
}

impl LayerDefaults {
    /// Replace the metric name used by layer defaults.
    #[must_use]
    pub fn with_metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.metric_name = metric_name.into();
        self
    }

    /// Replace the threshold of one layer.
    #[must_use]
    pub fn with_threshold_ms(mut self, layer: Layer, threshold_ms: u64) -> Self {
        self.thresholds.insert(layer, threshold_ms);
        self
    }

    /// Metric name used by layer defaults.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Threshold for a layer.
    #[must_use]
    pub fn threshold_ms(&self, layer: Layer) -> u64 {
        self.thresholds
            .get(&layer)
            .copied()
            .unwrap_or_else(|| default_layer_threshold_ms(layer))
    }

    /// Resolve the layer default for `method`.
    #[must_use]
    pub fn resolve(&self, method: &MethodId, layer: Layer) -> ResolvedPolicy {
        ResolvedPolicy {
            metric_name: self.metric_name.clone(),
            description: method.method().to_owned(),
            layer,
            threshold: Duration::from_millis(self.threshold_ms(layer)),
            log_parameters: false,
            alert_on_error: false,
            source: PolicySource::Layer,
        }
    }
}

/// Where a resolved policy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PolicySource {
    /// Registered for the exact method.
    Method,
    /// Registered for every method of the owning type.
    Type,
    /// Built-in layer default.
    Layer,
}

impl PolicySource {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Method => "method",
            Self::Type => "type",
            Self::Layer => "layer",
        }
    }
}

/// Fully resolved settings for one wrapped method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Timer metric name.
    pub metric_name: String,
    /// Description, the method name when none was configured.
    pub description: String,
    /// Layer tag.
    pub layer: Layer,
    /// Latency threshold; only strictly greater durations exceed it.
    pub threshold: Duration,
    /// Verbose parameter logging.
    pub log_parameters: bool,
    /// Error-level observation on failure.
    pub alert_on_error: bool,
    /// Origin of the settings.
    pub source: PolicySource,
}

impl ResolvedPolicy {
    /// Resolve an explicit policy for `method`.
    #[must_use]
    pub fn explicit(
        policy: &MonitorPolicy,
        method: &MethodId,
        layer: Layer,
        source: PolicySource,
    ) -> Self {
        let metric_name = match policy.value.trim() {
            "" => DEFAULT_MONITORED_METRIC.to_owned(),
            name => name.to_owned(),
        };
        let description = match policy.description.trim() {
            "" => method.method().to_owned(),
            description => description.to_owned(),
        };
        Self {
            metric_name,
            description,
            layer,
            threshold: Duration::from_millis(policy.threshold_millis),
            log_parameters: policy.log_parameters,
            alert_on_error: policy.alert_on_error,
            source,
        }
    }

    /// Threshold in whole milliseconds, as used in tags.
    #[must_use]
    pub fn threshold_ms(&self) -> u64 {
        u64::try_from(self.threshold.as_millis()).unwrap_or(u64::MAX)
    }

    /// Returns true when `elapsed` exceeds the threshold.
    #[must_use]
    pub fn exceeds_threshold(&self, elapsed: Duration) -> bool {
        elapsed > self.threshold
    }
}

/// Outcome label of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InvocationStatus {
    /// Returned normally.
    Success,
    /// Returned an error.
    Error,
}

impl InvocationStatus {
    /// Tag value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}
