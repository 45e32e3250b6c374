//! Monitoring configuration schema, defaults, and validation.
//!
//! - Deserialization uses `serde` (JSON or TOML).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Per-dependency resilience settings are stored as partial overrides and
//!   resolved against `resilience.defaults` on read.

use clinic_monitor_domain::{
    DEFAULT_LAYER_METRIC, DEFAULT_POLICY_THRESHOLD_MS, Layer, LayerDefaults, MonitorPolicy,
    PolicyTarget, default_layer_threshold_ms,
};
use clinic_monitor_shared::{BoundedU32, BoundedU64, ErrorCode, ErrorEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

const MAX_SERIES_MIN: u32 = 1;
const MAX_SERIES_MAX: u32 = 1_000_000;
const REPORT_INTERVAL_MIN_MS: u64 = 1_000;
const REPORT_INTERVAL_MAX_MS: u64 = 86_400_000;
const THRESHOLD_MAX_MS: u64 = 3_600_000;
const POLICIES_MAX: usize = 1_024;
const REGIONS_MAX: usize = 256;
const REGION_MAX_ENTRIES_MIN: u64 = 1;
const REGION_MAX_ENTRIES_MAX: u64 = 10_000_000;
const REGION_TTL_MIN_MS: u64 = 1;
const REGION_TTL_MAX_MS: u64 = 604_800_000;

const TIMEOUT_MIN_MS: u64 = 1;
const TIMEOUT_MAX_MS: u64 = 600_000;
const FAILURE_RATE_MIN: u64 = 1;
const FAILURE_RATE_MAX: u64 = 100;
const WINDOW_MIN: u64 = 1;
const WINDOW_MAX: u64 = 1_000;
const WAIT_MIN_MS: u64 = 1;
const WAIT_MAX_MS: u64 = 3_600_000;
const RETRY_ATTEMPTS_MIN: u64 = 1;
const RETRY_ATTEMPTS_MAX: u64 = 10;
const RETRY_BACKOFF_MAX_MS: u64 = 60_000;

/// Top-level monitoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct MonitoringConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Common tags applied to every metric.
    pub application: ApplicationConfig,
    /// Metrics registry settings.
    pub registry: RegistryConfig,
    /// Structured logging settings.
    pub logging: LoggingConfig,
    /// Method interceptor settings.
    pub interceptor: InterceptorConfig,
    /// Cache instrumentation settings.
    pub cache: CacheConfig,
    /// Remote-call resilience settings.
    pub resilience: ResilienceConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            application: ApplicationConfig::default(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
            interceptor: InterceptorConfig::default(),
            cache: CacheConfig::default(),
            resilience: ResilienceConfig::default(),
        }
    }
}

impl MonitoringConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(
        mut self,
    ) -> Result<ValidatedMonitoringConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }

        self.application.normalize_and_validate()?;
        self.interceptor.layers.validate()?;
        let policies = self.interceptor.normalize_and_validate()?;
        self.cache.validate()?;
        self.resilience.validate()?;

        let limits = ConfigLimits::new(&self)?;
        Ok(ValidatedMonitoringConfig {
            raw: self,
            limits,
            policies,
        })
    }
}

/// Validated config wrapper carrying bounded values and parsed policies.
#[derive(Debug, Clone)]
pub struct ValidatedMonitoringConfig {
    raw: MonitoringConfig,
    limits: ConfigLimits,
    policies: Vec<(PolicyTarget, MonitorPolicy)>,
}

impl ValidatedMonitoringConfig {
    /// Access validated numeric bounds.
    #[must_use]
    pub const fn limits(&self) -> &ConfigLimits {
        &self.limits
    }

    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &MonitoringConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> MonitoringConfig {
        self.raw
    }

    /// Declarative policies with parsed targets, in file order.
    #[must_use]
    pub fn policies(&self) -> &[(PolicyTarget, MonitorPolicy)] {
        &self.policies
    }

    /// Layer defaults built from `interceptor.layers`.
    #[must_use]
    pub fn layer_defaults(&self) -> LayerDefaults {
        self.raw.interceptor.layers.to_layer_defaults()
    }

    /// Resilience settings for `dependency`: defaults plus its overrides.
    #[must_use]
    pub fn dependency_config(&self, dependency: &str) -> DependencyConfig {
        self.raw.resilience.resolve(dependency)
    }
}

impl AsRef<MonitoringConfig> for ValidatedMonitoringConfig {
    fn as_ref(&self) -> &MonitoringConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedMonitoringConfig {
    type Target = MonitoringConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Validated numeric limits derived from the config.
#[derive(Debug, Clone, Copy)]
pub struct ConfigLimits {
    /// Registry series cap.
    pub max_series: BoundedU32<MAX_SERIES_MIN, MAX_SERIES_MAX>,
    /// Cache report period (ms).
    pub cache_report_interval_ms: BoundedU64<REPORT_INTERVAL_MIN_MS, REPORT_INTERVAL_MAX_MS>,
}

impl ConfigLimits {
    fn new(config: &MonitoringConfig) -> Result<Self, ConfigSchemaError> {
        let max_series = config.registry.max_series;
        let interval = config.cache.report_interval_ms;
        Ok(Self {
            max_series: BoundedU32::try_new(max_series).map_err(|_| {
                ConfigSchemaError::out_of_range(
                    "registry",
                    "maxSeries",
                    u64::from(max_series),
                    u64::from(MAX_SERIES_MIN),
                    u64::from(MAX_SERIES_MAX),
                )
            })?,
            cache_report_interval_ms: BoundedU64::try_new(interval).map_err(|_| {
                ConfigSchemaError::out_of_range(
                    "cache",
                    "reportIntervalMs",
                    interval,
                    REPORT_INTERVAL_MIN_MS,
                    REPORT_INTERVAL_MAX_MS,
                )
            })?,
        })
    }

    /// Cache report period.
    #[must_use]
    pub const fn cache_report_interval(&self) -> Duration {
        Duration::from_millis(self.cache_report_interval_ms.get())
    }
}

/// Parse a monitoring config from a JSON string, applying validation.
pub fn parse_monitoring_config_json(
    input: &str,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    let config: MonitoringConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

/// Parse a monitoring config from a TOML string, applying validation.
pub fn parse_monitoring_config_toml(
    input: &str,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    let config: MonitoringConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;

    config.validate_and_normalize().map_err(Into::into)
}

// =============================================================================
// APPLICATION / REGISTRY / LOGGING
// =============================================================================

/// Identity of the monitored application, applied as common tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ApplicationConfig {
    /// `application` tag.
    pub name: String,
    /// `environment` tag.
    pub environment: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "clinic-salon".to_owned(),
            environment: "dev".to_owned(),
        }
    }
}

impl ApplicationConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        self.name = self.name.trim().to_owned();
        self.environment = self.environment.trim().to_owned();
        if self.name.is_empty() {
            return Err(ConfigSchemaError::EmptyValue {
                section: "application".to_owned(),
                field: "name",
            });
        }
        if self.environment.is_empty() {
            return Err(ConfigSchemaError::EmptyValue {
                section: "application".to_owned(),
                field: "environment",
            });
        }
        Ok(())
    }
}

/// Metrics registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct RegistryConfig {
    /// Maximum number of distinct series; writes beyond it are dropped.
    pub max_series: u32,
    /// JSON-lines export of every observation.
    pub export: ExportConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_series: 10_000,
            export: ExportConfig::default(),
        }
    }
}

/// Metric export settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ExportConfig {
    /// Forward every write to the JSON exporter.
    pub enabled: bool,
}

/// Minimum severity written by the logger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevelConfig {
    /// Everything.
    Debug,
    /// Info and above.
    #[default]
    Info,
    /// Warnings and errors.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevelConfig {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a label; `None` when unknown.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Structured logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Minimum level.
    pub level: LogLevelConfig,
}

// =============================================================================
// INTERCEPTOR
// =============================================================================

/// Method interceptor settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct InterceptorConfig {
    /// Built-in per-layer policy.
    pub layers: LayerPoliciesConfig,
    /// Explicit method or type policies.
    pub policies: Vec<PolicyConfig>,
}

impl InterceptorConfig {
    fn normalize_and_validate(
        &mut self,
    ) -> Result<Vec<(PolicyTarget, MonitorPolicy)>, ConfigSchemaError> {
        if self.policies.len() > POLICIES_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "interceptor",
                field: "policies",
                len: self.policies.len(),
                max: POLICIES_MAX,
            });
        }

        let mut seen = BTreeSet::new();
        let mut parsed = Vec::with_capacity(self.policies.len());
        for (index, policy) in self.policies.iter_mut().enumerate() {
            policy.target = policy.target.trim().to_owned();
            let target = PolicyTarget::parse(&policy.target).map_err(|_| {
                ConfigSchemaError::InvalidPolicyTarget {
                    index,
                    target: policy.target.clone(),
                }
            })?;
            if !seen.insert(target.to_string()) {
                return Err(ConfigSchemaError::DuplicatePolicyTarget {
                    target: policy.target.clone(),
                });
            }
            if policy.threshold_millis > THRESHOLD_MAX_MS {
                return Err(ConfigSchemaError::out_of_range(
                    format!("interceptor.policies[{index}]"),
                    "thresholdMillis",
                    policy.threshold_millis,
                    0,
                    THRESHOLD_MAX_MS,
                ));
            }
            parsed.push((target, policy.to_monitor_policy()));
        }
        Ok(parsed)
    }
}

/// Per-layer thresholds and the shared metric name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LayerPoliciesConfig {
    /// Timer metric name used by layer defaults.
    pub metric_name: String,
    /// Controller layer.
    pub controller: LayerPolicyConfig,
    /// Service layer.
    pub service: LayerPolicyConfig,
    /// Repository layer.
    pub repository: LayerPolicyConfig,
    /// Remote-client layer.
    pub remote_client: LayerPolicyConfig,
}

impl Default for LayerPoliciesConfig {
    fn default() -> Self {
        Self {
            metric_name: DEFAULT_LAYER_METRIC.to_owned(),
            controller: LayerPolicyConfig::for_layer(Layer::Controller),
            service: LayerPolicyConfig::for_layer(Layer::Service),
            repository: LayerPolicyConfig::for_layer(Layer::Repository),
            remote_client: LayerPolicyConfig::for_layer(Layer::RemoteClient),
        }
    }
}

impl LayerPoliciesConfig {
    const fn entry(&self, layer: Layer) -> &LayerPolicyConfig {
        match layer {
            Layer::Controller => &self.controller,
            Layer::Service => &self.service,
            Layer::Repository => &self.repository,
            Layer::RemoteClient => &self.remote_client,
        }
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if self.metric_name.trim().is_empty() {
            return Err(ConfigSchemaError::EmptyValue {
                section: "interceptor.layers".to_owned(),
                field: "metricName",
            });
        }
        for layer in Layer::ALL {
            let threshold = self.entry(layer).threshold_millis;
            if threshold > THRESHOLD_MAX_MS {
                return Err(ConfigSchemaError::out_of_range(
                    format!("interceptor.layers.{}", layer_key(layer)),
                    "thresholdMillis",
                    threshold,
                    0,
                    THRESHOLD_MAX_MS,
                ));
            }
        }
        Ok(())
    }

    /// Convert into domain layer defaults.
    #[must_use]
    pub fn to_layer_defaults(&self) -> LayerDefaults {
        Layer::ALL.into_iter().fold(
            LayerDefaults::default().with_metric_name(self.metric_name.trim()),
            |defaults, layer| defaults.with_threshold_ms(layer, self.entry(layer).threshold_millis),
        )
    }
}

const fn layer_key(layer: Layer) -> &'static str {
    match layer {
        Layer::Controller => "controller",
        Layer::Service => "service",
        Layer::Repository => "repository",
        Layer::RemoteClient => "remoteClient",
    }
}

/// Layer default settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct LayerPolicyConfig {
    /// Latency threshold in milliseconds.
    pub threshold_millis: u64,
}

impl LayerPolicyConfig {
    const fn for_layer(layer: Layer) -> Self {
        Self {
            threshold_millis: default_layer_threshold_ms(layer),
        }
    }
}

impl Default for LayerPolicyConfig {
    fn default() -> Self {
        Self::for_layer(Layer::Service)
    }
}

/// Explicit policy for `Class.method` or `Class.*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct PolicyConfig {
    /// `Class.method` or `Class.*`.
    pub target: String,
    /// Metric name; empty selects `method.monitored.execution`.
    pub value: String,
    /// Description; empty falls back to the method name.
    pub description: String,
    /// Log arguments and results verbatim. Never enable for personal data.
    pub log_parameters: bool,
    /// Latency threshold in milliseconds.
    pub threshold_millis: u64,
    /// Error-level observation on failure.
    pub alert_on_error: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            value: String::new(),
            description: String::new(),
            log_parameters: false,
            threshold_millis: DEFAULT_POLICY_THRESHOLD_MS,
            alert_on_error: false,
        }
    }
}

impl PolicyConfig {
    /// Domain policy carried by this entry.
    #[must_use]
    pub fn to_monitor_policy(&self) -> MonitorPolicy {
        MonitorPolicy {
            value: self.value.trim().to_owned(),
            description: self.description.trim().to_owned(),
            log_parameters: self.log_parameters,
            threshold_millis: self.threshold_millis,
            alert_on_error: self.alert_on_error,
        }
    }
}

// =============================================================================
// CACHE
// =============================================================================

/// Cache instrumentation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheConfig {
    /// Period of the statistics report.
    pub report_interval_ms: u64,
    /// Settings for regions without an explicit entry.
    pub default_region: CacheRegionConfig,
    /// Named regions.
    pub regions: BTreeMap<String, CacheRegionConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let standard = CacheRegionConfig::default();
        let regions = [
            ("professionals", CacheRegionConfig::new(1_000, 60 * 60_000)),
            ("services", standard.clone()),
            ("clients", standard.clone()),
            ("appointments", standard.clone()),
            ("loyaltyPoints", standard),
            ("paymentStatus", CacheRegionConfig::new(2_000, 5 * 60_000)),
        ]
        .into_iter()
        .map(|(name, region)| (name.to_owned(), region))
        .collect();
        Self {
            report_interval_ms: 60_000,
            default_region: CacheRegionConfig::default(),
            regions,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if self.regions.len() > REGIONS_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "cache",
                field: "regions",
                len: self.regions.len(),
                max: REGIONS_MAX,
            });
        }
        self.default_region.validate("cache.defaultRegion".to_owned())?;
        for (name, region) in &self.regions {
            if name.trim().is_empty() {
                return Err(ConfigSchemaError::EmptyValue {
                    section: "cache.regions".to_owned(),
                    field: "name",
                });
            }
            region.validate(format!("cache.regions.{name}"))?;
        }
        Ok(())
    }

    /// Settings for `region`, falling back to the default region.
    #[must_use]
    pub fn region(&self, region: &str) -> &CacheRegionConfig {
        self.regions.get(region).unwrap_or(&self.default_region)
    }
}

/// Capacity and expiry of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CacheRegionConfig {
    /// Maximum entries before least-recently-used eviction.
    pub max_entries: u64,
    /// Expire-after-write in milliseconds.
    pub ttl_ms: u64,
}

impl Default for CacheRegionConfig {
    fn default() -> Self {
        Self::new(500, 30 * 60_000)
    }
}

impl CacheRegionConfig {
    /// Region with explicit capacity and ttl.
    #[must_use]
    pub const fn new(max_entries: u64, ttl_ms: u64) -> Self {
        Self { max_entries, ttl_ms }
    }

    /// Expiry as a duration.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    fn validate(&self, section: String) -> Result<(), ConfigSchemaError> {
        check_range(
            &section,
            "maxEntries",
            self.max_entries,
            REGION_MAX_ENTRIES_MIN,
            REGION_MAX_ENTRIES_MAX,
        )?;
        check_range(&section, "ttlMs", self.ttl_ms, REGION_TTL_MIN_MS, REGION_TTL_MAX_MS)
    }
}

// =============================================================================
// RESILIENCE
// =============================================================================

/// Remote-call resilience settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ResilienceConfig {
    /// Settings for every dependency.
    pub defaults: DependencyConfig,
    /// Per-dependency overrides.
    pub dependencies: BTreeMap<String, DependencyOverrides>,
}

impl ResilienceConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        self.defaults.validate("resilience.defaults")?;
        for name in self.dependencies.keys() {
            if name.trim().is_empty() {
                return Err(ConfigSchemaError::EmptyValue {
                    section: "resilience.dependencies".to_owned(),
                    field: "name",
                });
            }
            self.resolve(name)
                .validate(&format!("resilience.dependencies.{name}"))?;
        }
        Ok(())
    }

    /// Defaults merged with the overrides of `dependency`.
    #[must_use]
    pub fn resolve(&self, dependency: &str) -> DependencyConfig {
        self.dependencies
            .get(dependency)
            .map_or_else(|| self.defaults.clone(), |overrides| overrides.apply_to(&self.defaults))
    }
}

/// Circuit breaker, timeout, and retry settings of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DependencyConfig {
    /// Per-attempt deadline.
    pub timeout_millis: u64,
    /// Failure percentage (1..=100) that opens the breaker.
    pub failure_rate_threshold: u32,
    /// Outcomes kept in the sliding window.
    pub sliding_window_size: u32,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: u32,
    /// Time spent open before trial calls are allowed.
    pub wait_duration_in_open_state_millis: u64,
    /// Trial calls admitted while half-open; as many successes close it.
    pub permitted_calls_in_half_open: u32,
    /// Attempts per idempotent call, including the first.
    pub retry_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_backoff_millis: u64,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            timeout_millis: 3_000,
            failure_rate_threshold: 50,
            sliding_window_size: 10,
            minimum_calls: 5,
            wait_duration_in_open_state_millis: 10_000,
            permitted_calls_in_half_open: 5,
            retry_attempts: 3,
            retry_backoff_millis: 1_000,
        }
    }
}

impl DependencyConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigSchemaError> {
        check_range(section, "timeoutMillis", self.timeout_millis, TIMEOUT_MIN_MS, TIMEOUT_MAX_MS)?;
        check_range(
            section,
            "failureRateThreshold",
            u64::from(self.failure_rate_threshold),
            FAILURE_RATE_MIN,
            FAILURE_RATE_MAX,
        )?;
        check_range(
            section,
            "slidingWindowSize",
            u64::from(self.sliding_window_size),
            WINDOW_MIN,
            WINDOW_MAX,
        )?;
        check_range(
            section,
            "minimumCalls",
            u64::from(self.minimum_calls),
            WINDOW_MIN,
            WINDOW_MAX,
        )?;
        if self.minimum_calls > self.sliding_window_size {
            return Err(ConfigSchemaError::MinimumCallsExceedWindow {
                section: section.to_owned(),
                minimum_calls: self.minimum_calls,
                sliding_window_size: self.sliding_window_size,
            });
        }
        check_range(
            section,
            "waitDurationInOpenStateMillis",
            self.wait_duration_in_open_state_millis,
            WAIT_MIN_MS,
            WAIT_MAX_MS,
        )?;
        check_range(
            section,
            "permittedCallsInHalfOpen",
            u64::from(self.permitted_calls_in_half_open),
            WINDOW_MIN,
            WINDOW_MAX,
        )?;
        check_range(
            section,
            "retryAttempts",
            u64::from(self.retry_attempts),
            RETRY_ATTEMPTS_MIN,
            RETRY_ATTEMPTS_MAX,
        )?;
        check_range(
            section,
            "retryBackoffMillis",
            self.retry_backoff_millis,
            0,
            RETRY_BACKOFF_MAX_MS,
        )
    }

    /// Per-attempt deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis)
    }

    /// Time spent open.
    #[must_use]
    pub const fn wait_duration_in_open_state(&self) -> Duration {
        Duration::from_millis(self.wait_duration_in_open_state_millis)
    }
}

/// Partial [`DependencyConfig`]; absent fields inherit the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct DependencyOverrides {
    /// See [`DependencyConfig::timeout_millis`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_millis: Option<u64>,
    /// See [`DependencyConfig::failure_rate_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_rate_threshold: Option<u32>,
    /// See [`DependencyConfig::sliding_window_size`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sliding_window_size: Option<u32>,
    /// See [`DependencyConfig::minimum_calls`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_calls: Option<u32>,
    /// See [`DependencyConfig::wait_duration_in_open_state_millis`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_duration_in_open_state_millis: Option<u64>,
    /// See [`DependencyConfig::permitted_calls_in_half_open`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permitted_calls_in_half_open: Option<u32>,
    /// See [`DependencyConfig::retry_attempts`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    /// See [`DependencyConfig::retry_backoff_millis`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_millis: Option<u64>,
}

impl DependencyOverrides {
    /// Overlay these overrides on `base`.
    #[must_use]
    pub fn apply_to(&self, base: &DependencyConfig) -> DependencyConfig {
        DependencyConfig {
            timeout_millis: self.timeout_millis.unwrap_or(base.timeout_millis),
            failure_rate_threshold: self
                .failure_rate_threshold
                .unwrap_or(base.failure_rate_threshold),
            sliding_window_size: self.sliding_window_size.unwrap_or(base.sliding_window_size),
            minimum_calls: self.minimum_calls.unwrap_or(base.minimum_calls),
            wait_duration_in_open_state_millis: self
                .wait_duration_in_open_state_millis
                .unwrap_or(base.wait_duration_in_open_state_millis),
            permitted_calls_in_half_open: self
                .permitted_calls_in_half_open
                .unwrap_or(base.permitted_calls_in_half_open),
            retry_attempts: self.retry_attempts.unwrap_or(base.retry_attempts),
            retry_backoff_millis: self.retry_backoff_millis.unwrap_or(base.retry_backoff_millis),
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Typed validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    #[error("unsupported config version: {found} (supported: {supported})")]
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A numeric value is out of bounds.
    #[error("{section}.{field} must be within [{min}, {max}] (got {value})")]
    LimitOutOfRange {
        /// Schema section (e.g. `resilience.defaults`).
        section: String,
        /// Field name in the config file (e.g. `timeoutMillis`).
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A required string is empty after trimming.
    #[error("{section}.{field} must be non-empty")]
    EmptyValue {
        /// Schema section.
        section: String,
        /// Field name.
        field: &'static str,
    },
    /// A list or map field exceeds the maximum allowed size.
    #[error("{section}.{field} must have at most {max} entries (got {len})")]
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name.
        field: &'static str,
        /// Number of entries.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// A policy target is not `Class.method` or `Class.*`.
    #[error("interceptor.policies[{index}].target `{target}` must be `Class.method` or `Class.*`")]
    InvalidPolicyTarget {
        /// Position in the policy list.
        index: usize,
        /// Raw target.
        target: String,
    },
    /// Two policies share a target.
    #[error("duplicate policy target `{target}`")]
    DuplicatePolicyTarget {
        /// Duplicated target.
        target: String,
    },
    /// `minimumCalls` is larger than the window that must hold them.
    #[error(
        "{section}.minimumCalls ({minimum_calls}) must not exceed slidingWindowSize ({sliding_window_size})"
    )]
    MinimumCallsExceedWindow {
        /// Schema section.
        section: String,
        /// Configured minimum.
        minimum_calls: u32,
        /// Configured window size.
        sliding_window_size: u32,
    },
}

impl ConfigSchemaError {
    fn out_of_range(
        section: impl Into<String>,
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    ) -> Self {
        Self::LimitOutOfRange {
            section: section.into(),
            field,
            value,
            min,
            max,
        }
    }

    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_value"),
            Self::ListTooLarge { .. } => ErrorCode::new("config", "list_too_large"),
            Self::InvalidPolicyTarget { .. } => ErrorCode::new("config", "invalid_policy_target"),
            Self::DuplicatePolicyTarget { .. } => {
                ErrorCode::new("config", "duplicate_policy_target")
            },
            Self::MinimumCallsExceedWindow { .. } => {
                ErrorCode::new("config", "invalid_circuit_window")
            },
        }
    }
}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::EmptyValue { section, field } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field),
            ConfigSchemaError::ListTooLarge {
                section,
                field,
                len,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidPolicyTarget { index, target } => envelope
                .with_metadata("index", index.to_string())
                .with_metadata("target", target),
            ConfigSchemaError::DuplicatePolicyTarget { target } => {
                envelope.with_metadata("target", target)
            },
            ConfigSchemaError::MinimumCallsExceedWindow {
                section,
                minimum_calls,
                sliding_window_size,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("minimumCalls", minimum_calls.to_string())
                .with_metadata("slidingWindowSize", sliding_window_size.to_string()),
        }
    }
}

fn check_range(
    section: &str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::out_of_range(section, field, value, min, max));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() -> Result<(), ConfigSchemaError> {
        let config = MonitoringConfig::default().validate_and_normalize()?;
        assert_eq!(config.limits().max_series.get(), 10_000);
        assert_eq!(config.limits().cache_report_interval(), Duration::from_secs(60));
        assert_eq!(config.cache.region("paymentStatus").ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.region("unknown").max_entries, 500);
        assert_eq!(config.layer_defaults().threshold_ms(Layer::RemoteClient), 3_000);
        Ok(())
    }

    #[test]
    fn dependency_overrides_inherit_defaults() -> Result<(), ConfigSchemaError> {
        let mut config = MonitoringConfig::default();
        config.resilience.dependencies.insert(
            "loyalty-service".to_owned(),
            DependencyOverrides {
                sliding_window_size: Some(5),
                ..DependencyOverrides::default()
            },
        );
        let validated = config.validate_and_normalize()?;

        let loyalty = validated.dependency_config("loyalty-service");
        assert_eq!(loyalty.sliding_window_size, 5);
        assert_eq!(loyalty.minimum_calls, 5);
        assert_eq!(loyalty.timeout(), Duration::from_secs(3));
        assert_eq!(validated.dependency_config("client-service").sliding_window_size, 10);
        Ok(())
    }

    #[test]
    fn minimum_calls_must_fit_window() {
        let mut config = MonitoringConfig::default();
        config.resilience.dependencies.insert(
            "finance-service".to_owned(),
            DependencyOverrides {
                sliding_window_size: Some(3),
                ..DependencyOverrides::default()
            },
        );
        let error = config.validate_and_normalize().err();
        assert!(matches!(
            error,
            Some(ConfigSchemaError::MinimumCallsExceedWindow { ref section, .. })
                if section == "resilience.dependencies.finance-service"
        ));
    }

    #[test]
    fn policy_targets_are_parsed_and_deduplicated() {
        let mut config = MonitoringConfig::default();
        config.interceptor.policies = vec![
            PolicyConfig {
                target: " FinanceService.* ".to_owned(),
                ..PolicyConfig::default()
            },
            PolicyConfig {
                target: "FinanceService.*".to_owned(),
                ..PolicyConfig::default()
            },
        ];
        let error = config.clone().validate_and_normalize().err();
        assert!(matches!(
            error,
            Some(ConfigSchemaError::DuplicatePolicyTarget { .. })
        ));

        config.interceptor.policies.truncate(1);
        let validated = config.validate_and_normalize();
        assert_eq!(
            validated.as_ref().map(|config| config.policies().len()).ok(),
            Some(1)
        );
    }

    #[test]
    fn errors_map_to_envelopes_with_metadata() {
        let mut config = MonitoringConfig::default();
        config.resilience.defaults.failure_rate_threshold = 0;
        let envelope = config.validate_and_normalize().err().map(ErrorEnvelope::from);

        assert_eq!(
            envelope.as_ref().map(|envelope| envelope.code.to_string()),
            Some("config:invalid_limit".to_owned())
        );
        assert_eq!(
            envelope
                .as_ref()
                .and_then(|envelope| envelope.metadata.get("field"))
                .map(String::as_str),
            Some("failureRateThreshold")
        );
    }
}
