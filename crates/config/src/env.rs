//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict: a variable that is present but empty or malformed
//! fails the load instead of being ignored.

use crate::schema::{LogLevelConfig, MonitoringConfig, ValidatedMonitoringConfig};
use clinic_monitor_shared::{ErrorCode, ErrorEnvelope, redact_if_secret};
use std::collections::BTreeMap;

/// Env var: `application` tag.
pub const ENV_APPLICATION_NAME: &str = "CLINIC_MONITOR_APPLICATION_NAME";
/// Env var: `environment` tag.
pub const ENV_ENVIRONMENT: &str = "CLINIC_MONITOR_ENVIRONMENT";
/// Env var: minimum log level.
pub const ENV_LOG_LEVEL: &str = "CLINIC_MONITOR_LOG_LEVEL";
/// Env var: enable the JSON metric exporter.
pub const ENV_EXPORT_ENABLED: &str = "CLINIC_MONITOR_EXPORT_ENABLED";
/// Env var: registry series cap.
pub const ENV_MAX_SERIES: &str = "CLINIC_MONITOR_MAX_SERIES";
/// Env var: cache report period.
pub const ENV_CACHE_REPORT_INTERVAL_MS: &str = "CLINIC_MONITOR_CACHE_REPORT_INTERVAL_MS";
/// Env var: default per-attempt timeout.
pub const ENV_TIMEOUT_MS: &str = "CLINIC_MONITOR_TIMEOUT_MS";
/// Env var: default failure rate threshold.
pub const ENV_FAILURE_RATE_THRESHOLD: &str = "CLINIC_MONITOR_FAILURE_RATE_THRESHOLD";
/// Env var: default sliding window size.
pub const ENV_SLIDING_WINDOW_SIZE: &str = "CLINIC_MONITOR_SLIDING_WINDOW_SIZE";
/// Env var: default minimum calls.
pub const ENV_MINIMUM_CALLS: &str = "CLINIC_MONITOR_MINIMUM_CALLS";
/// Env var: default open-state wait.
pub const ENV_WAIT_DURATION_MS: &str = "CLINIC_MONITOR_WAIT_DURATION_MS";
/// Env var: default half-open trial calls.
pub const ENV_PERMITTED_HALF_OPEN_CALLS: &str = "CLINIC_MONITOR_PERMITTED_HALF_OPEN_CALLS";
/// Env var: default retry attempts.
pub const ENV_RETRY_ATTEMPTS: &str = "CLINIC_MONITOR_RETRY_ATTEMPTS";
/// Env var: default retry backoff.
pub const ENV_RETRY_BACKOFF_MS: &str = "CLINIC_MONITOR_RETRY_BACKOFF_MS";

const ALL_VARS: [&str; 14] = [
    ENV_APPLICATION_NAME,
    ENV_ENVIRONMENT,
    ENV_LOG_LEVEL,
    ENV_EXPORT_ENABLED,
    ENV_MAX_SERIES,
    ENV_CACHE_REPORT_INTERVAL_MS,
    ENV_TIMEOUT_MS,
    ENV_FAILURE_RATE_THRESHOLD,
    ENV_SLIDING_WINDOW_SIZE,
    ENV_MINIMUM_CALLS,
    ENV_WAIT_DURATION_MS,
    ENV_PERMITTED_HALF_OPEN_CALLS,
    ENV_RETRY_ATTEMPTS,
    ENV_RETRY_BACKOFF_MS,
];

/// Parsed environment overrides; `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringEnv {
    /// `application.name`.
    pub application_name: Option<String>,
    /// `application.environment`.
    pub environment: Option<String>,
    /// `logging.level`.
    pub log_level: Option<LogLevelConfig>,
    /// `registry.export.enabled`.
    pub export_enabled: Option<bool>,
    /// `registry.maxSeries`.
    pub max_series: Option<u32>,
    /// `cache.reportIntervalMs`.
    pub cache_report_interval_ms: Option<u64>,
    /// `resilience.defaults.timeoutMillis`.
    pub timeout_ms: Option<u64>,
    /// `resilience.defaults.failureRateThreshold`.
    pub failure_rate_threshold: Option<u32>,
    /// `resilience.defaults.slidingWindowSize`.
    pub sliding_window_size: Option<u32>,
    /// `resilience.defaults.minimumCalls`.
    pub minimum_calls: Option<u32>,
    /// `resilience.defaults.waitDurationInOpenStateMillis`.
    pub wait_duration_ms: Option<u64>,
    /// `resilience.defaults.permittedCallsInHalfOpen`.
    pub permitted_half_open_calls: Option<u32>,
    /// `resilience.defaults.retryAttempts`.
    pub retry_attempts: Option<u32>,
    /// `resilience.defaults.retryBackoffMillis`.
    pub retry_backoff_ms: Option<u64>,
}

impl MonitoringEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            application_name: parse_optional_trimmed(map, ENV_APPLICATION_NAME)?,
            environment: parse_optional_trimmed(map, ENV_ENVIRONMENT)?,
            log_level: parse_optional_log_level(map, ENV_LOG_LEVEL)?,
            export_enabled: parse_optional_bool(map, ENV_EXPORT_ENABLED)?,
            max_series: parse_optional_int(map, ENV_MAX_SERIES)?,
            cache_report_interval_ms: parse_optional_int(map, ENV_CACHE_REPORT_INTERVAL_MS)?,
            timeout_ms: parse_optional_int(map, ENV_TIMEOUT_MS)?,
            failure_rate_threshold: parse_optional_int(map, ENV_FAILURE_RATE_THRESHOLD)?,
            sliding_window_size: parse_optional_int(map, ENV_SLIDING_WINDOW_SIZE)?,
            minimum_calls: parse_optional_int(map, ENV_MINIMUM_CALLS)?,
            wait_duration_ms: parse_optional_int(map, ENV_WAIT_DURATION_MS)?,
            permitted_half_open_calls: parse_optional_int(map, ENV_PERMITTED_HALF_OPEN_CALLS)?,
            retry_attempts: parse_optional_int(map, ENV_RETRY_ATTEMPTS)?,
            retry_backoff_ms: parse_optional_int(map, ENV_RETRY_BACKOFF_MS)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map = ALL_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| ((*name).to_owned(), value)))
            .collect();
        Self::from_map(&map)
    }

    /// Returns true when no variable was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: MonitoringConfig,
    env: &MonitoringEnv,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    let mut config = base;

    set(&mut config.application.name, env.application_name.clone());
    set(&mut config.application.environment, env.environment.clone());
    set(&mut config.logging.level, env.log_level);
    set(&mut config.registry.export.enabled, env.export_enabled);
    set(&mut config.registry.max_series, env.max_series);
    set(&mut config.cache.report_interval_ms, env.cache_report_interval_ms);

    let defaults = &mut config.resilience.defaults;
    set(&mut defaults.timeout_millis, env.timeout_ms);
    set(&mut defaults.failure_rate_threshold, env.failure_rate_threshold);
    set(&mut defaults.sliding_window_size, env.sliding_window_size);
    set(&mut defaults.minimum_calls, env.minimum_calls);
    set(&mut defaults.wait_duration_in_open_state_millis, env.wait_duration_ms);
    set(&mut defaults.permitted_calls_in_half_open, env.permitted_half_open_calls);
    set(&mut defaults.retry_attempts, env.retry_attempts);
    set(&mut defaults.retry_backoff_millis, env.retry_backoff_ms);

    config.validate_and_normalize().map_err(Into::into)
}

fn set<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// Env parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    #[error("{var} must be non-empty when set")]
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// Boolean env var had an invalid value.
    #[error("{var} must be a boolean (true/false/1/0/yes/no/on/off)")]
    InvalidBool {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Integer env var had an invalid value.
    #[error("{var} must be a non-negative integer")]
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    #[error("{var} has an unsupported value")]
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "env_empty_value"),
            Self::InvalidBool { .. } => ErrorCode::new("config", "env_invalid_bool"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "env_invalid_int"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "env_invalid_enum"),
        }
    }
}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());
        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidBool { var, value }
            | EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_if_secret(var, &value)),
        }
    }
}

fn lookup<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some(trimmed))
}

fn parse_optional_trimmed(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<String>, EnvParseError> {
    Ok(lookup(map, var)?.map(str::to_owned))
}

fn parse_optional_int<T: std::str::FromStr>(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<T>, EnvParseError> {
    lookup(map, var)?
        .map(|value| {
            value.parse::<T>().map_err(|_| EnvParseError::InvalidInt {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_bool(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<bool>, EnvParseError> {
    let Some(value) = lookup(map, var)? else {
        return Ok(None);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(Some(true)),
        "false" | "0" | "no" | "off" => Ok(Some(false)),
        _ => Err(EnvParseError::InvalidBool {
            var,
            value: value.to_owned(),
        }),
    }
}

fn parse_optional_log_level(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<LogLevelConfig>, EnvParseError> {
    lookup(map, var)?
        .map(|value| {
            LogLevelConfig::parse(value).ok_or_else(|| EnvParseError::InvalidEnum {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}
