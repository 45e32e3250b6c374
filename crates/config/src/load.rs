//! Config loading helpers (file + overrides + env).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::{MonitoringConfig, MonitoringEnv, ValidatedMonitoringConfig, apply_env_overrides};
use clinic_monitor_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use serde_json::Value;
use std::path::Path;

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// `.json` (also used when there is no extension).
    Json,
    /// `.toml`.
    Toml,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, ErrorEnvelope> {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            None | Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            Some(other) => Err(ErrorEnvelope::expected(
                ErrorCode::new("config", "unsupported_format"),
                "unsupported config format; use .json or .toml",
            )
            .with_metadata("extension", other.to_owned())),
        }
    }
}

/// Load the monitoring config using a deterministic precedence order.
///
/// Precedence (highest wins):
/// - env overrides (`MonitoringEnv`)
/// - overrides JSON (partial config, deep-merged)
/// - config text (file content)
/// - defaults (`MonitoringConfig::default()`)
pub fn load_monitoring_config_from_sources(
    config_text: Option<(&str, ConfigFormat)>,
    overrides_json: Option<&str>,
    env: &MonitoringEnv,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    let mut config = match config_text {
        None => MonitoringConfig::default(),
        Some((input, format)) => parse_config_unvalidated(input, format)?,
    };

    if let Some(input) = overrides_json {
        config = apply_overrides_json(config, input)?;
    }

    // env is applied last and also validates the resulting config.
    apply_env_overrides(config, env)
}

/// Load the monitoring config from an optional file path.
pub fn load_monitoring_config_from_path(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
    env: &MonitoringEnv,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    match config_path {
        None => load_monitoring_config_from_sources(None, overrides_json, env),
        Some(path) => {
            let format = ConfigFormat::from_path(path)?;
            let text = read_config_file(path)?;
            load_monitoring_config_from_sources(Some((&text, format)), overrides_json, env)
        },
    }
}

/// Load the monitoring config from std env and an optional file path.
pub fn load_monitoring_config_std_env(
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<ValidatedMonitoringConfig, ErrorEnvelope> {
    let env = MonitoringEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    load_monitoring_config_from_path(config_path, overrides_json, &env)
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &MonitoringConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &MonitoringConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(
    input: &str,
    format: ConfigFormat,
) -> Result<MonitoringConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn apply_overrides_json(
    config: MonitoringConfig,
    input: &str,
) -> Result<MonitoringConfig, ErrorEnvelope> {
    let invalid = |message: String| {
        ErrorEnvelope::expected(ErrorCode::new("config", "invalid_json"), message)
            .with_metadata("source", "overrides")
    };

    let overrides: Value = serde_json::from_str(input)
        .map_err(|error| invalid(format!("invalid overrides JSON: {error}")))?;
    if !overrides.is_object() {
        return Err(invalid("overrides JSON must be an object".to_owned()));
    }

    let mut merged = serde_json::to_value(&config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    merge_json(&mut merged, overrides);
    serde_json::from_value(merged)
        .map_err(|error| invalid(format!("invalid overrides JSON: {error}")))
}

/// Objects merge key by key; every other value replaces the base.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    },
                }
            }
        },
        (slot, value) => *slot = value,
    }
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn override_precedence_is_deterministic() -> Result<(), Box<dyn std::error::Error>> {
        let file = r#"{"application":{"name":"clinic-salon","environment":"staging"},"resilience":{"defaults":{"timeoutMillis":2000}}}"#;
        let overrides = r#"{"resilience":{"defaults":{"timeoutMillis":1500}}}"#;
        let env = MonitoringEnv::from_map(&BTreeMap::from([(
            "CLINIC_MONITOR_ENVIRONMENT".to_owned(),
            "prod".to_owned(),
        )]))?;

        let config = load_monitoring_config_from_sources(
            Some((file, ConfigFormat::Json)),
            Some(overrides),
            &env,
        )?;

        assert_eq!(config.application.environment, "prod");
        assert_eq!(config.resilience.defaults.timeout_millis, 1_500);
        assert_eq!(config.resilience.defaults.sliding_window_size, 10);
        Ok(())
    }

    #[test]
    fn overrides_merge_into_maps() -> Result<(), Box<dyn std::error::Error>> {
        let overrides = r#"{"resilience":{"dependencies":{"loyalty-service":{"slidingWindowSize":5}}},"cache":{"regions":{"reports":{"maxEntries":50,"ttlMs":1000}}}}"#;
        let config =
            load_monitoring_config_from_sources(None, Some(overrides), &MonitoringEnv::default())?;

        assert_eq!(config.dependency_config("loyalty-service").sliding_window_size, 5);
        assert_eq!(config.cache.region("reports").max_entries, 50);
        assert_eq!(config.cache.region("professionals").max_entries, 1_000);
        Ok(())
    }

    #[test]
    fn unknown_override_keys_are_rejected() {
        let result = load_monitoring_config_from_sources(
            None,
            Some(r#"{"registry":{"maxSerie":5}}"#),
            &MonitoringEnv::default(),
        );
        let error = result.err();
        assert_eq!(
            error.as_ref().map(|error| error.code.to_string()),
            Some("config:invalid_json".to_owned())
        );
        assert_eq!(
            error
                .as_ref()
                .and_then(|error| error.metadata.get("source"))
                .map(String::as_str),
            Some("overrides")
        );
    }

    #[test]
    fn serialization_round_trips_through_toml() -> Result<(), Box<dyn std::error::Error>> {
        let config = MonitoringConfig::default();
        let toml_text = to_pretty_toml(&config)?;
        let parsed = load_monitoring_config_from_sources(
            Some((&toml_text, ConfigFormat::Toml)),
            None,
            &MonitoringEnv::default(),
        )?;
        assert_eq!(parsed.as_ref(), &config);
        assert!(to_pretty_json(&config)?.ends_with("}\n"));
        Ok(())
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let error = ConfigFormat::from_path(Path::new("monitoring.yaml")).err();
        assert_eq!(
            error.map(|error| error.code.to_string()),
            Some("config:unsupported_format".to_owned())
        );
    }
}
