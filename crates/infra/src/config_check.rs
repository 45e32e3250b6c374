//! Config loading helpers for CLI surfaces.

use crate::InfraResult;
use clinic_monitor_config::{
    MonitoringEnv, ValidatedMonitoringConfig, load_monitoring_config_from_path,
    monitoring_config_schema, to_pretty_json, to_pretty_toml,
};
use clinic_monitor_shared::{ErrorClass, ErrorCode, ErrorEnvelope};
use std::collections::BTreeMap;
use std::path::Path;

/// Load and validate the effective config from an env map, a file, and overrides.
pub fn load_effective_config(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<ValidatedMonitoringConfig> {
    let env = MonitoringEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    load_monitoring_config_from_path(config_path, overrides_json, &env)
}

/// Load and validate the effective config, returning deterministic pretty JSON.
pub fn load_effective_config_json(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    to_pretty_json(&config)
}

/// Load and validate the effective config, returning pretty TOML.
pub fn load_effective_config_toml(
    env: &BTreeMap<String, String>,
    config_path: Option<&Path>,
    overrides_json: Option<&str>,
) -> InfraResult<String> {
    let config = load_effective_config(env, config_path, overrides_json)?;
    to_pretty_toml(&config)
}

/// JSON schema of the config file.
pub fn config_schema_json() -> InfraResult<String> {
    let mut output = serde_json::to_string_pretty(&monitoring_config_schema()).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config schema: {error}"),
            ErrorClass::NonRetriable,
        )
    })?;
    output.push('\n');
    Ok(output)
}
