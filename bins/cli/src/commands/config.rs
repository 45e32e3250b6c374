//! Config command handlers.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use clinic_monitor_infra::{
    config_schema_json, load_effective_config_json, load_effective_config_toml,
};
use std::collections::BTreeMap;
use std::path::Path;

/// Text rendering used by `config show`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConfigFormat {
    /// Pretty JSON.
    #[default]
    Json,
    /// Pretty TOML.
    Toml,
}

fn config_path_value(path: Option<&Path>) -> Option<String> {
    path.map(|value| value.to_string_lossy().to_string())
}

/// Load, merge, and validate the config without printing it.
pub fn config_check_with_env(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    path: Option<&Path>,
    overrides_json: Option<&str>,
) -> Result<CliOutput, CliError> {
    let config_json = match load_effective_config_json(env, path, overrides_json) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config check completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "config", None)
    } else if mode.is_json() {
        let config_value: serde_json::Value = serde_json::from_str(config_json.trim())?;
        let payload = serde_json::json!({
            "status": "ok",
            "configPath": config_path_value(path),
            "effectiveConfig": config_value,
        });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        path.map_or_else(
            || "status: ok\nconfig: ok\n".to_string(),
            |path| format!("status: ok\nconfig: ok\npath: {}\n", path.to_string_lossy()),
        )
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the effective config after env and JSON overrides.
pub fn config_show_with_env(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    path: Option<&Path>,
    overrides_json: Option<&str>,
    format: ConfigFormat,
) -> Result<CliOutput, CliError> {
    let rendered = match format {
        ConfigFormat::Json => load_effective_config_json(env, path, overrides_json),
        ConfigFormat::Toml => load_effective_config_toml(env, path, overrides_json),
    };
    let rendered = match rendered {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "config show completed", mode.no_progress);

    let stdout = if mode.is_json() || mode.is_ndjson() {
        // Machine output always carries the JSON view.
        let config_json = match format {
            ConfigFormat::Json => rendered,
            ConfigFormat::Toml => match load_effective_config_json(env, path, overrides_json) {
                Ok(config) => config,
                Err(error) => {
                    return Ok(format_error_output(mode, &error, ExitCode::InvalidInput));
                },
            },
        };
        let config_value: serde_json::Value = serde_json::from_str(config_json.trim())?;
        if mode.is_ndjson() {
            format_ndjson_summary(
                "ok",
                "config",
                Some(serde_json::json!({ "effectiveConfig": config_value })),
            )
        } else {
            let payload = serde_json::json!({
                "status": "ok",
                "configPath": config_path_value(path),
                "effectiveConfig": config_value,
            });
            let mut output = serde_json::to_string_pretty(&payload)?;
            output.push('\n');
            output
        }
    } else {
        let mut out = String::from("status: ok\nconfig:\n");
        out.push_str(&rendered);
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Print the JSON schema of the config file.
pub fn config_schema(mode: OutputMode) -> Result<CliOutput, CliError> {
    let schema = match config_schema_json() {
        Ok(schema) => schema,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::Internal)),
    };

    let stdout = if mode.is_ndjson() {
        let value: serde_json::Value = serde_json::from_str(schema.trim())?;
        format_ndjson_summary("ok", "schema", Some(serde_json::json!({ "schema": value })))
    } else {
        schema
    };

    Ok(CliOutput {
        stdout,
        stderr: String::new(),
        exit_code: ExitCode::Ok,
    })
}
