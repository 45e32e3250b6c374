//! CLI binary entrypoint.

mod commands;
mod error;
mod format;

use clap::{Parser, Subcommand};
use clinic_monitor_infra::{InfraError, is_secret_key, validate_env_parsing};
use clinic_monitor_shared::{ErrorClass, ErrorKind};
use commands::{
    ConfigFormat, DemoArgs, config_check_with_env, config_schema, config_show_with_env,
    run_demo_with_env, run_info,
};
use error::{CliError, ExitCode};
use format::{OutputArgs, OutputMode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prefix of every environment variable the CLI reads.
const ENV_PREFIX: &str = "CLINIC_MONITOR_";
/// Variable holding a `tracing` filter directive.
const LOG_FILTER_ENV: &str = "CLINIC_MONITOR_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "clinic-monitor",
    version,
    about = "Instrumentation and resilience layer for the clinic services",
    long_about = None
)]
struct Cli {
    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show build and version details.
    Info,
    /// Validate the `CLINIC_MONITOR_*` environment overrides.
    EnvCheck,
    /// Config-related commands.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run a scripted booking scenario and print the resulting metrics.
    Demo {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Optional JSON overrides (partial config).
        #[arg(long)]
        overrides_json: Option<String>,
        /// Booking attempts.
        #[arg(long, default_value_t = 20)]
        calls: u32,
        /// Leading payment gateway calls that fail.
        #[arg(long, default_value_t = 3)]
        failures: u32,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Validate config loading, merging, and normalization.
    Check {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Optional JSON overrides (partial config).
        #[arg(long)]
        overrides_json: Option<String>,
    },
    /// Show the effective config after applying overrides.
    Show {
        /// Optional config file path (JSON/TOML).
        #[arg(long)]
        path: Option<PathBuf>,
        /// Optional JSON overrides (partial config).
        #[arg(long)]
        overrides_json: Option<String>,
        /// Rendering of the text output.
        #[arg(long, value_enum, default_value = "json")]
        format: ConfigFormat,
    },
    /// Print the JSON schema of the config file.
    Schema,
}

pub(crate) struct CliOutput {
    stdout: String,
    stderr: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let mode = OutputMode::from_args(&cli.output);
    init_tracing(mode);

    match run(&cli.command, mode) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

/// Install the stderr subscriber; JSON lines when machine output is requested.
fn init_tracing(mode: OutputMode) {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(mode.default_log_directive()));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if mode.is_json() || mode.is_ndjson() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
    };
    if installed.is_err() {
        let _ = writeln!(io::stderr(), "warn: tracing subscriber already installed");
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

fn run(command: &Commands, mode: OutputMode) -> Result<CliOutput, CliError> {
    let env = collect_scoped_env(ENV_PREFIX);
    match command {
        Commands::Info => run_info(mode),
        Commands::EnvCheck => env_check_with_env(mode, &env),
        Commands::Config { command } => match command {
            ConfigCommands::Check {
                path,
                overrides_json,
            } => config_check_with_env(mode, &env, path.as_deref(), overrides_json.as_deref()),
            ConfigCommands::Show {
                path,
                overrides_json,
                format,
            } => config_show_with_env(
                mode,
                &env,
                path.as_deref(),
                overrides_json.as_deref(),
                *format,
            ),
            ConfigCommands::Schema => config_schema(mode),
        },
        Commands::Demo {
            path,
            overrides_json,
            calls,
            failures,
        } => run_demo_with_env(
            mode,
            &env,
            DemoArgs {
                path: path.as_deref(),
                overrides_json: overrides_json.as_deref(),
                calls: *calls,
                failures: *failures,
            },
        ),
    }
}

fn env_check_with_env(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
) -> Result<CliOutput, CliError> {
    if let Err(error) = validate_env_parsing(env) {
        return Ok(format_error_output(mode, &error, ExitCode::InvalidInput));
    }

    let mut stderr = String::new();
    log_info(&mut stderr, "env check completed", mode.no_progress);

    let keys: Vec<&str> = env.keys().map(String::as_str).collect();
    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "env", Some(serde_json::json!({ "keys": keys })))
    } else if mode.is_json() {
        let payload = serde_json::json!({ "status": "ok", "keys": keys });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        format!("status: ok\nenv: ok\nkeys: {}\n", keys.len())
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

/// Error body printed at the CLI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    code: String,
    message: String,
    kind: ErrorKind,
    class: ErrorClass,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    meta: BTreeMap<String, String>,
}

impl ErrorBody {
    fn from_infra(error: &InfraError) -> Self {
        let meta = error
            .metadata
            .iter()
            .map(|(key, value)| {
                let value = if is_secret_key(key) {
                    "<redacted>".to_string()
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect();
        Self {
            code: error.code.to_string(),
            message: error.message.clone(),
            kind: error.kind,
            class: error.class,
            meta,
        }
    }
}

pub(crate) fn format_error_output(
    mode: OutputMode,
    error: &InfraError,
    exit_code: ExitCode,
) -> CliOutput {
    let body = ErrorBody::from_infra(error);
    tracing::debug!(code = %body.code, "command failed");

    let mut stderr = String::new();
    log_info(&mut stderr, "command failed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_error(&body)
    } else if mode.is_json() {
        let payload = serde_json::json!({
            "status": "error",
            "error": body,
        });

        // This is a CLI boundary, so JSON serialization errors are internal.
        let mut output = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| {
            "{\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_string()
        });
        output.push('\n');
        output
    } else {
        format_error_text(&body)
    };

    CliOutput {
        stdout,
        stderr,
        exit_code,
    }
}

fn format_error_text(error: &ErrorBody) -> String {
    let mut out = format!(
        "status: error\ncode: {}\nmessage: {}\nkind: {}\nclass: {}\n",
        error.code, error.message, error.kind, error.class
    );
    if !error.meta.is_empty() {
        out.push_str("meta:\n");
        for (key, value) in &error.meta {
            out.push_str("  ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
    }
    out
}

pub(crate) fn log_info(stderr: &mut String, message: &str, no_progress: bool) {
    if no_progress {
        return;
    }
    stderr.push_str("info: ");
    stderr.push_str(message);
    stderr.push('\n');
}

pub(crate) fn format_ndjson_summary(
    status: &str,
    kind: &str,
    extra: Option<serde_json::Value>,
) -> String {
    let mut payload = serde_json::Map::new();
    payload.insert("type".to_string(), "summary".into());
    payload.insert("status".to_string(), status.into());
    payload.insert("kind".to_string(), kind.into());
    if let Some(serde_json::Value::Object(map)) = extra {
        payload.extend(map);
    }
    let mut out = serde_json::to_string(&serde_json::Value::Object(payload)).unwrap_or_else(|_| {
        "{\"type\":\"summary\",\"status\":\"error\",\"kind\":\"internal\"}".to_string()
    });
    out.push('\n');
    out
}

fn format_ndjson_error(error: &ErrorBody) -> String {
    let payload = serde_json::json!({
        "type": "error",
        "status": "error",
        "error": error,
    });
    let mut out = serde_json::to_string(&payload).unwrap_or_else(|_| {
        "{\"type\":\"error\",\"status\":\"error\",\"error\":{\"code\":\"core:internal\",\"message\":\"internal error\",\"kind\":\"invariant\"}}".to_string()
    });
    out.push('\n');
    out
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;

    if !output.stderr.is_empty() {
        let mut stderr = io::stderr();
        stderr.write_all(output.stderr.as_bytes())?;
        stderr.flush()?;
    }

    Ok(())
}

fn collect_scoped_env(prefix: &str) -> BTreeMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with(prefix))
        .collect()
}
