//! # clinic-monitor-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Config loading helpers used by CLI surfaces.
pub mod config_check;
/// Scripted scenario used by the CLI `demo` command.
pub mod demo;
/// Environment validation helpers used by CLI surfaces.
pub mod env_check;
/// Runtime composition from validated config.
pub mod runtime;

pub use config_check::{
    config_schema_json, load_effective_config, load_effective_config_json,
    load_effective_config_toml,
};
pub use demo::{DemoOptions, DemoOutcome, run_demo};
pub use env_check::{InfraError, InfraResult, validate_env_parsing};
pub use runtime::{MonitoringRuntime, PROCESS_UPTIME_METRIC, RuntimeOptions, RuntimeSnapshot};

// Re-export redaction utilities for CLI boundary sanitization
pub use clinic_monitor_shared::{is_secret_key, redact_if_secret};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
