//! # clinic-monitor-config
//!
//! Configuration schema, validation, and loading for the monitoring layer.
//! This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (file + overrides + env).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;
/// JSON Schema export.
pub mod schema_export;

pub use schema::{
    ApplicationConfig, CURRENT_CONFIG_VERSION, CacheConfig, CacheRegionConfig, ConfigLimits,
    ConfigSchemaError, DependencyConfig, DependencyOverrides, ExportConfig, InterceptorConfig,
    LayerPoliciesConfig, LayerPolicyConfig, LogLevelConfig, LoggingConfig, MonitoringConfig,
    PolicyConfig, RegistryConfig, ResilienceConfig, ValidatedMonitoringConfig,
    parse_monitoring_config_json, parse_monitoring_config_toml,
};

pub use env::{EnvParseError, MonitoringEnv, apply_env_overrides};
pub use load::{
    ConfigFormat, load_monitoring_config_from_path, load_monitoring_config_from_sources,
    load_monitoring_config_std_env, to_pretty_json, to_pretty_toml,
};
pub use schema_export::monitoring_config_schema;

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
