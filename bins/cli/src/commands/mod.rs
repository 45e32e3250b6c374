//! CLI command handlers.

pub mod config;
pub mod demo;
pub mod info;

pub use config::{ConfigFormat, config_check_with_env, config_schema, config_show_with_env};
pub use demo::{DemoArgs, run_demo_with_env};
pub use info::run_info;
