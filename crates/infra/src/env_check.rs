//! Environment validation helpers for CLI surfaces.

use clinic_monitor_config::{MonitoringConfig, MonitoringEnv, apply_env_overrides};
use clinic_monitor_shared::ErrorEnvelope;
use std::collections::BTreeMap;

/// Infra-level error type (shared error envelope).
pub type InfraError = ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

/// Validate that the provided env overrides parse and merge into a valid config.
pub fn validate_env_parsing(env: &BTreeMap<String, String>) -> InfraResult<()> {
    let parsed = MonitoringEnv::from_map(env).map_err(ErrorEnvelope::from)?;
    apply_env_overrides(MonitoringConfig::default(), &parsed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_numbers() {
        let env = BTreeMap::from([(
            "CLINIC_MONITOR_TIMEOUT_MS".to_owned(),
            "soon".to_owned(),
        )]);
        assert!(validate_env_parsing(&env).is_err());
    }

    #[test]
    fn accepts_an_empty_environment() -> InfraResult<()> {
        validate_env_parsing(&BTreeMap::new())
    }
}
