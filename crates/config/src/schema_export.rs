//! JSON Schema export for the monitoring config.

use crate::MonitoringConfig;
use schemars::{Schema, schema_for};

/// JSON Schema for `MonitoringConfig`.
#[must_use]
pub fn monitoring_config_schema() -> Schema {
    schema_for!(MonitoringConfig)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_lists_top_level_sections() {
        let schema = monitoring_config_schema();
        let properties = schema
            .get("properties")
            .and_then(serde_json::Value::as_object);
        let keys: Vec<&str> = properties
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();

        for section in ["application", "registry", "logging", "interceptor", "cache", "resilience"] {
            assert!(keys.contains(&section), "missing section {section}");
        }
    }
}
