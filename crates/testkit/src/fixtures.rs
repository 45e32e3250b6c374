//! Access to the files under `crates/testkit/fixtures`.

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::{fmt, fs};

/// Errors raised while loading a fixture.
#[derive(Debug)]
pub enum FixtureError {
    /// Fixture file does not exist.
    Missing {
        /// Path that could not be found.
        path: PathBuf,
    },
    /// Fixture file could not be read.
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Fixture file could not be parsed.
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl fmt::Display for FixtureError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { path } => write!(formatter, "missing fixture: {}", path.display()),
            Self::Read { path, source } => {
                write!(formatter, "failed to read fixture {}: {source}", path.display())
            },
            Self::Parse { path, source } => {
                write!(formatter, "failed to parse fixture {}: {source}", path.display())
            },
        }
    }
}

impl std::error::Error for FixtureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Missing { .. } => None,
        }
    }
}

/// Root of the fixture tree.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

/// Absolute path of a fixture, e.g. `config/monitoring.valid.json`.
pub fn fixture_path(relative_path: &str) -> PathBuf {
    fixture_root().join(relative_path)
}

/// Read a fixture as text.
pub fn fixture_text(relative_path: &str) -> Result<String, FixtureError> {
    let path = fixture_path(relative_path);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            Err(FixtureError::Missing { path })
        },
        Err(source) => Err(FixtureError::Read { path, source }),
    }
}

/// Read and deserialize a JSON fixture.
pub fn load_json_fixture<T: DeserializeOwned>(relative_path: &str) -> Result<T, FixtureError> {
    let contents = fixture_text(relative_path)?;
    serde_json::from_str(&contents).map_err(|source| FixtureError::Parse {
        path: fixture_path(relative_path),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn env_fixture_loads_as_a_string_map() -> Result<(), FixtureError> {
        let env: BTreeMap<String, String> = load_json_fixture("env/monitoring-env.valid.json")?;
        assert!(env.keys().all(|key| key.starts_with("CLINIC_MONITOR_")));
        Ok(())
    }

    #[test]
    fn missing_fixture_is_reported_with_its_path() {
        let error = fixture_text("config/does-not-exist.json").err();
        assert!(matches!(error, Some(FixtureError::Missing { .. })));
    }
}
