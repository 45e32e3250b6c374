//! Result alias and small combinators for the shared error envelope.

use crate::errors::ErrorEnvelope;

/// Shared result type used across the workspace.
pub type Result<T, E = ErrorEnvelope> = std::result::Result<T, E>;

/// Extension helpers for `Result` values.
pub trait ResultExt<T> {
    /// Map the success value, preserving the error.
    fn map_ok<U, F>(self, op: F) -> Result<U>
    where
        F: FnOnce(T) -> U;

    /// Attach a metadata entry to the error, if any.
    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn map_ok<U, F>(self, op: F) -> Result<U>
    where
        F: FnOnce(T) -> U,
    {
        self.map(op)
    }

    fn with_error_metadata(self, key: &str, value: impl Into<String>) -> Result<T> {
        self.map_err(|error| error.with_metadata(key, value))
    }
}
