//! Error envelope types and helpers.
//!
//! Every boundary in the workspace (ports, config, resilience) reports failures
//! as an [`ErrorEnvelope`]. Business errors raised by wrapped methods keep their
//! own types; the interceptor only needs their [`ErrorTypeName`].

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::{fmt, io};

/// Metadata attached to errors for diagnostics.
pub type ErrorMetadata = BTreeMap<String, String>;

/// High-level classification of error origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Expected failures (validation, not-found, cancellation).
    Expected,
    /// Invariant violations in our own logic.
    Invariant,
    /// Unexpected failures (I/O, remote dependencies, timeouts).
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Expected => "expected",
            Self::Invariant => "invariant",
            Self::Unexpected => "unexpected",
        })
    }
}

/// Retry classification for failure handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// The operation may be attempted again.
    Retriable,
    /// Attempting again will not help.
    NonRetriable,
}

impl ErrorClass {
    /// Returns true when the error is considered retriable.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Retriable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Retriable => "retriable",
            Self::NonRetriable => "non-retriable",
        })
    }
}

/// Stable error code with namespace and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: Cow<'static, str>,
    code: Cow<'static, str>,
}

impl ErrorCode {
    /// Create a new error code with a namespace and code.
    pub fn new(namespace: impl Into<Cow<'static, str>>, code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// Cancellation of a request context.
    pub const fn cancelled() -> Self {
        Self::core("cancelled")
    }

    /// Invalid caller input.
    pub const fn invalid_input() -> Self {
        Self::core("invalid_input")
    }

    /// Requested entity does not exist.
    pub const fn not_found() -> Self {
        Self::core("not_found")
    }

    /// Operation exceeded its deadline.
    pub const fn timeout() -> Self {
        Self::core("timeout")
    }

    /// I/O failure.
    pub const fn io() -> Self {
        Self::core("io")
    }

    /// Internal failure.
    pub const fn internal() -> Self {
        Self::core("internal")
    }

    /// Remote dependency refused or failed the call.
    pub const fn dependency_unavailable() -> Self {
        Self {
            namespace: Cow::Borrowed("resilience"),
            code: Cow::Borrowed("dependency_unavailable"),
        }
    }

    /// Call short-circuited by an open breaker.
    pub const fn circuit_open() -> Self {
        Self {
            namespace: Cow::Borrowed("resilience"),
            code: Cow::Borrowed("circuit_open"),
        }
    }

    const fn core(code: &'static str) -> Self {
        Self {
            namespace: Cow::Borrowed("core"),
            code: Cow::Borrowed(code),
        }
    }

    /// Returns the namespace portion.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the code identifier.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error envelope shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error kind describing the origin category.
    pub kind: ErrorKind,
    /// Retry classification.
    pub class: ErrorClass,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Additional diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    fn build(kind: ErrorKind, class: ErrorClass, code: ErrorCode, message: String) -> Self {
        Self {
            kind,
            class,
            code,
            message,
            metadata: BTreeMap::new(),
        }
    }

    /// Create an expected, non-retriable error.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Expected,
            ErrorClass::NonRetriable,
            code,
            message.into(),
        )
    }

    /// Create an invariant error (always non-retriable).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::build(
            ErrorKind::Invariant,
            ErrorClass::NonRetriable,
            code,
            message.into(),
        )
    }

    /// Create an unexpected error with the provided retry classification.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, class: ErrorClass) -> Self {
        Self::build(ErrorKind::Unexpected, class, code, message.into())
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected(ErrorCode::cancelled(), message)
    }

    /// Returns true if the error represents a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.code == ErrorCode::cancelled()
    }

    /// Returns true if the error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::timeout()
    }

    /// Attach a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind, self.class, self.code, self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

impl From<io::Error> for ErrorEnvelope {
    fn from(error: io::Error) -> Self {
        let kind = error.kind();
        let code = match kind {
            io::ErrorKind::NotFound => ErrorCode::not_found(),
            io::ErrorKind::TimedOut => ErrorCode::timeout(),
            io::ErrorKind::Interrupted => ErrorCode::cancelled(),
            _ => ErrorCode::io(),
        };
        let class = if is_transient_io(kind) {
            ErrorClass::Retriable
        } else {
            ErrorClass::NonRetriable
        };
        Self::unexpected(code, error.to_string(), class)
    }
}

const fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
    )
}

/// Label used as the `exception` tag when a wrapped method fails.
///
/// The default implementation reports the short type name, so most business
/// error types only need an empty `impl ErrorTypeName for MyError {}`.
pub trait ErrorTypeName {
    /// Short, low-cardinality name for the error type.
    fn error_type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }
}

impl ErrorTypeName for ErrorEnvelope {
    fn error_type_name(&self) -> Cow<'static, str> {
        Cow::Owned(self.code.to_string())
    }
}

impl ErrorTypeName for io::Error {
    fn error_type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed("IoError")
    }
}

impl ErrorTypeName for String {
    fn error_type_name(&self) -> Cow<'static, str> {
        Cow::Borrowed("Error")
    }
}

/// Last path segment of a type name, without generic parameters.
#[must_use]
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let head = full.split('<').next().unwrap_or(full);
    head.rsplit("::").next().unwrap_or(head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct AppointmentConflict;

    impl ErrorTypeName for AppointmentConflict {}

    #[test]
    fn error_envelope_constructors() {
        let expected = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(expected.kind, ErrorKind::Expected);
        assert_eq!(expected.class, ErrorClass::NonRetriable);

        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "boom");
        assert_eq!(invariant.kind, ErrorKind::Invariant);

        let unexpected =
            ErrorEnvelope::unexpected(ErrorCode::timeout(), "slow", ErrorClass::Retriable);
        assert_eq!(unexpected.kind, ErrorKind::Unexpected);
        assert!(unexpected.class.is_retriable());
        assert!(unexpected.is_timeout());
    }

    #[test]
    fn io_errors_are_classified() {
        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(envelope.kind, ErrorKind::Unexpected);
        assert!(envelope.class.is_retriable());
        assert_eq!(envelope.code, ErrorCode::io());

        let envelope = ErrorEnvelope::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(envelope.code, ErrorCode::not_found());
        assert!(!envelope.class.is_retriable());
    }

    #[test]
    fn error_type_names_are_short() {
        assert_eq!(AppointmentConflict.error_type_name(), "AppointmentConflict");
        assert_eq!(short_type_name::<Vec<u8>>(), "Vec");

        let envelope = ErrorEnvelope::expected(ErrorCode::not_found(), "missing");
        assert_eq!(envelope.error_type_name(), "core:not_found");
    }

    #[test]
    fn cancellation_is_detected() {
        let error = ErrorEnvelope::cancelled("stopped").with_metadata("operation", "demo");
        assert!(error.is_cancelled());
        assert_eq!(error.metadata.get("operation").map(String::as_str), Some("demo"));
    }
}
