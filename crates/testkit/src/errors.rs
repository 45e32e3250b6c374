//! Error fixtures shared by interceptor and resilience tests.

use clinic_monitor_shared::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorTypeName};
use std::fmt;

/// Return a list of common error codes used in tests.
pub fn common_error_codes() -> Vec<ErrorCode> {
    vec![
        ErrorCode::cancelled(),
        ErrorCode::invalid_input(),
        ErrorCode::not_found(),
        ErrorCode::timeout(),
        ErrorCode::io(),
        ErrorCode::internal(),
        ErrorCode::dependency_unavailable(),
        ErrorCode::circuit_open(),
    ]
}

/// A cancellation error fixture.
pub fn cancelled_error() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("cancelled")
}

/// An invalid input error fixture.
pub fn invalid_input_error() -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid input")
}

/// A retriable timeout error fixture.
pub fn timeout_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(ErrorCode::timeout(), "timeout", ErrorClass::Retriable)
}

/// A retriable infrastructure failure, as returned by an unreachable dependency.
pub fn dependency_unavailable_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::dependency_unavailable(),
        "connection refused",
        ErrorClass::Retriable,
    )
}

/// A non-retriable infrastructure failure (for example a 5xx with no retry hint).
pub fn dependency_rejected_error() -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::dependency_unavailable(),
        "dependency answered 500",
        ErrorClass::NonRetriable,
    )
}

/// Business error raised by scheduling code when two appointments collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentConflict {
    /// Professional that is already booked.
    pub professional_id: u64,
}

impl fmt::Display for AppointmentConflict {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "professional {} is already booked for that slot",
            self.professional_id
        )
    }
}

impl std::error::Error for AppointmentConflict {}

impl ErrorTypeName for AppointmentConflict {}
