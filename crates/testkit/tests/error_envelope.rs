//! Integration tests for error fixtures crossing crate boundaries.

use clinic_monitor_shared::{ErrorClass, ErrorCode, ErrorKind, ErrorTypeName};
use clinic_monitor_testkit::errors::{
    AppointmentConflict, cancelled_error, dependency_rejected_error, dependency_unavailable_error,
    invalid_input_error, timeout_error,
};

#[test]
fn error_envelope_crosses_crates() {
    let timeout = timeout_error();
    assert_eq!(timeout.code, ErrorCode::timeout());
    assert!(timeout.is_timeout());

    let boxed: Box<dyn std::error::Error> = Box::new(timeout);
    assert!(boxed.to_string().contains("timeout"));

    assert!(cancelled_error().is_cancelled());
}

#[test]
fn infrastructure_fixtures_are_unexpected() {
    let unavailable = dependency_unavailable_error();
    assert_eq!(unavailable.kind, ErrorKind::Unexpected);
    assert_eq!(unavailable.class, ErrorClass::Retriable);

    let rejected = dependency_rejected_error();
    assert_eq!(rejected.kind, ErrorKind::Unexpected);
    assert!(!rejected.class.is_retriable());
}

#[test]
fn business_fixtures_report_their_type_names() {
    assert_eq!(invalid_input_error().kind, ErrorKind::Expected);
    assert_eq!(
        invalid_input_error().error_type_name(),
        "core:invalid_input"
    );

    let conflict = AppointmentConflict { professional_id: 7 };
    assert_eq!(conflict.error_type_name(), "AppointmentConflict");
    assert!(conflict.to_string().contains("professional 7"));
}
