//! # clinic-monitor-testkit
//!
//! Test doubles, a manual clock, and fixture access.
//! This crate depends on `adapters`, `ports`, `domain`, and `shared`.

pub mod errors;
pub mod fixtures;
pub mod in_memory;

pub use in_memory::{
    CapturingLogger, ManualClock, MemoryLogSink, NoopLogger, NoopTelemetry, NoopTimer,
    PanickingTelemetry,
};

/// Returns the testkit crate version.
#[must_use]
pub const fn testkit_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_domain::domain_crate_version;
    use clinic_monitor_ports::ports_crate_version;

    #[test]
    fn testkit_crate_compiles() {
        let version = testkit_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn testkit_can_use_ports_and_domain() {
        assert!(!ports_crate_version().is_empty());
        assert!(!domain_crate_version().is_empty());
    }

    #[test]
    fn error_fixtures_are_available() {
        let codes = errors::common_error_codes();
        assert!(!codes.is_empty());
    }

    #[test]
    fn in_memory_doubles_are_available() {
        let _ = NoopLogger;
        let _ = ManualClock::new();
    }
}
