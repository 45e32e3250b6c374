//! # clinic-monitor-ports
//!
//! Port traits for the clinic-monitor hexagonal architecture.
//!
//! This crate defines the interfaces between the instrumentation engine and
//! the adapters that store, export, and log what it observes. It depends only
//! on `domain` and `shared`.

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod cache;
pub mod clock;
pub mod logger;
pub mod metrics;
pub mod telemetry;

pub use cache::*;
pub use clock::*;
pub use logger::*;
pub use metrics::*;
pub use telemetry::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without directly depending on `clinic-monitor-domain`.
pub use clinic_monitor_domain::{SeriesKind, SeriesSnapshot, SeriesValue, TimerSnapshot};
