//! Scripted scenario exercising every monitoring component once.
//!
//! A booking flow looks up a patient, reads a professional through a cache
//! region, schedules an appointment (some slots are taken), and asks a payment
//! gateway for the invoice status. The first `failures` gateway calls fail so
//! the breaker has something to react to.

use crate::InfraResult;
use crate::runtime::{MonitoringRuntime, RuntimeSnapshot};
use clinic_monitor_app::CallOptions;
use clinic_monitor_domain::{FallbackReason, Layer};
use clinic_monitor_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext};
use serde::Serialize;

/// Size of the scripted scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoOptions {
    /// Booking attempts.
    pub calls: u32,
    /// Leading gateway calls that fail.
    pub failures: u32,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            calls: 20,
            failures: 3,
        }
    }
}

/// What the scenario did, plus the resulting runtime state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoOutcome {
    /// Booking attempts.
    pub calls: u32,
    /// Appointments booked.
    pub booked: u32,
    /// Bookings rejected because the slot was taken.
    pub slot_conflicts: u32,
    /// Gateway answers that came from the gateway.
    pub live_payments: u32,
    /// Gateway answers produced by the fallback.
    pub fallback_payments: u32,
    /// Metrics, cache statistics, and breaker states after the run.
    pub snapshot: RuntimeSnapshot,
}

const PAYMENT_GATEWAY: &str = "payment-gateway";
const PENDING: &str = "PENDING";

fn slot_taken(appointment: u32) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("scheduling", "slot_taken"),
        format!("slot for appointment {appointment} is already booked"),
    )
}

fn pending_status(_invoice: &u32, _reason: &FallbackReason) -> String {
    PENDING.to_owned()
}

/// Run the scenario against `runtime`.
pub async fn run_demo(runtime: &MonitoringRuntime, options: DemoOptions) -> InfraResult<DemoOutcome> {
    let find_patient = runtime.wrap("PatientRepository", "findById", Layer::Repository)?;
    let schedule = runtime.wrap("AppointmentService", "scheduleAppointment", Layer::Service)?;
    let professionals = runtime.cache_region::<String>("professionals")?;
    let payments = runtime.client(PAYMENT_GATEWAY)?;
    let ctx = RequestContext::new_request();

    let (mut booked, mut slot_conflicts) = (0, 0);
    let (mut live_payments, mut fallback_payments) = (0, 0);

    for appointment in 0..options.calls {
        let patient = find_patient.call(|| Ok::<u32, ErrorEnvelope>(appointment % 5))?;
        let professional_key = format!("professional:{}", appointment % 3);
        let professional = professionals
            .get_or_insert_with(&professional_key, || format!("Professional {}", appointment % 3));

        let booking = schedule.call_with_args(&(patient, professional.as_str()), || {
            if appointment % 7 == 6 {
                Err(slot_taken(appointment))
            } else {
                Ok(appointment)
            }
        });
        match booking {
            Ok(_) => booked += 1,
            Err(error) if error.code == ErrorCode::new("scheduling", "slot_taken") => {
                slot_conflicts += 1;
                continue;
            },
            Err(error) => return Err(error),
        }

        let failures = options.failures;
        let status = payments
            .call(
                &ctx,
                CallOptions::once(),
                appointment,
                |invoice| async move {
                    if invoice < failures {
                        Err(ErrorEnvelope::unexpected(
                            ErrorCode::dependency_unavailable(),
                            "payment gateway answered 503",
                            ErrorClass::NonRetriable,
                        ))
                    } else {
                        Ok("PAID".to_owned())
                    }
                },
                &pending_status,
            )
            .await?;
        if status.is_fallback() {
            fallback_payments += 1;
        } else {
            live_payments += 1;
        }
    }

    runtime.cache_monitor().report_now();
    let outcome = DemoOutcome {
        calls: options.calls,
        booked,
        slot_conflicts,
        live_payments,
        fallback_payments,
        snapshot: runtime.snapshot(),
    };
    tracing::info!(
        calls = outcome.calls,
        booked = outcome.booked,
        fallbacks = outcome.fallback_payments,
        "demo scenario finished"
    );
    Ok(outcome)
}
