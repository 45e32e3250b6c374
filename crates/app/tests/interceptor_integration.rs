//! Integration tests for method interception under concurrency.

use clinic_monitor_adapters::{InMemoryMetricsRegistry, SystemClock};
use clinic_monitor_app::{InterceptorDeps, MethodInterceptor, PolicyTable};
use clinic_monitor_domain::{Layer, MonitorPolicy, PolicyTarget};
use clinic_monitor_ports::SeriesQuery;
use clinic_monitor_shared::{ErrorEnvelope, Result};
use clinic_monitor_testkit::CapturingLogger;
use clinic_monitor_testkit::errors::AppointmentConflict;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

fn interceptor(registry: &InMemoryMetricsRegistry, policies: PolicyTable) -> MethodInterceptor {
    MethodInterceptor::new(
        InterceptorDeps {
            telemetry: Arc::new(registry.clone()),
            logger: Some(CapturingLogger::new()),
            clock: Arc::new(SystemClock::new()),
        },
        policies,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_are_all_counted() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = InMemoryMetricsRegistry::new(1_000);
    let method = interceptor(&registry, PolicyTable::default()).wrap_named(
        "PatientRepository",
        "findById",
        Layer::Repository,
    )?;

    let tasks = (0..8_u64).map(|task| {
        let method = method.clone();
        tokio::spawn(async move {
            let mut total = 0;
            for call in 0..25_u64 {
                total += method.call(|| Ok::<u64, ErrorEnvelope>(task * 100 + call))?;
            }
            Ok::<u64, ErrorEnvelope>(total)
        })
    });
    for joined in join_all(tasks).await {
        joined??;
    }

    let count = SeriesQuery::named("method.execution")
        .tag("layer", "repository")
        .tag("status", "success")
        .timer_count(&registry);
    assert_eq!(count, 200);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_concurrent_outcomes_split_by_status() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let registry = InMemoryMetricsRegistry::new(1_000);
    let method = interceptor(&registry, PolicyTable::default()).wrap_named(
        "AppointmentService",
        "book",
        Layer::Service,
    )?;

    let tasks = (0..8_u64).map(|task| {
        let method = method.clone();
        tokio::spawn(async move {
            let mut failures = 0_u64;
            for call in 0..25_u64 {
                let slot = task * 25 + call;
                let outcome = method.call(|| {
                    if slot % 3 == 0 {
                        Err(AppointmentConflict { professional_id: slot })
                    } else {
                        Ok(slot)
                    }
                });
                if outcome.is_err() {
                    failures += 1;
                }
            }
            failures
        })
    });
    let mut failures = 0;
    for joined in join_all(tasks).await {
        failures += joined?;
    }

    let by_status = |status: &str| {
        SeriesQuery::named("method.execution")
            .tag("layer", "service")
            .tag("status", status)
            .timer_count(&registry)
    };
    assert_eq!(failures, 67);
    assert_eq!(by_status("error"), failures);
    assert_eq!(by_status("success") + by_status("error"), 200);
    assert_eq!(
        SeriesQuery::named("method.errors")
            .tag("exception", "AppointmentConflict")
            .counter_total(&registry),
        failures
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn overlapping_async_calls_each_record_once() -> Result<()> {
    let registry = InMemoryMetricsRegistry::new(1_000);
    let policies = PolicyTable::default().with_policy(
        PolicyTarget::parse("ProfessionalClient.fetchSchedule")?,
        MonitorPolicy::default()
            .named("professional.schedule.fetch")
            .with_threshold_millis(150),
    );
    let method = interceptor(&registry, policies).wrap_named(
        "ProfessionalClient",
        "fetchSchedule",
        Layer::RemoteClient,
    )?;

    let calls = (0..10_u64).map(|professional_id| {
        let method = method.clone();
        async move {
            method
                .call_async(async move {
                    tokio::time::sleep(Duration::from_millis(100 + professional_id * 10)).await;
                    Ok::<u64, ErrorEnvelope>(professional_id)
                })
                .await
        }
    });
    let results: Vec<u64> = join_all(calls).await.into_iter().collect::<Result<_>>()?;
    assert_eq!(results, (0..10).collect::<Vec<_>>());

    assert_eq!(
        SeriesQuery::named("professional.schedule.fetch").timer_count(&registry),
        10
    );
    // 160ms..=190ms are strictly above the 150ms threshold.
    assert_eq!(
        SeriesQuery::named("method.threshold.exceeded").counter_total(&registry),
        4
    );
    Ok(())
}

#[test]
fn business_errors_reach_the_caller_unchanged() -> Result<()> {
    let registry = InMemoryMetricsRegistry::new(1_000);
    let policies = PolicyTable::default().with_policy(
        PolicyTarget::parse("AppointmentService.*")?,
        MonitorPolicy::default().named("appointment.ops").alerting(),
    );
    let method = interceptor(&registry, policies).wrap_named(
        "AppointmentService",
        "reschedule",
        Layer::Service,
    )?;

    let conflict = AppointmentConflict { professional_id: 9 };
    let outcome: std::result::Result<(), AppointmentConflict> = method.call(|| Err(conflict.clone()));

    assert_eq!(outcome, Err(conflict));
    assert_eq!(
        SeriesQuery::named("method.errors")
            .tag("exception", "AppointmentConflict")
            .tag("alertEnabled", "true")
            .counter_total(&registry),
        1
    );
    assert_eq!(
        SeriesQuery::named("appointment.ops")
            .tag("status", "error")
            .timer_count(&registry),
        1
    );
    Ok(())
}
