//! Timing, error, and threshold recording around business methods.

use super::guard::{self, SyncScope};
use super::policy_table::PolicyTable;
use clinic_monitor_domain::{InvocationStatus, Layer, MethodId, ResolvedPolicy};
use clinic_monitor_ports::{
    ClockPort, LogEvent, LogFields, LogLevel, LoggerPort, TelemetryPort, TelemetryTags,
};
use clinic_monitor_shared::{ErrorEnvelope, ErrorTypeName};
use serde_json::{Value, json};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Counter incremented once per failed invocation.
pub const METHOD_ERRORS_METRIC: &str = "method.errors";
/// Counter incremented when a successful invocation is slower than its threshold.
pub const THRESHOLD_EXCEEDED_METRIC: &str = "method.threshold.exceeded";

/// Ports the interceptor records into.
#[derive(Clone)]
pub struct InterceptorDeps {
    /// Metrics registry or exporter.
    pub telemetry: Arc<dyn TelemetryPort>,
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Monotonic clock used for durations.
    pub clock: Arc<dyn ClockPort>,
}

/// Builds [`MonitoredMethod`]s with policies resolved from a [`PolicyTable`].
#[derive(Clone)]
pub struct MethodInterceptor {
    deps: InterceptorDeps,
    policies: Arc<PolicyTable>,
}

impl MethodInterceptor {
    /// Interceptor over the given ports and policies.
    #[must_use]
    pub fn new(deps: InterceptorDeps, policies: PolicyTable) -> Self {
        Self {
            deps,
            policies: Arc::new(policies),
        }
    }

    /// Policies used at wrap time.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// Wrap `method`, resolving its policy once.
    #[must_use]
    pub fn wrap(&self, method: MethodId, layer: Layer) -> MonitoredMethod {
        let policy = self.policies.resolve(&method, layer);
        MonitoredMethod::new(method, policy, self.deps.clone())
    }

    /// Wrap `class.method`.
    pub fn wrap_named(
        &self,
        class: &str,
        method: &str,
        layer: Layer,
    ) -> Result<MonitoredMethod, ErrorEnvelope> {
        let method = MethodId::new(class, method)?;
        Ok(self.wrap(method, layer))
    }
}

/// A business method wrapped with instrumentation.
///
/// Cloning is cheap; clones share the resolved policy.
#[derive(Clone)]
pub struct MonitoredMethod {
    inner: Arc<MethodState>,
}

struct MethodState {
    id: MethodId,
    policy: ResolvedPolicy,
    deps: InterceptorDeps,
    base_tags: TelemetryTags,
    fault_reported: AtomicBool,
}

impl MonitoredMethod {
    fn new(id: MethodId, policy: ResolvedPolicy, deps: InterceptorDeps) -> Self {
        let mut base_tags = TelemetryTags::new();
        base_tags.insert("class".into(), id.class().into());
        base_tags.insert("method".into(), id.method().into());
        base_tags.insert("layer".into(), policy.layer.as_str().into());
        Self {
            inner: Arc::new(MethodState {
                id,
                policy,
                deps,
                base_tags,
                fault_reported: AtomicBool::new(false),
            }),
        }
    }

    /// Identity of the wrapped method.
    #[must_use]
    pub fn id(&self) -> &MethodId {
        &self.inner.id
    }

    /// Policy resolved at wrap time.
    #[must_use]
    pub fn policy(&self) -> &ResolvedPolicy {
        &self.inner.policy
    }

    /// Invoke a synchronous target.
    pub fn call<T, E, F>(&self, target: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: ErrorTypeName + fmt::Display,
    {
        self.run_sync(None, target, |_| None)
    }

    /// Invoke a synchronous target, logging `args` and the return value when
    /// the policy asks for it.
    pub fn call_with_args<A, T, E, F>(&self, args: &A, target: F) -> Result<T, E>
    where
        A: fmt::Debug + ?Sized,
        T: fmt::Debug,
        F: FnOnce() -> Result<T, E>,
        E: ErrorTypeName + fmt::Display,
    {
        let rendered = self.render(args);
        self.run_sync(rendered, target, |value| Some(format!("{value:?}")))
    }

    /// Await a target future.
    ///
    /// A future that is dropped before completing records nothing.
    pub async fn call_async<T, E, Fut>(&self, target: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: ErrorTypeName + fmt::Display,
    {
        self.run_async(None, target, |_| None).await
    }

    /// Await a target future with parameter logging.
    pub async fn call_async_with_args<A, T, E, Fut>(&self, args: &A, target: Fut) -> Result<T, E>
    where
        A: fmt::Debug + ?Sized,
        T: fmt::Debug,
        Fut: Future<Output = Result<T, E>>,
        E: ErrorTypeName + fmt::Display,
    {
        let rendered = self.render(args);
        self.run_async(rendered, target, |value| Some(format!("{value:?}")))
            .await
    }

    /// Turn a one-argument function into an instrumented one.
    pub fn decorate<A, T, E, F>(self, target: F) -> impl Fn(A) -> Result<T, E>
    where
        A: fmt::Debug,
        T: fmt::Debug,
        F: Fn(A) -> Result<T, E>,
        E: ErrorTypeName + fmt::Display,
    {
        move |args| {
            let rendered = self.render(&args);
            self.run_sync(rendered, || target(args), |value| Some(format!("{value:?}")))
        }
    }

    fn render<A: fmt::Debug + ?Sized>(&self, args: &A) -> Option<String> {
        self.inner
            .policy
            .log_parameters
            .then(|| format!("{args:?}"))
    }

    fn run_sync<T, E, F, R>(&self, args: Option<String>, target: F, render: R) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: ErrorTypeName + fmt::Display,
        R: FnOnce(&T) -> Option<String>,
    {
        if guard::is_active(&self.inner.id) {
            return target();
        }
        let _scope = SyncScope::enter(&self.inner.id);
        let started = self.before(args);
        let result = target();
        self.after(&result, started, render);
        result
    }

    async fn run_async<T, E, Fut, R>(&self, args: Option<String>, target: Fut, render: R) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: ErrorTypeName + fmt::Display,
        R: FnOnce(&T) -> Option<String>,
    {
        if guard::is_active(&self.inner.id) {
            return target.await;
        }
        let started = self.before(args);
        let result = guard::scope_async(&self.inner.id, target).await;
        self.after(&result, started, render);
        result
    }

    fn before(&self, args: Option<String>) -> Option<Duration> {
        let state = &self.inner;
        self.guarded("invoked", || {
            if let (Some(args), Some(logger)) = (args, state.deps.logger.as_ref()) {
                let mut fields = state.log_fields();
                fields.insert("args".into(), Value::String(args));
                logger.info("method.invoked", "Monitored method invoked", Some(fields));
            }
            state.deps.clock.now()
        })
    }

    fn after<T, E, R>(&self, result: &Result<T, E>, started: Option<Duration>, render: R)
    where
        E: ErrorTypeName + fmt::Display,
        R: FnOnce(&T) -> Option<String>,
    {
        let Some(started) = started else {
            return;
        };
        let state = &self.inner;
        self.guarded("record", || {
            let elapsed = state.deps.clock.elapsed_since(started);
            match result {
                Ok(value) => {
                    let rendered = if state.policy.log_parameters {
                        render(value)
                    } else {
                        None
                    };
                    state.record_success(elapsed, rendered);
                },
                Err(error) => state.record_error(elapsed, error),
            }
        });
    }

    fn guarded<R>(&self, stage: &'static str, record: impl FnOnce() -> R) -> Option<R> {
        match panic::catch_unwind(AssertUnwindSafe(record)) {
            Ok(value) => Some(value),
            Err(_) => {
                if !self.inner.fault_reported.swap(true, Ordering::Relaxed) {
                    tracing::error!(
                        method = %self.inner.id,
                        stage,
                        "instrumentation failed; method result returned without it"
                    );
                }
                None
            },
        }
    }
}

impl fmt::Debug for MonitoredMethod {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MonitoredMethod")
            .field("id", &self.inner.id)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl MethodState {
    fn record_success(&self, elapsed: Duration, result: Option<String>) {
        let duration_ms = duration_ms(elapsed);
        let telemetry = &self.deps.telemetry;

        let mut tags = self.base_tags.clone();
        tags.insert("status".into(), InvocationStatus::Success.as_str().into());
        telemetry.record_timer_ms(&self.policy.metric_name, duration_ms, Some(&tags));

        if self.policy.exceeds_threshold(elapsed) {
            let threshold_ms = self.policy.threshold_ms();
            let mut tags = self.base_tags.clone();
            tags.insert("threshold".into(), threshold_ms.to_string().into());
            telemetry.increment_counter(THRESHOLD_EXCEEDED_METRIC, 1, Some(&tags));

            if let Some(logger) = self.deps.logger.as_ref() {
                let mut fields = self.log_fields();
                fields.insert("durationMs".into(), Value::from(duration_ms));
                fields.insert("thresholdMs".into(), Value::from(threshold_ms));
                logger.warn(
                    "method.threshold_exceeded",
                    "Monitored method exceeded its latency threshold",
                    Some(fields),
                );
            }
        }

        if let (Some(result), Some(logger)) = (result, self.deps.logger.as_ref()) {
            let mut fields = self.log_fields();
            fields.insert("durationMs".into(), Value::from(duration_ms));
            fields.insert("result".into(), Value::String(result));
            logger.info("method.completed", "Monitored method completed", Some(fields));
        }
    }

    fn record_error<E: ErrorTypeName + fmt::Display>(&self, elapsed: Duration, error: &E) {
        let duration_ms = duration_ms(elapsed);
        let exception = error.error_type_name();
        let telemetry = &self.deps.telemetry;

        let mut tags = self.base_tags.clone();
        tags.insert("status".into(), InvocationStatus::Error.as_str().into());
        tags.insert("exception".into(), exception.as_ref().into());
        telemetry.record_timer_ms(&self.policy.metric_name, duration_ms, Some(&tags));

        let mut tags = self.base_tags.clone();
        tags.insert("exception".into(), exception.as_ref().into());
        tags.insert(
            "alertEnabled".into(),
            self.policy.alert_on_error.to_string().into(),
        );
        telemetry.increment_counter(METHOD_ERRORS_METRIC, 1, Some(&tags));

        let Some(logger) = self.deps.logger.as_ref() else {
            return;
        };
        let mut fields = self.log_fields();
        fields.insert("durationMs".into(), Value::from(duration_ms));
        fields.insert("exception".into(), Value::from(exception.as_ref()));
        if self.policy.alert_on_error {
            logger.log(
                LogEvent::new(
                    LogLevel::Error,
                    "method.failed.alert",
                    "Monitored method failed",
                )
                .with_fields(Some(fields))
                .with_error(json!({
                    "type": exception.as_ref(),
                    "message": error.to_string(),
                })),
            );
        } else {
            fields.insert("error".into(), Value::String(error.to_string()));
            logger.warn("method.failed", "Monitored method failed", Some(fields));
        }
    }

    fn log_fields(&self) -> LogFields {
        let mut fields = LogFields::new();
        fields.insert("class".into(), Value::from(self.id.class()));
        fields.insert("method".into(), Value::from(self.id.method()));
        fields.insert("layer".into(), Value::from(self.policy.layer.as_str()));
        fields.insert(
            "description".into(),
            Value::String(self.policy.description.clone()),
        );
        fields
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_adapters::InMemoryMetricsRegistry;
    use clinic_monitor_domain::{MonitorPolicy, PolicyTarget};
    use clinic_monitor_ports::SeriesQuery;
    use clinic_monitor_testkit::errors::AppointmentConflict;
    use clinic_monitor_testkit::{CapturingLogger, ManualClock, PanickingTelemetry};

    struct Fixture {
        registry: InMemoryMetricsRegistry,
        logger: Arc<CapturingLogger>,
        clock: Arc<ManualClock>,
        interceptor: MethodInterceptor,
    }

    fn fixture(policies: PolicyTable) -> Fixture {
        let registry = InMemoryMetricsRegistry::new(1_000);
        let logger = CapturingLogger::new();
        let clock = ManualClock::new();
        let interceptor = MethodInterceptor::new(
            InterceptorDeps {
                telemetry: Arc::new(registry.clone()),
                logger: Some(logger.clone()),
                clock: clock.clone(),
            },
            policies,
        );
        Fixture {
            registry,
            logger,
            clock,
            interceptor,
        }
    }

    fn schedule_policy() -> Result<PolicyTable, ErrorEnvelope> {
        Ok(PolicyTable::default().with_policy(
            PolicyTarget::parse("AppointmentService.scheduleAppointment")?,
            MonitorPolicy::default()
                .named("appointment.schedule")
                .with_threshold_millis(100)
                .alerting(),
        ))
    }

    #[test]
    fn duration_equal_to_threshold_is_not_exceeded() -> Result<(), ErrorEnvelope> {
        let fx = fixture(schedule_policy()?);
        let method =
            fx.interceptor
                .wrap_named("AppointmentService", "scheduleAppointment", Layer::Service)?;

        let booked: Result<u64, AppointmentConflict> = method.call(|| {
            fx.clock.advance_ms(100);
            Ok(42)
        });
        assert_eq!(booked, Ok(42));

        let timers = SeriesQuery::named("appointment.schedule")
            .tag("status", "success")
            .tag("layer", "service")
            .timer_count(&fx.registry);
        assert_eq!(timers, 1);
        assert_eq!(
            SeriesQuery::named(THRESHOLD_EXCEEDED_METRIC).counter_total(&fx.registry),
            0
        );
        assert_eq!(fx.logger.count("method.threshold_exceeded"), 0);
        Ok(())
    }

    #[test]
    fn slower_than_threshold_counts_and_warns() -> Result<(), ErrorEnvelope> {
        let fx = fixture(schedule_policy()?);
        let method =
            fx.interceptor
                .wrap_named("AppointmentService", "scheduleAppointment", Layer::Service)?;

        let _: Result<(), AppointmentConflict> = method.call(|| {
            fx.clock.advance_ms(101);
            Ok(())
        });

        let exceeded = SeriesQuery::named(THRESHOLD_EXCEEDED_METRIC)
            .tag("threshold", "100")
            .tag("class", "AppointmentService")
            .counter_total(&fx.registry);
        assert_eq!(exceeded, 1);
        let warnings = fx.logger.events_named("method.threshold_exceeded");
        assert_eq!(
            warnings.first().and_then(|event| event.field("durationMs")),
            Some(&Value::from(101))
        );
        Ok(())
    }

    #[test]
    fn business_error_is_returned_unchanged_and_counted_once() -> Result<(), ErrorEnvelope> {
        let fx = fixture(schedule_policy()?);
        let method =
            fx.interceptor
                .wrap_named("AppointmentService", "scheduleAppointment", Layer::Service)?;

        let conflict = AppointmentConflict { professional_id: 3 };
        let result: Result<(), AppointmentConflict> = method.call(|| Err(conflict.clone()));
        assert_eq!(result, Err(conflict));

        let errors = SeriesQuery::named("appointment.schedule")
            .tag("status", "error")
            .tag("exception", "AppointmentConflict")
            .timer_count(&fx.registry);
        assert_eq!(errors, 1);
        assert_eq!(
            SeriesQuery::named(METHOD_ERRORS_METRIC)
                .tag("alertEnabled", "true")
                .counter_total(&fx.registry),
            1
        );

        let alerts = fx.logger.events_named("method.failed.alert");
        let alert = alerts.first().ok_or_else(|| {
            ErrorEnvelope::invariant(clinic_monitor_shared::ErrorCode::internal(), "no alert")
        })?;
        assert_eq!(alert.level, LogLevel::Error);
        assert_eq!(
            alert.error.as_ref().and_then(|error| error.get("type")),
            Some(&Value::from("AppointmentConflict"))
        );
        assert_eq!(fx.logger.count("method.failed"), 0);
        Ok(())
    }

    #[test]
    fn layer_default_failures_warn_without_alerting() -> Result<(), ErrorEnvelope> {
        let fx = fixture(PolicyTable::default());
        let method = fx
            .interceptor
            .wrap_named("ClientRepository", "save", Layer::Repository)?;

        let _: Result<(), ErrorEnvelope> = method.call(|| {
            Err(clinic_monitor_testkit::errors::invalid_input_error())
        });

        assert_eq!(
            SeriesQuery::named(METHOD_ERRORS_METRIC)
                .tag("exception", "core:invalid_input")
                .tag("alertEnabled", "false")
                .counter_total(&fx.registry),
            1
        );
        assert_eq!(fx.logger.count("method.failed"), 1);
        assert_eq!(fx.logger.count("method.failed.alert"), 0);
        Ok(())
    }

    #[test]
    fn nested_wrapper_of_the_same_method_records_once() -> Result<(), ErrorEnvelope> {
        let fx = fixture(PolicyTable::default());
        let outer = fx
            .interceptor
            .wrap_named("LoyaltyService", "addPoints", Layer::Service)?;
        let inner = outer.clone();

        let total: Result<u32, ErrorEnvelope> = outer.call(|| inner.call(|| Ok(10)));
        assert_eq!(total?, 10);
        assert_eq!(
            SeriesQuery::named("method.execution").timer_count(&fx.registry),
            1
        );
        Ok(())
    }

    #[test]
    fn parameters_are_logged_only_when_enabled() -> Result<(), ErrorEnvelope> {
        let policies = PolicyTable::default().with_policy(
            PolicyTarget::parse("ReportService.*")?,
            MonitorPolicy::default().logging_parameters(),
        );
        let fx = fixture(policies);
        let report = fx
            .interceptor
            .wrap_named("ReportService", "monthly", Layer::Service)?;
        let find = fx
            .interceptor
            .wrap_named("ClientService", "find", Layer::Service)?;

        let _: Result<Vec<u32>, ErrorEnvelope> =
            report.call_with_args(&("2026-09", 4), || Ok(vec![1, 2]));
        let _: Result<u32, ErrorEnvelope> = find.call_with_args(&"ana@example.com", || Ok(1));

        let invoked = fx.logger.events_named("method.invoked");
        assert_eq!(invoked.len(), 1);
        assert_eq!(
            invoked.first().and_then(|event| event.field("args")),
            Some(&Value::from("(\"2026-09\", 4)"))
        );
        let completed = fx.logger.events_named("method.completed");
        assert_eq!(
            completed.first().and_then(|event| event.field("result")),
            Some(&Value::from("[1, 2]"))
        );
        Ok(())
    }

    #[test]
    fn failing_telemetry_never_reaches_the_caller() -> Result<(), ErrorEnvelope> {
        let interceptor = MethodInterceptor::new(
            InterceptorDeps {
                telemetry: Arc::new(PanickingTelemetry),
                logger: None,
                clock: ManualClock::new(),
            },
            PolicyTable::default(),
        );
        let method = interceptor.wrap_named("PaymentService", "charge", Layer::Service)?;

        let ok: Result<&str, ErrorEnvelope> = method.call(|| Ok("paid"));
        assert_eq!(ok?, "paid");
        let err: Result<(), AppointmentConflict> =
            method.call(|| Err(AppointmentConflict { professional_id: 1 }));
        assert_eq!(err, Err(AppointmentConflict { professional_id: 1 }));
        Ok(())
    }

    #[test]
    fn decorated_function_behaves_like_the_original() -> Result<(), ErrorEnvelope> {
        let fx = fixture(PolicyTable::default());
        let double = fx
            .interceptor
            .wrap_named("PricingService", "double", Layer::Service)?
            .decorate(|value: u32| -> Result<u32, ErrorEnvelope> { Ok(value * 2) });

        assert_eq!(double(4)?, 8);
        assert_eq!(double(5)?, 10);
        assert_eq!(
            SeriesQuery::named("method.execution")
                .tag("method", "double")
                .timer_count(&fx.registry),
            2
        );
        Ok(())
    }

    #[tokio::test]
    async fn async_calls_are_timed_with_the_injected_clock() -> Result<(), ErrorEnvelope> {
        let fx = fixture(schedule_policy()?);
        let method =
            fx.interceptor
                .wrap_named("AppointmentService", "scheduleAppointment", Layer::Service)?;
        let clock = fx.clock.clone();

        let result: Result<u64, AppointmentConflict> = method
            .call_async(async move {
                clock.advance_ms(250);
                Ok(7)
            })
            .await;
        assert_eq!(result, Ok(7));

        let series = SeriesQuery::named("appointment.schedule").run(&fx.registry);
        let timer = series.first().and_then(|series| series.timer()).cloned();
        assert_eq!(timer.map(|timer| timer.max_ms), Some(250));
        assert_eq!(
            SeriesQuery::named(THRESHOLD_EXCEEDED_METRIC).counter_total(&fx.registry),
            1
        );
        Ok(())
    }
}
