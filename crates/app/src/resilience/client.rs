//! Remote-call wrapper: breaker admission, per-attempt timeout, bounded
//! retry, and a fallback that never fails.

use super::breaker::CircuitBreaker;
use clinic_monitor_domain::{CallOutcome, DependencyName, DependencyResponse, FallbackReason};
use clinic_monitor_ports::{ClockPort, LoggerPort, TelemetryPort, TelemetryTags, log_fields};
use clinic_monitor_shared::{
    ErrorKind, RequestContext, Result, RetryPolicy, retry_async_with_observer,
    timeout_with_context,
};
use serde_json::Value;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Timer of guarded calls, tagged `dependency` and `outcome`.
pub const DEPENDENCY_CALL_METRIC: &str = "dependency.call";
/// Counter of degraded responses, tagged `dependency` and `reason`.
pub const DEPENDENCY_FALLBACK_METRIC: &str = "dependency.fallback";
/// Counter of retries (not first attempts), tagged `dependency`.
pub const RETRY_ATTEMPT_METRIC: &str = "retry.attempt";
/// Counter of attempts cut off by the per-call timeout, tagged `dependency`.
pub const TIMEOUT_TRIGGERED_METRIC: &str = "timeout.triggered";

/// Deadline and retry budget applied to each guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Deadline of one attempt.
    pub timeout: Duration,
    /// Attempts of an idempotent call, including the first.
    pub retry_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_backoff: Duration,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retry_attempts: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl CallPolicy {
    fn retry_policy(&self, options: CallOptions) -> RetryPolicy {
        if options.idempotent && self.retry_attempts > 1 {
            let backoff_ms = u64::try_from(self.retry_backoff.as_millis()).unwrap_or(u64::MAX);
            RetryPolicy::fixed(self.retry_attempts, backoff_ms)
        } else {
            RetryPolicy::single_attempt()
        }
    }
}

/// Per-call switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// The call may be repeated safely, so retriable failures are retried.
    pub idempotent: bool,
}

impl CallOptions {
    /// Options for a read or an otherwise repeatable call.
    #[must_use]
    pub const fn idempotent() -> Self {
        Self { idempotent: true }
    }

    /// Options for a call that must be attempted at most once.
    #[must_use]
    pub const fn once() -> Self {
        Self { idempotent: false }
    }
}

/// Produces the degraded value returned instead of a live response.
///
/// Must return quickly and must not fail; a panic is caught and replaced by
/// `T::default()`.
pub trait FallbackProducer<A: ?Sized, T>: Send + Sync {
    /// Degraded value for `args` given why the live call was not used.
    fn produce(&self, args: &A, reason: &FallbackReason) -> T;
}

impl<A: ?Sized, T, F> FallbackProducer<A, T> for F
where
    F: Fn(&A, &FallbackReason) -> T + Send + Sync,
{
    fn produce(&self, args: &A, reason: &FallbackReason) -> T {
        self(args, reason)
    }
}

/// Ports the resilience layer records into.
#[derive(Clone)]
pub struct ResilienceDeps {
    /// Metrics registry or exporter.
    pub telemetry: Arc<dyn TelemetryPort>,
    /// Optional structured logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
    /// Clock used for durations and breaker waits.
    pub clock: Arc<dyn ClockPort>,
}

/// Guarded client for one remote dependency.
#[derive(Clone)]
pub struct ResilientClient {
    breaker: Arc<CircuitBreaker>,
    policy: CallPolicy,
    deps: ResilienceDeps,
    tags: TelemetryTags,
    fault_reported: Arc<AtomicBool>,
}

impl ResilientClient {
    /// Client sharing `breaker` with every other client of the dependency.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, policy: CallPolicy, deps: ResilienceDeps) -> Self {
        let mut tags = TelemetryTags::new();
        tags.insert("dependency".into(), breaker.dependency().as_str().into());
        Self {
            breaker,
            policy,
            deps,
            tags,
            fault_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Guarded dependency.
    #[must_use]
    pub fn dependency(&self) -> &DependencyName {
        self.breaker.dependency()
    }

    /// Breaker shared by the dependency.
    #[must_use]
    pub const fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Deadline and retry budget.
    #[must_use]
    pub const fn policy(&self) -> &CallPolicy {
        &self.policy
    }

    /// Run `operation` against the dependency.
    ///
    /// Infrastructure failures (`ErrorKind::Unexpected`, timeouts included)
    /// count against the breaker and yield a fallback. Expected and invariant
    /// errors, and cancellation, are returned as `Err` without touching the
    /// breaker window.
    #[tracing::instrument(
        name = "dependency.call",
        skip_all,
        fields(dependency = %self.breaker.dependency(), idempotent = options.idempotent)
    )]
    pub async fn call<A, T, F, Fut, P>(
        &self,
        ctx: &RequestContext,
        options: CallOptions,
        args: A,
        mut operation: F,
        fallback: &P,
    ) -> Result<DependencyResponse<T>>
    where
        A: Clone,
        T: Default,
        F: FnMut(A) -> Fut,
        Fut: Future<Output = Result<T>>,
        P: FallbackProducer<A, T> + ?Sized,
    {
        ctx.ensure_not_cancelled("dependency.call")?;
        let started = self.deps.clock.now();

        let permit = match self.breaker.try_acquire() {
            Ok(permit) => permit,
            Err(reason) => {
                self.record_call("rejected", started);
                return Ok(self.fallback(&args, reason, fallback));
            },
        };

        let timeout = self.policy.timeout;
        let telemetry = &self.deps.telemetry;
        let tags = &self.tags;
        let mut run_attempt = || {
            let attempt = operation(args.clone());
            async move {
                let result = timeout_with_context(ctx, timeout, "dependency.call", attempt).await;
                if result.as_ref().is_err_and(|error| error.is_timeout()) {
                    self.observe(|| telemetry.increment_counter(TIMEOUT_TRIGGERED_METRIC, 1, Some(tags)));
                }
                result
            }
        };
        let outcome = retry_async_with_observer(
            ctx,
            self.policy.retry_policy(options),
            "dependency.call",
            &mut run_attempt,
            |attempt, error| {
                tracing::debug!(attempt, code = %error.code, "retrying dependency call");
                self.observe(|| telemetry.increment_counter(RETRY_ATTEMPT_METRIC, 1, Some(tags)));
            },
        )
        .await;

        match outcome {
            Ok(value) => {
                permit.record(CallOutcome::Success);
                self.record_call("success", started);
                Ok(DependencyResponse::live(value))
            },
            Err(error) if error.is_cancelled() => {
                permit.release();
                self.record_call("ignored", started);
                Err(error)
            },
            Err(error) if error.kind == ErrorKind::Unexpected => {
                permit.record(CallOutcome::Failure);
                let (label, reason) = if error.is_timeout() {
                    ("timeout", FallbackReason::Timeout)
                } else {
                    (
                        "failure",
                        FallbackReason::Failure {
                            code: error.code.to_string(),
                            message: error.message.clone(),
                        },
                    )
                };
                self.record_call(label, started);
                Ok(self.fallback(&args, reason, fallback))
            },
            Err(error) => {
                permit.release();
                self.record_call("ignored", started);
                Err(error)
            },
        }
    }

    fn fallback<A, T, P>(&self, args: &A, reason: FallbackReason, producer: &P) -> DependencyResponse<T>
    where
        T: Default,
        P: FallbackProducer<A, T> + ?Sized,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| producer.produce(args, &reason))) {
            Ok(value) => {
                self.note_fallback(&reason);
                DependencyResponse::fallback(value, reason)
            },
            Err(_) => {
                self.observe(|| {
                    if let Some(logger) = self.deps.logger.as_ref() {
                        logger.error(
                            "fallback.defect",
                            "Fallback producer failed; returning an empty value",
                            Some(log_fields([
                                ("dependency", Value::from(self.dependency().as_str())),
                                ("trigger", Value::from(reason.as_str())),
                            ])),
                        );
                    }
                });
                let reason = FallbackReason::ProducerDefect;
                self.note_fallback(&reason);
                DependencyResponse::fallback(T::default(), reason)
            },
        }
    }

    fn note_fallback(&self, reason: &FallbackReason) {
        self.observe(|| {
            let mut tags = self.tags.clone();
            tags.insert("reason".into(), reason.as_str().into());
            self.deps
                .telemetry
                .increment_counter(DEPENDENCY_FALLBACK_METRIC, 1, Some(&tags));

            if let Some(logger) = self.deps.logger.as_ref() {
                logger.warn(
                    "dependency.fallback",
                    "Degraded response returned",
                    Some(log_fields([
                        ("dependency", Value::from(self.dependency().as_str())),
                        ("reason", Value::from(reason.as_str())),
                        ("detail", Value::String(reason.to_string())),
                    ])),
                );
            }
        });
    }

    fn record_call(&self, outcome: &'static str, started: Duration) {
        self.observe(|| {
            let elapsed = self.deps.clock.elapsed_since(started);
            let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
            let mut tags = self.tags.clone();
            tags.insert("outcome".into(), outcome.into());
            self.deps
                .telemetry
                .record_timer_ms(DEPENDENCY_CALL_METRIC, duration_ms, Some(&tags));
        });
    }

    fn observe(&self, report: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(report)).is_err()
            && !self.fault_reported.swap(true, Ordering::Relaxed)
        {
            tracing::error!(
                dependency = %self.dependency(),
                "resilience instrumentation failed; call result unaffected"
            );
        }
    }
}
