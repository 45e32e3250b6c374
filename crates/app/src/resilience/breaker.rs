//! Three-state circuit breaker for one dependency.
//!
//! State changes happen under a per-breaker mutex that is never held across an
//! `.await`. Each change bumps a generation counter; outcomes reported by
//! permits from an older generation are dropped.

use super::window::SlidingWindow;
use clinic_monitor_domain::{
    BreakerSnapshot, CallOutcome, CircuitState, DependencyName, FallbackReason,
};
use clinic_monitor_ports::{ClockPort, LoggerPort, TelemetryPort, TelemetryTags, log_fields};
use parking_lot::Mutex;
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Counter of state changes, tagged `dependency`, `from`, `to`.
pub const CIRCUIT_TRANSITIONS_METRIC: &str = "circuit.transitions";
/// Gauge of the current state (0 closed, 1 open, 2 half-open).
pub const CIRCUIT_STATE_METRIC: &str = "circuit.state";

/// Thresholds of one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    /// Failure rate in percent (1..=100) that opens the breaker.
    pub failure_rate_threshold: u32,
    /// Number of outcomes kept in the sliding window.
    pub sliding_window_size: u32,
    /// Outcomes required before the failure rate is evaluated.
    pub minimum_calls: u32,
    /// Time spent open before trial calls are allowed.
    pub wait_duration_in_open_state: Duration,
    /// Trial calls allowed while half-open; that many successes close the breaker.
    pub permitted_calls_in_half_open: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50,
            sliding_window_size: 10,
            minimum_calls: 5,
            wait_duration_in_open_state: Duration::from_secs(10),
            permitted_calls_in_half_open: 5,
        }
    }
}

/// A state change, as reported to telemetry and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Previous state.
    pub from: CircuitState,
    /// New state.
    pub to: CircuitState,
    /// Outcomes in the window when the change happened.
    pub window_calls: usize,
    /// Failures in the window when the change happened.
    pub window_failures: usize,
}

/// Circuit breaker guarding one dependency.
pub struct CircuitBreaker {
    dependency: DependencyName,
    settings: BreakerSettings,
    clock: Arc<dyn ClockPort>,
    telemetry: Option<Arc<dyn TelemetryPort>>,
    logger: Option<Arc<dyn LoggerPort>>,
    tags: TelemetryTags,
    state: Mutex<BreakerState>,
    fault_reported: AtomicBool,
}

struct BreakerState {
    state: CircuitState,
    generation: u64,
    window: SlidingWindow,
    consecutive_failures: u32,
    opened_at: Option<Duration>,
    half_open_in_flight: u32,
    half_open_successes: u32,
}

impl BreakerState {
    fn move_to(&mut self, to: CircuitState, now: Duration) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
            window_calls: self.window.len(),
            window_failures: self.window.failures(),
        };
        self.state = to;
        self.generation = self.generation.wrapping_add(1);
        self.window.clear();
        self.half_open_in_flight = 0;
        self.half_open_successes = 0;
        self.opened_at = (to == CircuitState::Open).then_some(now);
        transition
    }
}

impl CircuitBreaker {
    /// Closed breaker for `dependency`.
    #[must_use]
    pub fn new(dependency: DependencyName, settings: BreakerSettings, clock: Arc<dyn ClockPort>) -> Self {
        let capacity = usize::try_from(settings.sliding_window_size).unwrap_or(usize::MAX);
        let mut tags = TelemetryTags::new();
        tags.insert("dependency".into(), dependency.as_str().into());
        Self {
            dependency,
            settings,
            clock,
            telemetry: None,
            logger: None,
            tags,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                generation: 0,
                window: SlidingWindow::new(capacity),
                consecutive_failures: 0,
                opened_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
            }),
            fault_reported: AtomicBool::new(false),
        }
    }

    /// Report transitions to `telemetry` and `logger`; the state gauge is set
    /// immediately.
    #[must_use]
    pub fn with_observers(
        mut self,
        telemetry: Option<Arc<dyn TelemetryPort>>,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        self.telemetry = telemetry;
        self.logger = logger;
        let state = self.state();
        self.observe(|| {
            if let Some(telemetry) = self.telemetry.as_ref() {
                telemetry.set_gauge(CIRCUIT_STATE_METRIC, state.gauge_value(), Some(&self.tags));
            }
        });
        self
    }

    /// Guarded dependency.
    #[must_use]
    pub const fn dependency(&self) -> &DependencyName {
        &self.dependency
    }

    /// Configured thresholds.
    #[must_use]
    pub const fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Stored state. An elapsed open wait is only applied by the next
    /// [`Self::try_acquire`].
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state.lock().state
    }

    /// Point-in-time view.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let state = self.state.lock();
        BreakerSnapshot {
            dependency: self.dependency.as_str().to_owned(),
            state: state.state,
            window_calls: u32::try_from(state.window.len()).unwrap_or(u32::MAX),
            window_failures: u32::try_from(state.window.failures()).unwrap_or(u32::MAX),
            consecutive_failures: state.consecutive_failures,
            half_open_in_flight: state.half_open_in_flight,
            half_open_successes: state.half_open_successes,
            open_for_ms: state
                .opened_at
                .map(|at| u64::try_from(now.saturating_sub(at).as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// Ask to attempt one call.
    ///
    /// Returns the short-circuit reason when the call must not be attempted.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, FallbackReason> {
        let now = self.clock.now();
        let (admitted, transition) = {
            let mut state = self.state.lock();
            let mut transition = None;
            let wait_elapsed = state.opened_at.is_some_and(|opened_at| {
                now.saturating_sub(opened_at) >= self.settings.wait_duration_in_open_state
            });
            if state.state == CircuitState::Open && wait_elapsed {
                transition = Some(state.move_to(CircuitState::HalfOpen, now));
            }

            let admitted = match state.state {
                CircuitState::Closed => Ok((state.generation, false)),
                CircuitState::Open => Err(FallbackReason::CircuitOpen),
                CircuitState::HalfOpen => {
                    let taken = state
                        .half_open_in_flight
                        .saturating_add(state.half_open_successes);
                    if taken < self.settings.permitted_calls_in_half_open {
                        state.half_open_in_flight = state.half_open_in_flight.saturating_add(1);
                        Ok((state.generation, true))
                    } else {
                        Err(FallbackReason::HalfOpenSaturated)
                    }
                },
            };
            (admitted, transition)
        };

        if let Some(transition) = transition {
            self.publish(transition);
        }
        admitted.map(|(generation, trial)| CallPermit {
            breaker: Arc::clone(self),
            generation,
            trial,
            settled: false,
        })
    }

    fn complete(&self, generation: u64, trial: bool, outcome: Option<CallOutcome>) {
        let now = self.clock.now();
        let transition = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return;
            }
            match outcome {
                Some(CallOutcome::Failure) => {
                    state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                },
                Some(CallOutcome::Success) => state.consecutive_failures = 0,
                None => {},
            }

            match (state.state, outcome) {
                (CircuitState::Closed, Some(outcome)) => {
                    state.window.record(outcome);
                    let minimum = usize::try_from(self.settings.minimum_calls).unwrap_or(usize::MAX);
                    state
                        .window
                        .failure_rate_reached(self.settings.failure_rate_threshold, minimum)
                        .then(|| state.move_to(CircuitState::Open, now))
                },
                (CircuitState::HalfOpen, outcome) if trial => {
                    state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
                    match outcome {
                        Some(CallOutcome::Failure) => Some(state.move_to(CircuitState::Open, now)),
                        Some(CallOutcome::Success) => {
                            state.half_open_successes = state.half_open_successes.saturating_add(1);
                            (state.half_open_successes >= self.settings.permitted_calls_in_half_open)
                                .then(|| state.move_to(CircuitState::Closed, now))
                        },
                        None => None,
                    }
                },
                _ => None,
            }
        };

        if let Some(transition) = transition {
            self.publish(transition);
        }
    }

    fn publish(&self, transition: Transition) {
        self.observe(|| {
            if let Some(telemetry) = self.telemetry.as_ref() {
                let mut tags = self.tags.clone();
                tags.insert("from".into(), transition.from.as_str().into());
                tags.insert("to".into(), transition.to.as_str().into());
                telemetry.increment_counter(CIRCUIT_TRANSITIONS_METRIC, 1, Some(&tags));
                telemetry.set_gauge(
                    CIRCUIT_STATE_METRIC,
                    transition.to.gauge_value(),
                    Some(&self.tags),
                );
            }

            if let Some(logger) = self.logger.as_ref() {
                let fields = log_fields([
                    ("dependency", Value::from(self.dependency.as_str())),
                    ("from", Value::from(transition.from.as_str())),
                    ("to", Value::from(transition.to.as_str())),
                    ("windowCalls", Value::from(transition.window_calls)),
                    ("windowFailures", Value::from(transition.window_failures)),
                ]);
                if transition.to == CircuitState::Open {
                    logger.warn("circuit.transition", "Circuit breaker opened", Some(fields));
                } else {
                    logger.info("circuit.transition", "Circuit breaker changed state", Some(fields));
                }
            }
        });
    }

    fn observe(&self, report: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(report)).is_err()
            && !self.fault_reported.swap(true, Ordering::Relaxed)
        {
            tracing::error!(
                dependency = %self.dependency,
                "circuit breaker observers failed; state machine unaffected"
            );
        }
    }
}

/// Admission to attempt one call.
///
/// A permit dropped without [`CallPermit::record`] releases its slot without
/// recording an outcome.
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// Returns true for half-open trial calls.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }

    /// Feed the outcome of the attempted call to the breaker.
    pub fn record(mut self, outcome: CallOutcome) {
        self.settled = true;
        self.breaker.complete(self.generation, self.trial, Some(outcome));
    }

    /// Give the slot back without recording an outcome.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.complete(self.generation, self.trial, None);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.complete(self.generation, self.trial, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_adapters::InMemoryMetricsRegistry;
    use clinic_monitor_domain::PrimitiveError;
    use clinic_monitor_ports::SeriesQuery;
    use clinic_monitor_testkit::{CapturingLogger, ManualClock};

    fn settings(permitted: u32) -> BreakerSettings {
        BreakerSettings {
            failure_rate_threshold: 50,
            sliding_window_size: 5,
            minimum_calls: 5,
            wait_duration_in_open_state: Duration::from_secs(10),
            permitted_calls_in_half_open: permitted,
        }
    }

    fn breaker(
        permitted: u32,
        clock: &Arc<ManualClock>,
    ) -> Result<Arc<CircuitBreaker>, PrimitiveError> {
        Ok(Arc::new(CircuitBreaker::new(
            DependencyName::parse("loyalty-service")?,
            settings(permitted),
            clock.clone(),
        )))
    }

    fn feed(breaker: &Arc<CircuitBreaker>, outcomes: &[CallOutcome]) -> Result<(), FallbackReason> {
        for outcome in outcomes {
            breaker.try_acquire()?.record(*outcome);
        }
        Ok(())
    }

    fn trip(breaker: &Arc<CircuitBreaker>) -> Result<(), FallbackReason> {
        use CallOutcome::{Failure, Success};
        feed(breaker, &[Failure, Failure, Failure, Success, Success])
    }

    #[test]
    fn three_failures_and_two_successes_open_the_breaker() -> Result<(), Box<dyn std::error::Error>> {
        use CallOutcome::{Failure, Success};
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock)?;
        feed(&breaker, &[Failure, Failure, Failure, Success])
            .map_err(|reason| reason.to_string())?;
        assert_eq!(breaker.state(), CircuitState::Closed);
        feed(&breaker, &[Success]).map_err(|reason| reason.to_string())?;
        assert_eq!(breaker.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(9_999));
        assert_eq!(breaker.try_acquire().err(), Some(FallbackReason::CircuitOpen));
        assert_eq!(breaker.snapshot().open_for_ms, Some(9_999));
        Ok(())
    }

    #[test]
    fn trial_failure_reopens_and_restarts_the_wait() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock)?;
        trip(&breaker).map_err(|reason| reason.to_string())?;

        clock.advance(Duration::from_secs(10));
        let trial = breaker.try_acquire().map_err(|reason| reason.to_string())?;
        assert!(trial.is_trial());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        trial.record(CallOutcome::Failure);

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.snapshot().open_for_ms, Some(0));
        clock.advance(Duration::from_secs(5));
        assert_eq!(breaker.try_acquire().err(), Some(FallbackReason::CircuitOpen));
        Ok(())
    }

    #[test]
    fn enough_trial_successes_close_and_clear_the_window() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock)?;
        trip(&breaker).map_err(|reason| reason.to_string())?;
        clock.advance(Duration::from_secs(10));

        feed(&breaker, &[CallOutcome::Success]).map_err(|reason| reason.to_string())?;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        feed(&breaker, &[CallOutcome::Success]).map_err(|reason| reason.to_string())?;

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.window_calls, 0);
        assert_eq!(snapshot.open_for_ms, None);
        Ok(())
    }

    #[test]
    fn dropped_trial_permit_frees_its_slot() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let breaker = breaker(1, &clock)?;
        trip(&breaker).map_err(|reason| reason.to_string())?;
        clock.advance(Duration::from_secs(10));

        let trial = breaker.try_acquire().map_err(|reason| reason.to_string())?;
        assert_eq!(
            breaker.try_acquire().err(),
            Some(FallbackReason::HalfOpenSaturated)
        );
        drop(trial);
        assert_eq!(breaker.snapshot().half_open_in_flight, 0);
        assert!(breaker.try_acquire().is_ok());
        Ok(())
    }

    #[test]
    fn outcomes_from_an_older_generation_are_ignored() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let breaker = breaker(2, &clock)?;
        let slow_call = breaker.try_acquire().map_err(|reason| reason.to_string())?;
        trip(&breaker).map_err(|reason| reason.to_string())?;

        slow_call.record(CallOutcome::Failure);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert_eq!(snapshot.window_calls, 0);
        Ok(())
    }

    #[test]
    fn transitions_are_counted_logged_and_gauged() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let registry = InMemoryMetricsRegistry::new(100);
        let logger = CapturingLogger::new();
        let breaker = Arc::new(
            CircuitBreaker::new(
                DependencyName::parse("report-service")?,
                settings(1),
                clock.clone(),
            )
            .with_observers(Some(Arc::new(registry.clone())), Some(logger.clone())),
        );
        let gauge = SeriesQuery::named(CIRCUIT_STATE_METRIC).tag("dependency", "report-service");
        assert_eq!(gauge.gauge(&registry), Some(0.0));

        trip(&breaker).map_err(|reason| reason.to_string())?;
        assert_eq!(gauge.gauge(&registry), Some(1.0));
        clock.advance(Duration::from_secs(10));
        feed(&breaker, &[CallOutcome::Success]).map_err(|reason| reason.to_string())?;

        let opened = SeriesQuery::named(CIRCUIT_TRANSITIONS_METRIC)
            .tag("from", "closed")
            .tag("to", "open")
            .counter_total(&registry);
        let total = SeriesQuery::named(CIRCUIT_TRANSITIONS_METRIC).counter_total(&registry);
        assert_eq!((opened, total), (1, 3));
        assert_eq!(gauge.gauge(&registry), Some(0.0));
        assert_eq!(logger.count("circuit.transition"), 3);
        Ok(())
    }

    #[test]
    fn concurrent_failures_open_the_breaker_once() -> Result<(), Box<dyn std::error::Error>> {
        let clock = ManualClock::new();
        let registry = InMemoryMetricsRegistry::new(100);
        let breaker = Arc::new(
            CircuitBreaker::new(
                DependencyName::parse("finance-service")?,
                settings(2),
                clock.clone(),
            )
            .with_observers(Some(Arc::new(registry.clone())), None),
        );

        let rejected = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let breaker = Arc::clone(&breaker);
                    scope.spawn(move || {
                        let mut rejected = 0_u32;
                        for _ in 0..20 {
                            match breaker.try_acquire() {
                                Ok(permit) => permit.record(CallOutcome::Failure),
                                Err(_) => rejected += 1,
                            }
                        }
                        rejected
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().map_err(|_| "worker panicked"))
                .sum::<Result<u32, _>>()
        })?;

        let opened = SeriesQuery::named(CIRCUIT_TRANSITIONS_METRIC)
            .tag("from", "closed")
            .tag("to", "open")
            .counter_total(&registry);
        assert_eq!(opened, 1);
        assert_eq!(SeriesQuery::named(CIRCUIT_TRANSITIONS_METRIC).counter_total(&registry), 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(rejected >= 160 - 8 * 5, "only {rejected} calls were short-circuited");
        Ok(())
    }

    #[test]
    fn concurrent_trials_never_exceed_the_half_open_allowance() -> Result<(), Box<dyn std::error::Error>> {
        const CALLERS: usize = 16;
        let clock = ManualClock::new();
        let breaker = breaker(3, &clock)?;
        trip(&breaker).map_err(|reason| reason.to_string())?;
        clock.advance(Duration::from_secs(10));

        let barrier = std::sync::Barrier::new(CALLERS);
        let outcomes = std::thread::scope(|scope| {
            let callers: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let breaker = Arc::clone(&breaker);
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        let permit = breaker.try_acquire();
                        let in_flight = breaker.snapshot().half_open_in_flight;
                        barrier.wait();
                        let outcome = permit.as_ref().err().cloned();
                        if let Ok(permit) = permit {
                            permit.record(CallOutcome::Success);
                        }
                        (outcome, in_flight)
                    })
                })
                .collect();
            callers
                .into_iter()
                .map(|caller| caller.join().map_err(|_| "caller panicked"))
                .collect::<Result<Vec<_>, _>>()
        })?;

        let admitted = outcomes.iter().filter(|(outcome, _)| outcome.is_none()).count();
        let saturated = outcomes
            .iter()
            .filter(|(outcome, _)| *outcome == Some(FallbackReason::HalfOpenSaturated))
            .count();
        assert_eq!((admitted, saturated), (3, CALLERS - 3));
        assert!(outcomes.iter().all(|(_, in_flight)| *in_flight <= 3));
        assert_eq!(breaker.state(), CircuitState::Closed);
        Ok(())
    }
}
