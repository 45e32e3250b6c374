//! In-memory doubles for the port contracts.
//!
//! These implementations are intended for:
//! - Unit/integration tests of the interceptor, cache, and resilience layers
//! - Deterministic timing through a manually advanced clock
//! - Asserting on emitted log events and exported lines

use clinic_monitor_adapters::LogSink;
use clinic_monitor_ports::{
    ClockPort, LogEvent, LogFields, LogLevel, LoggerPort, TelemetryPort, TelemetryTags,
    TelemetryTimer,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// A no-op logger implementation.
#[derive(Debug, Default)]
pub struct NoopLogger;

impl LoggerPort for NoopLogger {
    fn log(&self, _event: LogEvent) {}

    fn child(&self, _fields: LogFields) -> Box<dyn LoggerPort> {
        Box::new(Self)
    }
}

/// A no-op telemetry timer.
#[derive(Debug, Default)]
pub struct NoopTimer;

impl TelemetryTimer for NoopTimer {
    fn stop(&self) {}
}

/// A no-op telemetry implementation.
#[derive(Debug, Default)]
pub struct NoopTelemetry;

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}

    fn set_gauge(&self, _name: &str, _value: f64, _tags: Option<&TelemetryTags>) {}

    fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(NoopTimer)
    }
}

/// Telemetry adapter that panics on every write.
///
/// Used to prove that instrumentation failures never reach business callers.
#[derive(Debug, Default)]
pub struct PanickingTelemetry;

#[allow(clippy::panic, reason = "this double exists to fail loudly")]
impl TelemetryPort for PanickingTelemetry {
    fn increment_counter(&self, name: &str, _value: u64, _tags: Option<&TelemetryTags>) {
        panic!("telemetry backend unavailable: {name}");
    }

    fn record_timer_ms(&self, name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {
        panic!("telemetry backend unavailable: {name}");
    }

    fn set_gauge(&self, name: &str, _value: f64, _tags: Option<&TelemetryTags>) {
        panic!("telemetry backend unavailable: {name}");
    }

    fn start_timer(&self, name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        panic!("telemetry backend unavailable: {name}");
    }
}

/// Clock that only moves when a test advances it.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Clock starting at zero.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Move time forward by whole milliseconds.
    pub fn advance_ms(&self, millis: u64) {
        self.now_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump to an absolute offset.
    pub fn set(&self, at: Duration) {
        let millis = u64::try_from(at.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.store(millis, Ordering::SeqCst);
    }
}

impl ClockPort for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

/// Logger that keeps every event in memory.
///
/// Children share the same buffer and prepend their base fields.
#[derive(Clone, Default)]
pub struct CapturingLogger {
    events: Arc<Mutex<Vec<LogEvent>>>,
    base_fields: LogFields,
}

impl CapturingLogger {
    /// Empty logger.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All captured events, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }

    /// Captured events with the given event name.
    pub fn events_named(&self, event: &str) -> Vec<LogEvent> {
        self.events
            .lock()
            .iter()
            .filter(|captured| captured.event.as_ref() == event)
            .cloned()
            .collect()
    }

    /// Number of captured events with the given name.
    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|captured| captured.event.as_ref() == event)
            .count()
    }

    /// Number of captured events at `level`.
    pub fn count_at(&self, level: LogLevel) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|captured| captured.level == level)
            .count()
    }

    /// Drop everything captured so far.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl LoggerPort for CapturingLogger {
    fn log(&self, mut event: LogEvent) {
        if !self.base_fields.is_empty() {
            let mut merged = self.base_fields.clone();
            if let Some(fields) = event.fields.take() {
                merged.extend(fields);
            }
            event.fields = Some(merged);
        }
        self.events.lock().push(event);
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut base_fields = self.base_fields.clone();
        base_fields.extend(fields);
        Box::new(Self {
            events: Arc::clone(&self.events),
            base_fields,
        })
    }
}

/// Line sink that keeps every written line.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    /// Empty sink.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Lines written so far, without trailing newlines.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|line| line.trim_end().to_owned())
            .collect()
    }

    /// Lines parsed as JSON; lines that are not JSON are skipped.
    pub fn json_lines(&self) -> Vec<Value> {
        self.lines
            .lock()
            .iter()
            .filter_map(|line| serde_json::from_str(line.trim_end()).ok())
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        self.lines.lock().push(line.to_owned());
        Ok(())
    }
}
