//! JSON-lines metric exporter and a common-tags decorator.

use crate::log_sink::{LogSink, write_or_warn_once};
use clinic_monitor_domain::{MetricSample, SeriesKind};
use clinic_monitor_ports::{GaugeSupplier, TelemetryPort, TelemetryTags, TelemetryTimer};
use clinic_monitor_shared::redaction::{REDACTED, is_secret_key};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const SERIALIZE_FAILED_LINE: &str = "{\"type\":\"metric\",\"metricType\":\"counter\",\"name\":\"telemetry.serialize_failed\",\"value\":1.0}\n";

/// Telemetry adapter that writes one JSON line per observation.
#[derive(Clone)]
pub struct JsonTelemetry {
    sink: Arc<dyn LogSink>,
    base_tags: TelemetryTags,
    sink_warned: Arc<AtomicBool>,
}

impl JsonTelemetry {
    /// Create an exporter backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_tags: TelemetryTags::new(),
            sink_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set base tags applied to every observation.
    #[must_use]
    pub fn with_base_tags(mut self, tags: TelemetryTags) -> Self {
        self.base_tags = tags;
        self
    }

    fn emit(
        &self,
        metric_type: SeriesKind,
        name: &str,
        value: f64,
        unit: &str,
        tags: Option<&TelemetryTags>,
    ) {
        let sample = MetricSample {
            metric_type,
            name: name.to_owned(),
            value,
            unit: unit.to_owned(),
            tags: merge_tags(&self.base_tags, tags),
            timestamp_ms: now_epoch_ms(),
        };
        write_or_warn_once(
            self.sink.as_ref(),
            &metric_line(&sample),
            &self.sink_warned,
            "telemetry",
        );
    }
}

impl TelemetryPort for JsonTelemetry {
    #[allow(clippy::cast_precision_loss, reason = "exported counter deltas are small")]
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        self.emit(SeriesKind::Counter, name, value as f64, "count", tags);
    }

    #[allow(clippy::cast_precision_loss, reason = "durations in ms fit f64 exactly")]
    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        self.emit(SeriesKind::Timer, name, duration_ms as f64, "ms", tags);
    }

    fn set_gauge(&self, name: &str, value: f64, tags: Option<&TelemetryTags>) {
        self.emit(SeriesKind::Gauge, name, value, "value", tags);
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(StopwatchTimer::new(
            Arc::new(self.clone()),
            name,
            tags.cloned(),
        ))
    }
}

/// Telemetry decorator that adds common tags (`application`, `environment`)
/// before delegating.
#[derive(Clone)]
pub struct TaggedTelemetry {
    inner: Arc<dyn TelemetryPort>,
    tags: TelemetryTags,
}

impl TaggedTelemetry {
    /// Wrap a telemetry port with common tags.
    #[must_use]
    pub fn new(inner: Arc<dyn TelemetryPort>, tags: TelemetryTags) -> Self {
        Self { inner, tags }
    }
}

impl TelemetryPort for TaggedTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.increment_counter(name, value, Some(&merged));
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.record_timer_ms(name, duration_ms, Some(&merged));
    }

    fn set_gauge(&self, name: &str, value: f64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.set_gauge(name, value, Some(&merged));
    }

    fn register_gauge(&self, name: &str, tags: Option<&TelemetryTags>, supplier: GaugeSupplier) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.register_gauge(name, Some(&merged), supplier);
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        let merged = merge_tags(&self.tags, tags);
        self.inner.start_timer(name, Some(&merged))
    }
}

/// Timer that records its wall duration into a telemetry port once.
pub struct StopwatchTimer {
    telemetry: Arc<dyn TelemetryPort>,
    name: Box<str>,
    tags: Option<TelemetryTags>,
    started_at: Instant,
    stopped: AtomicBool,
}

impl StopwatchTimer {
    /// Start timing now.
    #[must_use]
    pub fn new(telemetry: Arc<dyn TelemetryPort>, name: &str, tags: Option<TelemetryTags>) -> Self {
        Self {
            telemetry,
            name: name.into(),
            tags,
            started_at: Instant::now(),
            stopped: AtomicBool::new(false),
        }
    }
}

impl TelemetryTimer for StopwatchTimer {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let duration_ms = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.telemetry
            .record_timer_ms(&self.name, duration_ms, self.tags.as_ref());
    }
}

#[derive(Serialize)]
struct MetricLine<'a> {
    #[serde(rename = "type")]
    line_type: &'static str,
    #[serde(flatten)]
    sample: &'a MetricSample,
}

fn metric_line(sample: &MetricSample) -> String {
    let line = MetricLine {
        line_type: "metric",
        sample,
    };
    serde_json::to_string(&line).map_or_else(
        |_| SERIALIZE_FAILED_LINE.to_owned(),
        |mut encoded| {
            encoded.push('\n');
            encoded
        },
    )
}

/// Later tags win; values under secret-looking keys are redacted.
pub(crate) fn merge_tags(base: &TelemetryTags, extra: Option<&TelemetryTags>) -> TelemetryTags {
    let mut merged = base.clone();
    if let Some(extra) = extra {
        merged.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    for (key, value) in &mut merged {
        if is_secret_key(key) {
            *value = REDACTED.into();
        }
    }
    merged
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| u64::try_from(duration.as_millis()).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_ports::telemetry_tags;
    use parking_lot::Mutex;
    use serde_json::Value;

    #[derive(Default)]
    struct LinesSink(Mutex<Vec<String>>);

    impl LogSink for LinesSink {
        fn write_line(&self, line: &str) -> std::io::Result<()> {
            self.0.lock().push(line.to_owned());
            Ok(())
        }
    }

    #[derive(Default)]
    struct Capture(Mutex<Vec<(String, Option<TelemetryTags>)>>);

    impl TelemetryPort for Capture {
        fn increment_counter(&self, name: &str, _value: u64, tags: Option<&TelemetryTags>) {
            self.0.lock().push((name.to_owned(), tags.cloned()));
        }

        fn record_timer_ms(&self, name: &str, _duration_ms: u64, tags: Option<&TelemetryTags>) {
            self.0.lock().push((name.to_owned(), tags.cloned()));
        }

        fn set_gauge(&self, name: &str, _value: f64, tags: Option<&TelemetryTags>) {
            self.0.lock().push((name.to_owned(), tags.cloned()));
        }

        fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
            self.0.lock().push((name.to_owned(), tags.cloned()));
            Box::new(NoopTimer)
        }
    }

    struct NoopTimer;

    impl TelemetryTimer for NoopTimer {
        fn stop(&self) {}
    }

    #[test]
    fn exporter_writes_metric_lines() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(LinesSink::default());
        let telemetry = JsonTelemetry::new(sink.clone())
            .with_base_tags(telemetry_tags([("application", "clinic-salon")]));

        telemetry.increment_counter("method.errors", 1, Some(&telemetry_tags([("class", "ClientService")])));
        telemetry.record_timer_ms("method.execution", 42, None);
        telemetry.set_gauge("circuit.state", 1.0, Some(&telemetry_tags([("token", "abc")])));

        let lines: Vec<Value> = sink
            .0
            .lock()
            .iter()
            .map(|line| serde_json::from_str(line.trim()))
            .collect::<Result<_, _>>()?;
        assert_eq!(lines.len(), 3);

        let counter = lines.first().ok_or("missing counter line")?;
        assert_eq!(counter.get("type"), Some(&Value::from("metric")));
        assert_eq!(counter.get("metricType"), Some(&Value::from("counter")));
        assert_eq!(counter.pointer("/tags/application"), Some(&Value::from("clinic-salon")));
        assert_eq!(counter.pointer("/tags/class"), Some(&Value::from("ClientService")));

        let timer = lines.get(1).ok_or("missing timer line")?;
        assert_eq!(timer.get("unit"), Some(&Value::from("ms")));
        assert_eq!(timer.get("value").and_then(Value::as_f64), Some(42.0));

        let gauge = lines.get(2).ok_or("missing gauge line")?;
        assert_eq!(gauge.pointer("/tags/token"), Some(&Value::from(REDACTED)));
        Ok(())
    }

    #[test]
    fn tagged_telemetry_adds_common_tags_and_lets_call_tags_win() {
        let inner = Arc::new(Capture::default());
        let tagged = TaggedTelemetry::new(
            inner.clone(),
            telemetry_tags([("application", "clinic-salon"), ("environment", "dev")]),
        );

        tagged.increment_counter("c", 1, Some(&telemetry_tags([("environment", "prod")])));
        tagged.register_gauge("g", None, Arc::new(|| 3.0));

        let captured = inner.0.lock();
        let (_, tags) = captured.first().cloned().unwrap_or_default();
        let tags = tags.unwrap_or_default();
        assert_eq!(tags.get("application").map(AsRef::as_ref), Some("clinic-salon"));
        assert_eq!(tags.get("environment").map(AsRef::as_ref), Some("prod"));
        assert_eq!(captured.len(), 2);
    }

    #[test]
    fn stopwatch_records_once() {
        let inner = Arc::new(Capture::default());
        let timer = StopwatchTimer::new(inner.clone(), "dependency.call", None);
        timer.stop();
        timer.stop();
        assert_eq!(inner.0.lock().len(), 1);
    }
}
