//! Structured logger adapters: JSON lines and `tracing` forwarding.

use crate::log_sink::{LogSink, write_or_warn_once};
use clinic_monitor_ports::{LogEvent, LogFields, LogLevel, LoggerPort};
use clinic_monitor_shared::redaction::{REDACTED, is_secret_key};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{SystemTime, UNIX_EPOCH};

const SERIALIZE_FAILED_LINE: &str = "{\"timestampMs\":0,\"level\":\"error\",\"event\":\"logger.serialize_failed\",\"message\":\"log serialization failed\"}\n";

/// JSON logger emitting one line per event.
#[derive(Clone)]
pub struct JsonLogger {
    sink: Arc<dyn LogSink>,
    base_fields: LogFields,
    min_level: LogLevel,
    sink_warned: Arc<AtomicBool>,
}

impl JsonLogger {
    /// Create a JSON logger backed by the provided sink.
    #[must_use]
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            base_fields: LogFields::new(),
            min_level: LogLevel::Info,
            sink_warned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set base fields applied to every event.
    #[must_use]
    pub fn with_base_fields(mut self, fields: LogFields) -> Self {
        self.base_fields = fields;
        self
    }

    /// Set the minimum log level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }
}

impl LoggerPort for JsonLogger {
    fn log(&self, event: LogEvent) {
        if event.level < self.min_level {
            return;
        }

        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        redact_fields(&mut fields);

        let mut payload = serde_json::Map::new();
        payload.insert("timestampMs".to_owned(), Value::from(now_epoch_ms()));
        payload.insert("level".to_owned(), Value::from(event.level.as_str()));
        payload.insert("event".to_owned(), Value::from(event.event.as_ref()));
        payload.insert("message".to_owned(), Value::from(event.message.as_ref()));
        if !fields.is_empty() {
            payload.insert("fields".to_owned(), fields_to_json(fields));
        }
        if let Some(mut error) = event.error {
            redact_value(&mut error);
            payload.insert("error".to_owned(), error);
        }

        let line = serde_json::to_string(&Value::Object(payload)).map_or_else(
            |_| SERIALIZE_FAILED_LINE.to_owned(),
            |mut encoded| {
                encoded.push('\n');
                encoded
            },
        );
        write_or_warn_once(self.sink.as_ref(), &line, &self.sink_warned, "logger");
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            sink: Arc::clone(&self.sink),
            base_fields: merged,
            min_level: self.min_level,
            sink_warned: Arc::clone(&self.sink_warned),
        })
    }
}

/// Logger that forwards events to the `tracing` macros.
///
/// Fields and error payloads are rendered as JSON strings after redaction.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    base_fields: LogFields,
}

impl TracingLogger {
    /// Forwarding logger without base fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoggerPort for TracingLogger {
    fn log(&self, event: LogEvent) {
        let mut fields = self.base_fields.clone();
        fields.extend(event.fields.unwrap_or_default());
        redact_fields(&mut fields);
        let fields = if fields.is_empty() {
            String::new()
        } else {
            fields_to_json(fields).to_string()
        };
        let error = event
            .error
            .map(|mut error| {
                redact_value(&mut error);
                error.to_string()
            })
            .unwrap_or_default();
        let name = event.event.as_ref();
        let message = event.message.as_ref();

        match event.level {
            LogLevel::Debug => tracing::debug!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Info => tracing::info!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Warn => tracing::warn!(event = name, fields = %fields, error = %error, "{message}"),
            LogLevel::Error => tracing::error!(event = name, fields = %fields, error = %error, "{message}"),
        }
    }

    fn child(&self, fields: LogFields) -> Box<dyn LoggerPort> {
        let mut merged = self.base_fields.clone();
        merged.extend(fields);
        Box::new(Self {
            base_fields: merged,
        })
    }
}

fn fields_to_json(fields: LogFields) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.into_string(), value))
            .collect(),
    )
}

fn redact_fields(fields: &mut LogFields) {
    for (key, value) in fields.iter_mut() {
        if is_secret_key(key) {
            *value = Value::from(REDACTED);
        } else {
            redact_value(value);
        }
    }
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map.iter_mut() {
                if is_secret_key(key) {
                    *nested = Value::from(REDACTED);
                } else {
                    redact_value(nested);
                }
            }
        },
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {},
    }
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
    use clinic_monitor_ports::log_fields;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct LinesSink(Mutex<Vec<String>>);

    impl LinesSink {
        fn parsed(&self) -> Result<Vec<Value>, serde_json::Error> {
            self.0
                .lock()
                .iter()
                .map(|line| serde_json::from_str(line.trim()))
                .collect()
        }
    }

    impl LogSink for LinesSink {
        fn write_line(&self, line: &str) -> std::io::Result<()> {
            self.0.lock().push(line.to_owned());
            Ok(())
        }
    }

    #[test]
    fn json_logger_redacts_secret_fields_and_error_payloads() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(LinesSink::default());
        let logger = JsonLogger::new(sink.clone());

        logger.log(
            LogEvent::new(LogLevel::Error, "method.failed.alert", "payment failed")
                .with_fields(Some(log_fields([
                    ("class", json!("FinanceService")),
                    ("password", json!("hunter2")), // pragma: allowlist secret
                    ("args", json!([{ "cardToken": "tok_123", "amount": 90 }])),
                ])))
                .with_error(json!({ "message": "declined", "apiKey": "k" })), // pragma: allowlist secret
        );

        let lines = sink.parsed()?;
        let line = lines.first().ok_or("missing line")?;
        assert_eq!(line.get("level"), Some(&json!("error")));
        assert_eq!(line.pointer("/fields/class"), Some(&json!("FinanceService")));
        assert_eq!(line.pointer("/fields/password"), Some(&json!(REDACTED)));
        assert_eq!(line.pointer("/fields/args/0/cardToken"), Some(&json!(REDACTED)));
        assert_eq!(line.pointer("/fields/args/0/amount"), Some(&json!(90)));
        assert_eq!(line.pointer("/error/apiKey"), Some(&json!(REDACTED)));
        Ok(())
    }

    #[test]
    fn events_below_min_level_are_dropped() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(LinesSink::default());
        let logger = JsonLogger::new(sink.clone()).with_min_level(LogLevel::Warn);

        logger.info("method.invoked", "skipped", None);
        logger.warn("method.threshold_exceeded", "kept", None);

        let lines = sink.parsed()?;
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines.first().and_then(|line| line.get("event")),
            Some(&json!("method.threshold_exceeded"))
        );
        Ok(())
    }

    #[test]
    fn child_logger_merges_base_fields() -> Result<(), Box<dyn std::error::Error>> {
        let sink = Arc::new(LinesSink::default());
        let logger = JsonLogger::new(sink.clone())
            .with_base_fields(log_fields([("application", json!("clinic-salon"))]));

        let child = logger.child(log_fields([("dependency", json!("loyalty-service"))]));
        child.info("circuit.transition", "closed", None);

        let lines = sink.parsed()?;
        let line = lines.first().ok_or("missing line")?;
        assert_eq!(line.pointer("/fields/application"), Some(&json!("clinic-salon")));
        assert_eq!(line.pointer("/fields/dependency"), Some(&json!("loyalty-service")));
        Ok(())
    }

    #[test]
    fn tracing_logger_accepts_every_level() {
        let logger = TracingLogger::new();
        let child = logger.child(log_fields([("region", json!("clients"))]));
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            child.log(LogEvent::new(level, "cache.report", "report"));
        }
    }
}
