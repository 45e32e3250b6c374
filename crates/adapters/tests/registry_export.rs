// Allow missing docs in integration test.
#![allow(missing_docs, reason = "integration test")]

use clinic_monitor_adapters::{
    InMemoryMetricsRegistry, JsonTelemetry, LogSink, MemoryCacheStore, SystemClock,
    TaggedTelemetry,
};
use clinic_monitor_ports::{
    CacheStorePort, MetricsQueryPort, SeriesQuery, TelemetryPort, telemetry_tags,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct LinesSink(Mutex<Vec<String>>);

impl LogSink for LinesSink {
    fn write_line(&self, line: &str) -> std::io::Result<()> {
        self.0.lock().push(line.to_owned());
        Ok(())
    }
}

#[test]
fn tagged_registry_stores_and_exports_every_write() -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(LinesSink::default());
    let exporter = Arc::new(JsonTelemetry::new(sink.clone()));
    let registry = InMemoryMetricsRegistry::with_exporter(100, exporter);
    let telemetry = TaggedTelemetry::new(
        Arc::new(registry.clone()),
        telemetry_tags([("application", "clinic-salon"), ("environment", "dev")]),
    );

    let tags = telemetry_tags([
        ("class", "AppointmentService"),
        ("method", "scheduleAppointment"),
        ("layer", "service"),
        ("status", "success"),
    ]);
    telemetry.record_timer_ms("method.execution", 120, Some(&tags));
    telemetry.record_timer_ms("method.execution", 80, Some(&tags));

    let series = SeriesQuery::named("method.execution")
        .tag("application", "clinic-salon")
        .tag("status", "success")
        .run(&registry);
    let timer = series.first().and_then(|series| series.timer()).ok_or("missing timer")?;
    assert_eq!(timer.count, 2);
    assert!((timer.mean_ms() - 100.0).abs() < f64::EPSILON);

    let lines = sink.0.lock().clone();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines.first().ok_or("no line")?.trim())?;
    assert_eq!(first.pointer("/tags/environment"), Some(&serde_json::json!("dev")));
    assert_eq!(registry.snapshot().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn memory_store_expires_with_the_runtime_clock() -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryCacheStore::new(5, Duration::from_secs(300), Arc::new(SystemClock::new()))?;
    store.put("payment:42", "PAID".to_owned());

    tokio::time::advance(Duration::from_secs(299)).await;
    assert_eq!(store.get("payment:42").as_deref(), Some("PAID"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(store.get("payment:42"), None);
    Ok(())
}
