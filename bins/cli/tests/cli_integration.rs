//! CLI integration tests.

use clinic_monitor_testkit::fixtures::fixture_path;
use std::process::Command;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn run_cli(args: &[&str]) -> std::io::Result<std::process::Output> {
    let mut command = Command::new(env!("CARGO_BIN_EXE_clinic-monitor"));
    command.args(args);
    for (key, _) in std::env::vars() {
        if key.starts_with("CLINIC_MONITOR_") {
            command.env_remove(key);
        }
    }
    command.output()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Result<serde_json::Value> {
    serde_json::from_slice(&output.stdout)
}

#[test]
fn info_json_has_build_details() -> TestResult {
    let output = run_cli(&["--output", "json", "info"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["status"], "ok");
    assert_eq!(value["build"]["name"], "clinic-monitor-cli");
    Ok(())
}

#[test]
fn config_check_accepts_the_valid_fixture() -> TestResult {
    let path = fixture_path("config/monitoring.valid.json");
    let output = run_cli(&[
        "--no-progress",
        "config",
        "check",
        "--path",
        path.to_str().ok_or("non-utf8 fixture path")?,
    ])?;
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)?.starts_with("status: ok\nconfig: ok\n"));
    Ok(())
}

#[test]
fn config_check_rejects_the_invalid_fixture() -> TestResult {
    let path = fixture_path("config/monitoring.invalid.json");
    let output = run_cli(&[
        "--output",
        "ndjson",
        "config",
        "check",
        "--path",
        path.to_str().ok_or("non-utf8 fixture path")?,
    ])?;
    assert_eq!(output.status.code(), Some(2));

    let value = stdout_json(&output)?;
    assert_eq!(value["type"], "error");
    assert_eq!(value["error"]["kind"], "expected");
    Ok(())
}

#[test]
fn env_overrides_reach_the_effective_config() -> TestResult {
    let output = Command::new(env!("CARGO_BIN_EXE_clinic-monitor"))
        .args(["--output", "json", "config", "show"])
        .env("CLINIC_MONITOR_APPLICATION_NAME", "salon-north")
        .output()?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert_eq!(value["effectiveConfig"]["application"]["name"], "salon-north");
    Ok(())
}

#[test]
fn schema_is_valid_json() -> TestResult {
    let output = run_cli(&["config", "schema"])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    assert!(value["properties"]["resilience"].is_object());
    Ok(())
}

#[test]
fn demo_reports_fallbacks_and_an_open_gateway() -> TestResult {
    let output = run_cli(&[
        "--output",
        "json",
        "--no-progress",
        "demo",
        "--calls",
        "10",
        "--failures",
        "3",
        "--overrides-json",
        r#"{"registry":{"export":{"enabled":false}}}"#,
    ])?;
    assert!(output.status.success());

    let value = stdout_json(&output)?;
    let demo = &value["demo"];
    assert_eq!(demo["booked"], 9);
    assert_eq!(demo["fallbackPayments"], 7);

    let breakers = demo["snapshot"]["breakers"]
        .as_array()
        .ok_or("breakers should be an array")?;
    assert_eq!(breakers.len(), 1);
    assert_eq!(breakers[0]["dependency"], "payment-gateway");
    assert_eq!(breakers[0]["state"], "OPEN");
    Ok(())
}
