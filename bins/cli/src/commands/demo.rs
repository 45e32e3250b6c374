//! Demo command handler: builds the monitoring runtime from config and runs
//! the scripted booking scenario against it.

use crate::error::{CliError, ExitCode};
use crate::format::OutputMode;
use crate::{CliOutput, format_error_output, format_ndjson_summary, log_info};
use clinic_monitor_infra::{
    DemoOptions, DemoOutcome, MonitoringRuntime, RuntimeOptions, load_effective_config, run_demo,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// Inputs of the demo command.
#[derive(Debug, Clone, Copy)]
pub struct DemoArgs<'a> {
    pub path: Option<&'a Path>,
    pub overrides_json: Option<&'a str>,
    pub calls: u32,
    pub failures: u32,
}

/// Run the scenario on a fresh current-thread runtime.
pub fn run_demo_with_env(
    mode: OutputMode,
    env: &BTreeMap<String, String>,
    args: DemoArgs<'_>,
) -> Result<CliOutput, CliError> {
    if args.calls == 0 {
        return Err(CliError::InvalidInput("--calls must be at least 1".to_string()));
    }
    let config = match load_effective_config(env, args.path, args.overrides_json) {
        Ok(config) => config,
        Err(error) => return Ok(format_error_output(mode, &error, ExitCode::InvalidInput)),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let options = DemoOptions {
        calls: args.calls,
        failures: args.failures,
    };
    let outcome = runtime.block_on(async {
        let monitoring = MonitoringRuntime::from_config(&config, RuntimeOptions::default())?;
        monitoring.start_reporter();
        let outcome = run_demo(&monitoring, options).await;
        monitoring.shutdown().await;
        outcome
    });
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(error) => {
            let exit_code = ExitCode::for_infra(&error);
            return Ok(format_error_output(mode, &error, exit_code));
        },
    };

    let mut stderr = String::new();
    log_info(&mut stderr, "demo completed", mode.no_progress);

    let stdout = if mode.is_ndjson() {
        format_ndjson_summary("ok", "demo", Some(serde_json::to_value(&outcome)?))
    } else if mode.is_json() {
        let payload = serde_json::json!({ "status": "ok", "demo": outcome });
        let mut output = serde_json::to_string_pretty(&payload)?;
        output.push('\n');
        output
    } else {
        format_demo_text(&outcome)
    };

    Ok(CliOutput {
        stdout,
        stderr,
        exit_code: ExitCode::Ok,
    })
}

fn format_demo_text(outcome: &DemoOutcome) -> String {
    let mut out = format!(
        "status: ok\ncalls: {}\nbooked: {}\nslotConflicts: {}\npayments: {} live, {} fallback\n",
        outcome.calls,
        outcome.booked,
        outcome.slot_conflicts,
        outcome.live_payments,
        outcome.fallback_payments,
    );

    out.push_str("breakers:\n");
    for breaker in &outcome.snapshot.breakers {
        let _ = writeln!(out, "  {}: {}", breaker.dependency, breaker.state);
    }
    out.push_str("caches:\n");
    for region in &outcome.snapshot.caches {
        let _ = writeln!(
            out,
            "  {}: size={} hits={} misses={} hitRatio={:.2}",
            region.region,
            region.size,
            region.hits,
            region.misses,
            region.hit_ratio(),
        );
    }
    let _ = writeln!(out, "series: {}", outcome.snapshot.metrics.len());
    out
}
