//! Background task that calls [`CacheMonitor::report_now`] on a fixed period.

use super::monitor::CacheMonitor;
use clinic_monitor_shared::CancellationToken;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle of a running reporter.
pub struct PeriodicReporter {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PeriodicReporter {
    /// Spawn a reporter on the current tokio runtime.
    ///
    /// The first report happens one full `period` after spawning.
    #[must_use]
    pub fn spawn(monitor: Arc<CacheMonitor>, period: Duration) -> Self {
        Self::spawn_with_token(monitor, period, CancellationToken::new())
    }

    /// Spawn a reporter that also stops when `token` is cancelled.
    #[must_use]
    pub fn spawn_with_token(
        monitor: Arc<CacheMonitor>,
        period: Duration,
        token: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(monitor, period, token.clone()));
        Self { token, handle }
    }

    /// Returns true once the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(error) = self.handle.await {
            tracing::warn!(%error, "cache reporter task ended abnormally");
        }
    }
}

async fn run(monitor: Arc<CacheMonitor>, period: Duration, token: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    let mut fault_reported = false;
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| monitor.report_now()));
                if outcome.is_err() && !fault_reported {
                    fault_reported = true;
                    tracing::error!("cache report failed; reporter keeps running");
                }
            }
        }
    }
    tracing::debug!("cache reporter stopped");
}
