//! Bounded retry with a fixed delay between attempts.
//!
//! Only errors classified [`ErrorClass::Retriable`](crate::ErrorClass) are
//! attempted again. Whether an operation may be retried at all (idempotency)
//! is decided by the caller.

use crate::{ErrorEnvelope, RequestContext, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first try.
    pub max_attempts: u32,
    /// Delay before every retry, in milliseconds.
    pub delay_ms: u64,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    #[must_use]
    pub const fn single_attempt() -> Self {
        Self::fixed(1, 0)
    }

    /// `max_attempts` attempts separated by a constant delay.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        Self {
            max_attempts,
            delay_ms,
        }
    }

    /// Delay to wait after a failed attempt.
    #[must_use]
    pub const fn delay(self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Retry a fallible async operation.
pub async fn retry_async<T, F, Fut>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_async_with_observer(ctx, policy, operation, &mut op, |_, _| {}).await
}

/// Retry with a callback invoked before each new attempt.
///
/// The callback receives the number of the attempt that just failed and its
/// error. Non-retriable errors come back exactly as the operation produced
/// them; a retriable error that exhausts the policy carries an `attempts`
/// metadata entry.
pub async fn retry_async_with_observer<T, F, Fut, Obs>(
    ctx: &RequestContext,
    policy: RetryPolicy,
    operation: &str,
    op: &mut F,
    mut on_retry: Obs,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Obs: FnMut(u32, &ErrorEnvelope),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        ctx.ensure_not_cancelled(operation)?;

        let error = match op().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        if !error.class.is_retriable() {
            return Err(error);
        }
        if attempt >= max_attempts {
            return Err(error.with_metadata("attempts", attempt.to_string()));
        }

        on_retry(attempt, &error);
        let delay = policy.delay();
        if !delay.is_zero() {
            tokio::select! {
                () = ctx.cancelled() => {
                    return Err(ErrorEnvelope::cancelled("operation cancelled")
                        .with_metadata("operation", operation));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
