//! Request-scoped context: correlation id plus cooperative cancellation.
//!
//! Cancellation is backed by `tokio_util`'s token. Cancelling a context aborts
//! retries and pending timeouts that were started with it; work already
//! running inside a remote call only stops if the call itself is dropped.

use crate::{ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use tokio_util::sync::CancellationToken;

/// A correlation identifier used for logging and telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl CorrelationId {
    /// Parse a caller-provided identifier. Surrounding whitespace is trimmed;
    /// empty values are rejected.
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                crate::ErrorCode::invalid_input(),
                "correlationId must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Allocate a process-unique `req_<n>` identifier.
    #[must_use]
    pub fn new_request_id() -> Self {
        let n = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("req_{n}")))
    }

    /// Borrow the identifier as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Request-scoped context passed across boundaries.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self::with_cancellation(correlation_id, CancellationToken::new())
    }

    /// Create a context with an auto-generated `req_*` id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::new_request_id())
    }

    /// Create a context sharing an existing cancellation token.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Derive a context that is cancelled with this one but can also be
    /// cancelled on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    /// Return the correlation id.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Return a clone of the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Returns true if the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel this request.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Resolve once the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Fail with a cancellation error tagged with `operation` when cancelled.
    pub fn ensure_not_cancelled(&self, operation: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation)
                .with_metadata("correlationId", self.correlation_id.as_str()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique_and_trimmed() -> Result<()> {
        let first = CorrelationId::new_request_id();
        let second = CorrelationId::new_request_id();
        assert_ne!(first, second);
        assert!(first.as_str().starts_with("req_"));

        assert_eq!(CorrelationId::parse("  abc ")?.as_str(), "abc");
        assert!(CorrelationId::parse("   ").is_err());
        Ok(())
    }

    #[test]
    fn child_context_follows_parent_cancellation() {
        let parent = RequestContext::new_request();
        let child = parent.child();
        assert!(child.ensure_not_cancelled("lookup").is_ok());

        parent.cancel();
        assert!(child.is_cancelled());
        let error = child.ensure_not_cancelled("lookup").err();
        assert!(error.is_some_and(|error| error.is_cancelled()));
    }

    #[test]
    fn cancelling_child_leaves_parent_running() {
        let parent = RequestContext::new_request();
        let child = parent.child();
        child.cancel();
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let ctx = RequestContext::new_request();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        ctx.cancel();
        assert!(task.await.is_ok());
    }
}
