//! Tracks which monitored methods are active on the current call stack.
//!
//! A method that is already being recorded further up the stack must not be
//! recorded again by a nested wrapper of the same identity.

use clinic_monitor_domain::MethodId;
use std::cell::RefCell;
use std::future::Future;

thread_local! {
    static ACTIVE_SYNC: RefCell<Vec<MethodId>> = const { RefCell::new(Vec::new()) };
}

tokio::task_local! {
    static ACTIVE_ASYNC: Vec<MethodId>;
}

/// Returns true when `method` is being recorded by an enclosing wrapper.
pub(crate) fn is_active(method: &MethodId) -> bool {
    let in_task = ACTIVE_ASYNC
        .try_with(|active| active.contains(method))
        .unwrap_or(false);
    in_task
        || ACTIVE_SYNC
            .try_with(|active| active.borrow().contains(method))
            .unwrap_or(false)
}

/// Marks `method` active on this thread until dropped.
pub(crate) struct SyncScope {
    pushed: bool,
}

impl SyncScope {
    pub(crate) fn enter(method: &MethodId) -> Self {
        let pushed = ACTIVE_SYNC
            .try_with(|active| active.borrow_mut().push(method.clone()))
            .is_ok();
        Self { pushed }
    }
}

impl Drop for SyncScope {
    fn drop(&mut self) {
        if self.pushed {
            let _ = ACTIVE_SYNC.try_with(|active| active.borrow_mut().pop());
        }
    }
}

/// Run `future` with `method` marked active for the task.
pub(crate) async fn scope_async<F: Future>(method: &MethodId, future: F) -> F::Output {
    let mut active = ACTIVE_ASYNC.try_with(Clone::clone).unwrap_or_default();
    active.push(method.clone());
    ACTIVE_ASYNC.scope(active, future).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_monitor_domain::PrimitiveError;

    #[test]
    fn sync_scope_is_popped_on_drop() -> Result<(), PrimitiveError> {
        let method = MethodId::new("ClientService", "findClient")?;
        assert!(!is_active(&method));
        {
            let _scope = SyncScope::enter(&method);
            assert!(is_active(&method));
        }
        assert!(!is_active(&method));
        Ok(())
    }

    #[tokio::test]
    async fn async_scope_is_visible_inside_the_future_only() -> Result<(), PrimitiveError> {
        let method = MethodId::new("ReportService", "monthly")?;
        let other = MethodId::new("ReportService", "weekly")?;
        let seen = scope_async(&method, async { (is_active(&method), is_active(&other)) }).await;
        assert_eq!(seen, (true, false));
        assert!(!is_active(&method));
        Ok(())
    }
}
