use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cooperative cancellation token threaded through every fetch operation
/// (spec §5). Cheap to clone; every clone observes the same underlying flag.
#[derive(Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel` has been called (or immediately if it already has).
    pub async fn wait(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_resolves_after_cancel() {
        let flag = CancelFlag::new();
        let waiter = flag.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        flag.cancel();
        handle.await.unwrap();
        assert!(flag.is_cancelled());
    }

    #[tokio::test]
    async fn wait_returns_immediately_if_already_cancelled() {
        let flag = CancelFlag::new();
        flag.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(50), flag.wait())
            .await
            .expect("wait should not block once cancelled");
    }
}
