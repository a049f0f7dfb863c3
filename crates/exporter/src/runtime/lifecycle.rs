use std::future::Future;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// The process stop notification plus the handlers that must finish
/// before the process exits (closing listeners, unregistering services).
#[derive(Clone, Default)]
pub struct Lifecycle {
    stop: CancellationToken,
    handlers: TaskTracker,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancelled when shutdown begins.
    pub fn token(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Run `handler` exactly once, after shutdown begins.
    pub fn register<F, Fut>(&self, name: impl Into<String>, handler: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let stop = self.stop.clone();
        self.handlers.spawn(async move {
            stop.cancelled().await;
            info!("Running shutdown handler: {}", name);
            handler().await;
        });
    }

    /// Signal stop and wait for every registered handler. Safe to call
    /// more than once.
    pub async fn shutdown(&self) {
        self.stop.cancel();
        self.handlers.close();
        self.handlers.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_handlers_run_on_shutdown() {
        let lifecycle = Lifecycle::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for name in ["syslog", "registry"] {
            let calls = calls.clone();
            lifecycle.register(name, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        lifecycle.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(lifecycle.is_stopping());
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_slow_handler() {
        let lifecycle = Lifecycle::new();
        let done = Arc::new(AtomicUsize::new(0));

        let flag = done.clone();
        lifecycle.register("slow", move || async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(1, Ordering::SeqCst);
        });

        lifecycle.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let lifecycle = Lifecycle::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        lifecycle.register("once", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        lifecycle.shutdown().await;
        lifecycle.shutdown().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_observes_stop() {
        let lifecycle = Lifecycle::new();
        let token = lifecycle.token();
        assert!(!token.is_cancelled());
        lifecycle.shutdown().await;
        assert!(token.is_cancelled());
    }
}
