use std::future::Future;

use super::single_flight::SingleFlight;

/// Register key for the token refresh operation.
pub const REFRESH_OPERATION: &str = "refresh";

/// Ensures at most one token refresh is in flight per process.
///
/// Callers that arrive while a refresh is pending receive that refresh's
/// outcome. Failures are plain `false`; nothing is raised past this point.
#[derive(Clone, Default)]
pub struct RefreshGuard {
    flights: SingleFlight<&'static str, bool>,
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` as the refresh, or join the one already pending.
    pub async fn refresh<F, Fut>(&self, start: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.flights.run(REFRESH_OPERATION, start).await
    }

    pub fn in_flight(&self) -> bool {
        self.flights.in_flight(&REFRESH_OPERATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_five_callers_one_refresh_same_outcome() {
        let guard = RefreshGuard::new();
        let calls_made = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Notify::new());

        let callers = join_all((0..5).map(|_| {
            let calls_made = Arc::clone(&calls_made);
            let gate = Arc::clone(&gate);
            guard.refresh(move || {
                calls_made.fetch_add(1, Ordering::SeqCst);
                async move {
                    gate.notified().await;
                    false
                }
            })
        }));
        let release = async {
            tokio::task::yield_now().await;
            assert!(guard.in_flight());
            gate.notify_one();
        };
        let (outcomes, ()) = tokio::join!(callers, release);

        assert_eq!(calls_made.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes, vec![false; 5]);
        assert!(!guard.in_flight());
    }

    #[tokio::test]
    async fn test_refresh_after_failure_starts_new_attempt() {
        let guard = RefreshGuard::new();
        assert!(!guard.refresh(|| async { false }).await);
        assert!(guard.refresh(|| async { true }).await);
    }
}
