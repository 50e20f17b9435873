// src/core/deadline.rs — Deadline-bounded model calls on a bounded pool
//
// Every external call goes through here. Futures are driven in place and
// dropped on expiry or cancellation, so nothing keeps running in the
// background and the pool permit is released immediately.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::infra::errors::ArcherError;

/// Tagged result of a deadline-bounded call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Ok(T),
    TimedOut,
    Failed(ArcherError),
}

impl<T> CallOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutcome::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            CallOutcome::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Collapse into a `Result`, naming the operation in the timeout error.
    pub fn into_result(self, operation: &str, timeout: Duration) -> Result<T, ArcherError> {
        match self {
            CallOutcome::Ok(v) => Ok(v),
            CallOutcome::TimedOut => Err(ArcherError::Timeout {
                operation: operation.to_string(),
                seconds: timeout.as_secs(),
            }),
            CallOutcome::Failed(e) => Err(e),
        }
    }

    /// Value on success, `fallback` otherwise. Logs the miss.
    pub fn unwrap_or_log(self, operation: &str, fallback: T) -> T {
        match self {
            CallOutcome::Ok(v) => v,
            CallOutcome::TimedOut => {
                tracing::warn!(operation, "Timed out, using fallback value");
                fallback
            }
            CallOutcome::Failed(e) => {
                tracing::warn!(operation, error = %e, "Failed, using fallback value");
                fallback
            }
        }
    }
}

/// Run `fut` with a hard deadline.
pub async fn call_with_deadline<T, F>(timeout: Duration, fut: F) -> CallOutcome<T>
where
    F: Future<Output = Result<T, ArcherError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(v)) => CallOutcome::Ok(v),
        Ok(Err(e)) => CallOutcome::Failed(e),
        Err(_) => CallOutcome::TimedOut,
    }
}

/// Bounded concurrency for model calls, with a shared cancellation token.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie this pool to an external token (e.g. a shutdown signal).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for a slot, then run `fut` under `timeout`. The deadline starts
    /// once the call actually runs, not while it queues.
    pub async fn run<T, F>(&self, timeout: Duration, fut: F) -> CallOutcome<T>
    where
        F: Future<Output = Result<T, ArcherError>>,
    {
        if self.cancel.is_cancelled() {
            return CallOutcome::Failed(ArcherError::Cancelled);
        }

        let _permit = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(p) => p,
                Err(_) => return CallOutcome::Failed(ArcherError::Cancelled),
            },
            _ = self.cancel.cancelled() => return CallOutcome::Failed(ArcherError::Cancelled),
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => CallOutcome::Failed(ArcherError::Cancelled),
            outcome = call_with_deadline(timeout, fut) => outcome,
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_call_ok() {
        let out = call_with_deadline(Duration::from_secs(1), async { Ok::<_, ArcherError>(7) }).await;
        assert!(matches!(out, CallOutcome::Ok(7)));
    }

    #[tokio::test]
    async fn test_call_failed() {
        let out = call_with_deadline(Duration::from_secs(1), async {
            Err::<u8, _>(ArcherError::Parse("bad".into()))
        })
        .await;
        assert!(matches!(out, CallOutcome::Failed(ArcherError::Parse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let out = call_with_deadline(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, ArcherError>(())
        })
        .await;
        assert!(matches!(out, CallOutcome::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_future_is_dropped() {
        struct DropFlag(Arc<AtomicUsize>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let flag = DropFlag(dropped.clone());
        let out = call_with_deadline(Duration::from_secs(1), async move {
            let _flag = flag;
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ArcherError>(())
        })
        .await;
        assert!(matches!(out, CallOutcome::TimedOut));
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_into_result_maps_timeout() {
        let out: CallOutcome<()> = CallOutcome::TimedOut;
        let err = out
            .into_result("rewrite", Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, ArcherError::Timeout { seconds: 60, .. }));
    }

    #[test]
    fn test_unwrap_or_log_uses_fallback() {
        let out: CallOutcome<String> = CallOutcome::Failed(ArcherError::Cancelled);
        assert_eq!(out.unwrap_or_log("test", "orig".into()), "orig");
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = WorkerPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..6).map(|_| {
            let running = running.clone();
            let peak = peak.clone();
            pool.run(Duration::from_secs(5), async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, ArcherError>(())
            })
        });
        let outcomes = futures::future::join_all(tasks).await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_pool_refuses_work() {
        let pool = WorkerPool::new(1);
        pool.cancellation_token().cancel();
        let out = pool
            .run(Duration::from_secs(1), async { Ok::<_, ArcherError>(1) })
            .await;
        assert!(matches!(out, CallOutcome::Failed(ArcherError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_in_flight_call() {
        let token = CancellationToken::new();
        let pool = WorkerPool::new(1).with_cancellation(token.clone());

        let call = pool.run(Duration::from_secs(60), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, ArcherError>(())
        });
        let cancel = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        };
        let (out, _) = tokio::join!(call, cancel);
        assert!(matches!(out, CallOutcome::Failed(ArcherError::Cancelled)));
    }
}
