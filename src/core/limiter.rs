use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::constants::SEMAPHORE_CLOSED_ERR;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("No execution slot became free within {waited_ms}ms")]
    QueueTimeout { waited_ms: u64 },
}

/// Bounds how many units of work run at once.
///
/// Backed by a fair semaphore: callers that find every slot taken wait in
/// arrival order and are admitted one per released slot. The slot is held
/// by a permit guard, so it is returned however the work ends, including
/// errors, panics and cancellation of the caller.
#[derive(Debug)]
pub struct ExecutionLimiter {
    permits: Semaphore,
    max: usize,
    queued: AtomicUsize,
    queue_timeout: Option<Duration>,
}

impl ExecutionLimiter {
    pub fn new(max: NonZeroUsize) -> Self {
        Self {
            permits: Semaphore::new(max.get()),
            max: max.get(),
            queued: AtomicUsize::new(0),
            queue_timeout: None,
        }
    }

    /// Queued callers that wait longer than `timeout` give up with
    /// [`AdmissionError::QueueTimeout`] without running their work.
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn running(&self) -> usize {
        self.max - self.permits.available_permits()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub async fn admit<F, Fut>(&self, work: F) -> Result<Fut::Output, AdmissionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _permit = self.acquire().await?;
        tracing::info!(
            running = self.running(),
            queued = self.queued(),
            "Admitted"
        );

        Ok(work().await)
    }

    async fn acquire(&self) -> Result<SemaphorePermit<'_>, AdmissionError> {
        // Permits go straight to waiters on release, so this never jumps the queue.
        if let Ok(permit) = self.permits.try_acquire() {
            return Ok(permit);
        }

        let _waiting = QueueSlot::enter(&self.queued);
        let started = Instant::now();
        tracing::debug!(queued = self.queued(), "All execution slots busy, queueing");

        let permit = match self.queue_timeout {
            Some(limit) => tokio::time::timeout(limit, self.permits.acquire())
                .await
                .map_err(|_| {
                    let waited_ms = started.elapsed().as_millis() as u64;
                    tracing::warn!(waited_ms, "Gave up waiting for an execution slot");
                    AdmissionError::QueueTimeout { waited_ms }
                })?,
            None => self.permits.acquire().await,
        };

        Ok(permit.expect(SEMAPHORE_CLOSED_ERR))
    }
}

/// Counts a caller as queued for as long as it is alive.
struct QueueSlot<'a>(&'a AtomicUsize);

impl<'a> QueueSlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::AtomicBool;

    fn limiter(max: usize) -> Arc<ExecutionLimiter> {
        Arc::new(ExecutionLimiter::new(NonZeroUsize::new(max).unwrap()))
    }

    async fn settle() {
        for _ in 0..100 {
            tokio::task::yield_now().await;
        }
    }

    /// Spawns a unit of work that holds its slot until `gate` gets a permit.
    fn spawn_gated(
        limiter: &Arc<ExecutionLimiter>,
        gate: &Arc<Semaphore>,
    ) -> tokio::task::JoinHandle<Result<(), AdmissionError>> {
        let limiter = limiter.clone();
        let gate = gate.clone();
        tokio::spawn(async move {
            limiter
                .admit(|| async move {
                    gate.acquire().await.unwrap().forget();
                })
                .await
        })
    }


    #[test]
    fn test_queue_timeout_message() {
        let error = AdmissionError::QueueTimeout { waited_ms: 50 };

        match &error {
            AdmissionError::QueueTimeout { waited_ms } => assert_eq!(*waited_ms, 50),
        }
        assert_eq!(error.to_string(), "No execution slot became free within 50ms");
    }

    #[tokio::test]
    async fn test_burst_within_bound_runs_immediately() {
        let limiter = limiter(3);
        let gate = Arc::new(Semaphore::new(0));

        let handles: Vec<_> = (0..3).map(|_| spawn_gated(&limiter, &gate)).collect();
        settle().await;

        assert_eq!(limiter.running(), 3);
        assert_eq!(limiter.queued(), 0);

        gate.add_permits(3);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_excess_work_is_queued_and_admitted_one_per_release() {
        let limiter = limiter(2);
        let gate = Arc::new(Semaphore::new(0));

        let handles: Vec<_> = (0..5).map(|_| spawn_gated(&limiter, &gate)).collect();
        settle().await;

        assert_eq!(limiter.running(), 2);
        assert_eq!(limiter.queued(), 3);

        for remaining in (0..3).rev() {
            gate.add_permits(1);
            settle().await;
            assert_eq!(limiter.running(), 2);
            assert_eq!(limiter.queued(), remaining);
        }

        gate.add_permits(2);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(()));
        }
        assert_eq!(limiter.running(), 0);
        assert_eq!(limiter.queued(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_bound_under_parallel_load() {
        let limiter = limiter(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|_| {
            let limiter = limiter.clone();
            let current = current.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                limiter
                    .admit(|| async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            })
        });

        for result in futures::future::join_all(tasks).await {
            assert_eq!(result.unwrap(), Ok(()));
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_queued_work_is_admitted_in_arrival_order() {
        let limiter = limiter(1);
        let gate = Arc::new(Semaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let occupant = spawn_gated(&limiter, &gate);
        settle().await;

        let mut handles = Vec::new();
        for (position, name) in ["A", "B", "C"].into_iter().enumerate() {
            let queued_limiter = limiter.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queued_limiter
                    .admit(|| async move {
                        order.lock().unwrap().push(name);
                    })
                    .await
            }));

            while limiter.queued() < position + 1 {
                tokio::task::yield_now().await;
            }
        }

        gate.add_permits(1);
        occupant.await.unwrap().unwrap();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_slot_released_when_work_fails() {
        let limiter = limiter(1);

        let failed = limiter.admit(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(failed, Ok(Err("boom")));
        assert_eq!(limiter.running(), 0);

        let next = limiter.admit(|| async { 42 }).await;
        assert_eq!(next, Ok(42));
    }

    #[tokio::test]
    async fn test_slot_released_when_work_panics() {
        let limiter = limiter(1);
        let gate = Arc::new(Semaphore::new(0));

        let panicking = {
            let limiter = limiter.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                limiter
                    .admit(|| async move {
                        gate.acquire().await.unwrap().forget();
                        panic!("work panicked");
                    })
                    .await
            })
        };
        settle().await;

        let waiting = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.admit(|| async { "admitted" }).await })
        };
        settle().await;
        assert_eq!(limiter.queued(), 1);

        gate.add_permits(1);
        assert!(panicking.await.unwrap_err().is_panic());
        assert_eq!(waiting.await.unwrap(), Ok("admitted"));
        assert_eq!(limiter.running(), 0);
    }

    #[tokio::test]
    async fn test_queue_timeout_rejects_without_running_work() {
        let limiter = Arc::new(
            ExecutionLimiter::new(NonZeroUsize::new(1).unwrap())
                .with_queue_timeout(Duration::from_millis(20)),
        );
        let gate = Arc::new(Semaphore::new(0));
        let occupant = spawn_gated(&limiter, &gate);
        settle().await;

        let ran = AtomicBool::new(false);
        let result = limiter
            .admit(|| async {
                ran.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(result, Err(AdmissionError::QueueTimeout { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(limiter.queued(), 0);

        gate.add_permits(1);
        occupant.await.unwrap().unwrap();
        assert_eq!(limiter.running(), 0);
    }
}
