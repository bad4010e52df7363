//! Deferred work scheduler
//!
//! Off-hot-path work (post-boot configuration push, smart-charging
//! recomputation after stop) is submitted here with an explicit delay.
//! Concurrency is bounded by a semaphore and everything drains on shutdown
//! instead of being dropped mid-flight.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, warn};

use super::shutdown::ShutdownSignal;

/// Bounded-concurrency scheduler for delayed background tasks.
#[derive(Clone)]
pub struct DeferredScheduler {
    semaphore: Arc<Semaphore>,
    shutdown: ShutdownSignal,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl DeferredScheduler {
    pub fn new(max_concurrency: usize, shutdown: ShutdownSignal) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            shutdown,
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Submit a task to run after `delay`. The task is skipped (not queued)
    /// when shutdown fires before the delay elapses.
    pub fn submit_after<F>(&self, delay: Duration, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let shutdown = self.shutdown.clone();
        let in_flight = self.in_flight.clone();
        let drained = self.drained.clone();

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let run = async {
                tokio::time::sleep(delay).await;
                let _permit = match semaphore.acquire().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                debug!(label, "Running deferred task");
                task.await;
            };

            tokio::select! {
                _ = run => {}
                _ = shutdown.wait() => {
                    warn!(label, "Deferred task skipped by shutdown");
                }
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }

    /// Number of tasks not yet finished (delayed, queued, or running).
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until every submitted task finished or was skipped, or the
    /// timeout elapses.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            let notified = self.drained.notified();
            if self.in_flight() == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.in_flight() == 0;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn runs_task_after_delay() {
        let scheduler = DeferredScheduler::new(4, ShutdownSignal::new());
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.submit_after(Duration::from_millis(10), "test", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(scheduler.drain(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_skips_delayed_task() {
        let shutdown = ShutdownSignal::new();
        let scheduler = DeferredScheduler::new(4, shutdown.clone());
        let counter = Arc::new(AtomicU32::new(0));

        let c = counter.clone();
        scheduler.submit_after(Duration::from_secs(60), "never", async move {
            c.fetch_add(1, Ordering::SeqCst);
        });

        shutdown.trigger();
        assert!(scheduler.drain(Duration::from_secs(1)).await);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let scheduler = DeferredScheduler::new(1, ShutdownSignal::new());
        let peak = Arc::new(AtomicU32::new(0));
        let running = Arc::new(AtomicU32::new(0));

        for _ in 0..4 {
            let peak = peak.clone();
            let running = running.clone();
            scheduler.submit_after(Duration::from_millis(1), "bounded", async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }

        assert!(scheduler.drain(Duration::from_secs(2)).await);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
