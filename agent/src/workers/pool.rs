//! Bounded-concurrency worker pool with timed graceful shutdown

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::errors::AgentError;

/// Worker pool options
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Maximum number of commands executing at once
    pub max_workers: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        // TODO: make pool sizing configurable through the settings file
        Self { max_workers: 16 }
    }
}

/// Runs submitted tasks on at most `max_workers` concurrent tokio tasks.
///
/// Submission is never rejected for being over capacity; excess tasks queue
/// on the semaphore. Only a pool that has begun shutting down rejects work.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    shutting_down: AtomicBool,
}

impl WorkerPool {
    /// Create a pool with `options.max_workers` permits
    pub fn new(options: PoolOptions) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(options.max_workers)),
            tasks: Mutex::new(JoinSet::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Submit a task for execution.
    ///
    /// Returns [`AgentError::PoolShutdown`] once shutdown has begun.
    pub async fn submit<F>(&self, task: F) -> Result<(), AgentError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AgentError::PoolShutdown);
        }

        let semaphore = Arc::clone(&self.semaphore);
        let mut tasks = self.tasks.lock().await;

        // Reap tasks that have already finished
        while tasks.try_join_next().is_some() {}

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            task.await;
        });

        Ok(())
    }

    /// Stop accepting work and wait up to `timeout` for in-flight tasks.
    ///
    /// Tasks still running when the timeout expires are left running; the
    /// pool never cancels them.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + timeout;
        let mut tasks = self.tasks.lock().await;

        info!(
            "Worker pool shutting down, waiting up to {:?} for {} submitted tasks",
            timeout,
            tasks.len()
        );

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => {
                    info!("All worker pool tasks have completed");
                    return;
                }
                Err(_) => {
                    warn!(
                        "Worker pool shutdown timed out with {} tasks still running",
                        tasks.len()
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn pool(max_workers: usize) -> WorkerPool {
        WorkerPool::new(PoolOptions { max_workers })
    }

    #[tokio::test]
    async fn test_runs_submitted_tasks() {
        let pool = pool(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = pool(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_submit_rejected_after_shutdown() {
        let pool = pool(1);
        pool.shutdown(Duration::from_millis(10)).await;

        let result = pool.submit(async {}).await;
        assert!(matches!(result, Err(AgentError::PoolShutdown)));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_all_in_flight_tasks() {
        // 16 tasks finishing well within the timeout must all be observed
        // before shutdown returns.
        let pool = pool(16);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..16 {
            let counter = counter.clone();
            pool.submit(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_does_not_cancel_tasks() {
        let pool = pool(1);
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        pool.submit(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap();

        pool.shutdown(Duration::from_millis(20)).await;
        assert!(!finished.load(Ordering::SeqCst));

        // The task keeps running to completion after the timeout
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
