//! Dispatch loops and the worker pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::job::Job;
use crate::retry::RetryPolicy;
use crate::runner::CommandRunner;
use crate::store::JobStore;

/// Per-worker loop configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between claim attempts when nothing is pending (or the store
    /// is unavailable). Keeps the error path from busy-spinning.
    pub poll_interval: Duration,

    pub retry: RetryPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

/// Worker pool handle.
/// - `request_shutdown()` stops the loops from taking new claims.
/// - `shutdown_and_join()` additionally waits for them to finish.
///
/// Shutdown does not cancel an in-flight command; the loop applies its
/// outcome and then exits. The pool holds no state shared between loops
/// beyond the store itself.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Launch `count` independent dispatch loops, with worker ids 1..=count.
    pub fn spawn(
        count: usize,
        store: Arc<dyn JobStore>,
        runner: Arc<dyn CommandRunner>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(count);
        for worker_id in 1..=count {
            let store = Arc::clone(&store);
            let runner = Arc::clone(&runner);
            let config = config.clone();
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                dispatch_loop(worker_id, store, runner, config, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

/// One worker's claim-execute-update cycle. Runs until shutdown.
async fn dispatch_loop(
    worker_id: usize,
    store: Arc<dyn JobStore>,
    runner: Arc<dyn CommandRunner>,
    config: WorkerConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let job = match store.claim_next_pending().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                if sleep_or_shutdown(shutdown_rx, config.poll_interval).await {
                    break;
                }
                continue;
            }
            Err(err) => {
                // Transient store trouble: log and retry after the poll
                // interval. The loop never gives up.
                tracing::warn!(worker_id, %err, "claim failed");
                if sleep_or_shutdown(shutdown_rx, config.poll_interval).await {
                    break;
                }
                continue;
            }
        };

        run_claimed_job(worker_id, &store, &*runner, &config, job).await;
    }
    tracing::debug!(worker_id, "worker stopped");
}

/// Execute one claimed job and apply its outcome.
async fn run_claimed_job(
    worker_id: usize,
    store: &Arc<dyn JobStore>,
    runner: &dyn CommandRunner,
    config: &WorkerConfig,
    mut job: Job,
) {
    tracing::info!(worker_id, job_id = %job.id, "executing job");

    match runner.run(&job.command).await {
        Ok(()) => {
            job.complete();
            tracing::info!(worker_id, job_id = %job.id, "job completed");
            persist(&**store, &job).await;
        }
        Err(error) => {
            let dead = job.record_failure(error);
            if dead {
                tracing::warn!(
                    worker_id,
                    job_id = %job.id,
                    attempts = job.attempts,
                    "retry budget exhausted, job moved to dead letter"
                );
                persist(&**store, &job).await;
            } else {
                let delay = config.retry.next_delay(job.attempts);
                tracing::info!(
                    worker_id,
                    job_id = %job.id,
                    attempts = job.attempts,
                    delay_ms = delay.as_millis() as u64,
                    "job failed, retry scheduled"
                );
                // Persist the failed state first, so the re-activation write
                // can never be overwritten by it.
                if persist(&**store, &job).await {
                    schedule_reactivation(Arc::clone(store), job, delay);
                }
            }
        }
    }
}

/// Write a job back, logging instead of crashing the loop on failure.
async fn persist(store: &dyn JobStore, job: &Job) -> bool {
    match store.update(job).await {
        Ok(()) => true,
        Err(err) => {
            tracing::error!(job_id = %job.id, %err, "failed to persist job state");
            false
        }
    }
}

/// Re-activate a failed job after its backoff delay.
///
/// Runs as a detached task so the timer fires independently of the dispatch
/// loop that scheduled it, while other workers keep draining the pending
/// pool. A process restart drops in-flight timers; with the in-memory store
/// the jobs are gone with them anyway.
fn schedule_reactivation(store: Arc<dyn JobStore>, mut job: Job, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        job.requeue();
        if let Err(err) = store.update(&job).await {
            tracing::error!(job_id = %job.id, %err, "failed to re-activate job");
        }
    });
}

/// Sleep for `interval`, returning early (and true) on shutdown.
///
/// The pool only ever sends `true`, and a dropped sender also means the
/// pool is gone, so any wakeup on the channel is a shutdown.
async fn sleep_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        _ = shutdown_rx.changed() => true,
        _ = tokio::time::sleep(interval) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::job::JobState;
    use crate::store::InMemoryStore;

    /// Fails the first `n` runs, then succeeds.
    struct FlakyRunner {
        remaining_failures: AtomicU32,
    }

    impl FlakyRunner {
        fn new(n: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(n),
            }
        }

        fn always_failing() -> Self {
            Self::new(u32::MAX)
        }
    }

    #[async_trait]
    impl CommandRunner for FlakyRunner {
        async fn run(&self, _command: &str) -> Result<(), String> {
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(format!("intentional failure (left={left})"));
            }
            Ok(())
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval: Duration::from_millis(10),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                multiplier: 2.0,
                max_delay: Duration::from_millis(50),
            },
        }
    }

    async fn wait_terminal(store: &Arc<InMemoryStore>, id: &str) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let jobs = store.find(None).await.unwrap();
                if let Some(job) = jobs.iter().find(|j| j.id == id)
                    && job.state.is_terminal()
                {
                    return job.clone();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not reach a terminal state in time")
    }

    #[tokio::test]
    async fn successful_job_completes_with_zero_attempts() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(Job::new("ok", "true", 3)).await.unwrap();

        let pool = WorkerPool::spawn(1, store.clone(), Arc::new(FlakyRunner::new(0)), fast_config());
        let job = wait_terminal(&store, "ok").await;
        pool.shutdown_and_join().await;

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn always_failing_job_with_budget_one_dies_after_one_attempt() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(Job::new("doomed", "false", 1)).await.unwrap();

        let pool = WorkerPool::spawn(
            1,
            store.clone(),
            Arc::new(FlakyRunner::always_failing()),
            fast_config(),
        );
        let job = wait_terminal(&store, "doomed").await;
        pool.shutdown_and_join().await;

        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
        assert!(job.last_error.is_some());
    }

    #[tokio::test]
    async fn fail_once_then_succeed_completes_with_one_attempt() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(Job::new("flaky", "true", 3)).await.unwrap();

        let pool = WorkerPool::spawn(1, store.clone(), Arc::new(FlakyRunner::new(1)), fast_config());
        let job = wait_terminal(&store, "flaky").await;
        pool.shutdown_and_join().await;

        // Passed through failed -> pending -> processing -> completed.
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn zero_retry_budget_dead_letters_on_first_failure() {
        let store = Arc::new(InMemoryStore::new());
        store.insert(Job::new("strict", "false", 0)).await.unwrap();

        let pool = WorkerPool::spawn(
            1,
            store.clone(),
            Arc::new(FlakyRunner::always_failing()),
            fast_config(),
        );
        let job = wait_terminal(&store, "strict").await;
        pool.shutdown_and_join().await;

        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn multiple_workers_drain_the_pending_pool() {
        let store = Arc::new(InMemoryStore::new());
        for i in 0..8 {
            store
                .insert(Job::new(format!("job{i}"), "true", 3))
                .await
                .unwrap();
        }

        let pool = WorkerPool::spawn(4, store.clone(), Arc::new(FlakyRunner::new(0)), fast_config());
        for i in 0..8 {
            let job = wait_terminal(&store, &format!("job{i}")).await;
            assert_eq!(job.state, JobState::Completed);
        }
        pool.shutdown_and_join().await;

        // Every job completed exactly once.
        let completed = store.find(Some(JobState::Completed)).await.unwrap();
        assert_eq!(completed.len(), 8);
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let store = Arc::new(InMemoryStore::new());
        let pool = WorkerPool::spawn(2, store, Arc::new(FlakyRunner::new(0)), fast_config());

        tokio::time::timeout(Duration::from_secs(1), pool.shutdown_and_join())
            .await
            .expect("workers did not stop after shutdown");
    }
}
