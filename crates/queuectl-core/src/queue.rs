//! Client surface: enqueue, list, start workers.

use std::sync::Arc;

use crate::error::QueueError;
use crate::job::{Job, JobSpec, JobState};
use crate::runner::CommandRunner;
use crate::store::JobStore;
use crate::worker::{WorkerConfig, WorkerPool};

/// Entry point for submitting and inspecting jobs.
///
/// All mutation flows through the store; `JobQueue` is stateless glue over
/// it, so it can be cloned freely and shared with a running worker pool.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    /// Validate the spec, apply defaults (`state = pending`, `attempts = 0`,
    /// `max_retries = 3`), and insert. No job is created on validation
    /// failure, and a duplicate id leaves the original record untouched.
    pub async fn enqueue(&self, spec: JobSpec) -> Result<Job, QueueError> {
        let job = Job::from_spec(spec)?;
        self.store.insert(job).await
    }

    /// List jobs, optionally filtered by state, ordered by creation time.
    pub async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        self.store.find(state).await
    }

    /// Launch `count` dispatch loops against this queue's store.
    pub fn start_workers(
        &self,
        count: usize,
        runner: Arc<dyn CommandRunner>,
        config: WorkerConfig,
    ) -> WorkerPool {
        WorkerPool::spawn(count, self.store(), runner, config)
    }
}
