//! In-memory job store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::QueueError;
use crate::job::{Job, JobState};
use crate::store::JobStore;

/// In-memory store state.
struct StoreState {
    /// All job records (single source of truth).
    records: HashMap<String, Job>,

    /// Claim order for pending jobs (ids only, FIFO).
    pending: VecDeque<String>,
}

/// In-memory `JobStore`.
///
/// One mutex guards both the records and the pending queue, and
/// `claim_next_pending` selects and flips state while holding it. That lock
/// is the store's atomic primitive: two concurrent claims serialize on it,
/// so the same job can never be handed to both.
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StoreState {
                records: HashMap::new(),
                pending: VecDeque::new(),
            })),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn insert(&self, job: Job) -> Result<Job, QueueError> {
        let mut state = self.state.lock().await;
        if state.records.contains_key(&job.id) {
            return Err(QueueError::DuplicateId(job.id.clone()));
        }
        if job.state.is_claimable() {
            state.pending.push_back(job.id.clone());
        }
        state.records.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.lock().await;
        // Entries can go stale (a job re-inserted into the queue and claimed
        // via an older entry), so skip anything no longer pending.
        while let Some(id) = state.pending.pop_front() {
            let Some(record) = state.records.get_mut(&id) else {
                continue;
            };
            if !record.state.is_claimable() {
                continue;
            }
            record.begin_processing();
            return Ok(Some(record.clone()));
        }
        Ok(None)
    }

    async fn update(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let Some(existing) = state.records.get_mut(&job.id) else {
            return Err(QueueError::NotFound(job.id.clone()));
        };
        let was_claimable = existing.state.is_claimable();
        *existing = job.clone();
        // A job re-activated into `pending` must become claimable again.
        if job.state.is_claimable() && !was_claimable {
            state.pending.push_back(job.id.clone());
        }
        Ok(())
    }

    async fn find(&self, filter: Option<JobState>) -> Result<Vec<Job>, QueueError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state
            .records
            .values()
            .filter(|job| filter.is_none_or(|s| job.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }
}
