//! Job store port and the in-memory implementation.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::error::QueueError;
use crate::job::{Job, JobState};

/// Job store port (interface).
///
/// The store is the only shared mutable resource between workers, and
/// `claim_next_pending` is its only contended entry point. This trait is the
/// seam for swapping the in-memory store for a persistent backend later.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `DuplicateId` if the id already exists.
    async fn insert(&self, job: Job) -> Result<Job, QueueError>;

    /// Atomically select one pending job, transition it to `processing`, and
    /// return the updated record. Returns `None` when nothing is pending.
    ///
    /// Implementations must perform the select-and-flip under the store's
    /// own atomic primitive, never as a separate read then write — that
    /// would let two concurrent workers claim the same job. For any two
    /// concurrent calls, no job is returned to both.
    async fn claim_next_pending(&self) -> Result<Option<Job>, QueueError>;

    /// Persist mutated fields. Fails with `NotFound` if the job no longer
    /// exists. Only the owning worker (or its re-activation timer) writes a
    /// claimed job, so last-write-wins is acceptable here.
    async fn update(&self, job: &Job) -> Result<(), QueueError>;

    /// List jobs, optionally filtered by state. Used by listing tooling,
    /// not by the dispatch loop.
    async fn find(&self, state: Option<JobState>) -> Result<Vec<Job>, QueueError>;
}
