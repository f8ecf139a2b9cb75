//! queuectl-core
//!
//! The job lifecycle engine behind `queuectl`: clients submit shell commands
//! as jobs, a pool of workers claims and runs them, failures retry with
//! exponential backoff, and jobs that exhaust their budget are dead-lettered.
//!
//! Modules:
//! - **job**: the `Job` record and its state machine
//! - **store**: the `JobStore` port (atomic claim) + in-memory implementation
//! - **retry**: backoff policy
//! - **runner**: command execution seam (`sh -c` in production)
//! - **worker**: per-worker dispatch loops and the pool supervising them
//! - **queue**: enqueue/list/start_workers surface for callers

pub mod error;
pub mod job;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod store;
pub mod worker;

pub use error::QueueError;
pub use job::{DEFAULT_MAX_RETRIES, Job, JobSpec, JobState};
pub use queue::JobQueue;
pub use retry::RetryPolicy;
pub use runner::{CommandRunner, ShellRunner};
pub use store::{InMemoryStore, JobStore};
pub use worker::{WorkerConfig, WorkerPool};
