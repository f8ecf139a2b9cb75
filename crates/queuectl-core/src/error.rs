use thiserror::Error;

/// Errors surfaced by the queue core.
///
/// Propagation policy:
/// - `Validation` / `DuplicateId` are permanent: reported once to the caller,
///   never retried.
/// - `StoreUnavailable` is transient: dispatch loops log it and retry after
///   the poll interval; enqueue/listing surface it directly.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid job spec: {0}")]
    Validation(String),

    #[error("duplicate job id: {0}")]
    DuplicateId(String),

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}
