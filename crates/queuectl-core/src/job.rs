//! Job record and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QueueError;

/// Default retry budget applied when the enqueue input leaves it out.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Job state.
///
/// State transitions:
/// - Pending -> Processing (claim)
/// - Processing -> Completed (command exited 0)
/// - Processing -> Failed (command failed, budget left)
/// - Processing -> Dead (command failed, budget exhausted)
/// - Failed -> Pending (re-activation after backoff)
///
/// No other edges are valid. In particular a Failed job is never claimed
/// directly; it must pass through Pending first, so a worker cannot race
/// the backoff timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Eligible for claim.
    Pending,

    /// Claimed by exactly one worker, command executing.
    Processing,

    /// Terminal success.
    Completed,

    /// Transient failure, waiting out the backoff delay.
    Failed,

    /// Terminal failure (retry budget exhausted).
    Dead,
}

impl JobState {
    /// Is this a terminal state (never claimed or mutated again)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }

    /// Is this job eligible for claim?
    pub fn is_claimable(self) -> bool {
        matches!(self, JobState::Pending)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        };
        f.write_str(s)
    }
}

impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "dead" => Ok(JobState::Dead),
            other => Err(QueueError::Validation(format!(
                "unknown job state: {other}"
            ))),
        }
    }
}

/// Enqueue input. Fields are optional so malformed input is rejected with a
/// `Validation` error instead of a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub id: Option<String>,

    /// Shell command to execute. Opaque to the core.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Job record: the single source of truth for one job.
///
/// Design: state transitions go through methods, not direct field access,
/// so every mutation refreshes `updated_at` and the state machine edges are
/// enforced in one place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Externally supplied id, unique across the store.
    pub id: String,

    /// Shell command to execute.
    pub command: String,

    pub state: JobState,

    /// Number of execution attempts that have failed so far.
    pub attempts: u32,

    /// Retry budget; reaching it on a failure dead-letters the job.
    pub max_retries: u32,

    /// Last failure reason (if any).
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: impl Into<String>, command: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            command: command.into(),
            state: JobState::Pending,
            attempts: 0,
            max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a job from enqueue input, validating required fields and
    /// applying defaults.
    pub fn from_spec(spec: JobSpec) -> Result<Self, QueueError> {
        let id = spec
            .id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| QueueError::Validation("missing required field: id".into()))?;
        let command = spec
            .command
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| QueueError::Validation("missing required field: command".into()))?;
        Ok(Self::new(
            id,
            command,
            spec.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        ))
    }

    /// Mark as claimed (Pending -> Processing).
    pub fn begin_processing(&mut self) {
        self.state = JobState::Processing;
        self.touch();
    }

    /// Mark as succeeded (Processing -> Completed).
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.touch();
    }

    /// Record a failed attempt (Processing -> Failed or Dead).
    ///
    /// Increments `attempts`; returns `true` if the retry budget is now
    /// exhausted and the job is dead. A `max_retries` of 0 dead-letters on
    /// the first failure.
    pub fn record_failure(&mut self, error: String) -> bool {
        self.attempts += 1;
        self.last_error = Some(error);
        let dead = self.attempts >= self.max_retries;
        self.state = if dead { JobState::Dead } else { JobState::Failed };
        self.touch();
        dead
    }

    /// Re-activate after backoff (Failed -> Pending, attempts unchanged).
    /// No-op from any other state.
    pub fn requeue(&mut self) {
        if self.state == JobState::Failed {
            self.state = JobState::Pending;
            self.touch();
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: Option<&str>, command: Option<&str>, max_retries: Option<u32>) -> JobSpec {
        JobSpec {
            id: id.map(String::from),
            command: command.map(String::from),
            max_retries,
        }
    }

    #[test]
    fn from_spec_applies_defaults() {
        let job = Job::from_spec(spec(Some("job1"), Some("echo hi"), None)).unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn from_spec_rejects_missing_fields() {
        assert!(matches!(
            Job::from_spec(spec(None, Some("echo hi"), None)),
            Err(QueueError::Validation(_))
        ));
        assert!(matches!(
            Job::from_spec(spec(Some("job1"), None, None)),
            Err(QueueError::Validation(_))
        ));
        // Whitespace-only counts as missing.
        assert!(matches!(
            Job::from_spec(spec(Some("  "), Some("echo hi"), None)),
            Err(QueueError::Validation(_))
        ));
    }

    #[test]
    fn failure_below_budget_goes_to_failed() {
        let mut job = Job::new("j", "false", 3);
        job.begin_processing();
        let dead = job.record_failure("exit status 1".into());
        assert!(!dead);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.attempts <= job.max_retries);
    }

    #[test]
    fn failure_at_budget_goes_to_dead() {
        let mut job = Job::new("j", "false", 1);
        job.begin_processing();
        let dead = job.record_failure("exit status 1".into());
        assert!(dead);
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
    }

    #[test]
    fn zero_budget_dead_letters_on_first_failure() {
        let mut job = Job::new("j", "false", 0);
        job.begin_processing();
        assert!(job.record_failure("exit status 1".into()));
        assert_eq!(job.state, JobState::Dead);
    }

    #[test]
    fn requeue_only_from_failed() {
        let mut job = Job::new("j", "false", 3);
        job.begin_processing();
        job.record_failure("boom".into());
        job.requeue();
        assert_eq!(job.state, JobState::Pending);

        let mut done = Job::new("k", "true", 3);
        done.begin_processing();
        done.complete();
        done.requeue();
        assert_eq!(done.state, JobState::Completed);
    }

    #[test]
    fn spec_deserializes_from_json_with_missing_fields() {
        let spec: JobSpec = serde_json::from_str(r#"{"id":"job1","command":"sleep 2"}"#).unwrap();
        let job = Job::from_spec(spec).unwrap();
        assert_eq!(job.id, "job1");
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);

        let empty: JobSpec = serde_json::from_str("{}").unwrap();
        assert!(Job::from_spec(empty).is_err());
    }

    #[test]
    fn state_round_trips_through_strings() {
        for s in ["pending", "processing", "completed", "failed", "dead"] {
            let state: JobState = s.parse().unwrap();
            assert_eq!(state.to_string(), s);
        }
        assert!("bogus".parse::<JobState>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Dead.is_terminal());
        assert!(!JobState::Failed.is_terminal());
        assert!(JobState::Pending.is_claimable());
        assert!(!JobState::Failed.is_claimable());
    }
}
