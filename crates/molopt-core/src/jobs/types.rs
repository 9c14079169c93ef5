//! Job request and status types.

use chrono::{DateTime, Utc};
use molopt_abstraction::OptimizationParameters;
use molopt_models::ModelId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Work submitted to the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    /// Optimize one identifier.
    Single {
        /// Structure identifier (SMILES).
        identifier: String,
        /// Model to use, or `None` to let the selector choose.
        model: Option<ModelId>,
        /// Optimization parameters.
        params: OptimizationParameters,
    },
    /// Optimize several identifiers in order.
    Batch {
        /// Structure identifiers (SMILES).
        identifiers: Vec<String>,
        /// Model to use, or `None` to let the selector choose per entry.
        model: Option<ModelId>,
        /// Optimization parameters shared by every entry.
        params: OptimizationParameters,
    },
}

impl JobRequest {
    /// Short label for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Single { .. } => "single",
            Self::Batch { .. } => "batch",
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker.
    Queued,
    /// Being processed.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before it finished.
    Cancelled,
}

impl JobState {
    /// Whether the job has stopped for good.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(state)
    }
}

/// Observable status of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    /// Percentage in `[0, 100]`.
    pub progress: f64,
    pub message: String,
    /// Attempts started so far.
    pub attempts: u32,
    /// Serialized report once completed.
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    pub(crate) fn queued(id: JobId) -> Self {
        Self {
            id,
            state: JobState::Queued,
            progress: 0.0,
            message: "Queued".to_string(),
            attempts: 0,
            result: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_parse() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-uuid".parse::<JobId>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_request_wire_form() {
        let request: JobRequest = serde_json::from_value(serde_json::json!({
            "kind": "batch",
            "identifiers": ["CCO", "O"],
            "model": "ANI2x",
            "params": { "max_steps": 50 }
        }))
        .unwrap();

        match request {
            JobRequest::Batch { identifiers, model, params } => {
                assert_eq!(identifiers.len(), 2);
                assert_eq!(model, Some(ModelId::Ani2x));
                assert_eq!(params.max_steps, 50);
            }
            JobRequest::Single { .. } => panic!("expected a batch request"),
        }
    }
}
