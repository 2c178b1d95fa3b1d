//! Task record and its state machine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TaskId;

/// Outcome label -> occurrence count, as returned by the execution engine.
pub type Counts = BTreeMap<String, u64>;

/// Task status.
///
/// State transitions:
/// - Pending -> Processing -> Completed
/// - Pending -> Processing -> Failed
///
/// Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Persisted, waiting for a worker.
    Pending,

    /// Claimed by a worker; the engine is (or was) running.
    Processing,

    /// Engine returned counts; `result` is set.
    Completed,

    /// Execution or persistence failed; `error` is set.
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task {task_id}: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub task_id: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Persisted task record.
///
/// Design:
/// - `id`, `circuit`, `shots`, `created_at` never change after creation.
/// - All status changes go through the transition methods below, which keep
///   `result`/`error`/`completed_at` consistent with `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub circuit: String,
    pub shots: u32,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<Counts>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// New `Pending` task. `shots` is validated by the submitter before this
    /// is called; zero is still refused here so no record can carry it.
    pub fn new(
        id: TaskId,
        circuit: impl Into<String>,
        shots: u32,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        if shots == 0 {
            return None;
        }
        Some(Self {
            id,
            circuit: circuit.into(),
            shots,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at,
            completed_at: None,
        })
    }

    /// Pending -> Processing.
    pub fn start_processing(&mut self) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Processing)?;
        Ok(())
    }

    /// Processing -> Completed. Sets `result` and `completed_at`.
    pub fn complete(&mut self, counts: Counts, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(counts);
        self.error = None;
        self.completed_at = Some(at);
        Ok(())
    }

    /// Pending/Processing -> Failed. Sets `error` and `completed_at`.
    pub fn fail(&mut self, error: impl Into<String>, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.result = None;
        self.completed_at = Some(at);
        Ok(())
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), TransitionError> {
        let allowed = matches!(
            (self.status, to),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        );
        if !allowed {
            return Err(TransitionError {
                task_id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `result` iff Completed, `error` iff Failed, `completed_at` iff terminal.
    pub fn is_consistent(&self) -> bool {
        let result_ok = self.result.is_some() == (self.status == TaskStatus::Completed);
        let error_ok = self.error.is_some() == (self.status == TaskStatus::Failed);
        let done_ok = self.completed_at.is_some() == self.status.is_terminal();
        result_ok && error_ok && done_ok && self.shots > 0
    }
}
