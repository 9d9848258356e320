//! Node states.

use serde::{Deserialize, Serialize};

/// Task state.
///
/// State transitions:
/// - Pending -> Scheduled -> Running -> Succeeded
/// - Pending -> Scheduled -> Running -> Failed
/// - Pending -> Scheduled -> Failed (dispatch error)
/// - any non-terminal state -> Revoked
///
/// A completion notification may carry a task straight from Scheduled to a
/// terminal state; Running is recorded only when the executor reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Created, not yet handed to the dispatcher.
    Pending,

    /// Handed to the queue (or about to run inline).
    Scheduled,

    /// Executing on a worker.
    Running,

    Succeeded,

    Failed,

    /// Revoked before completion; its outcome (if any arrives) is dropped.
    Revoked,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Revoked
        )
    }

    /// Can a completion notification still be applied?
    pub fn accepts_completion(self) -> bool {
        matches!(self, TaskState::Scheduled | TaskState::Running)
    }
}

/// State of a Chain or a Group, derived from its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowState {
    /// Persisted but not started.
    Pending,

    Running,

    Succeeded,

    Failed,

    Revoked,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FlowState::Succeeded | FlowState::Failed | FlowState::Revoked
        )
    }
}

/// Serializable view over both state enums (status API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateView {
    Pending,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Revoked,
}

impl StateView {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StateView::Succeeded | StateView::Failed | StateView::Revoked
        )
    }
}

impl From<TaskState> for StateView {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending => StateView::Pending,
            TaskState::Scheduled => StateView::Scheduled,
            TaskState::Running => StateView::Running,
            TaskState::Succeeded => StateView::Succeeded,
            TaskState::Failed => StateView::Failed,
            TaskState::Revoked => StateView::Revoked,
        }
    }
}

impl From<FlowState> for StateView {
    fn from(state: FlowState) -> Self {
        match state {
            FlowState::Pending => StateView::Pending,
            FlowState::Running => StateView::Running,
            FlowState::Succeeded => StateView::Succeeded,
            FlowState::Failed => StateView::Failed,
            FlowState::Revoked => StateView::Revoked,
        }
    }
}
