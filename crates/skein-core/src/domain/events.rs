//! Domain events emitted by the engine.
//!
//! Events describe transitions that already happened in the store. Sinks must
//! not feed back into the engine.

use serde::Serialize;
use serde_json::Value;

use super::ids::{ChainId, GroupId, NodeId, TaskId};
use super::outcome::FailureKind;
use super::state::FlowState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    WorkflowStarted {
        root: NodeId,
    },
    TaskDispatched {
        task_id: TaskId,
        endpoint: String,
        inline: bool,
    },
    TaskCompleted {
        task_id: TaskId,
        value: Value,
    },
    TaskFailed {
        task_id: TaskId,
        kind: FailureKind,
        message: String,
    },
    /// A notification that arrived for a terminal, revoked or never
    /// dispatched task.
    NotificationDiscarded {
        task_id: TaskId,
        reason: DiscardReason,
    },
    NodeRevoked {
        node_id: NodeId,
    },
    ChainFinished {
        chain_id: ChainId,
        state: FlowState,
    },
    BarrierFired {
        group_id: GroupId,
        state: FlowState,
        members: usize,
    },
    ErrorCallbackDispatched {
        task_id: TaskId,
        callback_id: TaskId,
        endpoint: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    AlreadyTerminal,
    Revoked,
    NotDispatched,
}

impl DomainEvent {
    /// Short name used as the tracing message.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::WorkflowStarted { .. } => "workflow_started",
            DomainEvent::TaskDispatched { .. } => "task_dispatched",
            DomainEvent::TaskCompleted { .. } => "task_completed",
            DomainEvent::TaskFailed { .. } => "task_failed",
            DomainEvent::NotificationDiscarded { .. } => "notification_discarded",
            DomainEvent::NodeRevoked { .. } => "node_revoked",
            DomainEvent::ChainFinished { .. } => "chain_finished",
            DomainEvent::BarrierFired { .. } => "barrier_fired",
            DomainEvent::ErrorCallbackDispatched { .. } => "error_callback_dispatched",
        }
    }
}
