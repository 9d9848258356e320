//! Chain record: tasks executed one after another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{ChainId, NodeId, TaskId};
use super::node::Parent;
use super::state::FlowState;

/// What the state machine should do after a step of the chain succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainStep {
    /// Dispatch the next task with the previous result injected.
    Next(TaskId),

    /// The last task succeeded; the chain is complete.
    Finished,

    /// The notification does not match the cursor (stale or duplicate) or the
    /// chain already left the running state.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainRecord {
    pub id: ChainId,
    pub root: NodeId,
    pub tasks: Vec<TaskId>,

    /// Index of the task the chain is waiting on. Advances only when that
    /// task's success is processed.
    pub cursor: usize,

    pub state: FlowState,

    /// Result of the last task, once the chain succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    pub parent: Parent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<NodeId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChainRecord {
    pub fn new(
        id: ChainId,
        root: NodeId,
        tasks: Vec<TaskId>,
        parent: Parent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            root,
            tasks,
            cursor: 0,
            state: FlowState::Pending,
            result: None,
            parent,
            trigger: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> Running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != FlowState::Pending {
            return false;
        }
        self.state = FlowState::Running;
        self.updated_at = now;
        true
    }

    /// The task the chain is currently waiting on.
    pub fn current(&self) -> Option<TaskId> {
        self.tasks.get(self.cursor).copied()
    }

    /// Record the success of the task at `position`.
    ///
    /// On the last position the chain becomes Succeeded with `value` as its
    /// result.
    pub fn advance(&mut self, position: usize, value: &Value, now: DateTime<Utc>) -> ChainStep {
        if self.state != FlowState::Running || position != self.cursor {
            return ChainStep::Ignored;
        }
        self.cursor += 1;
        self.updated_at = now;
        match self.tasks.get(self.cursor) {
            Some(next) => ChainStep::Next(*next),
            None => {
                self.state = FlowState::Succeeded;
                self.result = Some(value.clone());
                ChainStep::Finished
            }
        }
    }

    /// Zero-task chains succeed immediately with no result.
    pub fn finish_empty(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != FlowState::Running || !self.tasks.is_empty() {
            return false;
        }
        self.state = FlowState::Succeeded;
        self.updated_at = now;
        true
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = FlowState::Failed;
        self.updated_at = now;
        true
    }

    pub fn mark_revoked(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = FlowState::Revoked;
        self.updated_at = now;
        true
    }

    /// Tasks at or after the cursor: the ones revocation still has to reach.
    pub fn remaining(&self) -> &[TaskId] {
        let from = self.cursor.min(self.tasks.len());
        &self.tasks[from..]
    }

    /// Tasks strictly after `position`.
    pub fn tasks_after(&self, position: usize) -> &[TaskId] {
        let from = position.saturating_add(1).min(self.tasks.len());
        &self.tasks[from..]
    }
}
