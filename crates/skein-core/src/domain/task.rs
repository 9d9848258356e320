//! Task record: one unit of work and its lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{NodeId, TaskId};
use super::node::Parent;
use super::outcome::{ErrorDescriptor, Payload};
use super::state::TaskState;

/// Persisted task.
///
/// Design:
/// - This is the single source of truth for the task's state.
/// - Transitions happen through the `mark_*` methods; each returns `false`
///   when the transition is not allowed from the current state, so callers
///   can treat a refused transition as "someone else got there first".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    /// Root of the workflow this task belongs to.
    pub root: NodeId,

    /// Registered endpoint name.
    pub endpoint: String,

    /// Declared arguments.
    pub payload: Payload,

    /// Arguments actually dispatched (declared + injected).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_payload: Option<Payload>,

    pub state: TaskState,

    /// Seconds to wait before the first delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,

    /// Endpoint invoked when this task fails.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,

    /// Set on error-callback tasks: the task whose failure they report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_for: Option<TaskId>,

    pub parent: Parent,

    /// Downstream node started when this (standalone) task succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<NodeId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,

    /// Revoked while running: the in-flight outcome will be dropped.
    #[serde(default)]
    pub revoke_requested: bool,

    /// Number of times the dispatcher accepted this task.
    #[serde(default)]
    pub dispatch_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        root: NodeId,
        endpoint: impl Into<String>,
        payload: Payload,
        parent: Parent,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            root,
            endpoint: endpoint.into(),
            payload,
            effective_payload: None,
            state: TaskState::Pending,
            delay_secs: None,
            on_error: None,
            callback_for: None,
            parent,
            trigger: None,
            result: None,
            error: None,
            revoke_requested: false,
            dispatch_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_error_callback(&self) -> bool {
        self.callback_for.is_some()
    }

    /// Pending -> Scheduled, remembering the payload that goes out.
    pub fn mark_scheduled(&mut self, effective_payload: Payload, now: DateTime<Utc>) -> bool {
        if self.state != TaskState::Pending {
            return false;
        }
        self.state = TaskState::Scheduled;
        self.effective_payload = Some(effective_payload);
        self.dispatch_count += 1;
        self.updated_at = now;
        true
    }

    /// Scheduled -> Running.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TaskState::Scheduled {
            return false;
        }
        self.state = TaskState::Running;
        self.updated_at = now;
        true
    }

    pub fn mark_succeeded(&mut self, value: Value, now: DateTime<Utc>) -> bool {
        if !self.state.accepts_completion() {
            return false;
        }
        self.state = TaskState::Succeeded;
        self.result = Some(value);
        self.updated_at = now;
        true
    }

    /// Failure is also accepted from Pending: a task that could not be
    /// dispatched at all fails without ever being scheduled.
    pub fn mark_failed(&mut self, error: ErrorDescriptor, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Failed;
        self.error = Some(error);
        self.updated_at = now;
        true
    }

    /// Any non-terminal state -> Revoked.
    pub fn mark_revoked(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.revoke_requested = self.state == TaskState::Running;
        self.state = TaskState::Revoked;
        self.updated_at = now;
        true
    }

    /// Payload to report in error callbacks: what was sent if anything was.
    pub fn original_payload(&self) -> &Payload {
        self.effective_payload.as_ref().unwrap_or(&self.payload)
    }
}
