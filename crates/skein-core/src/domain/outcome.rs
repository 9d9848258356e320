//! Outcome model: the shape of a finished task, as reported to the tracker.
//!
//! This module does not assume a queue or a store. It only defines what a
//! completion notification carries and how group members are summarized.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::TaskId;

/// Ordered mapping of argument name to value.
///
/// `serde_json` is built with `preserve_order`, so iteration follows
/// insertion order.
pub type Payload = serde_json::Map<String, Value>;

/// Where a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The task never reached an executor (queue down, unknown endpoint).
    Dispatch,

    /// The callable ran and returned an error.
    Execution,

    /// The workflow definition cannot be satisfied (missing arguments, ...).
    Configuration,
}

/// Failure description carried by a failed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: FailureKind,
    pub message: String,

    /// The payload the task was (or would have been) invoked with.
    #[serde(default)]
    pub payload: Payload,
}

impl ErrorDescriptor {
    pub fn new(kind: FailureKind, message: impl Into<String>, payload: Payload) -> Self {
        Self {
            kind,
            message: message.into(),
            payload,
        }
    }

    pub fn dispatch(message: impl Into<String>, payload: Payload) -> Self {
        Self::new(FailureKind::Dispatch, message, payload)
    }

    pub fn execution(message: impl Into<String>, payload: Payload) -> Self {
        Self::new(FailureKind::Execution, message, payload)
    }

    pub fn configuration(message: impl Into<String>, payload: Payload) -> Self {
        Self::new(FailureKind::Configuration, message, payload)
    }
}

/// Result of one task execution.
///
/// Serialized as `{"status": "success", "value": ...}` or
/// `{"status": "failure", "error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { value: Value },
    Failure { error: ErrorDescriptor },
}

impl Outcome {
    pub fn success(value: impl Into<Value>) -> Self {
        Outcome::Success {
            value: value.into(),
        }
    }

    pub fn failure(error: ErrorDescriptor) -> Self {
        Outcome::Failure { error }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// A completion notification: the only input that advances the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub node_id: TaskId,
    pub outcome: Outcome,
}

impl Completion {
    pub fn new(node_id: TaskId, outcome: Outcome) -> Self {
        Self { node_id, outcome }
    }
}

/// Terminal summary of one group member, kept in the group's result slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MemberResult {
    Succeeded(Value),
    Failed(ErrorDescriptor),
    Revoked,
}

impl MemberResult {
    /// Value handed to the group's trigger.
    ///
    /// Successes appear as the raw value so a group of scalars injects a
    /// plain array; failures and revocations become tagged placeholders.
    pub fn to_value(&self) -> Value {
        match self {
            MemberResult::Succeeded(value) => value.clone(),
            MemberResult::Failed(error) => serde_json::json!({
                "error": {
                    "kind": error.kind,
                    "message": error.message,
                }
            }),
            MemberResult::Revoked => serde_json::json!({ "revoked": true }),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MemberResult::Failed(_))
    }
}
