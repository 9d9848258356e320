//! Errors that end up inside a failure outcome.
//!
//! These never abort the engine: each one is turned into an
//! [`ErrorDescriptor`] and recorded on the task.

use thiserror::Error;

use super::outcome::{ErrorDescriptor, FailureKind, Payload};

/// Error returned by an endpoint body.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        TaskError::new(format!("invalid arguments: {err}"))
    }
}

/// The payload of a task cannot be completed from its declaration and the
/// previous result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    #[error("endpoint '{endpoint}' is missing required arguments: {missing:?}")]
    MissingArguments {
        endpoint: String,
        missing: Vec<String>,
    },
}

impl InjectionError {
    pub fn to_descriptor(&self, payload: Payload) -> ErrorDescriptor {
        ErrorDescriptor::new(FailureKind::Configuration, self.to_string(), payload)
    }
}
