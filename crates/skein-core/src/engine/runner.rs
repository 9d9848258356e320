//! TaskRunner - invoke a registered endpoint and capture its outcome.
//!
//! Shared by debug-mode dispatch and the execution trigger, so both paths
//! produce the same `Outcome` for the same payload.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::outcome::{ErrorDescriptor, Outcome, Payload};
use crate::typed::TaskRegistry;

#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
}

impl TaskRunner {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self { registry }
    }

    /// Never fails: errors become failure outcomes.
    pub async fn run(&self, endpoint: &str, payload: Payload) -> Outcome {
        let handler = match self.registry.resolve(endpoint) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(endpoint, error = %e, "cannot run task");
                return Outcome::failure(ErrorDescriptor::configuration(e.to_string(), payload));
            }
        };

        match handler.invoke(payload.clone()).await {
            Ok(value) => {
                debug!(endpoint, "task body returned");
                Outcome::success(value)
            }
            Err(e) => {
                debug!(endpoint, error = %e, "task body failed");
                Outcome::failure(ErrorDescriptor::execution(e.message, payload))
            }
        }
    }
}
