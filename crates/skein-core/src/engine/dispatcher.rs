//! Dispatcher - hand a scheduled task to something that runs it.
//!
//! Production mode enqueues an execution request on the task queue; debug
//! mode runs the endpoint inline. The dispatcher does not touch the store:
//! the engine records the transition and, for inline runs, feeds the outcome
//! back into the state machine.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::runner::TaskRunner;
use crate::config::EngineConfig;
use crate::domain::outcome::{ErrorDescriptor, Outcome, Payload};
use crate::domain::task::TaskRecord;
use crate::ports::{QueueError, QueueMessageId, QueueRequest, TaskQueue};

/// Tracking handle returned by `Engine::submit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchReceipt {
    /// Accepted by the task queue.
    Enqueued { message_id: QueueMessageId },

    /// Ran inline (debug mode); the outcome is already applied.
    Inline { outcome: Outcome },

    /// Not dispatched: revoked, or no longer PENDING.
    Suppressed,

    /// Could not be dispatched; the task is FAILED.
    Rejected { error: ErrorDescriptor },
}

/// What happened to one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Dispatched {
    Enqueued(QueueMessageId),
    Completed(Outcome),
}

#[derive(Clone)]
enum Mode {
    Queue(Arc<dyn TaskQueue>),
    Inline(TaskRunner),
}

#[derive(Clone)]
pub(crate) struct Dispatcher {
    mode: Mode,
    config: Arc<EngineConfig>,
}

impl Dispatcher {
    pub(crate) fn queued(queue: Arc<dyn TaskQueue>, config: Arc<EngineConfig>) -> Self {
        Self {
            mode: Mode::Queue(queue),
            config,
        }
    }

    pub(crate) fn inline(runner: TaskRunner, config: Arc<EngineConfig>) -> Self {
        Self {
            mode: Mode::Inline(runner),
            config,
        }
    }

    pub(crate) fn is_inline(&self) -> bool {
        matches!(self.mode, Mode::Inline(_))
    }

    pub(crate) async fn dispatch(
        &self,
        task: &TaskRecord,
        payload: Payload,
    ) -> Result<Dispatched, QueueError> {
        match &self.mode {
            Mode::Queue(queue) => {
                let request = QueueRequest {
                    node_id: task.id,
                    endpoint: task.endpoint.clone(),
                    url: self.config.run_url(&task.endpoint),
                    payload,
                    delay: task.delay_secs.map(Duration::from_secs),
                };
                let message_id = queue.enqueue(request).await?;
                debug!(node = %task.id, endpoint = %task.endpoint, %message_id, "enqueued");
                Ok(Dispatched::Enqueued(message_id))
            }
            Mode::Inline(runner) => {
                if let Some(delay) = task.delay_secs {
                    debug!(node = %task.id, delay, "delay ignored in debug mode");
                }
                let outcome = runner.run(&task.endpoint, payload).await;
                Ok(Dispatched::Completed(outcome))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{NodeId, TaskId};
    use crate::domain::node::Parent;
    use crate::impls::InMemoryTaskQueue;
    use crate::typed::{Signature, TaskRegistry};
    use chrono::Utc;
    use serde_json::json;
    use ulid::Ulid;

    fn task(delay: Option<u64>) -> TaskRecord {
        let id = TaskId::from_ulid(Ulid::new());
        let mut t = TaskRecord::new(
            id,
            NodeId::Task(id),
            "echo",
            Payload::new(),
            Parent::Standalone,
            Utc::now(),
        );
        t.delay_secs = delay;
        t
    }

    fn config() -> Arc<EngineConfig> {
        Arc::new(EngineConfig {
            base_url: Some("https://hooks.test".into()),
            ..EngineConfig::default()
        })
    }

    #[tokio::test]
    async fn queue_mode_builds_the_run_request() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let dispatcher = Dispatcher::queued(queue.clone(), config());
        let t = task(Some(30));

        let mut payload = Payload::new();
        payload.insert("x".into(), json!(1));
        let result = dispatcher.dispatch(&t, payload.clone()).await.unwrap();
        assert!(matches!(result, Dispatched::Enqueued(_)));

        let sent = queue.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].node_id, t.id);
        assert_eq!(sent[0].url, "https://hooks.test/run/echo/");
        assert_eq!(sent[0].payload, payload);
        assert_eq!(sent[0].delay, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn queue_errors_surface() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        queue.set_outage(Some("down")).await;
        let dispatcher = Dispatcher::queued(queue, config());

        let err = dispatcher.dispatch(&task(None), Payload::new()).await.unwrap_err();
        assert!(matches!(err, QueueError::Unavailable(_)));
    }

    #[tokio::test]
    async fn inline_mode_runs_immediately_and_ignores_delay() {
        let mut registry = TaskRegistry::new();
        registry
            .register_fn("echo", Signature::new(), |p| Ok(serde_json::Value::Object(p)))
            .unwrap();
        let dispatcher = Dispatcher::inline(TaskRunner::new(Arc::new(registry)), config());
        assert!(dispatcher.is_inline());

        let mut payload = Payload::new();
        payload.insert("x".into(), json!(1));
        let result = dispatcher.dispatch(&task(Some(3600)), payload).await.unwrap();
        assert_eq!(result, Dispatched::Completed(Outcome::success(json!({"x": 1}))));
    }
}
