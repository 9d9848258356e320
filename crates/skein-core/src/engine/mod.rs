//! Engine - ties the store, the dispatcher and the registry together.
//!
//! # Components
//! - **builder**: wiring and startup validation
//! - **injector**: result injection (pure)
//! - **dispatcher** / **runner**: queue or inline execution
//! - **machine**: completion handling, chain advance, group barriers
//! - **revoke**: revocation propagation
//! - **status**: read-side views

pub mod builder;
pub mod dispatcher;
pub(crate) mod graph;
pub mod injector;
mod machine;
mod revoke;
pub mod runner;
pub mod status;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::dispatcher::DispatchReceipt;
pub use self::graph::MAX_CAS_ATTEMPTS;
pub use self::machine::Disposition;
pub use self::revoke::RevokeReport;
pub use self::runner::TaskRunner;
pub use self::status::NodeStatus;

use self::dispatcher::Dispatcher;
use self::graph::{Edit, Graph};
use crate::canvas::{CanvasError, WorkflowSpec};
use crate::config::EngineConfig;
use crate::domain::events::DomainEvent;
use crate::domain::ids::{NodeId, TaskId};
use crate::domain::node::Node;
use crate::domain::outcome::Completion;
use crate::domain::state::{StateView, TaskState};
use crate::domain::task::TaskRecord;
use crate::error::EngineError;
use crate::ports::{Clock, EventSink, IdGenerator};
use crate::typed::TaskRegistry;

/// Workflow engine handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Engine {
    graph: Graph,
    registry: Arc<TaskRegistry>,
    dispatcher: Dispatcher,
    runner: TaskRunner,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The runner used for inline dispatch and by execution triggers.
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    pub fn is_debug(&self) -> bool {
        self.dispatcher.is_inline()
    }

    /// Validate `spec` and persist it, every node PENDING. Returns the root.
    pub async fn create(&self, spec: &WorkflowSpec) -> Result<NodeId, EngineError> {
        spec.validate(&self.registry)?;

        let nodes = spec.materialize(self.ids.as_ref(), self.clock.now());
        let root = nodes
            .first()
            .map(|n| n.id())
            .ok_or_else(|| CanvasError::Invalid(vec!["empty workflow".into()]))?;
        let count = nodes.len();
        for node in nodes {
            self.graph.insert(node).await?;
        }

        info!(root = %root, nodes = count, "workflow created");
        Ok(root)
    }

    /// Dispatch the entry nodes of a created workflow.
    pub async fn start(&self, root: NodeId) -> Result<(), EngineError> {
        let state = self.graph.node(root).await?.state();
        if state != StateView::Pending {
            return Err(EngineError::NotStartable { id: root, state });
        }

        info!(root = %root, debug = self.is_debug(), "workflow started");
        self.events.emit(&DomainEvent::WorkflowStarted { root });
        self.enter(root, None).await
    }

    /// `create` followed by `start`.
    pub async fn run(&self, spec: &WorkflowSpec) -> Result<NodeId, EngineError> {
        let root = self.create(spec).await?;
        self.start(root).await?;
        Ok(root)
    }

    /// Dispatch one PENDING task with its declared payload.
    pub async fn submit(&self, task_id: TaskId) -> Result<DispatchReceipt, EngineError> {
        self.submit_with(task_id, None).await
    }

    /// Tracker entry point: apply a completion notification.
    pub async fn on_complete(&self, completion: Completion) -> Result<Disposition, EngineError> {
        self.settle(completion.node_id, completion.outcome, machine::Origin::Notification)
            .await
    }

    /// Called by an execution trigger before running the task body.
    ///
    /// Returns the task when it should run (SCHEDULED or RUNNING; a RUNNING
    /// task is a redelivery), `None` when it was revoked, finished or never
    /// dispatched.
    pub async fn begin_run(&self, task_id: TaskId) -> Result<Option<TaskRecord>, EngineError> {
        let now = self.clock.now();
        self.graph
            .update_task(task_id, |task| match task.state {
                TaskState::Scheduled => {
                    task.mark_running(now);
                    Edit::Commit(Some(task.clone()))
                }
                TaskState::Running => Edit::Skip(Some(task.clone())),
                _ => Edit::Skip(None),
            })
            .await
    }

    /// Raw stored record.
    pub async fn node(&self, id: NodeId) -> Result<Node, EngineError> {
        self.graph.node(id).await
    }

    /// Result of a finished node, if any.
    pub async fn result(&self, id: NodeId) -> Result<Option<Value>, EngineError> {
        Ok(self.status(id).await?.result)
    }
}
