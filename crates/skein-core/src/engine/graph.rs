//! Typed access to the workflow store.
//!
//! Every state change goes through [`Graph::update`]: load, apply a closure,
//! compare-and-swap, and start over on a version conflict. The closure may
//! run several times and must only look at the record it is given.

use std::sync::Arc;

use crate::domain::chain::ChainRecord;
use crate::domain::group::GroupRecord;
use crate::domain::ids::{ChainId, GroupId, NodeId, TaskId};
use crate::domain::node::Node;
use crate::domain::task::TaskRecord;
use crate::error::EngineError;
use crate::ports::{StoreError, WorkflowStore};

/// Conflicting updates tolerated before giving up on a node.
pub const MAX_CAS_ATTEMPTS: u32 = 64;

/// What an update closure decided.
pub(crate) enum Edit<X> {
    /// Persist the modified record and return the value.
    Commit(X),
    /// Leave the stored record untouched.
    Skip(X),
}

/// A record kind stored as one `Node` variant.
pub(crate) trait NodeRecord: Sized + Send {
    const KIND: &'static str;

    fn from_node(node: Node) -> Result<Self, Node>;

    fn into_node(self) -> Node;
}

impl NodeRecord for TaskRecord {
    const KIND: &'static str = "task";

    fn from_node(node: Node) -> Result<Self, Node> {
        match node {
            Node::Task(t) => Ok(t),
            other => Err(other),
        }
    }

    fn into_node(self) -> Node {
        Node::Task(self)
    }
}

impl NodeRecord for ChainRecord {
    const KIND: &'static str = "chain";

    fn from_node(node: Node) -> Result<Self, Node> {
        match node {
            Node::Chain(c) => Ok(c),
            other => Err(other),
        }
    }

    fn into_node(self) -> Node {
        Node::Chain(self)
    }
}

impl NodeRecord for GroupRecord {
    const KIND: &'static str = "group";

    fn from_node(node: Node) -> Result<Self, Node> {
        match node {
            Node::Group(g) => Ok(g),
            other => Err(other),
        }
    }

    fn into_node(self) -> Node {
        Node::Group(self)
    }
}

#[derive(Clone)]
pub(crate) struct Graph {
    store: Arc<dyn WorkflowStore>,
}

impl Graph {
    pub(crate) fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub(crate) async fn insert(&self, node: Node) -> Result<(), EngineError> {
        Ok(self.store.insert(node).await?)
    }

    pub(crate) async fn node(&self, id: NodeId) -> Result<Node, EngineError> {
        Ok(self.store.load(id).await?.record)
    }

    pub(crate) async fn list_by_root(&self, root: NodeId) -> Result<Vec<Node>, EngineError> {
        Ok(self.store.list_by_root(root).await?)
    }

    pub(crate) async fn task(&self, id: TaskId) -> Result<TaskRecord, EngineError> {
        self.typed(NodeId::Task(id)).await
    }

    async fn typed<R: NodeRecord>(&self, id: NodeId) -> Result<R, EngineError> {
        let node = self.node(id).await?;
        R::from_node(node).map_err(|other| kind_mismatch::<R>(id, &other))
    }

    pub(crate) async fn update_task<X: Send>(
        &self,
        id: TaskId,
        f: impl FnMut(&mut TaskRecord) -> Edit<X> + Send,
    ) -> Result<X, EngineError> {
        self.update(NodeId::Task(id), f).await
    }

    pub(crate) async fn update_chain<X: Send>(
        &self,
        id: ChainId,
        f: impl FnMut(&mut ChainRecord) -> Edit<X> + Send,
    ) -> Result<X, EngineError> {
        self.update(NodeId::Chain(id), f).await
    }

    pub(crate) async fn update_group<X: Send>(
        &self,
        id: GroupId,
        f: impl FnMut(&mut GroupRecord) -> Edit<X> + Send,
    ) -> Result<X, EngineError> {
        self.update(NodeId::Group(id), f).await
    }

    /// Read-modify-write with optimistic concurrency.
    async fn update<R: NodeRecord, X: Send>(
        &self,
        id: NodeId,
        mut f: impl FnMut(&mut R) -> Edit<X> + Send,
    ) -> Result<X, EngineError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let loaded = self.store.load(id).await?;
            let mut record =
                R::from_node(loaded.record).map_err(|other| kind_mismatch::<R>(id, &other))?;

            match f(&mut record) {
                Edit::Skip(x) => return Ok(x),
                Edit::Commit(x) => {
                    match self
                        .store
                        .compare_and_swap(loaded.version, record.into_node())
                        .await
                    {
                        Ok(_) => return Ok(x),
                        Err(StoreError::Conflict { .. }) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
            }
        }
        Err(StoreError::Contention {
            id,
            attempts: MAX_CAS_ATTEMPTS,
        }
        .into())
    }
}

fn kind_mismatch<R: NodeRecord>(id: NodeId, found: &Node) -> EngineError {
    StoreError::KindMismatch {
        id,
        expected: R::KIND,
        found: found.kind().name(),
    }
    .into()
}
