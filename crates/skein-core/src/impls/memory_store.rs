//! In-memory workflow store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ids::NodeId;
use crate::domain::node::Node;
use crate::ports::{StoreError, Versioned, WorkflowStore};

#[derive(Default)]
struct StoreState {
    /// Single source of truth: node + current version.
    nodes: HashMap<NodeId, Versioned<Node>>,

    /// Insertion order, for `list_by_root`.
    order: Vec<NodeId>,
}

/// Arena store guarded by one async mutex.
///
/// The lock is held only for the map operation itself, never across an
/// engine await point.
#[derive(Default)]
pub struct InMemoryWorkflowStore {
    state: Mutex<StoreState>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn insert(&self, node: Node) -> Result<(), StoreError> {
        let id = node.id();
        let mut state = self.state.lock().await;
        if state.nodes.contains_key(&id) {
            return Err(StoreError::AlreadyExists(id));
        }
        state.nodes.insert(
            id,
            Versioned {
                version: 1,
                record: node,
            },
        );
        state.order.push(id);
        Ok(())
    }

    async fn load(&self, id: NodeId) -> Result<Versioned<Node>, StoreError> {
        let state = self.state.lock().await;
        state.nodes.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn compare_and_swap(&self, expected: u64, node: Node) -> Result<u64, StoreError> {
        let id = node.id();
        let mut state = self.state.lock().await;
        let Some(current) = state.nodes.get_mut(&id) else {
            return Err(StoreError::NotFound(id));
        };
        if current.version != expected {
            return Err(StoreError::Conflict {
                id,
                expected,
                actual: current.version,
            });
        }
        current.version += 1;
        current.record = node;
        Ok(current.version)
    }

    async fn list_by_root(&self, root: NodeId) -> Result<Vec<Node>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|v| v.record.root() == root)
            .map(|v| v.record.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::TaskId;
    use crate::domain::node::Parent;
    use crate::domain::outcome::Payload;
    use crate::domain::task::TaskRecord;
    use chrono::Utc;
    use ulid::Ulid;

    fn task(root: Option<NodeId>) -> Node {
        let id = TaskId::from_ulid(Ulid::new());
        let root = root.unwrap_or(NodeId::Task(id));
        Node::Task(TaskRecord::new(
            id,
            root,
            "sum",
            Payload::new(),
            Parent::Standalone,
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn insert_then_load_starts_at_version_one() {
        let store = InMemoryWorkflowStore::new();
        let node = task(None);
        let id = node.id();

        store.insert(node.clone()).await.unwrap();
        let loaded = store.load(id).await.unwrap();

        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.record, node);
    }

    #[tokio::test]
    async fn double_insert_is_rejected() {
        let store = InMemoryWorkflowStore::new();
        let node = task(None);
        store.insert(node.clone()).await.unwrap();

        let err = store.insert(node.clone()).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(node.id()));
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = InMemoryWorkflowStore::new();
        let node = task(None);
        store.insert(node.clone()).await.unwrap();

        assert_eq!(store.compare_and_swap(1, node.clone()).await.unwrap(), 2);
        let err = store.compare_and_swap(1, node.clone()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn unknown_node_is_not_found() {
        let store = InMemoryWorkflowStore::new();
        let id = NodeId::Task(TaskId::from_ulid(Ulid::new()));
        assert_eq!(store.load(id).await.unwrap_err(), StoreError::NotFound(id));
    }

    #[tokio::test]
    async fn list_by_root_keeps_insertion_order() {
        let store = InMemoryWorkflowStore::new();
        let root = task(None);
        let root_id = root.id();
        let a = task(Some(root_id));
        let b = task(Some(root_id));
        let other = task(None);

        for n in [root.clone(), a.clone(), other, b.clone()] {
            store.insert(n).await.unwrap();
        }

        let ids: Vec<NodeId> = store
            .list_by_root(root_id)
            .await
            .unwrap()
            .iter()
            .map(Node::id)
            .collect();
        assert_eq!(ids, vec![root_id, a.id(), b.id()]);
    }
}
