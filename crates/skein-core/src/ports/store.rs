//! WorkflowStore port - the source of truth for every node.
//!
//! A flat arena keyed by `NodeId`. Each node carries a version; writes are
//! compare-and-swap on that version, which is the only synchronization the
//! engine relies on. Different nodes never contend with each other.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ids::NodeId;
use crate::domain::node::Node;

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("node {0} not found")]
    NotFound(NodeId),

    #[error("node {0} already exists")]
    AlreadyExists(NodeId),

    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    Conflict { id: NodeId, expected: u64, actual: u64 },

    #[error("gave up on {id} after {attempts} conflicting updates")]
    Contention { id: NodeId, attempts: u32 },

    #[error("node {id} is a {found}, expected a {expected}")]
    KindMismatch {
        id: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("store backend: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persist a new node at version 1.
    async fn insert(&self, node: Node) -> Result<(), StoreError>;

    async fn load(&self, id: NodeId) -> Result<Versioned<Node>, StoreError>;

    /// Replace the node if its stored version still equals `expected`.
    /// Returns the new version.
    async fn compare_and_swap(&self, expected: u64, node: Node) -> Result<u64, StoreError>;

    /// Every node whose `root` is `root`, in insertion order.
    async fn list_by_root(&self, root: NodeId) -> Result<Vec<Node>, StoreError>;
}
