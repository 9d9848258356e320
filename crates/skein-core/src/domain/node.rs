//! Flat node representation of a workflow graph.
//!
//! Nodes never own each other: chains and groups hold ids, and every node
//! holds the id of its parent. The store is an arena keyed by `NodeId`.

use serde::{Deserialize, Serialize};

use super::chain::ChainRecord;
use super::group::GroupRecord;
use super::ids::{ChainId, GroupId, NodeId, TaskId};
use super::state::StateView;
use super::task::TaskRecord;

/// Where a node sits in its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Parent {
    /// Workflow root, trigger target, or error callback.
    Standalone,

    /// Step `position` of a chain.
    Chain { id: ChainId, position: usize },

    /// Member `index` of a group.
    Group { id: GroupId, index: usize },
}

/// A group member: a single task or a whole chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Member {
    Task(TaskId),
    Chain(ChainId),
}

impl From<Member> for NodeId {
    fn from(member: Member) -> Self {
        match member {
            Member::Task(id) => NodeId::Task(id),
            Member::Chain(id) => NodeId::Chain(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Task,
    Chain,
    Group,
}

impl NodeKind {
    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Task => "task",
            NodeKind::Chain => "chain",
            NodeKind::Group => "group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Task(TaskRecord),
    Chain(ChainRecord),
    Group(GroupRecord),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Task(t) => NodeId::Task(t.id),
            Node::Chain(c) => NodeId::Chain(c.id),
            Node::Group(g) => NodeId::Group(g.id),
        }
    }

    pub fn root(&self) -> NodeId {
        match self {
            Node::Task(t) => t.root,
            Node::Chain(c) => c.root,
            Node::Group(g) => g.root,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Task(_) => NodeKind::Task,
            Node::Chain(_) => NodeKind::Chain,
            Node::Group(_) => NodeKind::Group,
        }
    }

    pub fn state(&self) -> StateView {
        match self {
            Node::Task(t) => t.state.into(),
            Node::Chain(c) => c.state.into(),
            Node::Group(g) => g.state.into(),
        }
    }
}

impl From<TaskRecord> for Node {
    fn from(record: TaskRecord) -> Self {
        Node::Task(record)
    }
}

impl From<ChainRecord> for Node {
    fn from(record: ChainRecord) -> Self {
        Node::Chain(record)
    }
}

impl From<GroupRecord> for Node {
    fn from(record: GroupRecord) -> Self {
        Node::Group(record)
    }
}
