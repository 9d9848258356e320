//! Read-side views of stored nodes.

use serde::Serialize;
use serde_json::Value;

use super::Engine;
use crate::domain::ids::NodeId;
use crate::domain::node::{Node, NodeKind, Parent};
use crate::domain::outcome::{ErrorDescriptor, MemberResult};
use crate::domain::state::StateView;
use crate::error::EngineError;

/// Flattened state of one node, suitable for status endpoints and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub kind: NodeKind,
    pub root: NodeId,
    pub state: StateView,

    /// Endpoint of a task node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    pub parent: Parent,

    /// Task result, last result of a chain, or the ordered member results of
    /// a fired group.
    pub result: Option<Value>,

    pub error: Option<ErrorDescriptor>,

    /// Chain steps or group members.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<NodeId>,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

impl From<&Node> for NodeStatus {
    fn from(node: &Node) -> Self {
        let mut status = NodeStatus {
            id: node.id(),
            kind: node.kind(),
            root: node.root(),
            state: node.state(),
            endpoint: None,
            parent: Parent::Standalone,
            result: None,
            error: None,
            children: Vec::new(),
            trigger: None,
        };
        match node {
            Node::Task(task) => {
                status.endpoint = Some(task.endpoint.clone());
                status.parent = task.parent;
                status.result = task.result.clone();
                status.error = task.error.clone();
                status.trigger = task.trigger;
            }
            Node::Chain(chain) => {
                status.parent = chain.parent;
                status.result = chain.result.clone();
                status.children = chain.tasks.iter().map(|t| NodeId::Task(*t)).collect();
                status.trigger = chain.trigger;
            }
            Node::Group(group) => {
                status.parent = group.parent;
                if group.fired {
                    let values = group.results().iter().map(MemberResult::to_value).collect();
                    status.result = Some(Value::Array(values));
                }
                status.children = group.members.iter().map(|m| (*m).into()).collect();
                status.trigger = group.trigger;
            }
        }
        status
    }
}

impl Engine {
    pub async fn status(&self, id: NodeId) -> Result<NodeStatus, EngineError> {
        let node = self.graph.node(id).await?;
        Ok(NodeStatus::from(&node))
    }

    /// Every node of a workflow, root first.
    pub async fn graph(&self, root: NodeId) -> Result<Vec<NodeStatus>, EngineError> {
        let nodes = self.graph.list_by_root(root).await?;
        if nodes.is_empty() {
            return Err(EngineError::UnknownNode(root));
        }
        Ok(nodes.iter().map(NodeStatus::from).collect())
    }
}
