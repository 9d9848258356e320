//! Revocation: stop a node and everything that would still run because of it.
//!
//! Propagation rules:
//! - a chain takes its remaining tasks and its trigger down with it
//! - a group takes its unfinished members and its trigger
//! - a revoked task halts its chain and takes the steps after it; steps
//!   before it are left to finish
//! - inside a group a revoked task counts as a REVOKED member and the
//!   barrier keeps going
//! - nodes already terminal are left alone

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{debug, info};

use super::Engine;
use super::graph::Edit;
use super::machine::Backlog;
use crate::domain::events::DomainEvent;
use crate::domain::ids::{ChainId, GroupId, NodeId, TaskId};
use crate::domain::node::Parent;
use crate::domain::outcome::MemberResult;
use crate::error::EngineError;

/// Result of one `revoke` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevokeReport {
    pub requested: NodeId,

    /// Nodes this call moved to REVOKED, in the order it reached them.
    /// Empty when the requested node had already finished.
    pub revoked: Vec<NodeId>,
}

impl RevokeReport {
    pub fn is_noop(&self) -> bool {
        self.revoked.is_empty()
    }
}

impl Engine {
    /// Revoke a task, chain or group.
    pub async fn revoke(&self, id: NodeId) -> Result<RevokeReport, EngineError> {
        // unknown ids are an error, terminal ones are not
        self.graph.node(id).await?;

        let mut revoked = Vec::new();
        let mut backlog = Backlog::default();
        self.revoke_node(id, true, &mut revoked, &mut backlog)
            .await?;
        // a fired barrier may have queued inline outcomes
        self.drain(&mut backlog).await?;

        info!(node = %id, revoked = revoked.len(), "revocation applied");
        Ok(RevokeReport {
            requested: id,
            revoked,
        })
    }

    /// `upward`: also tell the parent (chain halts, group slot filled).
    fn revoke_node<'a>(
        &'a self,
        id: NodeId,
        upward: bool,
        revoked: &'a mut Vec<NodeId>,
        backlog: &'a mut Backlog,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            match id {
                NodeId::Task(task) => self.revoke_task(task, upward, revoked, backlog).await,
                NodeId::Chain(chain) => {
                    self.revoke_chain(chain, None, upward, revoked, backlog)
                        .await
                }
                NodeId::Group(group) => self.revoke_group(group, revoked, backlog).await,
            }
        })
    }

    async fn revoke_task(
        &self,
        task_id: TaskId,
        upward: bool,
        revoked: &mut Vec<NodeId>,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let changed = self
            .graph
            .update_task(task_id, |task| {
                if task.mark_revoked(now) {
                    Edit::Commit(Some(task.clone()))
                } else {
                    Edit::Skip(None)
                }
            })
            .await?;
        let Some(task) = changed else {
            return Ok(());
        };

        if task.revoke_requested {
            debug!(node = %task_id, "revoked while running, outcome will be dropped");
        }
        self.mark_revoked_event(task_id.into(), revoked);

        if !upward {
            return Ok(());
        }
        match task.parent {
            Parent::Chain { id, position } => {
                self.revoke_chain(id, Some(position), true, revoked, backlog)
                    .await
            }
            Parent::Group { id, index } => {
                self.report_member(id, index, MemberResult::Revoked, backlog)
                    .await
            }
            Parent::Standalone => match task.trigger {
                Some(trigger) => self.revoke_node(trigger, true, revoked, backlog).await,
                None => Ok(()),
            },
        }
    }

    /// `halted_at`: position of a revoked step. Only the steps after it are
    /// revoked; without it, everything from the cursor on.
    async fn revoke_chain(
        &self,
        chain_id: ChainId,
        halted_at: Option<usize>,
        upward: bool,
        revoked: &mut Vec<NodeId>,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let changed = self
            .graph
            .update_chain(chain_id, |chain| {
                if chain.mark_revoked(now) {
                    Edit::Commit(Some(chain.clone()))
                } else {
                    Edit::Skip(None)
                }
            })
            .await?;
        let Some(chain) = changed else {
            return Ok(());
        };
        self.mark_revoked_event(chain_id.into(), revoked);

        let tasks = match halted_at {
            Some(position) => chain.tasks_after(position),
            None => chain.remaining(),
        };
        for task in tasks {
            self.revoke_node((*task).into(), false, revoked, backlog)
                .await?;
        }
        if let Some(trigger) = chain.trigger {
            self.revoke_node(trigger, true, revoked, backlog).await?;
        }
        if upward && let Parent::Group { id, index } = chain.parent {
            self.report_member(id, index, MemberResult::Revoked, backlog)
                .await?;
        }
        Ok(())
    }

    async fn revoke_group(
        &self,
        group_id: GroupId,
        revoked: &mut Vec<NodeId>,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let changed = self
            .graph
            .update_group(group_id, |group| {
                if group.mark_revoked(now) {
                    Edit::Commit(Some(group.clone()))
                } else {
                    Edit::Skip(None)
                }
            })
            .await?;
        let Some(group) = changed else {
            return Ok(());
        };
        self.mark_revoked_event(group_id.into(), revoked);

        // members fill their own slots as they go down
        for (member, slot) in group.members.iter().zip(&group.slots) {
            if slot.is_none() {
                self.revoke_node((*member).into(), true, revoked, backlog)
                    .await?;
            }
        }
        if let Some(trigger) = group.trigger {
            self.revoke_node(trigger, true, revoked, backlog).await?;
        }
        Ok(())
    }

    fn mark_revoked_event(&self, node_id: NodeId, revoked: &mut Vec<NodeId>) {
        debug!(node = %node_id, "revoked");
        self.events.emit(&DomainEvent::NodeRevoked { node_id });
        revoked.push(node_id);
    }
}
