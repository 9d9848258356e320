//! Group record: concurrent members behind a fan-in barrier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{GroupId, NodeId};
use super::node::{Member, Parent};
use super::outcome::MemberResult;
use super::state::FlowState;

/// Result of recording one member's terminal state.
#[derive(Debug, Clone, PartialEq)]
pub enum BarrierStep {
    /// The slot was already filled (duplicate notification) or the barrier
    /// already fired.
    Duplicate,

    /// Recorded; other members are still outstanding.
    Recorded { remaining: usize },

    /// This record completed the barrier. Returned exactly once per group.
    Fired(Vec<MemberResult>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    pub root: NodeId,
    pub members: Vec<Member>,

    /// One slot per member, in insertion order (not completion order).
    pub slots: Vec<Option<MemberResult>>,

    /// Members not yet terminal.
    pub remaining: usize,

    pub fired: bool,

    pub state: FlowState,

    pub parent: Parent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<NodeId>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRecord {
    pub fn new(
        id: GroupId,
        root: NodeId,
        members: Vec<Member>,
        parent: Parent,
        now: DateTime<Utc>,
    ) -> Self {
        let count = members.len();
        Self {
            id,
            root,
            members,
            slots: vec![None; count],
            remaining: count,
            fired: false,
            state: FlowState::Pending,
            parent,
            trigger: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> Running. A group without members fires on start.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<BarrierStep> {
        if self.state != FlowState::Pending {
            return None;
        }
        self.state = FlowState::Running;
        self.updated_at = now;
        if self.members.is_empty() {
            return Some(self.fire());
        }
        Some(BarrierStep::Recorded {
            remaining: self.remaining,
        })
    }

    /// Fill the slot of member `index`; decrement and check the barrier.
    pub fn record(
        &mut self,
        index: usize,
        result: MemberResult,
        now: DateTime<Utc>,
    ) -> BarrierStep {
        if self.fired {
            return BarrierStep::Duplicate;
        }
        let Some(slot) = self.slots.get_mut(index) else {
            return BarrierStep::Duplicate;
        };
        if slot.is_some() {
            return BarrierStep::Duplicate;
        }
        *slot = Some(result);
        self.remaining = self.remaining.saturating_sub(1);
        self.updated_at = now;

        if self.remaining == 0 {
            self.fire()
        } else {
            BarrierStep::Recorded {
                remaining: self.remaining,
            }
        }
    }

    /// Revoke the group itself. Members are revoked (and recorded) separately.
    pub fn mark_revoked(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = FlowState::Revoked;
        self.updated_at = now;
        true
    }

    /// Ordered results; complete only once the barrier fired.
    pub fn results(&self) -> Vec<MemberResult> {
        self.slots.iter().flatten().cloned().collect()
    }

    fn fire(&mut self) -> BarrierStep {
        self.fired = true;
        let results = self.results();
        if self.state != FlowState::Revoked {
            self.state = if results.iter().any(MemberResult::is_failure) {
                FlowState::Failed
            } else if !results.is_empty()
                && results.iter().all(|r| matches!(r, MemberResult::Revoked))
            {
                FlowState::Revoked
            } else {
                FlowState::Succeeded
            };
        }
        BarrierStep::Fired(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::TaskId;
    use crate::domain::outcome::{ErrorDescriptor, Payload};
    use serde_json::json;
    use ulid::Ulid;

    fn group(len: usize) -> GroupRecord {
        let id = GroupId::from_ulid(Ulid::new());
        let members = (0..len)
            .map(|_| Member::Task(TaskId::from_ulid(Ulid::new())))
            .collect();
        GroupRecord::new(id, NodeId::Group(id), members, Parent::Standalone, Utc::now())
    }

    #[test]
    fn barrier_fires_once_in_insertion_order() {
        let mut g = group(2);
        let now = Utc::now();
        g.start(now);

        assert_eq!(
            g.record(1, MemberResult::Succeeded(json!(9)), now),
            BarrierStep::Recorded { remaining: 1 }
        );
        let step = g.record(0, MemberResult::Succeeded(json!(6)), now);
        assert_eq!(
            step,
            BarrierStep::Fired(vec![
                MemberResult::Succeeded(json!(6)),
                MemberResult::Succeeded(json!(9)),
            ])
        );
        assert_eq!(g.state, FlowState::Succeeded);

        // late duplicate
        assert_eq!(
            g.record(0, MemberResult::Succeeded(json!(6)), now),
            BarrierStep::Duplicate
        );
    }

    #[test]
    fn duplicate_member_does_not_decrement() {
        let mut g = group(3);
        let now = Utc::now();
        g.start(now);

        g.record(0, MemberResult::Succeeded(json!(1)), now);
        assert_eq!(
            g.record(0, MemberResult::Succeeded(json!(1)), now),
            BarrierStep::Duplicate
        );
        assert_eq!(g.remaining, 2);
    }

    #[test]
    fn failure_does_not_block_the_barrier() {
        let mut g = group(2);
        let now = Utc::now();
        g.start(now);

        g.record(
            0,
            MemberResult::Failed(ErrorDescriptor::execution("x", Payload::new())),
            now,
        );
        let step = g.record(1, MemberResult::Succeeded(json!(2)), now);

        assert!(matches!(step, BarrierStep::Fired(ref r) if r.len() == 2));
        assert_eq!(g.state, FlowState::Failed);
    }

    #[test]
    fn empty_group_fires_on_start() {
        let mut g = group(0);
        assert_eq!(g.start(Utc::now()), Some(BarrierStep::Fired(vec![])));
        assert!(g.fired);
        assert_eq!(g.state, FlowState::Succeeded);
    }

    #[test]
    fn revoked_group_stays_revoked_after_firing() {
        let mut g = group(1);
        let now = Utc::now();
        g.start(now);
        assert!(g.mark_revoked(now));

        let step = g.record(0, MemberResult::Revoked, now);
        assert_eq!(step, BarrierStep::Fired(vec![MemberResult::Revoked]));
        assert_eq!(g.state, FlowState::Revoked);
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let mut g = group(1);
        assert_eq!(
            g.record(5, MemberResult::Revoked, Utc::now()),
            BarrierStep::Duplicate
        );
        assert_eq!(g.remaining, 1);
    }
}
