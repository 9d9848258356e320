//! Domain model (ids, states, records, outcomes, events).
//!
//! Nothing here touches a store, a queue or the clock: records receive the
//! current time as an argument and report refused transitions as `false`.

pub mod chain;
pub mod errors;
pub mod events;
pub mod group;
pub mod ids;
pub mod node;
pub mod outcome;
pub mod state;
pub mod task;

pub use chain::{ChainRecord, ChainStep};
pub use errors::{InjectionError, TaskError};
pub use events::{DiscardReason, DomainEvent};
pub use group::{BarrierStep, GroupRecord};
pub use ids::{ChainId, GroupId, IdParseError, NodeId, TaskId};
pub use node::{Member, Node, NodeKind, Parent};
pub use outcome::{Completion, ErrorDescriptor, FailureKind, MemberResult, Outcome, Payload};
pub use state::{FlowState, StateView, TaskState};
pub use task::TaskRecord;
