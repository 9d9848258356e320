//! Ports - the engine's view of the outside world.
//!
//! Each trait stands for an external collaborator (persistence, the task
//! queue, time, id allocation, event export). The engine only holds
//! `Arc<dyn Port>` handles; `impls` has the in-memory versions.
//!
//! # Principles
//! - The store is the source of truth; the queue only carries requests.
//! - Every state transition is a compare-and-swap on one node.

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod queue;
pub mod store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::queue::{
    Delivery, DeliverySource, QueueError, QueueMessageId, QueueRequest, TaskQueue,
};
pub use self::store::{StoreError, Versioned, WorkflowStore};
