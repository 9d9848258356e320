//! Impls - in-memory implementations of the ports.
//!
//! Used by the test suites, debug setups and the CLI demo. A deployment
//! provides its own `WorkflowStore` and `TaskQueue` against real services.

pub mod event_sinks;
pub mod memory_queue;
pub mod memory_store;

pub use self::event_sinks::{NoopEventSink, RecordingEventSink, TracingEventSink};
pub use self::memory_queue::InMemoryTaskQueue;
pub use self::memory_store::InMemoryWorkflowStore;
