//! skein-core
//!
//! Workflow orchestration over an at-least-once task queue: tasks, chains
//! and groups, result injection between steps, completion tracking and
//! revocation.
//!
//! # Modules
//! - **domain**: ids, records, states, outcomes, events
//! - **ports**: store, queue, clock, id and event abstractions
//! - **impls**: in-memory port implementations
//! - **typed**: endpoint signatures, handlers, registry
//! - **canvas**: workflow definitions and validation
//! - **engine**: dispatcher, state machine, revocation, builder
//! - **api**: inbound run / tracker / revoke entry points
//! - **worker**: local queue consumers
//! - **config**: engine configuration

pub mod api;
pub mod canvas;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;
pub mod worker;

pub use api::{ApiError, Inbound};
pub use canvas::{ChainSpec, GroupSpec, MemberSpec, TaskSpec, WorkflowSpec};
pub use config::EngineConfig;
pub use engine::{
    BuildError, DispatchReceipt, Disposition, Engine, EngineBuilder, NodeStatus, RevokeReport,
};
pub use error::EngineError;
pub use worker::{QueueWorker, WorkerGroup};
