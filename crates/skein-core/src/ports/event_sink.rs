//! EventSink port - where domain events go.
//!
//! Emission is synchronous and infallible: a sink that can fail must swallow
//! (and log) its own errors, the engine never waits on it.

use crate::domain::events::DomainEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}
