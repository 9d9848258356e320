//! EventSink implementations.

use std::sync::Mutex;

use tracing::debug;

use crate::domain::events::DomainEvent;
use crate::ports::EventSink;

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DomainEvent) {}
}

/// Forwards every event to `tracing` at debug level, with the event body as
/// a JSON field.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        match serde_json::to_string(event) {
            Ok(body) => debug!(target: "skein::events", event = event.name(), %body),
            Err(e) => debug!(target: "skein::events", event = event.name(), error = %e),
        }
    }
}

/// Keeps every event in memory, for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&DomainEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &DomainEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{NodeId, TaskId};
    use ulid::Ulid;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        let root = NodeId::Task(TaskId::from_ulid(Ulid::new()));

        sink.emit(&DomainEvent::WorkflowStarted { root });
        sink.emit(&DomainEvent::NodeRevoked { node_id: root });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "workflow_started");
        assert_eq!(
            sink.count(|e| matches!(e, DomainEvent::NodeRevoked { .. })),
            1
        );
    }

    #[test]
    fn noop_and_tracing_sinks_accept_events() {
        let root = NodeId::Task(TaskId::from_ulid(Ulid::new()));
        NoopEventSink.emit(&DomainEvent::WorkflowStarted { root });
        TracingEventSink.emit(&DomainEvent::WorkflowStarted { root });
    }
}
