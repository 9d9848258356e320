//! Shared fixtures for the workflow integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use skein_core::domain::{NodeId, Payload, TaskError};
use skein_core::impls::{InMemoryTaskQueue, RecordingEventSink};
use skein_core::ports::Delivery;
use skein_core::typed::Signature;
use skein_core::{Engine, EngineConfig, Inbound, NodeStatus, QueueWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Debug,
    Production,
}

pub struct Harness {
    pub engine: Engine,
    pub queue: Arc<InMemoryTaskQueue>,
    pub events: Arc<RecordingEventSink>,
    pub worker: QueueWorker,
    executions: Arc<AtomicUsize>,
    notifications: Arc<Mutex<Vec<Payload>>>,
}

fn int(payload: &Payload, key: &str) -> Result<i64, TaskError> {
    payload
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| TaskError::new(format!("{key} must be an integer")))
}

pub fn production_config() -> EngineConfig {
    EngineConfig {
        project: Some("test-project".into()),
        location: Some("europe-west1".into()),
        queue: Some("workflows".into()),
        base_url: Some("https://hooks.test".into()),
        auth_token: Some("secret".into()),
        debug: false,
    }
}

impl Harness {
    pub fn new(mode: Mode) -> Self {
        Self::with_queue(mode, InMemoryTaskQueue::new())
    }

    /// Production harness whose queue delivers every request `1 + extra` times.
    pub fn with_duplicates(extra: u32) -> Self {
        Self::with_queue(Mode::Production, InMemoryTaskQueue::with_duplicates(extra))
    }

    fn with_queue(mode: Mode, queue: InMemoryTaskQueue) -> Self {
        let queue = Arc::new(queue);
        let events = Arc::new(RecordingEventSink::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let notifications = Arc::new(Mutex::new(Vec::new()));

        let config = match mode {
            Mode::Debug => EngineConfig::debug(),
            Mode::Production => production_config(),
        };

        let sum_runs = executions.clone();
        let total_runs = executions.clone();
        let explode_runs = executions.clone();
        let seen = notifications.clone();

        let engine = Engine::builder()
            .register_fn("sum", Signature::new().required("a").required("b"), move |p| {
                sum_runs.fetch_add(1, Ordering::SeqCst);
                Ok(json!(int(&p, "a")? + int(&p, "b")?))
            })
            .unwrap()
            .register_fn("total", Signature::new().required("values"), move |p| {
                total_runs.fetch_add(1, Ordering::SeqCst);
                let values = p
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| TaskError::new("values must be an array"))?;
                Ok(json!(values.iter().filter_map(Value::as_i64).sum::<i64>()))
            })
            .unwrap()
            .register_fn("explode", Signature::new().optional("x"), move |_| {
                explode_runs.fetch_add(1, Ordering::SeqCst);
                Err(TaskError::new("kaboom"))
            })
            .unwrap()
            .register_fn(
                "notify",
                Signature::new()
                    .required("task_id")
                    .required("task_name")
                    .required("error")
                    .required("payload"),
                move |p| {
                    seen.lock().unwrap().push(p);
                    Ok(Value::Null)
                },
            )
            .unwrap()
            .config(config)
            .queue(queue.clone())
            .event_sink(events.clone())
            .build()
            .unwrap();

        let worker = QueueWorker::new(queue.clone(), Inbound::new(engine.clone()));
        Self {
            engine,
            queue,
            events,
            worker,
            executions,
            notifications,
        }
    }

    /// Deliver everything currently ready, in order. Returns how many
    /// deliveries were processed.
    pub async fn step(&self) -> usize {
        let deliveries = self.queue.drain_ready().await;
        let n = deliveries.len();
        for delivery in deliveries {
            self.worker.process(delivery).await.unwrap();
        }
        n
    }

    /// Deliver until the queue is empty.
    pub async fn drain(&self) -> usize {
        let mut total = 0;
        loop {
            let n = self.step().await;
            if n == 0 {
                return total;
            }
            total += n;
        }
    }

    pub async fn process(&self, delivery: Delivery) {
        self.worker.process(delivery).await.unwrap();
    }

    /// Task bodies that actually ran (error callbacks excluded).
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<Payload> {
        self.notifications.lock().unwrap().clone()
    }

    pub async fn status(&self, id: NodeId) -> NodeStatus {
        self.engine.status(id).await.unwrap()
    }

    pub async fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.status(id).await.children
    }
}

pub fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}
