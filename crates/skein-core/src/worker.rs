//! Local execution workers.
//!
//! Plays the part of the hosted queue's HTTP push: take a due delivery, call
//! the execution trigger, post the outcome to the tracker. Used by the CLI
//! and by production-mode tests.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{ApiError, Inbound, RunRequest, RunResponse};
use crate::domain::outcome::Completion;
use crate::engine::Disposition;
use crate::ports::{Delivery, DeliverySource};

#[derive(Clone)]
pub struct QueueWorker {
    source: Arc<dyn DeliverySource>,
    inbound: Inbound,
    token: Option<String>,
}

impl QueueWorker {
    /// Presents the engine's own `auth_token` on every call.
    pub fn new(source: Arc<dyn DeliverySource>, inbound: Inbound) -> Self {
        let token = inbound.engine().config().auth_token.clone();
        Self {
            source,
            inbound,
            token,
        }
    }

    /// Handle one delivery. `None` when the task was skipped.
    pub async fn process(&self, delivery: Delivery) -> Result<Option<Disposition>, ApiError> {
        let auth = self.token.as_deref().map(|t| format!("Bearer {t}"));
        let request = delivery.request;

        let response = self
            .inbound
            .run(
                auth.as_deref(),
                &request.endpoint,
                RunRequest {
                    node_id: request.node_id,
                    payload: request.payload,
                },
            )
            .await?;

        match response {
            RunResponse::Executed { node_id, outcome } => {
                let tracked = self
                    .inbound
                    .tracker(auth.as_deref(), Completion::new(node_id, outcome))
                    .await?;
                Ok(Some(tracked.disposition))
            }
            RunResponse::Skipped { node_id, state } => {
                debug!(node = %node_id, ?state, attempt = delivery.attempt, "delivery skipped");
                Ok(None)
            }
        }
    }
}

/// Worker group handle.
/// - `request_shutdown()` stops every worker after its current delivery
/// - `shutdown_and_join()` also waits for them
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, worker: QueueWorker) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = worker.clone();
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, worker, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// Does not cancel a delivery in progress; workers stop taking new ones.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    worker: QueueWorker,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let delivery = tokio::select! {
            _ = shutdown_rx.changed() => {
                continue;
            }
            delivery = worker.source.next_delivery() => delivery,
        };

        let Some(delivery) = delivery else {
            tokio::task::yield_now().await;
            continue;
        };

        let node = delivery.request.node_id;
        if let Err(e) = worker.process(delivery).await {
            warn!(worker = worker_id, node = %node, error = %e, "delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{ChainSpec, TaskSpec};
    use crate::config::EngineConfig;
    use crate::domain::events::DiscardReason;
    use crate::engine::Engine;
    use crate::impls::InMemoryTaskQueue;
    use crate::typed::Signature;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn engine(queue: Arc<InMemoryTaskQueue>) -> Engine {
        Engine::builder()
            .register_fn("inc", Signature::new().required("x"), |p| {
                Ok(json!(p.get("x").and_then(Value::as_i64).unwrap_or(0) + 1))
            })
            .unwrap()
            .config(EngineConfig {
                project: Some("p".into()),
                location: Some("l".into()),
                queue: Some("q".into()),
                base_url: Some("https://hooks.test".into()),
                auth_token: Some("t0k".into()),
                debug: false,
            })
            .queue(queue)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn duplicate_delivery_is_discarded() {
        let queue = Arc::new(InMemoryTaskQueue::with_duplicates(1));
        let engine = engine(queue.clone());
        let worker = QueueWorker::new(queue.clone(), Inbound::new(engine.clone()));

        engine
            .run(&TaskSpec::new("inc").arg("x", 1).into())
            .await
            .unwrap();

        let deliveries = queue.drain_ready().await;
        assert_eq!(deliveries.len(), 2);

        let mut dispositions = Vec::new();
        for delivery in deliveries {
            dispositions.push(worker.process(delivery).await.unwrap());
        }
        assert_eq!(dispositions, vec![Some(Disposition::Applied), None]);
    }

    #[tokio::test]
    async fn late_notification_after_redelivery_is_discarded() {
        let queue = Arc::new(InMemoryTaskQueue::with_duplicates(1));
        let engine = engine(queue.clone());
        let inbound = Inbound::new(engine.clone());
        let worker = QueueWorker::new(queue.clone(), inbound.clone());

        let root = engine
            .run(&TaskSpec::new("inc").arg("x", 1).into())
            .await
            .unwrap();
        let task = root.as_task().unwrap();

        // both deliveries start before either reports
        let deliveries = queue.drain_ready().await;
        let mut outcomes = Vec::new();
        for delivery in deliveries {
            let request = RunRequest {
                node_id: task,
                payload: delivery.request.payload,
            };
            match inbound.run(Some("Bearer t0k"), "inc", request).await.unwrap() {
                RunResponse::Executed { outcome, .. } => outcomes.push(outcome),
                other => panic!("redelivery of a running task must run: {other:?}"),
            }
        }
        assert_eq!(outcomes.len(), 2);

        let first = worker
            .inbound
            .tracker(Some("t0k"), Completion::new(task, outcomes[0].clone()));
        assert_eq!(first.await.unwrap().disposition, Disposition::Applied);
        let second = worker
            .inbound
            .tracker(Some("t0k"), Completion::new(task, outcomes[1].clone()));
        assert_eq!(
            second.await.unwrap().disposition,
            Disposition::Discarded {
                reason: DiscardReason::AlreadyTerminal
            }
        );
    }

    #[tokio::test]
    async fn worker_group_drives_a_chain_to_completion() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let engine = engine(queue.clone());
        let workers = WorkerGroup::spawn(
            2,
            QueueWorker::new(queue.clone(), Inbound::new(engine.clone())),
        );

        let spec = ChainSpec::new([
            TaskSpec::new("inc").arg("x", 1),
            TaskSpec::new("inc"),
            TaskSpec::new("inc"),
        ]);
        let root = engine.run(&spec.into()).await.unwrap();

        let mut done = false;
        for _ in 0..200 {
            if engine.status(root).await.unwrap().is_terminal() {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        workers.shutdown_and_join().await;

        assert!(done, "chain did not finish");
        assert_eq!(engine.result(root).await.unwrap(), Some(json!(4)));
        assert_eq!(queue.sent().await.len(), 3);
    }
}
