//! In-memory task queue.
//!
//! Stands in for the hosted queue service in tests and in the CLI: accepts
//! requests, holds delayed ones until they are due, and hands deliveries to a
//! local worker. It can also simulate an outage and at-least-once
//! redelivery.

use std::collections::{BinaryHeap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::ids::TaskId;
use crate::ports::{
    Delivery, DeliverySource, QueueError, QueueMessageId, QueueRequest, TaskQueue,
};

/// Delayed delivery entry for the priority queue.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first); `seq`
/// keeps equal due times in enqueue order.
#[derive(Debug)]
struct ScheduledDelivery {
    due: Instant,
    seq: u64,
    delivery: Delivery,
}

impl PartialEq for ScheduledDelivery {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledDelivery {}

impl PartialOrd for ScheduledDelivery {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledDelivery {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Delivery>,
    scheduled: BinaryHeap<ScheduledDelivery>,

    /// Every accepted request, in acceptance order.
    sent: Vec<QueueRequest>,

    next_seq: u64,

    /// When set, `enqueue` fails with this message.
    outage: Option<String>,

    /// Extra deliveries per accepted request.
    duplicates: u32,
}

impl QueueState {
    fn next_message_id(&mut self) -> QueueMessageId {
        self.next_seq += 1;
        QueueMessageId(format!("msg-{:06}", self.next_seq))
    }

    /// Move deliveries whose time has come to the ready queue.
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.scheduled.peek() {
            if entry.due > now {
                break; // Heap is sorted, so we can stop
            }
            if let Some(entry) = self.scheduled.pop() {
                self.ready.push_back(entry.delivery);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver every request `1 + extra` times.
    pub fn with_duplicates(extra: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                duplicates: extra,
                ..QueueState::default()
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Simulate an outage (`Some`) or recover from one (`None`).
    pub async fn set_outage(&self, message: Option<&str>) {
        self.state.lock().await.outage = message.map(str::to_owned);
    }

    /// Requests accepted so far, in order.
    pub async fn sent(&self) -> Vec<QueueRequest> {
        self.state.lock().await.sent.clone()
    }

    /// How many times the engine enqueued `task_id`.
    pub async fn sent_count(&self, task_id: TaskId) -> usize {
        self.state
            .lock()
            .await
            .sent
            .iter()
            .filter(|r| r.node_id == task_id)
            .count()
    }

    /// Deliveries not yet handed out, due or not.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.scheduled.len()
    }

    /// Take every delivery that is due now, without waiting. Tests use this to
    /// replay deliveries in an order of their choosing.
    pub async fn drain_ready(&self) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        state.promote_due(Instant::now());
        state.ready.drain(..).collect()
    }

    /// Take every delivery, delayed ones included.
    pub async fn drain_all(&self) -> Vec<Delivery> {
        let mut state = self.state.lock().await;
        let mut all: Vec<Delivery> = state.ready.drain(..).collect();
        let mut scheduled: Vec<ScheduledDelivery> = state.scheduled.drain().collect();
        scheduled.sort_by(|a, b| b.cmp(a));
        all.extend(scheduled.into_iter().map(|s| s.delivery));
        all
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, request: QueueRequest) -> Result<QueueMessageId, QueueError> {
        let message_id = {
            let mut state = self.state.lock().await;
            if let Some(reason) = &state.outage {
                return Err(QueueError::Unavailable(reason.clone()));
            }

            let message_id = state.next_message_id();
            let due = request
                .delay
                .filter(|d| !d.is_zero())
                .map(|d| Instant::now() + d);
            state.sent.push(request.clone());

            for attempt in 1..=(1 + state.duplicates) {
                let delivery = Delivery {
                    message_id: message_id.clone(),
                    request: request.clone(),
                    attempt,
                };
                match due {
                    Some(due) => {
                        state.next_seq += 1;
                        let seq = state.next_seq;
                        state.scheduled.push(ScheduledDelivery { due, seq, delivery });
                    }
                    None => state.ready.push_back(delivery),
                }
            }
            message_id
        };

        // Notify waiting workers
        self.notify.notify_one();
        Ok(message_id)
    }
}

#[async_trait]
impl DeliverySource for InMemoryTaskQueue {
    async fn next_delivery(&self) -> Option<Delivery> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_due(Instant::now());

                if let Some(delivery) = state.ready.pop_front() {
                    return Some(delivery);
                }

                state.scheduled.peek().map(|entry| entry.due)
            };

            // Wait for an enqueue OR the next delayed delivery
            match next_wake {
                Some(wake) => {
                    tokio::select! {
                        _ = self.notify.notified() => {},
                        _ = tokio::time::sleep_until(wake.into()) => {},
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::outcome::Payload;
    use std::time::Duration;
    use ulid::Ulid;

    fn request(delay: Option<Duration>) -> QueueRequest {
        QueueRequest {
            node_id: TaskId::from_ulid(Ulid::new()),
            endpoint: "sum".into(),
            url: "http://localhost/run/sum/".into(),
            payload: Payload::new(),
            delay,
        }
    }

    #[tokio::test]
    async fn enqueue_then_deliver() {
        let queue = InMemoryTaskQueue::new();
        let req = request(None);
        let id = queue.enqueue(req.clone()).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_millis(100), queue.next_delivery())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(delivery.message_id, id);
        assert_eq!(delivery.request, req);
        assert_eq!(delivery.attempt, 1);
        assert_eq!(queue.pending().await, 0);
    }

    #[tokio::test]
    async fn outage_rejects_requests() {
        let queue = InMemoryTaskQueue::new();
        queue.set_outage(Some("maintenance")).await;

        let err = queue.enqueue(request(None)).await.unwrap_err();
        assert_eq!(err, QueueError::Unavailable("maintenance".into()));
        assert!(queue.sent().await.is_empty());

        queue.set_outage(None).await;
        assert!(queue.enqueue(request(None)).await.is_ok());
    }

    #[tokio::test]
    async fn duplicates_are_delivered_with_the_same_message_id() {
        let queue = InMemoryTaskQueue::with_duplicates(1);
        let id = queue.enqueue(request(None)).await.unwrap();

        let deliveries = queue.drain_ready().await;
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.message_id == id));
        assert_eq!(deliveries[1].attempt, 2);
    }

    #[tokio::test]
    async fn delayed_requests_wait_until_due() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(request(Some(Duration::from_secs(3600))))
            .await
            .unwrap();

        assert!(queue.drain_ready().await.is_empty());
        assert_eq!(queue.pending().await, 1);
        assert_eq!(queue.drain_all().await.len(), 1);
    }

    #[tokio::test]
    async fn delayed_delivery_wakes_the_consumer() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(request(Some(Duration::from_millis(20))))
            .await
            .unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(2), queue.next_delivery())
            .await
            .unwrap();
        assert!(delivery.is_some());
    }
}
