//! TaskQueue port - the external at-least-once execution queue.
//!
//! The engine only ever enqueues. Delivery, retries and backoff belong to the
//! queue service; a local worker consumes through [`DeliverySource`].

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::TaskId;
use crate::domain::outcome::Payload;

/// Execution request: "POST `payload` to `url` after `delay`".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRequest {
    pub node_id: TaskId,
    pub endpoint: String,
    pub url: String,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "delay_secs")]
    pub delay: Option<Duration>,
}

/// Handle assigned by the queue to an accepted request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueMessageId(pub String);

impl fmt::Display for QueueMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, request: QueueRequest) -> Result<QueueMessageId, QueueError>;
}

/// One delivery of a request. The same request may be delivered more than
/// once; `attempt` counts deliveries of the same message.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message_id: QueueMessageId,
    pub request: QueueRequest,
    pub attempt: u32,
}

/// Consumer side of a queue.
#[async_trait]
pub trait DeliverySource: Send + Sync {
    /// Wait for the next due delivery. `None` means nothing is available
    /// right now and the caller should poll again.
    async fn next_delivery(&self) -> Option<Delivery>;
}

mod delay_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match delay {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ulid::Ulid;

    #[test]
    fn delay_is_serialized_in_seconds() {
        let request = QueueRequest {
            node_id: TaskId::from_ulid(Ulid::new()),
            endpoint: "sum".into(),
            url: "https://example.test/run/sum/".into(),
            payload: Payload::new(),
            delay: Some(Duration::from_secs(30)),
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["delay"], json!(30));

        let back: QueueRequest = serde_json::from_value(v).unwrap();
        assert_eq!(back.delay, Some(Duration::from_secs(30)));
    }
}
