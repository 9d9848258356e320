//! Inbound endpoints, framework-free.
//!
//! - `POST /run/<endpoint>/`  -> [`Inbound::run`]
//! - `POST /tracker/`         -> [`Inbound::tracker`]
//! - `GET  /revoke/?task=..`  -> [`Inbound::revoke`]
//!
//! An HTTP layer only has to decode the body, pass the `Authorization`
//! header through and map [`ApiError::status_code`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::ids::{ChainId, GroupId, NodeId, TaskId};
use crate::domain::outcome::{Completion, Outcome, Payload};
use crate::domain::state::StateView;
use crate::engine::{Disposition, Engine, RevokeReport};
use crate::error::EngineError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Unauthorized => 401,
            ApiError::BadRequest(_) => 400,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::UnknownNode(id) => ApiError::NotFound(id.to_string()),
            EngineError::Id(e) => ApiError::BadRequest(e.to_string()),
            EngineError::NotStartable { .. } => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Body of an execution trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub node_id: TaskId,
    #[serde(default)]
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResponse {
    /// The body ran; `outcome` still has to reach the tracker.
    Executed { node_id: TaskId, outcome: Outcome },

    /// Revoked, already finished or never dispatched: nothing ran.
    Skipped { node_id: TaskId, state: StateView },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerResponse {
    pub node_id: TaskId,
    pub disposition: Disposition,
}

/// `?task=<id>`, `?chain=<id>` or `?group=<id>`; exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokeQuery {
    pub task: Option<String>,
    pub chain: Option<String>,
    pub group: Option<String>,
}

impl RevokeQuery {
    pub fn node_id(&self) -> Result<NodeId, ApiError> {
        let bad = |e: crate::domain::ids::IdParseError| ApiError::BadRequest(e.to_string());
        match (&self.task, &self.chain, &self.group) {
            (Some(t), None, None) => t.parse::<TaskId>().map(NodeId::from).map_err(bad),
            (None, Some(c), None) => c.parse::<ChainId>().map(NodeId::from).map_err(bad),
            (None, None, Some(g)) => g.parse::<GroupId>().map(NodeId::from).map_err(bad),
            _ => Err(ApiError::BadRequest(
                "exactly one of task, chain or group is required".into(),
            )),
        }
    }
}

/// Decode a JSON request body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// The engine's inbound surface.
#[derive(Clone)]
pub struct Inbound {
    engine: Engine,
    token: Option<String>,
}

impl Inbound {
    /// Uses the engine's configured `auth_token`.
    pub fn new(engine: Engine) -> Self {
        let token = engine.config().auth_token.clone();
        Self { engine, token }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn authorize(&self, authorization: Option<&str>) -> Result<(), ApiError> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };
        let presented = authorization.map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim());
        if presented == Some(expected) {
            Ok(())
        } else {
            warn!("rejected inbound request with a bad token");
            Err(ApiError::Unauthorized)
        }
    }

    /// Execution trigger: run the task body if the task is still live.
    pub async fn run(
        &self,
        authorization: Option<&str>,
        endpoint: &str,
        request: RunRequest,
    ) -> Result<RunResponse, ApiError> {
        self.authorize(authorization)?;
        let node_id = request.node_id;

        let status = self.engine.status(node_id.into()).await?;
        if status.endpoint.as_deref() != Some(endpoint) {
            return Err(ApiError::BadRequest(format!(
                "task {node_id} does not run endpoint '{endpoint}'"
            )));
        }

        match self.engine.begin_run(node_id).await? {
            Some(_) => {
                let outcome = self.engine.runner().run(endpoint, request.payload).await;
                Ok(RunResponse::Executed { node_id, outcome })
            }
            None => {
                debug!(node = %node_id, state = ?status.state, "run skipped");
                Ok(RunResponse::Skipped {
                    node_id,
                    state: status.state,
                })
            }
        }
    }

    /// Completion notification.
    pub async fn tracker(
        &self,
        authorization: Option<&str>,
        completion: Completion,
    ) -> Result<TrackerResponse, ApiError> {
        self.authorize(authorization)?;
        let node_id = completion.node_id;
        let disposition = self.engine.on_complete(completion).await?;
        Ok(TrackerResponse {
            node_id,
            disposition,
        })
    }

    pub async fn revoke(
        &self,
        authorization: Option<&str>,
        query: RevokeQuery,
    ) -> Result<RevokeReport, ApiError> {
        self.authorize(authorization)?;
        let id = query.node_id()?;
        Ok(self.engine.revoke(id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::events::DiscardReason;
    use crate::domain::outcome::FailureKind;
    use crate::impls::InMemoryTaskQueue;
    use crate::typed::Signature;
    use crate::canvas::TaskSpec;
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn inbound(token: Option<&str>) -> (Inbound, Arc<InMemoryTaskQueue>) {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let engine = Engine::builder()
            .register_fn("sum", Signature::new().required("a").required("b"), |p| {
                let a = p.get("a").and_then(Value::as_i64).unwrap_or(0);
                let b = p.get("b").and_then(Value::as_i64).unwrap_or(0);
                Ok(json!(a + b))
            })
            .unwrap()
            .config(EngineConfig {
                project: Some("p".into()),
                location: Some("l".into()),
                queue: Some("q".into()),
                base_url: Some("https://hooks.test".into()),
                auth_token: token.map(str::to_string),
                debug: false,
            })
            .queue(queue.clone())
            .build()
            .unwrap();
        (Inbound::new(engine), queue)
    }

    #[rstest]
    #[case::missing(None, false)]
    #[case::wrong(Some("Bearer nope"), false)]
    #[case::bearer(Some("Bearer s3cret"), true)]
    #[case::bare(Some("s3cret"), true)]
    fn token_check(#[case] header: Option<&str>, #[case] allowed: bool) {
        let (api, _) = inbound(Some("s3cret"));
        assert_eq!(api.authorize(header).is_ok(), allowed);
    }

    #[test]
    fn no_token_configured_allows_everything() {
        let (api, _) = inbound(None);
        assert!(api.authorize(None).is_ok());
    }

    #[test]
    fn revoke_query_needs_exactly_one_id() {
        let empty = RevokeQuery::default();
        assert!(matches!(empty.node_id(), Err(ApiError::BadRequest(_))));

        let both = RevokeQuery {
            task: Some("task-x".into()),
            chain: Some("chain-y".into()),
            group: None,
        };
        assert!(matches!(both.node_id(), Err(ApiError::BadRequest(_))));

        let garbage = RevokeQuery {
            task: Some("chain-01H".into()),
            ..RevokeQuery::default()
        };
        assert_eq!(garbage.node_id().map_err(|e| e.status_code()), Err(400));
    }

    #[tokio::test]
    async fn run_then_tracker_completes_a_task() {
        let (api, queue) = inbound(None);
        let engine = api.engine().clone();
        let root = engine
            .run(&TaskSpec::new("sum").arg("a", 2).arg("b", 3).into())
            .await
            .unwrap();
        let task = root.as_task().unwrap();

        let sent = queue.sent().await;
        let request = RunRequest {
            node_id: task,
            payload: sent[0].payload.clone(),
        };
        let response = api.run(None, "sum", request.clone()).await.unwrap();
        let RunResponse::Executed { outcome, .. } = response else {
            panic!("task should run: {response:?}");
        };

        let tracked = api
            .tracker(None, Completion::new(task, outcome.clone()))
            .await
            .unwrap();
        assert_eq!(tracked.disposition, Disposition::Applied);
        assert_eq!(engine.result(root).await.unwrap(), Some(json!(5)));

        // redelivery after completion
        let again = api.run(None, "sum", request).await.unwrap();
        assert!(matches!(again, RunResponse::Skipped { state: StateView::Succeeded, .. }));
        let dup = api.tracker(None, Completion::new(task, outcome)).await.unwrap();
        assert_eq!(
            dup.disposition,
            Disposition::Discarded {
                reason: DiscardReason::AlreadyTerminal
            }
        );
    }

    #[tokio::test]
    async fn run_rejects_a_mismatched_endpoint() {
        let (api, _) = inbound(None);
        let root = api
            .engine()
            .run(&TaskSpec::new("sum").arg("a", 1).arg("b", 1).into())
            .await
            .unwrap();
        let request = RunRequest {
            node_id: root.as_task().unwrap(),
            payload: Payload::new(),
        };
        let err = api.run(None, "other", request).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (api, _) = inbound(None);
        let completion = Completion::new(
            TaskId::from_ulid(ulid::Ulid::new()),
            Outcome::failure(crate::domain::outcome::ErrorDescriptor::new(
                FailureKind::Execution,
                "x",
                Payload::new(),
            )),
        );
        let err = api.tracker(None, completion).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn decode_maps_bad_json_to_bad_request() {
        let err = decode::<RunRequest>(b"{not json").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
