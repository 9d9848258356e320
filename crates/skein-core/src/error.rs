use thiserror::Error;

use crate::canvas::CanvasError;
use crate::config::ConfigError;
use crate::domain::errors::InjectionError;
use crate::domain::ids::{IdParseError, NodeId};
use crate::domain::state::StateView;
use crate::engine::BuildError;
use crate::ports::{QueueError, StoreError};
use crate::typed::RegistryError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {id} is {state:?}, only PENDING workflows can be started")]
    NotStartable { id: NodeId, state: StateView },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error(transparent)]
    Canvas(#[from] CanvasError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Id(#[from] IdParseError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => EngineError::UnknownNode(id),
            other => EngineError::Store(other),
        }
    }
}
