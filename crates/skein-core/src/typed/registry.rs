//! TaskRegistry - endpoint name -> handler + signature.
//!
//! Populated once at startup and then shared read-only behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::endpoint::{Endpoint, Signature};
use super::handler::{DynHandler, FnHandler, Handler, TypedHandler};
use crate::domain::errors::TaskError;
use crate::domain::outcome::Payload;

#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("endpoint '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown endpoint '{0}'")]
    Unknown(String),
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Endpoint, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_dyn(Arc::new(TypedHandler::<T, H>::new(handler)))
    }

    pub fn register_fn<F>(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.register_dyn(Arc::new(FnHandler::new(name, signature, f)))
    }

    pub fn register_dyn(&mut self, handler: Arc<dyn DynHandler>) -> Result<(), RegistryError> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn resolve(&self, endpoint: &str) -> Result<Arc<dyn DynHandler>, RegistryError> {
        self.handlers
            .get(endpoint)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(endpoint.to_string()))
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.handlers.contains_key(endpoint)
    }

    pub fn signature(&self, endpoint: &str) -> Option<&Signature> {
        self.handlers.get(endpoint).map(|h| h.signature())
    }

    /// Registered names, sorted.
    pub fn registered_endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
