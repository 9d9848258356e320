//! EngineBuilder - wiring and startup validation.
//!
//! # Fail-fast
//! - `expect_endpoints()` lists endpoints the deployment relies on
//! - `build()` checks they are all registered, validates the configuration
//!   and refuses production mode without a task queue
//!
//! ```ignore
//! let engine = Engine::builder()
//!     .register::<Sum, _>(SumHandler)?
//!     .expect_endpoints(&["sum"])
//!     .config(EngineConfig::debug())
//!     .build()?;
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::Engine;
use super::dispatcher::Dispatcher;
use super::graph::Graph;
use super::runner::TaskRunner;
use crate::config::{ConfigError, EngineConfig};
use crate::domain::errors::TaskError;
use crate::domain::outcome::Payload;
use crate::impls::{InMemoryWorkflowStore, TracingEventSink};
use crate::ports::{
    Clock, EventSink, IdGenerator, SystemClock, TaskQueue, UlidGenerator, WorkflowStore,
};
use crate::typed::{Endpoint, Handler, RegistryError, Signature, TaskRegistry};

pub struct EngineBuilder {
    registry: TaskRegistry,
    expected_endpoints: Option<Vec<String>>,
    config: EngineConfig,
    store: Option<Arc<dyn WorkflowStore>>,
    queue: Option<Arc<dyn TaskQueue>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    events: Option<Arc<dyn EventSink>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing endpoints: {0:?}. These endpoints were expected but not registered.")]
    MissingEndpoints(Vec<String>),

    #[error("Production mode needs a task queue: call .queue(..) or enable debug mode.")]
    MissingQueue,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            registry: TaskRegistry::new(),
            expected_endpoints: None,
            config: EngineConfig::default(),
            store: None,
            queue: None,
            clock: None,
            ids: None,
            events: None,
        }
    }

    pub fn register<T: Endpoint, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// Register an untyped endpoint working on the raw payload.
    pub fn register_fn<F>(
        mut self,
        name: impl Into<String>,
        signature: Signature,
        f: F,
    ) -> Result<Self, RegistryError>
    where
        F: Fn(Payload) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        self.registry.register_fn(name, signature, f)?;
        Ok(self)
    }

    pub fn expect_endpoints(mut self, endpoints: &[&str]) -> Self {
        self.expected_endpoints = Some(endpoints.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shorthand for flipping `config.debug`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    pub fn store(mut self, store: Arc<dyn WorkflowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Task queue used in production mode. Ignored in debug mode.
    pub fn queue(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> Result<Engine, BuildError> {
        if let Some(expected) = &self.expected_endpoints {
            let registered = self.registry.registered_endpoints();
            let missing: Vec<String> = expected
                .iter()
                .filter(|e| !registered.contains(e))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingEndpoints(missing));
            }
        }
        self.config.validate()?;

        let registry = Arc::new(self.registry);
        let config = Arc::new(self.config);
        let runner = TaskRunner::new(registry.clone());

        let dispatcher = if config.debug {
            Dispatcher::inline(runner.clone(), config.clone())
        } else {
            let queue = self.queue.ok_or(BuildError::MissingQueue)?;
            Dispatcher::queued(queue, config.clone())
        };

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryWorkflowStore::new()));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));

        info!(
            debug = config.debug,
            endpoints = registry.registered_endpoints().len(),
            "engine built"
        );

        Ok(Engine {
            graph: Graph::new(store),
            registry,
            dispatcher,
            runner,
            clock,
            ids,
            events,
            config,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
