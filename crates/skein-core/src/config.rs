//! Engine configuration.
//!
//! Read from a TOML file and/or `SKEIN_*` environment variables. In debug
//! mode nothing external is contacted, so only `debug = true` is required.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "SKEIN_";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Cloud project hosting the task queue.
    pub project: Option<String>,

    /// Queue region.
    pub location: Option<String>,

    /// Queue name.
    pub queue: Option<String>,

    /// Public base URL that execution requests and callbacks are sent to.
    pub base_url: Option<String>,

    /// Bearer token expected on inbound triggers. `None` disables the check.
    pub auth_token: Option<String>,

    /// Execute tasks inline instead of enqueueing them.
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl EngineConfig {
    /// Debug-mode configuration with nothing else set.
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Configuration from `SKEIN_*` variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `SKEIN_*` variables on top of this configuration.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (`SKEIN_PROJECT`, ...).
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("PROJECT") {
            self.project = Some(v);
        }
        if let Some(v) = var("LOCATION") {
            self.location = Some(v);
        }
        if let Some(v) = var("QUEUE") {
            self.queue = Some(v);
        }
        if let Some(v) = var("BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = var("AUTH_TOKEN") {
            self.auth_token = Some(v);
        }
        if let Some(v) = var("DEBUG") {
            self.debug = parse_bool(&v)
                .ok_or_else(|| ConfigError::Invalid(format!("SKEIN_DEBUG: not a boolean: {v}")))?;
        }
        Ok(self)
    }

    /// Production mode needs the queue coordinates and a base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debug {
            return Ok(());
        }
        let missing: Vec<&str> = [
            ("project", &self.project),
            ("location", &self.location),
            ("queue", &self.queue),
            ("base_url", &self.base_url),
        ]
        .into_iter()
        .filter(|(_, v)| v.as_deref().is_none_or(str::is_empty))
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "missing settings for production mode: {}",
                missing.join(", ")
            )));
        }
        if let Some(url) = &self.base_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "base_url must be an http(s) URL: {url}"
            )));
        }
        Ok(())
    }

    /// `projects/<p>/locations/<l>/queues/<q>`, when all three are set.
    pub fn queue_path(&self) -> Option<String> {
        match (&self.project, &self.location, &self.queue) {
            (Some(p), Some(l), Some(q)) => Some(format!("projects/{p}/locations/{l}/queues/{q}")),
            _ => None,
        }
    }

    /// Execution trigger URL for `endpoint`.
    pub fn run_url(&self, endpoint: &str) -> String {
        let base = self.base_url.as_deref().unwrap_or("").trim_end_matches('/');
        format!("{base}/run/{endpoint}/")
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
