//! Server configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Config file could not be read or parsed
    #[error("invalid config {path}: {reason}")]
    Config {
        /// Path of the config file
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Listener could not be bound
    #[error("failed to bind {bind}: {source}")]
    Bind {
        /// Bind address
        bind: String,
        /// I/O error
        source: std::io::Error,
    },

    /// Server stopped with an I/O error
    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration of the event service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub bind: String,
    /// Fallback log filter when `RUST_LOG` is not set
    pub log_filter: String,
    /// Table holding the events
    pub table: String,
    /// Column holding each event document
    pub field: String,
    /// Events inserted at start-up
    pub seed: Vec<Map<String, Value>>,
}

impl ServerConfig {
    /// Create a config with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a config from a JSON file; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the file cannot be read or is
    /// not a valid config
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let config_error = |reason: String| ServerError::Config {
            path: path.display().to_string(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| config_error(e.to_string()))
    }

    /// Set the bind address
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Set the fallback log filter
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the events table
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Add an event inserted at start-up
    #[must_use]
    pub fn with_seed(mut self, event: Map<String, Value>) -> Self {
        self.seed.push(event);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            log_filter: "wasmio=info,tower_http=debug".to_string(),
            table: "event".to_string(),
            field: "data".to_string(),
            seed: Vec::new(),
        }
    }
}
