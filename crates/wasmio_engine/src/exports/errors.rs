//! Parse failures, one per shape the host can observe.

use serde::{Deserialize, Serialize};
use wasmio_core::Raised;
use wasmio_wasm::Module;

/// A conference event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name
    pub name: String,
    /// Year it takes place
    pub year: u32,
}

/// Parse error with a recognisable prefix
#[derive(Debug, thiserror::Error)]
#[error("[CustomError] {source}")]
pub struct CustomError {
    #[from]
    source: serde_json::Error,
}

/// Module exporting the parse demos
#[derive(Debug)]
pub struct DemoErrors {
    module: Module,
}

impl DemoErrors {
    /// Create a fresh module instance
    #[must_use]
    pub fn new() -> Self {
        Self {
            module: Module::named("demo_errors"),
        }
    }

    /// Module instance the exports run in
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Fails with the decoder message as a bare string
    ///
    /// # Errors
    ///
    /// Returns [`Raised::Text`] if `input` is not an [`Event`]
    pub fn parse_with_string_error(&self, input: &str) -> Result<Event, Raised> {
        self.module.call("parse_with_string_error", || {
            serde_json::from_str(input).map_err(|e| Raised::text(e.to_string()))
        })
    }

    /// Fails with the decoder message as an `Error`
    ///
    /// # Errors
    ///
    /// Returns an `Error` if `input` is not an [`Event`]
    pub fn parse_with_error(&self, input: &str) -> Result<Event, Raised> {
        self.module.call("parse_with_error", || {
            serde_json::from_str(input).map_err(|e| Raised::from_error(&e))
        })
    }

    /// Fails with a [`CustomError`] as an `Error`
    ///
    /// # Errors
    ///
    /// Returns an `Error` prefixed with `[CustomError]` if `input` is not
    /// an [`Event`]
    pub fn parse_with_custom_error(&self, input: &str) -> Result<Event, Raised> {
        self.module.call("parse_with_custom_error", || {
            serde_json::from_str(input).map_err(|e| Raised::from_error(&CustomError::from(e)))
        })
    }

    /// Panics on bad input, which traps the module
    ///
    /// # Errors
    ///
    /// Returns a `RuntimeError` if `input` is not an [`Event`]
    pub fn parse_with_panic(&self, input: &str) -> Result<Event, Raised> {
        self.module.call("parse_with_panic", || {
            match serde_json::from_str::<Event>(input) {
                Ok(event) => Ok(event),
                Err(e) => panic!("failed to parse event: {}", e),
            }
        })
    }
}

impl Default for DemoErrors {
    fn default() -> Self {
        Self::new()
    }
}
