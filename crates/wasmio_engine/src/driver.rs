//! Host drivers.
//!
//! A driver gives the module read and write access to data the host owns.
//! The module only ever passes statements in and plain values out.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use wasmio_core::Raised;
use wasmio_wasm::HostFunction;

/// Host data access
///
/// Both primitives are required. A driver used in one direction only
/// answers the other with a no-op.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a mutating statement
    ///
    /// # Errors
    ///
    /// Returns the host's failure unchanged
    async fn execute_raw(&self, query: String) -> Result<Value, Raised>;

    /// Run a reading statement
    ///
    /// # Errors
    ///
    /// Returns the host's failure unchanged
    async fn query_raw(&self, query: String) -> Result<Value, Raised>;
}

/// Driver built from two host callbacks
#[derive(Debug, Clone)]
pub struct HostDriver {
    /// Mutating primitive
    pub execute_raw: HostFunction,
    /// Reading primitive
    pub query_raw: HostFunction,
}

impl HostDriver {
    /// Create a driver from both primitives
    #[must_use]
    pub fn new(execute_raw: HostFunction, query_raw: HostFunction) -> Self {
        Self {
            execute_raw,
            query_raw,
        }
    }

    /// Driver that can only read; writes resolve to `null`
    #[must_use]
    pub fn query_only(query_raw: HostFunction) -> Self {
        Self::new(HostFunction::noop("execute_raw"), query_raw)
    }

    /// Driver that can only write; reads resolve to `null`
    #[must_use]
    pub fn execute_only(execute_raw: HostFunction) -> Self {
        Self::new(execute_raw, HostFunction::noop("query_raw"))
    }
}

#[async_trait]
impl Driver for HostDriver {
    async fn execute_raw(&self, query: String) -> Result<Value, Raised> {
        self.execute_raw.call1_async(Value::String(query)).await
    }

    async fn query_raw(&self, query: String) -> Result<Value, Raised> {
        self.query_raw.call1_async(Value::String(query)).await
    }
}

/// Driver that fakes a remote database: every call waits, then answers
/// `42` for writes and two fixed rows for reads.
#[derive(Debug, Clone)]
pub struct DemoDriver {
    latency: Duration,
}

impl DemoDriver {
    /// Latency of the demo database
    pub const DEFAULT_LATENCY: Duration = Duration::from_millis(200);

    /// Create a demo driver with [`Self::DEFAULT_LATENCY`]
    #[must_use]
    pub fn new() -> Self {
        Self {
            latency: Self::DEFAULT_LATENCY,
        }
    }

    /// Set the simulated latency
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for DemoDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for DemoDriver {
    async fn execute_raw(&self, query: String) -> Result<Value, Raised> {
        tracing::info!("execute_raw({})", query);
        tokio::time::sleep(self.latency).await;
        Ok(json!(42))
    }

    async fn query_raw(&self, query: String) -> Result<Value, Raised> {
        tracing::info!("query_raw({})", query);
        tokio::time::sleep(self.latency).await;
        Ok(json!([
            { "id": 1, "name": "John" },
            { "id": 2, "name": "Jane" },
        ]))
    }
}
