//! Host function call shapes.
//!
//! The simple exports forward one argument to a host callback and log
//! each step; the advanced ones do the same without logging, and the
//! typed ones declare the argument and result as `u32`.

use serde_json::Value;
use wasmio_core::Raised;
use wasmio_wasm::{HostFunction, HostValue, Module};

/// Module exporting the I/O demos
#[derive(Debug)]
pub struct DemoIo {
    module: Module,
}

impl DemoIo {
    /// Create a fresh module instance
    #[must_use]
    pub fn new() -> Self {
        Self {
            module: Module::named("demo_io"),
        }
    }

    /// Module instance the exports run in
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Call `f` once and hand back whatever it returned
    ///
    /// # Errors
    ///
    /// Returns the callback's failure unchanged
    pub fn call_simple_sync_fn(&self, f: &HostFunction, arg: Value) -> Result<HostValue, Raised> {
        self.module.call("call_simple_sync_fn", || {
            tracing::info!("Calling sync fn from Rust...");
            let result = f.call1_sync(arg)?;
            tracing::info!("Function returned: {:?}", result);
            Ok(result)
        })
    }

    /// Call `f` once and wait for its promise
    ///
    /// # Errors
    ///
    /// Returns the callback's failure or rejection unchanged
    pub async fn call_simple_async_fn(&self, f: &HostFunction, arg: Value) -> Result<Value, Raised> {
        self.module
            .call_async("call_simple_async_fn", async {
                tracing::info!("Calling async fn from Rust...");
                let pending = f.call1_sync(arg)?;
                tracing::info!("Async fn is running");
                tracing::info!("Awaiting promise...");
                let result = pending.settle().await?;
                tracing::info!("Promise resolved with: {}", result);
                Ok(result)
            })
            .await
    }

    /// Call `f` once, untyped
    ///
    /// # Errors
    ///
    /// Returns the callback's failure unchanged
    pub fn call_advanced_sync_fn(&self, f: &HostFunction, arg: Value) -> Result<HostValue, Raised> {
        self.module
            .call("call_advanced_sync_fn", || f.call1_sync(arg))
    }

    /// Call `f` once and wait, untyped
    ///
    /// # Errors
    ///
    /// Returns the callback's failure or rejection unchanged
    pub async fn call_advanced_async_fn(&self, f: &HostFunction, arg: Value) -> Result<Value, Raised> {
        self.module
            .call_async("call_advanced_async_fn", f.call1_async(arg))
            .await
    }

    /// Call `f` once with a `u32`, expecting a `u32` back
    ///
    /// # Errors
    ///
    /// Returns `invalid type: unit value, expected u32` without calling
    /// `f` if `arg` is not a `u32`, or the callback's failure unchanged
    pub fn call_advanced_sync_fn_typed(&self, f: &HostFunction, arg: &Value) -> Result<u32, Raised> {
        self.module.call("call_advanced_sync_fn_typed", || {
            f.call1_sync_typed::<u32, u32>(arg)
        })
    }

    /// Call `f` once with a `u32` and wait for a `u32`
    ///
    /// # Errors
    ///
    /// As [`Self::call_advanced_sync_fn_typed`], plus the promise's rejection
    pub async fn call_advanced_async_fn_typed(
        &self,
        f: &HostFunction,
        arg: &Value,
    ) -> Result<u32, Raised> {
        self.module
            .call_async(
                "call_advanced_async_fn_typed",
                f.call1_async_typed::<u32, u32>(arg),
            )
            .await
    }
}

impl Default for DemoIo {
    fn default() -> Self {
        Self::new()
    }
}
