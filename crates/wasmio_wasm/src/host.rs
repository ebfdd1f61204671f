//! Host functions called from the module.
//!
//! The host hands the module plain callbacks. A callback may answer with a
//! value straight away or with a promise that settles later, and the module
//! can call it in four shapes:
//!
//! ```text
//!   call1_sync        value in, value or promise out, untouched
//!   call1_async       value in, settled value out
//!   call1_sync_typed  ABI-lowered T in, ABI-lowered R out
//!   call1_async_typed ABI-lowered T in, settled and ABI-lowered R out
//! ```
//!
//! Each shape invokes the callback at most once. The typed shapes lower
//! the argument first and never invoke the callback when lowering fails.

use crate::abi::{self, AbiParam};
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use wasmio_core::Raised;

/// A pending host result
pub type HostPromise = BoxFuture<'static, Result<Value, Raised>>;

/// What a host callback hands back
pub enum HostValue {
    /// A value, available now
    Ready(Value),
    /// A promise that settles later
    Promise(HostPromise),
}

impl HostValue {
    /// A promise that is already resolved
    #[must_use]
    pub fn resolved(value: Value) -> Self {
        Self::Promise(Box::pin(futures::future::ready(Ok(value))))
    }

    /// True for a promise
    #[must_use]
    pub fn is_promise(&self) -> bool {
        matches!(self, Self::Promise(_))
    }

    /// The value, if it is available now
    #[must_use]
    pub fn into_ready(self) -> Option<Value> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Promise(_) => None,
        }
    }

    /// Wait for the value; a ready value resolves immediately
    ///
    /// # Errors
    ///
    /// Returns the promise's rejection
    pub async fn settle(self) -> Result<Value, Raised> {
        match self {
            Self::Ready(value) => Ok(value),
            Self::Promise(promise) => promise.await,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Promise(_) => f.write_str("Promise { <pending> }"),
        }
    }
}

/// Host callback implementation
pub type HostFn = Arc<dyn Fn(Value) -> Result<HostValue, Raised> + Send + Sync>;

/// A host callback the module may call
#[derive(Clone)]
pub struct HostFunction {
    /// Function name, for logs
    name: String,
    /// The function implementation
    implementation: HostFn,
}

impl HostFunction {
    /// Create a host function from a raw implementation
    #[must_use]
    pub fn new(name: impl Into<String>, implementation: HostFn) -> Self {
        Self {
            name: name.into(),
            implementation,
        }
    }

    /// A callback that answers with a value
    #[must_use]
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Raised> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(move |arg| f(arg).map(HostValue::Ready)))
    }

    /// A callback that answers with a promise
    #[must_use]
    pub fn asynchronous<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Raised>> + Send + 'static,
    {
        Self::new(
            name,
            Arc::new(move |arg| Ok(HostValue::Promise(Box::pin(f(arg))))),
        )
    }

    /// A callback that does nothing and resolves to `null`
    #[must_use]
    pub fn noop(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(|_arg| Ok(HostValue::resolved(Value::Null))))
    }

    /// Function name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call with one argument and return whatever the callback returned
    ///
    /// # Errors
    ///
    /// Returns the callback's error unchanged
    pub fn call1_sync(&self, arg: Value) -> Result<HostValue, Raised> {
        tracing::debug!(function = %self.name, "calling host fn from module");
        let result = (self.implementation)(arg)?;
        tracing::debug!(function = %self.name, "host fn returned: {:?}", result);
        Ok(result)
    }

    /// Call with one argument and wait for the settled value
    ///
    /// # Errors
    ///
    /// Returns the callback's error or the promise's rejection unchanged
    pub async fn call1_async(&self, arg: Value) -> Result<Value, Raised> {
        let pending = self.call1_sync(arg)?;
        tracing::debug!(function = %self.name, "awaiting host promise");
        let value = pending.settle().await?;
        tracing::debug!(function = %self.name, "host promise resolved with: {}", value);
        Ok(value)
    }

    /// Call with an argument lowered to `T`, lowering the result to `R`
    ///
    /// # Errors
    ///
    /// Returns an `Error` naming the expected type if lowering fails, or
    /// the callback's error unchanged
    pub fn call1_sync_typed<T, R>(&self, arg: &Value) -> Result<R, Raised>
    where
        T: AbiParam,
        R: AbiParam,
    {
        let arg = lower_arg::<T>(arg)?;
        match self.call1_sync(arg)? {
            HostValue::Ready(value) => abi::lower(&value).map_err(|e| Raised::from_error(&e)),
            HostValue::Promise(_) => abi::lower_unit().map_err(|e| Raised::from_error(&e)),
        }
    }

    /// Call with an argument lowered to `T`, wait, and lower the result to `R`
    ///
    /// # Errors
    ///
    /// Returns an `Error` naming the expected type if lowering fails, or
    /// the callback's error or rejection unchanged
    pub async fn call1_async_typed<T, R>(&self, arg: &Value) -> Result<R, Raised>
    where
        T: AbiParam,
        R: AbiParam,
    {
        let arg = lower_arg::<T>(arg)?;
        let value = self.call1_async(arg).await?;
        abi::lower(&value).map_err(|e| Raised::from_error(&e))
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Lower an argument to `T` and lift it back, normalising its representation
fn lower_arg<T: AbiParam>(arg: &Value) -> Result<Value, Raised> {
    let lowered: T = abi::lower(arg).map_err(|e| {
        tracing::debug!("typed argument rejected: {}", e);
        Raised::from_error(&e)
    })?;
    abi::lift(&lowered).map_err(|e| Raised::from_error(&e))
}
