//! Call recording for host callbacks.

use crate::host::{HostFunction, HostValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wasmio_core::Raised;

/// Arguments and call count observed by one host callback
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryCallRecord {
    /// Every argument, in call order
    pub args: Vec<Value>,
}

impl BoundaryCallRecord {
    /// Number of calls
    #[must_use]
    pub fn count(&self) -> usize {
        self.args.len()
    }
}

/// Records the calls that reach a host callback
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<BoundaryCallRecord>>,
}

impl CallRecorder {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call
    pub fn record(&self, arg: &Value) {
        self.lock().args.push(arg.clone());
    }

    /// Copy of the record so far
    #[must_use]
    pub fn snapshot(&self) -> BoundaryCallRecord {
        self.lock().clone()
    }

    /// Arguments seen so far
    #[must_use]
    pub fn calls(&self) -> Vec<Value> {
        self.lock().args.clone()
    }

    /// Number of calls so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().count()
    }

    /// Most recent argument
    #[must_use]
    pub fn last_call(&self) -> Option<Value> {
        self.lock().args.last().cloned()
    }

    /// True if any call saw exactly this argument
    #[must_use]
    pub fn was_called_with(&self, arg: &Value) -> bool {
        self.lock().args.iter().any(|seen| seen == arg)
    }

    /// Forget every recorded call
    pub fn clear(&self) {
        self.lock().args.clear();
    }

    /// Wrap a value-returning callback so its calls are recorded
    #[must_use]
    pub fn wrap_sync<F>(&self, name: impl Into<String>, f: F) -> HostFunction
    where
        F: Fn(Value) -> Result<Value, Raised> + Send + Sync + 'static,
    {
        let recorder = self.clone();
        HostFunction::sync(name, move |arg| {
            recorder.record(&arg);
            f(arg)
        })
    }

    /// Wrap a promise-returning callback so its calls are recorded
    #[must_use]
    pub fn wrap_async<F, Fut>(&self, name: impl Into<String>, f: F) -> HostFunction
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Raised>> + Send + 'static,
    {
        let recorder = self.clone();
        HostFunction::new(
            name,
            Arc::new(move |arg| {
                recorder.record(&arg);
                Ok(HostValue::Promise(Box::pin(f(arg))))
            }),
        )
    }

    fn lock(&self) -> MutexGuard<'_, BoundaryCallRecord> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
