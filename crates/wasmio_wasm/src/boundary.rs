//! In-process module boundary.
//!
//! A [`Module`] is one instance of the computation module. Every export
//! runs through [`Module::call`] or [`Module::call_async`], which contain
//! panics the way a WebAssembly runtime contains an `unreachable` trap:
//! the host receives a `RuntimeError` carrying the `"unreachable"`
//! sentinel and a synthetic stack, never the unwinding panic itself.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use wasmio_core::{CoreError, Raised, RUNTIME_ERROR_NAME, UNREACHABLE};

/// Module configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name, used in stacks and logs
    pub name: String,
    /// Refuse every call after the first trap
    pub poison_on_trap: bool,
}

impl ModuleConfig {
    /// Create a new module config
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            poison_on_trap: true,
        }
    }

    /// Enable/disable poisoning after a trap
    #[must_use]
    pub fn with_poison_on_trap(mut self, poison: bool) -> Self {
        self.poison_on_trap = poison;
        self
    }
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self::new("module")
    }
}

/// One instance of the computation module
#[derive(Debug)]
pub struct Module {
    /// Module configuration
    config: ModuleConfig,
    /// Set by the first trap when poisoning is enabled
    poisoned: AtomicBool,
    /// Traps observed so far
    traps: AtomicU64,
}

impl Module {
    /// Create a new module instance
    #[must_use]
    pub fn new(config: ModuleConfig) -> Self {
        Self {
            config,
            poisoned: AtomicBool::new(false),
            traps: AtomicU64::new(0),
        }
    }

    /// Create a module instance with default settings
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(ModuleConfig::new(name))
    }

    /// Get the module configuration
    #[must_use]
    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Module name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// True once a trap has poisoned this instance
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Number of traps raised by this instance
    #[must_use]
    pub fn trap_count(&self) -> u64 {
        self.traps.load(Ordering::Relaxed)
    }

    /// Run a synchronous export
    ///
    /// # Errors
    ///
    /// Returns whatever the export raises, or a `RuntimeError` if it
    /// panics or the instance is poisoned
    pub fn call<T, F>(&self, export: &str, f: F) -> Result<T, Raised>
    where
        F: FnOnce() -> Result<T, Raised>,
    {
        self.ensure_usable(export)?;
        tracing::trace!(module = %self.config.name, export, "boundary call");

        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(result) => result,
            Err(_payload) => Err(self.trap(export)),
        }
    }

    /// Run an asynchronous export
    ///
    /// # Errors
    ///
    /// Returns whatever the export raises, or a `RuntimeError` if it
    /// panics while being polled or the instance is poisoned
    pub async fn call_async<T, F>(&self, export: &str, future: F) -> Result<T, Raised>
    where
        F: Future<Output = Result<T, Raised>>,
    {
        self.ensure_usable(export)?;
        tracing::trace!(module = %self.config.name, export, "boundary call (async)");

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(result) => result,
            Err(_payload) => Err(self.trap(export)),
        }
    }

    fn ensure_usable(&self, export: &str) -> Result<(), Raised> {
        if !self.is_poisoned() {
            return Ok(());
        }
        let message = CoreError::Poisoned {
            module: self.config.name.clone(),
        }
        .to_string();
        tracing::warn!(module = %self.config.name, export, "call refused: {}", message);
        let stack = synthetic_stack(&self.config.name, &message, &[export]);
        Err(Raised::runtime(message, Some(stack)))
    }

    fn trap(&self, export: &str) -> Raised {
        self.traps.fetch_add(1, Ordering::Relaxed);
        if self.config.poison_on_trap {
            self.poisoned.store(true, Ordering::Release);
        }
        tracing::warn!(module = %self.config.name, export, "module trapped");
        let stack = synthetic_stack(
            &self.config.name,
            UNREACHABLE,
            &["__rust_start_panic", "rust_panic", export],
        );
        Raised::runtime(UNREACHABLE, Some(stack))
    }
}

/// Build a runtime-style stack: a `RuntimeError: <message>` header
/// followed by one `at` line per frame, innermost first.
#[must_use]
pub fn synthetic_stack(module: &str, message: &str, frames: &[&str]) -> String {
    let mut stack = format!("{}: {}", RUNTIME_ERROR_NAME, message);
    for frame in frames {
        stack.push_str(&format!("\n    at {} (wasm://wasm/{})", frame, module));
    }
    stack
}
