//! Panics on request.

use wasmio_core::Raised;
use wasmio_wasm::Module;

/// Module exporting the panic demo
#[derive(Debug)]
pub struct DemoPanic {
    module: Module,
}

impl DemoPanic {
    /// Create a fresh module instance
    #[must_use]
    pub fn new() -> Self {
        Self {
            module: Module::named("demo_panic"),
        }
    }

    /// Module instance the exports run in
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Install the panic hook so traps keep their panic text.
    ///
    /// Call before any other export.
    pub fn set_panic_hook(&self) {
        wasmio_wasm::set_panic_hook();
    }

    /// Panic with `message`
    ///
    /// # Errors
    ///
    /// Always returns a `RuntimeError`
    pub fn trigger_panic(&self, message: &str) -> Result<(), Raised> {
        self.module.call("trigger_panic", || panic!("{}", message))
    }
}

impl Default for DemoPanic {
    fn default() -> Self {
        Self::new()
    }
}
