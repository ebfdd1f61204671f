//! WebAssembly sandbox.
//!
//! Runs a compiled WebAssembly module under wasmtime and reports its
//! failures through the same boundary contract as [`crate::Module`]: a
//! trap becomes a `RuntimeError` whose message is `"unreachable"` for an
//! `unreachable` instruction, with the wasm backtrace as its stack.
//!
//! The guest reaches the panic registry through one import:
//!
//! ```text
//! (import "env" "set_panic_info" (func (param i32 i32)))   ;; ptr, len
//! ```
//!
//! which reads UTF-8 text out of the guest's exported `memory`.

use crate::boundary::synthetic_stack;
use crate::registry;
use serde::{Deserialize, Serialize};
use wasmio_core::{CoreError, Raised, UNREACHABLE};
use wasmtime::{
    Caller, Config, Engine, Extern, Instance, Linker, Store, Trap, WasmBacktrace, WasmParams,
    WasmResults,
};

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Module name, used in stacks and logs
    pub module_name: String,
    /// Fuel granted to each call; `None` disables metering
    pub max_fuel: Option<u64>,
    /// Refuse every call after the first trap
    pub poison_on_trap: bool,
}

impl SandboxConfig {
    /// Create a new sandbox config
    #[must_use]
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            max_fuel: None,
            poison_on_trap: true,
        }
    }

    /// Set the per-call fuel budget
    #[must_use]
    pub fn with_max_fuel(mut self, fuel: u64) -> Self {
        self.max_fuel = Some(fuel);
        self
    }

    /// Enable/disable poisoning after a trap
    #[must_use]
    pub fn with_poison_on_trap(mut self, poison: bool) -> Self {
        self.poison_on_trap = poison;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new("guest")
    }
}

/// Sandbox errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// Engine could not be created
    #[error("Engine creation failed: {0}")]
    Engine(String),

    /// Bytes are not a valid module
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// Host imports could not be linked
    #[error("Link failed: {0}")]
    Link(String),

    /// Instantiation failed
    #[error("Instantiation failed: {0}")]
    Instantiation(String),
}

/// A single instantiated WebAssembly module
pub struct WasmSandbox {
    /// Sandbox configuration
    config: SandboxConfig,
    /// Store owning the instance
    store: Store<()>,
    /// The instance
    instance: Instance,
    /// Set by the first trap when poisoning is enabled
    poisoned: bool,
    /// Traps observed so far
    traps: u64,
}

impl WasmSandbox {
    /// Compile and instantiate a module
    ///
    /// # Errors
    ///
    /// Returns error if compilation, linking or instantiation fails
    pub fn new(config: SandboxConfig, wasm_bytes: &[u8]) -> Result<Self, SandboxError> {
        let mut engine_config = Config::new();
        engine_config.consume_fuel(config.max_fuel.is_some());
        let engine =
            Engine::new(&engine_config).map_err(|e| SandboxError::Engine(e.to_string()))?;

        let module = wasmtime::Module::new(&engine, wasm_bytes)
            .map_err(|e| SandboxError::Compilation(e.to_string()))?;

        let mut linker: Linker<()> = Linker::new(&engine);
        linker
            .func_wrap("env", "set_panic_info", set_panic_info)
            .map_err(|e| SandboxError::Link(e.to_string()))?;

        let mut store = Store::new(&engine, ());
        if let Some(fuel) = config.max_fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| SandboxError::Engine(e.to_string()))?;
        }

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| SandboxError::Instantiation(format!("{:#}", e)))?;

        tracing::debug!(module = %config.module_name, "sandbox instantiated");

        Ok(Self {
            config,
            store,
            instance,
            poisoned: false,
            traps: 0,
        })
    }

    /// Get the sandbox configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// True once a trap has poisoned this instance
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Number of traps raised by this instance
    #[must_use]
    pub fn trap_count(&self) -> u64 {
        self.traps
    }

    /// Call an export
    ///
    /// # Errors
    ///
    /// Returns an `Error` if the export is missing or has another
    /// signature, and a `RuntimeError` if the call traps or the instance
    /// is poisoned
    pub fn call<P, R>(&mut self, export: &str, params: P) -> Result<R, Raised>
    where
        P: WasmParams,
        R: WasmResults,
    {
        if self.poisoned {
            let message = CoreError::Poisoned {
                module: self.config.module_name.clone(),
            }
            .to_string();
            let stack = synthetic_stack(&self.config.module_name, &message, &[export]);
            return Err(Raised::runtime(message, Some(stack)));
        }

        let func = self
            .instance
            .get_typed_func::<P, R>(&mut self.store, export)
            .map_err(|e| Raised::error(format!("{:#}", e)))?;

        if let Some(fuel) = self.config.max_fuel {
            self.store
                .set_fuel(fuel)
                .map_err(|e| Raised::error(e.to_string()))?;
        }

        tracing::trace!(module = %self.config.module_name, export, "sandbox call");
        let result = func.call(&mut self.store, params);
        result.map_err(|err| self.trap(export, err))
    }

    fn trap(&mut self, export: &str, err: wasmtime::Error) -> Raised {
        self.traps += 1;
        if self.config.poison_on_trap {
            self.poisoned = true;
        }

        let message = match err.downcast_ref::<Trap>() {
            Some(Trap::UnreachableCodeReached) => UNREACHABLE.to_string(),
            Some(trap) => trap.to_string(),
            None => err.to_string(),
        };

        let frames: Vec<String> = err
            .downcast_ref::<WasmBacktrace>()
            .map(|backtrace| {
                backtrace
                    .frames()
                    .iter()
                    .map(|frame| match frame.func_name() {
                        Some(name) => name.to_string(),
                        None => format!("wasm-function[{}]", frame.func_index()),
                    })
                    .collect()
            })
            .unwrap_or_else(|| vec![export.to_string()]);
        let frames: Vec<&str> = frames.iter().map(String::as_str).collect();

        tracing::warn!(module = %self.config.module_name, export, "guest trapped: {}", message);
        let stack = synthetic_stack(&self.config.module_name, &message, &frames);
        Raised::runtime(message, Some(stack))
    }
}

impl std::fmt::Debug for WasmSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmSandbox")
            .field("config", &self.config)
            .field("poisoned", &self.poisoned)
            .field("traps", &self.traps)
            .finish_non_exhaustive()
    }
}

/// `env.set_panic_info(ptr, len)`: the guest's panic hook
fn set_panic_info(mut caller: Caller<'_, ()>, ptr: i32, len: i32) -> wasmtime::Result<()> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| wasmtime::Error::msg("guest does not export `memory`"))?;

    let start = ptr as u32 as usize;
    let end = start
        .checked_add(len as u32 as usize)
        .ok_or_else(|| wasmtime::Error::msg("panic info length overflows"))?;
    let bytes = memory
        .data(&caller)
        .get(start..end)
        .ok_or_else(|| wasmtime::Error::msg("panic info out of bounds"))?;

    let info = String::from_utf8_lossy(bytes);
    if !registry::record(&info) {
        tracing::debug!("guest panic info dropped, no registry installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::FailureClassifier;
    use crate::diagnostics::TrapDiagnosticsReader;

    const GUEST: &str = r#"
        (module
          (import "env" "set_panic_info" (func $set_panic_info (param i32 i32)))
          (memory (export "memory") 1)
          (data (i32.const 16) "panicked at guest/src/lib.rs:13:5:\npanic cause")
          (func $rust_panic
            i32.const 16
            i32.const 46
            call $set_panic_info
            unreachable)
          (func $trigger_panic (export "trigger_panic")
            call $rust_panic)
          (func $add_one (export "add_one") (param i32) (result i32)
            local.get 0
            i32.const 1
            i32.add)
          (func $divide (export "divide") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            i32.div_u)
          (func $spin (export "spin")
            (loop $again
              br $again)))
    "#;

    fn guest(config: SandboxConfig) -> WasmSandbox {
        let bytes = wat::parse_str(GUEST).unwrap();
        WasmSandbox::new(config, &bytes).unwrap()
    }

    #[test]
    fn test_sandbox_config_new() {
        let config = SandboxConfig::new("demo").with_max_fuel(1_000);
        assert_eq!(config.module_name, "demo");
        assert_eq!(config.max_fuel, Some(1_000));
        assert!(config.poison_on_trap);
    }

    #[test]
    fn test_invalid_bytes_fail_to_compile() {
        let err = WasmSandbox::new(SandboxConfig::default(), b"garbage").unwrap_err();
        assert!(matches!(err, SandboxError::Compilation(_)));
    }

    #[test]
    fn test_call_returns_value() {
        let mut sandbox = guest(SandboxConfig::default());
        let result: i32 = sandbox.call("add_one", 2023).unwrap();
        assert_eq!(result, 2024);
    }

    #[test]
    fn test_missing_export_is_structured_error() {
        let mut sandbox = guest(SandboxConfig::default());
        let err = sandbox.call::<(), ()>("missing", ()).unwrap_err();
        assert_eq!(err.name(), Some("Error"));
        assert!(!sandbox.is_poisoned());
    }

    #[test]
    fn test_trap_without_registry() {
        let _scenario = registry::isolate();
        let mut sandbox = guest(SandboxConfig::new("demo_panic"));
        let err = sandbox.call::<(), ()>("trigger_panic", ()).unwrap_err();

        assert!(err.is_wasm_panic());
        assert_eq!(err.message(), "unreachable");
        let stack = err.as_error_object().unwrap().stack.clone().unwrap();
        assert!(stack.starts_with("RuntimeError: unreachable\n"));
        assert!(stack.contains("rust_panic"));
        assert!(sandbox.is_poisoned());
    }

    #[test]
    fn test_trap_with_registry_reports_guest_panic() {
        let guard = registry::install();
        let mut sandbox = guest(SandboxConfig::new("demo_panic"));
        let err = sandbox.call::<(), ()>("trigger_panic", ()).unwrap_err();

        let failure = FailureClassifier::current().classify(&err);
        assert!(failure.is_trap());
        assert_eq!(
            failure.message(),
            "panicked at guest/src/lib.rs:13:5:\npanic cause"
        );

        let report = TrapDiagnosticsReader::current().read(err.as_error_object().unwrap());
        assert!(report.captured);
        assert!(
            report
                .stack
                .starts_with("panicked at guest/src/lib.rs:13:5:\npanic cause\n    at ")
        );
        drop(guard);
    }

    #[test]
    fn test_poisoned_after_trap() {
        let _scenario = registry::isolate();
        let mut sandbox = guest(SandboxConfig::default());
        let _ = sandbox.call::<(i32, i32), i32>("divide", (1, 0)).unwrap_err();
        assert_eq!(sandbox.trap_count(), 1);

        let err = sandbox.call::<i32, i32>("add_one", 1).unwrap_err();
        assert!(err.is_wasm_panic());
        assert!(err.message().contains("poisoned"));
    }

    #[test]
    fn test_division_trap_message() {
        let _scenario = registry::isolate();
        let mut sandbox = guest(SandboxConfig::default().with_poison_on_trap(false));
        let err = sandbox.call::<(i32, i32), i32>("divide", (1, 0)).unwrap_err();
        assert!(err.is_wasm_panic());
        assert_ne!(err.message(), "unreachable");
        assert_eq!(sandbox.call::<(i32, i32), i32>("divide", (6, 3)), Ok(2));
    }

    #[test]
    fn test_fuel_exhaustion_is_trap() {
        let _scenario = registry::isolate();
        let mut sandbox = guest(SandboxConfig::default().with_max_fuel(10_000));
        let err = sandbox.call::<(), ()>("spin", ()).unwrap_err();
        assert!(err.is_wasm_panic());
        assert!(err.message().contains("fuel"));
    }
}
