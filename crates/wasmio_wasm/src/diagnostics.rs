//! Trap diagnostics.

use crate::registry::{self, PanicRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use wasmio_core::{ErrorObject, Failure};

/// Stand-in for a trap that carries no stack
pub const NO_BACKTRACE: &str = "NO_BACKTRACE";

/// Human-readable report for a trap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapReport {
    /// Captured panic text, or the runtime's sentinel when none was captured
    pub message: String,
    /// `message`, then the original stack without its first line
    pub stack: String,
    /// Whether `message` came from the registry
    pub captured: bool,
}

/// Rebuilds a readable report from a trap and the registry
#[derive(Debug, Clone, Default)]
pub struct TrapDiagnosticsReader {
    registry: Option<Arc<PanicRegistry>>,
}

impl TrapDiagnosticsReader {
    /// Reader with no registry; reports only carry the sentinel
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reader bound to the currently installed registry
    #[must_use]
    pub fn current() -> Self {
        Self {
            registry: registry::current(),
        }
    }

    /// Read diagnostics from this registry
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<PanicRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the report for a trap's error object
    #[must_use]
    pub fn read(&self, error: &ErrorObject) -> TrapReport {
        let captured = self.registry.as_ref().and_then(|r| r.get());
        compose(captured, &error.message, error.stack.as_deref())
    }

    /// Build the report for a classified trap; `None` for other failures
    #[must_use]
    pub fn read_failure(&self, failure: &Failure) -> Option<TrapReport> {
        match failure {
            Failure::Trap {
                synthetic_message,
                captured_diagnostic,
                stack,
            } => {
                let captured = captured_diagnostic
                    .clone()
                    .or_else(|| self.registry.as_ref().and_then(|r| r.get()));
                Some(compose(captured, synthetic_message, stack.as_deref()))
            }
            Failure::StructuredError { .. } | Failure::StringError { .. } => None,
        }
    }
}

fn compose(captured: Option<String>, sentinel: &str, stack: Option<&str>) -> TrapReport {
    let is_captured = captured.is_some();
    let message = captured.unwrap_or_else(|| sentinel.to_string());
    let raw = stack.unwrap_or(NO_BACKTRACE);

    let mut lines = vec![message.as_str()];
    lines.extend(raw.split('\n').skip(1));
    let stack = lines.join("\n");

    TrapReport {
        message,
        stack,
        captured: is_captured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmio_core::Raised;

    fn trap_object() -> ErrorObject {
        ErrorObject::new("RuntimeError", "unreachable").with_stack(
            "RuntimeError: unreachable\n    at rust_panic (wasm://wasm/m)\n    at triggerPanic (wasm://wasm/m)",
        )
    }

    #[test]
    fn test_read_with_captured_diagnostic() {
        let registry = Arc::new(PanicRegistry::new());
        registry.set_panic_info("panicked at demo-panic/src/lib.rs:13:5:\npanic cause");
        let report = TrapDiagnosticsReader::new()
            .with_registry(registry)
            .read(&trap_object());

        assert!(report.captured);
        assert_eq!(
            report.message,
            "panicked at demo-panic/src/lib.rs:13:5:\npanic cause"
        );
        assert_eq!(
            report.stack,
            "panicked at demo-panic/src/lib.rs:13:5:\npanic cause\n    at rust_panic (wasm://wasm/m)\n    at triggerPanic (wasm://wasm/m)"
        );
    }

    #[test]
    fn test_read_without_registry_uses_sentinel() {
        let report = TrapDiagnosticsReader::new().read(&trap_object());
        assert!(!report.captured);
        assert_eq!(report.message, "unreachable");
        assert!(report.stack.starts_with("unreachable\n    at rust_panic"));
    }

    #[test]
    fn test_read_without_stack() {
        let report = TrapDiagnosticsReader::new().read(&ErrorObject::new("RuntimeError", "unreachable"));
        assert_eq!(report.stack, "unreachable");
    }

    #[test]
    fn test_read_failure_only_for_traps() {
        let reader = TrapDiagnosticsReader::new();
        let structured = Failure::structured("missing field `year` at line 1 column 22");
        assert!(reader.read_failure(&structured).is_none());

        let trap = Failure::Trap {
            synthetic_message: "unreachable".into(),
            captured_diagnostic: Some("panicked at x.rs:1:1:\nboom".into()),
            stack: trap_object().stack,
        };
        let report = reader.read_failure(&trap).unwrap();
        assert!(report.captured);
        assert!(report.stack.ends_with("at triggerPanic (wasm://wasm/m)"));
    }

    #[test]
    fn test_read_from_boundary_trap() {
        let raised = Raised::runtime(
            "unreachable",
            Some(crate::boundary::synthetic_stack("m", "unreachable", &["f"])),
        );
        let report = TrapDiagnosticsReader::new().read(raised.as_error_object().unwrap());
        assert_eq!(report.stack, "unreachable\n    at f (wasm://wasm/m)");
    }
}
