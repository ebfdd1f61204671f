//! Panic hook that feeds the panic registry.

use crate::registry;
use std::sync::Once;

static HOOK: Once = Once::new();

/// Install the process-wide panic hook.
///
/// The hook runs when a panic starts, before the boundary turns it into a
/// trap, and writes the panic text (`panicked at <file>:<line>:<col>:` plus
/// the message) into the installed registry. With no registry installed
/// the previous hook runs instead. Calling this more than once has no
/// further effect.
pub fn set_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let message = info.to_string();
            if registry::record(&message) {
                tracing::error!(target: "wasmio_wasm::panic", "{}", message);
            } else {
                previous(info);
            }
        }));
        tracing::debug!("panic hook installed");
    });
}

/// True once [`set_panic_hook`] has run
#[must_use]
pub fn is_panic_hook_set() -> bool {
    HOOK.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn test_hook_records_panic_text() {
        set_panic_hook();
        assert!(is_panic_hook_set());

        let guard = registry::install();
        let result = catch_unwind(AssertUnwindSafe(|| {
            panic!("panic cause");
        }));
        assert!(result.is_err());

        let captured = guard.get().unwrap();
        assert!(captured.starts_with("panicked at "));
        assert!(captured.contains("hook.rs"));
        assert!(captured.ends_with(":\npanic cause"));
    }

    #[test]
    fn test_hook_is_idempotent() {
        set_panic_hook();
        set_panic_hook();
        let guard = registry::install();
        let _ = catch_unwind(|| panic!("once"));
        assert!(guard.get().unwrap().ends_with("once"));
    }
}
