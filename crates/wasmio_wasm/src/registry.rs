//! Process-wide panic registry.
//!
//! A trap leaves no message behind: the host only ever sees the runtime's
//! sentinel. The panic hook writes the panic text into the registry right
//! before the trap propagates, and the host reads it back when rendering
//! the failure.
//!
//! The registry is installed for the duration of one scenario through
//! [`install`]. Installing takes a process-wide scenario lock, so two
//! trap scenarios never see each other's diagnostics, and dropping the
//! guard clears the slot and removes the handle.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

static SCENARIO: Mutex<()> = Mutex::new(());
static CURRENT: RwLock<Option<Arc<PanicRegistry>>> = RwLock::new(None);

/// Single-slot store for the most recent trap diagnostic
#[derive(Debug, Default)]
pub struct PanicRegistry {
    /// Last written diagnostic
    slot: Mutex<Option<String>>,
}

impl PanicRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current diagnostic, without clearing it
    #[must_use]
    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Current diagnostic, clearing the slot
    pub fn take(&self) -> Option<String> {
        self.lock().take()
    }

    /// Clear the slot
    pub fn clear(&self) {
        *self.lock() = None;
    }

    /// Overwrite the slot. Only the panic hook and the sandbox's
    /// `set_panic_info` import write here.
    pub(crate) fn set_panic_info(&self, info: impl Into<String>) {
        *self.lock() = Some(info.into());
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the process-wide scenario lock
#[derive(Debug)]
pub struct ScenarioGuard {
    _lock: MutexGuard<'static, ()>,
}

/// An installed registry; dropping it tears the registry down
#[derive(Debug)]
pub struct RegistryGuard {
    registry: Arc<PanicRegistry>,
    _scenario: ScenarioGuard,
}

impl RegistryGuard {
    /// Shared handle to the installed registry
    #[must_use]
    pub fn registry(&self) -> Arc<PanicRegistry> {
        Arc::clone(&self.registry)
    }
}

impl Deref for RegistryGuard {
    type Target = PanicRegistry;

    fn deref(&self) -> &PanicRegistry {
        &self.registry
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.clear();
        *CURRENT.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::debug!("panic registry removed");
    }
}

/// Enter a trap scenario without a registry.
///
/// Blocks until no other scenario is running.
#[must_use]
pub fn isolate() -> ScenarioGuard {
    ScenarioGuard {
        _lock: SCENARIO.lock().unwrap_or_else(PoisonError::into_inner),
    }
}

/// Enter a trap scenario with a fresh registry installed.
///
/// Blocks until no other scenario is running.
#[must_use]
pub fn install() -> RegistryGuard {
    let scenario = isolate();
    let registry = Arc::new(PanicRegistry::new());
    *CURRENT.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&registry));
    tracing::debug!("panic registry installed");
    RegistryGuard {
        registry,
        _scenario: scenario,
    }
}

/// The installed registry, if any
#[must_use]
pub fn current() -> Option<Arc<PanicRegistry>> {
    CURRENT
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
}

/// Write a diagnostic into the installed registry.
///
/// Returns `false` when no registry is installed.
pub(crate) fn record(info: &str) -> bool {
    match current() {
        Some(registry) => {
            registry.set_panic_info(info);
            true
        }
        None => false,
    }
}
