//! wasmio Module Boundary
//!
//! Everything that sits between the host and a sandboxed computation
//! module: the panic registry and hook, the in-process and wasmtime
//! boundaries that turn faults into traps, failure classification, trap
//! diagnostics, and the host function call shapes the module uses to
//! reach host I/O.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod boundary;
pub mod classify;
pub mod diagnostics;
pub mod hook;
pub mod host;
pub mod logging;
pub mod recorder;
pub mod registry;
pub mod sandbox;

pub use abi::{AbiError, AbiParam, AbiType};
pub use boundary::{Module, ModuleConfig};
pub use classify::{ErrorKind, FailureClassifier};
pub use diagnostics::{TrapDiagnosticsReader, TrapReport};
pub use hook::set_panic_hook;
pub use host::{HostFunction, HostPromise, HostValue};
pub use logging::init_logs;
pub use recorder::{BoundaryCallRecord, CallRecorder};
pub use registry::{PanicRegistry, RegistryGuard, ScenarioGuard};
pub use sandbox::{SandboxConfig, SandboxError, WasmSandbox};
