//! wasmio Core Types
//!
//! Pure types shared by both sides of the module boundary. Nothing in
//! this crate performs I/O or touches process-wide state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod failure;
pub mod raised;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use failure::{Failure, SourceLocation, UNREACHABLE};
pub use raised::{ErrorObject, Raised, ERROR_NAME, RUNTIME_ERROR_NAME};
