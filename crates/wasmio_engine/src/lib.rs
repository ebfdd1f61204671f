//! wasmio Query Engine
//!
//! Module-side code. The engine decodes tagged queries and hands each one
//! to a host [`Driver`] as a single statement; the demo exports in
//! [`exports`] exercise every shape a failure or a host call can take.
//!
//! Everything here runs inside a [`wasmio_wasm::Module`] boundary, so a
//! panic reaches the host as a trap.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod engine;
pub mod exports;
pub mod query;

pub use driver::{DemoDriver, Driver, HostDriver};
pub use engine::{Dispatch, DispatchState, EngineConfig, QueryEngine};
pub use query::{InsertQuery, Query, QueryError, QueryOutput, SelectQuery};
