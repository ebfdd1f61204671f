//! wasmio Server
//!
//! Event service over the query engine. The host owns an in-memory table
//! store and lends it to each request's engine through a driver; failures
//! come back as `{ "panic": bool, "message": string }`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod handler;
pub mod store;

pub use api::{ApiServer, AppState, router};
pub use config::{ServerConfig, ServerError};
pub use handler::{ErrorResponse, EventEntry};
pub use store::{StoreError, TableStore};
