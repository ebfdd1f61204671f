//! Demo exports.
//!
//! Small modules that show each side of the boundary on its own: typed
//! and string failures (`errors`), panics turned into traps (`panic`),
//! host function call shapes (`io`), and state shared between concurrent
//! calls (`shared`).

pub mod errors;
pub mod io;
pub mod panic;
pub mod shared;

pub use errors::{CustomError, DemoErrors, Event};
pub use io::DemoIo;
pub use panic::DemoPanic;
pub use shared::SharedCell;
