//! Values thrown across the module boundary.
//!
//! The host sees exactly two shapes: an error object carrying a `name`,
//! a `message` and possibly a `stack`, or a bare string. Everything the
//! module or a host callback fails with is lowered into one of these
//! before it crosses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name carried by error objects that report a module trap
pub const RUNTIME_ERROR_NAME: &str = "RuntimeError";

/// Name carried by recoverable error objects
pub const ERROR_NAME: &str = "Error";

/// An error-like object as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Error name, e.g. `"Error"` or `"RuntimeError"`
    pub name: String,
    /// Error message
    pub message: String,
    /// Stack trace; the first line repeats `name: message`
    pub stack: Option<String>,
}

impl ErrorObject {
    /// Create an error object with no stack
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace
    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// A value thrown across the module boundary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Raised {
    /// An error object
    #[error("{0}")]
    Error(ErrorObject),

    /// A bare string
    #[error("{0}")]
    Text(String),
}

impl Raised {
    /// A recoverable error object named `Error`
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorObject::new(ERROR_NAME, message))
    }

    /// A trap report named `RuntimeError`
    #[must_use]
    pub fn runtime(message: impl Into<String>, stack: Option<String>) -> Self {
        let mut object = ErrorObject::new(RUNTIME_ERROR_NAME, message);
        object.stack = stack;
        Self::Error(object)
    }

    /// A bare string
    #[must_use]
    pub fn text(message: impl Into<String>) -> Self {
        Self::Text(message.into())
    }

    /// Lower any displayable module-side error into an `Error` object
    #[must_use]
    pub fn from_error<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::error(err.to_string())
    }

    /// Error name, or `None` for a bare string
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Error(object) => Some(&object.name),
            Self::Text(_) => None,
        }
    }

    /// Message text
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Error(object) => &object.message,
            Self::Text(text) => text,
        }
    }

    /// The error object, if this is one
    #[must_use]
    pub fn as_error_object(&self) -> Option<&ErrorObject> {
        match self {
            Self::Error(object) => Some(object),
            Self::Text(_) => None,
        }
    }

    /// True when this reports a module trap
    #[must_use]
    pub fn is_wasm_panic(&self) -> bool {
        self.name() == Some(RUNTIME_ERROR_NAME)
    }
}
