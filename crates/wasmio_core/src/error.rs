//! Core error types for wasmio.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
///
/// Internal to the host side of a module instance. Nothing here crosses
/// the module boundary; that is what [`crate::Raised`] is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A module instance trapped earlier and must not be called again
    Poisoned {
        /// Module name
        module: String,
    },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poisoned { module } => {
                write!(f, "Module {} is poisoned by an earlier trap", module)
            }
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Poisoned {
            module: "demo_panic".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Module demo_panic is poisoned by an earlier trap"
        );

        let err = CoreError::Internal {
            message: "invalid transition".to_string(),
        };
        assert_eq!(format!("{}", err), "Internal error: invalid transition");
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::Internal {
            message: "x".to_string(),
        };
        let err2 = CoreError::Internal {
            message: "x".to_string(),
        };
        assert_eq!(err1, err2);
    }
}
