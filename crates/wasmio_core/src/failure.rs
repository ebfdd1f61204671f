//! Failure kinds the host distinguishes.

use crate::raised::{ERROR_NAME, RUNTIME_ERROR_NAME};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message a trap carries when no diagnostic was captured
pub const UNREACHABLE: &str = "unreachable";

static LOCATION: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r" at line (\d+) column (\d+)$").ok());

/// 1-based position inside a textual input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line, starting at 1
    pub line: usize,
    /// Column, starting at 1
    pub column: usize,
}

impl SourceLocation {
    /// Create a location
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Extract the trailing `at line L column C` from a decoder message
    #[must_use]
    pub fn parse(message: &str) -> Option<Self> {
        let captures = LOCATION.as_ref()?.captures(message)?;
        let line = captures.get(1)?.as_str().parse().ok()?;
        let column = captures.get(2)?.as_str().parse().ok()?;
        Some(Self { line, column })
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// A classified failure
///
/// Exactly one variant describes any failure. A trap leaves the module
/// instance in an undefined state; the other two are safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Failure {
    /// Unrecoverable fault inside the module
    Trap {
        /// Message produced by the runtime, usually [`UNREACHABLE`]
        synthetic_message: String,
        /// Panic text captured by the registry, if one was installed
        captured_diagnostic: Option<String>,
        /// Raw stack of the failed boundary call
        stack: Option<String>,
    },

    /// Recoverable error with a stable message
    StructuredError {
        /// Message as surfaced by the module
        message: String,
        /// Position in the textual input, when the fault was a decode error
        source_location: Option<SourceLocation>,
    },

    /// Recoverable error with opaque text
    StringError {
        /// Message text
        message: String,
    },
}

impl Failure {
    /// Build a structured error, parsing the source location from the message
    #[must_use]
    pub fn structured(message: impl Into<String>) -> Self {
        let message = message.into();
        let source_location = SourceLocation::parse(&message);
        Self::StructuredError {
            message,
            source_location,
        }
    }

    /// Name the host observes: `RuntimeError`, `Error`, or none for bare strings
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Self::Trap { .. } => Some(RUNTIME_ERROR_NAME),
            Self::StructuredError { .. } => Some(ERROR_NAME),
            Self::StringError { .. } => None,
        }
    }

    /// Rendered message; a captured diagnostic supersedes the trap sentinel
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Trap {
                synthetic_message,
                captured_diagnostic,
                ..
            } => captured_diagnostic.as_deref().unwrap_or(synthetic_message),
            Self::StructuredError { message, .. } | Self::StringError { message } => message,
        }
    }

    /// True for a trap
    #[must_use]
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// True when the caller may retry with corrected input
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.is_trap()
    }

    /// Source location of a structured error
    #[must_use]
    pub fn source_location(&self) -> Option<SourceLocation> {
        match self {
            Self::StructuredError {
                source_location, ..
            } => *source_location,
            _ => None,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}: {}", name, self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_location_parse() {
        let loc = SourceLocation::parse("missing field `year` at line 1 column 22");
        assert_eq!(loc, Some(SourceLocation::new(1, 22)));
    }

    #[test]
    fn test_source_location_absent() {
        assert_eq!(SourceLocation::parse("invalid type: unit value, expected u32"), None);
        assert_eq!(SourceLocation::parse("at line 1 column 2 trailing"), None);
    }

    #[test]
    fn test_structured_parses_location() {
        let failure = Failure::structured("[CustomError] missing field `year` at line 3 column 7");
        assert_eq!(failure.source_location(), Some(SourceLocation::new(3, 7)));
        assert_eq!(failure.name(), Some("Error"));
    }

    #[test]
    fn test_trap_message_prefers_diagnostic() {
        let bare = Failure::Trap {
            synthetic_message: UNREACHABLE.to_string(),
            captured_diagnostic: None,
            stack: None,
        };
        assert_eq!(bare.message(), "unreachable");

        let captured = Failure::Trap {
            synthetic_message: UNREACHABLE.to_string(),
            captured_diagnostic: Some("panicked at lib.rs:1:1:\nboom".to_string()),
            stack: None,
        };
        assert_eq!(captured.message(), "panicked at lib.rs:1:1:\nboom");
        assert_eq!(captured.name(), Some("RuntimeError"));
        assert!(!captured.is_recoverable());
    }

    #[test]
    fn test_string_error_display() {
        let failure = Failure::StringError {
            message: "plain".to_string(),
        };
        assert_eq!(failure.to_string(), "plain");
        assert_eq!(failure.name(), None);
        assert!(failure.is_recoverable());
    }

    proptest::proptest! {
        #[test]
        fn prop_location_roundtrip(line in 1usize..10_000, column in 1usize..10_000, prefix in "[a-z `]{0,20}") {
            let message = format!("{} at line {} column {}", prefix, line, column);
            proptest::prop_assert_eq!(
                SourceLocation::parse(&message),
                Some(SourceLocation::new(line, column))
            );
        }
    }
}
