//! Failure classification.

use crate::registry::{self, PanicRegistry};
use std::sync::Arc;
use wasmio_core::{ERROR_NAME, Failure, Raised, RUNTIME_ERROR_NAME};

/// Shape of a raised value, read from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `RuntimeError`: the module trapped
    Trap,
    /// `Error`: the module raised a structured error
    Structured,
    /// A bare string
    Bare,
    /// An error object with any other name
    Unrecognized,
}

impl ErrorKind {
    /// Read the kind of a raised value
    #[must_use]
    pub fn of(raised: &Raised) -> Self {
        match raised {
            Raised::Text(_) => Self::Bare,
            Raised::Error(object) => match object.name.as_str() {
                RUNTIME_ERROR_NAME => Self::Trap,
                ERROR_NAME => Self::Structured,
                _ => Self::Unrecognized,
            },
        }
    }
}

/// Maps raised values to [`Failure`]s
///
/// Classification is total: every raised value maps to exactly one
/// variant, and nothing here can fail.
#[derive(Debug, Clone, Default)]
pub struct FailureClassifier {
    /// Registry consulted for trap diagnostics
    registry: Option<Arc<PanicRegistry>>,
}

impl FailureClassifier {
    /// Classifier that never reports a captured diagnostic
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier bound to the currently installed registry
    #[must_use]
    pub fn current() -> Self {
        Self {
            registry: registry::current(),
        }
    }

    /// Consult this registry for trap diagnostics
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<PanicRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Classify a raised value
    #[must_use]
    pub fn classify(&self, raised: &Raised) -> Failure {
        self.classify_with(raised, PanicRegistry::get)
    }

    /// Classify a raised value; a trap takes the diagnostic out of the
    /// registry, so it is reported at most once
    #[must_use]
    pub fn classify_and_clear(&self, raised: &Raised) -> Failure {
        self.classify_with(raised, PanicRegistry::take)
    }

    fn classify_with(
        &self,
        raised: &Raised,
        read: impl Fn(&PanicRegistry) -> Option<String>,
    ) -> Failure {
        match (ErrorKind::of(raised), raised) {
            (ErrorKind::Trap, Raised::Error(object)) => Failure::Trap {
                synthetic_message: object.message.clone(),
                captured_diagnostic: self.registry.as_deref().and_then(read),
                stack: object.stack.clone(),
            },
            (ErrorKind::Structured, Raised::Error(object)) => {
                Failure::structured(object.message.clone())
            }
            (ErrorKind::Unrecognized, Raised::Error(object)) => {
                tracing::debug!(name = %object.name, "unrecognized error name, treating as string error");
                Failure::StringError {
                    message: object.message.clone(),
                }
            }
            (_, raised) => Failure::StringError {
                message: raised.message().to_string(),
            },
        }
    }
}

/// Classify against the currently installed registry
#[must_use]
pub fn classify(raised: &Raised) -> Failure {
    FailureClassifier::current().classify(raised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use wasmio_core::{ErrorObject, SourceLocation};

    #[test]
    fn test_trap_without_registry() {
        let raised = Raised::runtime("unreachable", Some("RuntimeError: unreachable".into()));
        let failure = FailureClassifier::new().classify(&raised);
        assert!(failure.is_trap());
        assert_eq!(failure.name(), Some("RuntimeError"));
        assert_eq!(failure.message(), "unreachable");
    }

    #[test]
    fn test_trap_with_registry_diagnostic() {
        let registry = Arc::new(PanicRegistry::new());
        registry.set_panic_info("panicked at lib.rs:13:5:\npanic cause");
        let failure = FailureClassifier::new()
            .with_registry(registry)
            .classify(&Raised::runtime("unreachable", None));
        assert_eq!(failure.message(), "panicked at lib.rs:13:5:\npanic cause");
        assert!(matches!(
            failure,
            Failure::Trap { ref synthetic_message, .. } if synthetic_message == "unreachable"
        ));
    }

    #[test]
    fn test_classify_and_clear_reports_diagnostic_once() {
        let registry = Arc::new(PanicRegistry::new());
        registry.set_panic_info("panicked at lib.rs:13:5:\nfirst");
        let classifier = FailureClassifier::new().with_registry(Arc::clone(&registry));
        let trap = Raised::runtime("unreachable", None);

        let first = classifier.classify_and_clear(&trap);
        assert_eq!(first.message(), "panicked at lib.rs:13:5:\nfirst");
        assert_eq!(registry.get(), None);

        let second = classifier.classify_and_clear(&trap);
        assert_eq!(second.message(), "unreachable");

        registry.set_panic_info("kept");
        let structured = classifier.classify_and_clear(&Raised::error("boom"));
        assert_eq!(structured.message(), "boom");
        assert_eq!(registry.get().as_deref(), Some("kept"));
    }

    #[test]
    fn test_structured_error() {
        let raised = Raised::error("missing field `year` at line 1 column 22");
        let failure = FailureClassifier::new().classify(&raised);
        assert_eq!(failure.name(), Some("Error"));
        assert_eq!(failure.message(), "missing field `year` at line 1 column 22");
        assert_eq!(failure.source_location(), Some(SourceLocation::new(1, 22)));
    }

    #[test]
    fn test_bare_string() {
        let failure = FailureClassifier::new().classify(&Raised::text("oops"));
        assert_eq!(
            failure,
            Failure::StringError {
                message: "oops".to_string()
            }
        );
    }

    #[test]
    fn test_unrecognized_name_falls_back() {
        let raised = Raised::Error(ErrorObject::new("TypeError", "x is not a function"));
        let failure = FailureClassifier::new().classify(&raised);
        assert_eq!(
            failure,
            Failure::StringError {
                message: "x is not a function".to_string()
            }
        );
    }

    #[test]
    fn test_error_kind_of() {
        assert_eq!(ErrorKind::of(&Raised::runtime("x", None)), ErrorKind::Trap);
        assert_eq!(ErrorKind::of(&Raised::error("x")), ErrorKind::Structured);
        assert_eq!(ErrorKind::of(&Raised::text("x")), ErrorKind::Bare);
    }

    proptest! {
        #[test]
        fn prop_classification_is_total(name in ".{0,16}", message in ".{0,64}", bare in any::<bool>()) {
            let raised = if bare {
                Raised::text(message.clone())
            } else {
                Raised::Error(ErrorObject::new(name.clone(), message.clone()))
            };
            let failure = FailureClassifier::new().classify(&raised);
            prop_assert_eq!(failure.message(), message.as_str());
            prop_assert_eq!(failure.is_trap(), !bare && name == "RuntimeError");
        }
    }
}
