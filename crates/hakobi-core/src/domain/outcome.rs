//! Handler outcome model.
//!
//! A handler reports what happened by *returning* a value, never by throwing:
//! panics are reserved for programming errors and are caught once at the
//! dispatcher boundary. This keeps the three engine-visible outcomes
//! (complete / business fault / technical failure) explicit in the type.

use serde::{Deserialize, Serialize};

use super::variables::Variables;

/// Result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandlerResult {
    /// The task succeeded; `variables` are handed back to the process.
    Completed { variables: Variables },

    /// A modeled business fault. Routed to the engine's fault-handling path
    /// and never consumes a retry.
    BusinessFailure {
        error_code: String,
        error_message: String,
    },

    /// Something went wrong technically. Consumes a retry when `retriable`;
    /// `retriable: false` means retrying cannot help (e.g. a payload that
    /// does not decode) and the task goes terminal immediately.
    TechnicalFailure {
        error_message: String,
        retriable: bool,
    },
}

impl HandlerResult {
    pub fn completed() -> Self {
        HandlerResult::Completed {
            variables: Variables::new(),
        }
    }

    pub fn completed_with(variables: Variables) -> Self {
        HandlerResult::Completed { variables }
    }

    pub fn business_failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        HandlerResult::BusinessFailure {
            error_code: code.into(),
            error_message: message.into(),
        }
    }

    /// Retriable technical failure (the common case).
    pub fn technical_failure(message: impl Into<String>) -> Self {
        HandlerResult::TechnicalFailure {
            error_message: message.into(),
            retriable: true,
        }
    }

    pub fn permanent_failure(message: impl Into<String>) -> Self {
        HandlerResult::TechnicalFailure {
            error_message: message.into(),
            retriable: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, HandlerResult::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_the_expected_variant() {
        assert!(HandlerResult::completed().is_completed());

        match HandlerResult::technical_failure("boom") {
            HandlerResult::TechnicalFailure {
                error_message,
                retriable,
            } => {
                assert_eq!(error_message, "boom");
                assert!(retriable);
            }
            other => panic!("unexpected: {other:?}"),
        }

        match HandlerResult::permanent_failure("bad payload") {
            HandlerResult::TechnicalFailure { retriable, .. } => assert!(!retriable),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn result_is_tagged_by_kind() {
        let r = HandlerResult::business_failure("INVOICE_MISSING", "no invoice");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["kind"], "BUSINESS_FAILURE");
        assert_eq!(v["error_code"], "INVOICE_MISSING");
    }
}
