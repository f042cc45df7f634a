//! Core error types.

use thiserror::Error;

/// Boxed error returned by actions, subjects and history sinks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from the state machine engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("state machine definition not found: {id}")]
    DefinitionNotFound { id: String },

    #[error("malformed state machine definition {id}: {reason}")]
    DefinitionMalformed { id: String, reason: String },

    #[error("invalid state machine definition: {reason}")]
    DefinitionInvalid { reason: String },

    #[error("guard '{guard}' could not be resolved")]
    UnresolvedGuard { guard: String },

    #[error("action '{action}' could not be resolved")]
    UnresolvedAction { action: String },

    #[error("'{identifier}' does not implement the {expected} contract")]
    ContractViolation {
        identifier: String,
        expected: &'static str,
    },

    #[error("invalid guard expression: {reason}")]
    InvalidGuardExpression { reason: String },

    #[error("transition from '{from}' to '{to}' is not allowed")]
    InvalidTransition { from: String, to: String },

    #[error("unknown verb '{verb}' for state machine '{machine}'")]
    UnknownVerb { machine: String, verb: String },

    #[error("action '{action}' failed: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to save subject: {0}")]
    SaveFailed(#[source] BoxError),

    #[error("failed to record transition history: {0}")]
    HistoryFailed(#[source] BoxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        CoreError::DefinitionInvalid {
            reason: reason.into(),
        }
    }

    /// Returns whether this error is a business-rule rejection rather than a fault.
    ///
    /// Callers are expected to treat rejections as ordinary control flow.
    pub fn is_rejection(&self) -> bool {
        matches!(self, CoreError::InvalidTransition { .. })
    }

    /// Returns whether this error points at a misconfigured state machine.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::DefinitionNotFound { .. }
                | CoreError::DefinitionMalformed { .. }
                | CoreError::DefinitionInvalid { .. }
                | CoreError::UnresolvedGuard { .. }
                | CoreError::UnresolvedAction { .. }
                | CoreError::ContractViolation { .. }
                | CoreError::InvalidGuardExpression { .. }
                | CoreError::UnknownVerb { .. }
        )
    }

    /// Returns a stable error code suitable for logs and tooling output.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::DefinitionNotFound { .. } => "DEFINITION_NOT_FOUND",
            CoreError::DefinitionMalformed { .. } => "DEFINITION_MALFORMED",
            CoreError::DefinitionInvalid { .. } => "DEFINITION_INVALID",
            CoreError::UnresolvedGuard { .. } => "UNRESOLVED_GUARD",
            CoreError::UnresolvedAction { .. } => "UNRESOLVED_ACTION",
            CoreError::ContractViolation { .. } => "CONTRACT_VIOLATION",
            CoreError::InvalidGuardExpression { .. } => "INVALID_GUARD_EXPRESSION",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::UnknownVerb { .. } => "UNKNOWN_VERB",
            CoreError::ActionFailed { .. } => "ACTION_FAILED",
            CoreError::SaveFailed(_) => "SAVE_FAILED",
            CoreError::HistoryFailed(_) => "HISTORY_FAILED",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Json(_) => "JSON_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_invalid_transition_is_rejection() {
        let rejected = CoreError::InvalidTransition {
            from: "draft".into(),
            to: "approved".into(),
        };
        assert!(rejected.is_rejection());
        assert!(!rejected.is_configuration());

        let unresolved = CoreError::UnresolvedGuard {
            guard: "IsManager".into(),
        };
        assert!(!unresolved.is_rejection());
        assert!(unresolved.is_configuration());
    }

    #[test]
    fn test_action_failure_keeps_source() {
        let err = CoreError::ActionFailed {
            action: "ProcessPayment".into(),
            source: "card declined".into(),
        };
        assert_eq!(err.error_code(), "ACTION_FAILED");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "card declined");
    }
}
