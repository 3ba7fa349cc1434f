//! Error types for workflow construction, validation, and execution
//!
//! All errors implement `std::error::Error` via the `thiserror` crate.
//! Validation failures carry a [`ValidationKind`] tag so callers can match
//! on the class of violation without parsing messages.
//!
//! # Error Categories
//!
//! - **Construction**: [`WorkflowError::Validation`], [`WorkflowError::EdgeGroup`]
//! - **Delivery**: [`WorkflowError::DeadLetter`], [`WorkflowError::NoApplicableHandler`]
//! - **Execution**: [`WorkflowError::ExecutorFailure`], [`WorkflowError::Execution`],
//!   [`WorkflowError::Cancelled`]
//! - **Requests**: [`WorkflowError::UnknownRequestId`]
//! - **Persistence**: [`WorkflowError::Checkpoint`]

use thiserror::Error;

/// Convenience result type using [`WorkflowError`]
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// The class of a workflow validation violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationKind {
    /// Two edges share the same `source -> target` pair
    EdgeDuplication,
    /// Two executors share the same ID
    ExecutorDuplication,
    /// No output type of an edge's source is assignable to any input type of
    /// its target
    TypeCompatibility,
    /// Unreachable or isolated executors, or a missing start executor
    GraphConnectivity,
    /// More than one executor intercepts the same request type from the same
    /// sub-workflow
    InterceptorConflict,
    /// A handler is missing its outbound type annotations
    HandlerOutputAnnotation,
}

impl ValidationKind {
    /// Stable tag string, used in error messages and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EdgeDuplication => "EDGE_DUPLICATION",
            Self::ExecutorDuplication => "EXECUTOR_DUPLICATION",
            Self::TypeCompatibility => "TYPE_COMPATIBILITY",
            Self::GraphConnectivity => "GRAPH_CONNECTIVITY",
            Self::InterceptorConflict => "INTERCEPTOR_CONFLICT",
            Self::HandlerOutputAnnotation => "HANDLER_OUTPUT_ANNOTATION",
        }
    }
}

/// A workflow graph validation failure
///
/// Raised during `build()` and again on resume after the graph is rebuilt.
/// Fatal for the builder; cannot be recovered by retry.
#[derive(Debug, Clone, Error)]
#[error("[{}] {message}", kind.as_str())]
pub struct ValidationError {
    /// The class of violation
    pub kind: ValidationKind,
    /// Human-readable description
    pub message: String,
}

impl ValidationError {
    /// Create a validation error
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Comprehensive error type for all workflow operations
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Workflow graph validation failed
    #[error("Workflow validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An edge group was constructed with invalid structure
    ///
    /// For example a fan-out with fewer than two targets, or a switch-case
    /// with no cases.
    #[error("Invalid edge group: {0}")]
    EdgeGroup(String),

    /// No registered handler of the executor accepts the message type
    #[error("Executor '{executor_id}' has no handler for message type '{message_type}'")]
    NoApplicableHandler {
        /// Executor that received the message
        executor_id: String,
        /// Type key of the rejected payload
        message_type: String,
    },

    /// A handler sent a message type it did not declare as an output
    #[error("Executor '{executor_id}' sent undeclared output type '{message_type}'")]
    UndeclaredOutput {
        /// Executor whose handler sent the message
        executor_id: String,
        /// Type key of the undeclared payload
        message_type: String,
    },

    /// A message was accepted by no edge group
    ///
    /// Fatal for the run: the graph has no route for this message.
    #[error("Message of type '{message_type}' from '{source_id}' could not be delivered by any edge group")]
    DeadLetter {
        /// Source executor of the undeliverable message
        source_id: String,
        /// Type key of the undeliverable payload
        message_type: String,
    },

    /// A payload could not be decoded into the handler's parameter type
    #[error("Failed to decode payload of type '{message_type}': {message}")]
    PayloadDecode {
        /// Type key of the payload
        message_type: String,
        /// Decoder error
        message: String,
    },

    /// An executor handler failed
    #[error("Executor '{executor_id}' failed: {message}")]
    ExecutorFailure {
        /// Executor whose handler failed
        executor_id: String,
        /// Error description
        message: String,
    },

    /// `send_responses` was called with a request ID that is not pending
    ///
    /// Does not terminate the run; the caller may retry with valid IDs.
    #[error("Unknown request id: {0}")]
    UnknownRequestId(String),

    /// General execution error without executor context
    #[error("Workflow execution failed: {0}")]
    Execution(String),

    /// The run was cancelled by the caller
    #[error("Workflow run was cancelled")]
    Cancelled,

    /// Checkpoint persistence or resume error
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentflow_checkpoint::CheckpointError),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Application-defined error
    #[error("{0}")]
    Custom(String),
}

impl WorkflowError {
    /// Create an executor failure error with context
    pub fn executor_failure(executor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExecutorFailure {
            executor_id: executor_id.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(kind, message))
    }

    /// The validation kind, when this is a validation error
    pub fn validation_kind(&self) -> Option<ValidationKind> {
        match self {
            Self::Validation(err) => Some(err.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_includes_kind_tag() {
        let err = ValidationError::new(ValidationKind::EdgeDuplication, "duplicate edge a->b");
        assert_eq!(format!("{err}"), "[EDGE_DUPLICATION] duplicate edge a->b");
    }

    #[test]
    fn test_validation_kind_is_queryable() {
        let err = WorkflowError::validation(ValidationKind::GraphConnectivity, "unreachable");
        assert_eq!(err.validation_kind(), Some(ValidationKind::GraphConnectivity));
        assert_eq!(WorkflowError::Cancelled.validation_kind(), None);
    }

    #[test]
    fn test_graph_mismatch_message_text() {
        let err = WorkflowError::Checkpoint(
            agentflow_checkpoint::CheckpointError::GraphMismatch("resume refused".into()),
        );
        assert!(format!("{err}").contains("Workflow graph has changed"));
    }
}
