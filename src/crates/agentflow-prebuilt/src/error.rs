//! Error types for orchestration builders and managers

use thiserror::Error;

use agentflow_core::WorkflowError;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors raised by the orchestrators and their builders
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Builder configuration is invalid
    #[error("Invalid orchestration configuration: {0}")]
    Builder(String),

    /// A selector or ledger named a participant that does not exist
    #[error("Unknown participant '{0}'")]
    UnknownParticipant(String),

    /// A manager reply could not be parsed into the expected structure
    #[error("Manager response could not be parsed: {0}")]
    ManagerResponse(String),

    /// An underlying workflow error
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// An underlying checkpoint error
    #[error(transparent)]
    Checkpoint(#[from] agentflow_checkpoint::CheckpointError),
}

impl From<OrchestrationError> for WorkflowError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::Workflow(inner) => inner,
            other => WorkflowError::Custom(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_conversion_preserves_inner_error() {
        let err = OrchestrationError::Workflow(WorkflowError::Cancelled);
        assert!(matches!(WorkflowError::from(err), WorkflowError::Cancelled));
    }

    #[test]
    fn test_unknown_participant_message() {
        let err = OrchestrationError::UnknownParticipant("ghost".into());
        assert_eq!(format!("{err}"), "Unknown participant 'ghost'");
    }
}
