//! Events emitted during workflow execution
//!
//! `run_stream` yields one [`WorkflowEvent`] per observable step of a run:
//! executor lifecycle, yielded outputs, request-info pauses, streamed agent
//! fragments, and a [`WorkflowEvent::WorkflowStatus`] after every superstep.
//! Events are a single serde-tagged shape so callers can persist or forward
//! them without knowing every variant.
//!
//! # Run states
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Running` | Messages remain for the next superstep |
//! | `Idle` | No messages and no pending requests; the run is complete |
//! | `IdleWithPendingRequests` | No messages, but at least one request-info event awaits a response |
//! | `Failed` | A handler or delivery error terminated the run |
//! | `Cancelled` | The caller cancelled the run |
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = workflow.run_stream("go")?;
//! while let Some(event) = stream.next().await {
//!     match event? {
//!         WorkflowEvent::WorkflowOutput { data, .. } => println!("output: {:?}", data),
//!         WorkflowEvent::RequestInfo(request) => println!("needs input: {}", request.request_id),
//!         WorkflowEvent::WorkflowStatus { state } => println!("state: {:?}", state),
//!         _ => {}
//!     }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::TypedData;
use crate::request_info::RequestInfoEvent;

/// The run-level state reported after each superstep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Messages remain to deliver in the next superstep
    Running,
    /// No messages and no pending requests
    Idle,
    /// No messages, but unanswered request-info events exist
    IdleWithPendingRequests,
    /// The run terminated with an error
    Failed,
    /// The run was cancelled by the caller
    Cancelled,
}

impl RunState {
    /// Whether the scheduler should run another superstep
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// An event yielded by `run_stream` / `send_responses_streaming`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum WorkflowEvent {
    /// A handler yielded output to the caller
    WorkflowOutput {
        /// Executor whose handler produced the output
        source_executor_id: String,
        /// The output payload
        data: TypedData,
    },

    /// Run-state transition, emitted after every superstep
    WorkflowStatus {
        /// The run state after the superstep
        state: RunState,
    },

    /// A handler paused the run waiting for external input
    RequestInfo(RequestInfoEvent),

    /// An executor began handling a message
    ExecutorInvoked {
        /// The invoked executor
        executor_id: String,
    },

    /// An executor finished handling a message
    ExecutorCompleted {
        /// The completed executor
        executor_id: String,
    },

    /// A streamed fragment from an agent-backed executor
    AgentRunUpdate {
        /// Executor streaming the fragment
        executor_id: String,
        /// Token or content fragment
        text: String,
    },

    /// Orchestrator progress (speaker selection, ledger decisions, resets)
    Orchestrator {
        /// The orchestrator executor
        executor_id: String,
        /// Short machine-readable kind, e.g. `"speaker_selected"`
        kind: String,
        /// Human-readable description
        message: String,
    },
}

impl WorkflowEvent {
    /// Create an output event
    pub fn output(source_executor_id: impl Into<String>, data: TypedData) -> Self {
        Self::WorkflowOutput {
            source_executor_id: source_executor_id.into(),
            data,
        }
    }

    /// Create a status event
    pub fn status(state: RunState) -> Self {
        Self::WorkflowStatus { state }
    }

    /// Decode this event's output payload, if it is an output event of type `T`
    pub fn as_output<T: DeserializeOwned>(&self) -> Option<Result<T>> {
        match self {
            Self::WorkflowOutput { data, .. } => Some(data.decode()),
            _ => None,
        }
    }

    /// The run state, if this is a status event
    pub fn as_status(&self) -> Option<RunState> {
        match self {
            Self::WorkflowStatus { state } => Some(*state),
            _ => None,
        }
    }

    /// The request-info event, if this is a request pause
    pub fn as_request_info(&self) -> Option<&RequestInfoEvent> {
        match self {
            Self::RequestInfo(event) => Some(event),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serde_tagging() {
        let event = WorkflowEvent::status(RunState::IdleWithPendingRequests);
        let encoded = serde_json::to_value(&event).unwrap();
        assert_eq!(encoded["event"], "WorkflowStatus");
        assert_eq!(encoded["data"]["state"], "IDLE_WITH_PENDING_REQUESTS");

        let restored: WorkflowEvent = serde_json::from_value(encoded).unwrap();
        assert_eq!(restored.as_status(), Some(RunState::IdleWithPendingRequests));
    }

    #[test]
    fn test_as_output_decodes_payload() {
        let event = WorkflowEvent::output("sink", TypedData::from_parts("t", json!("done")));
        let decoded: String = event.as_output().unwrap().unwrap();
        assert_eq!(decoded, "done");
        assert!(event.as_status().is_none());
    }
}
