//! Request/response interrupt types
//!
//! A handler that needs external input calls
//! [`WorkflowContext::request_info`](crate::context::WorkflowContext::request_info).
//! That records a [`RequestInfoEvent`] in the run's pending map and surfaces
//! it to the caller; when every outstanding message has been processed and
//! at least one request is unanswered, the run reports
//! `IdleWithPendingRequests` instead of `Idle`.
//!
//! The caller resumes with `send_responses_streaming`, which routes each
//! response back to its originating executor as a [`RequestResponse`]
//! message with synthetic source
//! [`REQUEST_INFO_SOURCE`](crate::message::REQUEST_INFO_SOURCE).

use serde::{Deserialize, Serialize};

use crate::message::TypedData;

/// A pending request for external information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestInfoEvent {
    /// Unique ID used to match the eventual response
    pub request_id: String,

    /// Executor whose handler issued the request
    pub source_executor_id: String,

    /// The request payload
    pub data: TypedData,

    /// Type key of the expected response payload
    pub response_type: String,
}

/// A response routed back to the executor that issued a request
///
/// Handlers that issue requests register a handler for this type; the
/// response payload is carried as [`TypedData`] and decoded by the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestResponse {
    /// ID of the request this response answers
    pub request_id: String,

    /// The response payload
    pub data: TypedData,
}

impl RequestResponse {
    /// Create a response to a request
    pub fn new(request_id: impl Into<String>, data: TypedData) -> Self {
        Self {
            request_id: request_id.into(),
            data,
        }
    }
}
