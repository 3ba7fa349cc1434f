//! The capability surface handlers use to affect a run
//!
//! A [`WorkflowContext`] is handed to every handler invocation. It is
//! deliberately non-generic: the set of legal outbound message types is
//! carried as handler metadata and enforced when
//! [`send_message`](WorkflowContext::send_message) is called, not by the
//! type system. Handlers that declare no outputs are treated as
//! unannotated and checked only by the validator's warnings.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::message::{type_key, Message, TypedData, ANY_TYPE};
use crate::request_info::RequestInfoEvent;
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

/// Capability surface passed to a single handler invocation
#[derive(Clone)]
pub struct WorkflowContext {
    executor_id: String,
    source_ids: Vec<String>,
    allowed_outputs: Arc<Vec<String>>,
    shared_state: SharedState,
    runner: RunnerContext,
}

impl WorkflowContext {
    pub(crate) fn new(
        executor_id: impl Into<String>,
        source_ids: Vec<String>,
        allowed_outputs: Arc<Vec<String>>,
        shared_state: SharedState,
        runner: RunnerContext,
    ) -> Self {
        Self {
            executor_id: executor_id.into(),
            source_ids,
            allowed_outputs,
            shared_state,
            runner,
        }
    }

    /// ID of the executor whose handler is running
    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// IDs of the executors that contributed the inbound message
    pub fn source_ids(&self) -> &[String] {
        &self.source_ids
    }

    /// The run-scoped shared key/value store
    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    /// Broadcast a message along this executor's outgoing edge groups
    ///
    /// The message is delivered in the next superstep.
    pub async fn send_message<T: Serialize + 'static>(&self, message: T) -> Result<()> {
        self.send_data(TypedData::new(&message)?, None).await
    }

    /// Send a message routed only to one target executor
    pub async fn send_message_to<T: Serialize + 'static>(
        &self,
        message: T,
        target_id: impl Into<String>,
    ) -> Result<()> {
        self.send_data(TypedData::new(&message)?, Some(target_id.into()))
            .await
    }

    /// Send a pre-encoded payload, optionally targeted
    pub async fn send_data(&self, data: TypedData, target_id: Option<String>) -> Result<()> {
        self.check_output_declared(&data.type_name)?;
        let mut message =
            Message::new(data, self.executor_id.clone()).with_trace(Vec::new(), current_span_ids());
        if let Some(target_id) = target_id {
            message = message.with_target(target_id);
        }
        self.runner.send_message(message);
        Ok(())
    }

    /// Yield an output to the caller's event stream
    pub async fn yield_output<T: Serialize + 'static>(&self, data: T) -> Result<()> {
        self.runner.mark_progress();
        self.runner.add_event(WorkflowEvent::output(
            self.executor_id.clone(),
            TypedData::new(&data)?,
        ));
        Ok(())
    }

    /// Request external information, pausing the run once the graph idles
    ///
    /// Emits a [`RequestInfoEvent`] to the caller and records it as pending.
    /// The handler itself returns normally; when no further messages exist
    /// the scheduler reports `IdleWithPendingRequests` instead of `Idle`.
    /// The eventual response is delivered to this executor as a
    /// [`RequestResponse`](crate::request_info::RequestResponse) message.
    ///
    /// Returns the request ID used to match the response.
    pub async fn request_info<TReq, TResp>(&self, data: TReq) -> Result<String>
    where
        TReq: Serialize + 'static,
        TResp: 'static,
    {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.runner.register_request(RequestInfoEvent {
            request_id: request_id.clone(),
            source_executor_id: self.executor_id.clone(),
            data: TypedData::new(&data)?,
            response_type: type_key::<TResp>(),
        });
        Ok(request_id)
    }

    /// Emit an arbitrary event to the caller's stream
    pub fn add_event(&self, event: WorkflowEvent) {
        self.runner.add_event(event);
    }

    /// Re-surface an existing request-info event in this run
    ///
    /// Used by sub-workflow embedding: the inner run's pending request is
    /// registered in the outer run under its original request ID, so the
    /// caller's response can be routed back down unchanged.
    pub fn forward_request(&self, event: RequestInfoEvent) {
        self.runner.register_request(event);
    }

    /// Stream a token/content fragment from an agent-backed executor
    pub fn agent_update(&self, text: impl Into<String>) {
        self.runner.add_event(WorkflowEvent::AgentRunUpdate {
            executor_id: self.executor_id.clone(),
            text: text.into(),
        });
    }

    fn check_output_declared(&self, message_type: &str) -> Result<()> {
        if self.allowed_outputs.is_empty() {
            // Unannotated handler: allowed, but the reduced validation
            // coverage is worth surfacing once per send.
            warn!(
                executor_id = %self.executor_id,
                message_type,
                "handler has no declared output types; skipping send-time check"
            );
            return Ok(());
        }
        if self
            .allowed_outputs
            .iter()
            .any(|allowed| allowed == message_type || allowed == ANY_TYPE)
        {
            Ok(())
        } else {
            Err(WorkflowError::UndeclaredOutput {
                executor_id: self.executor_id.clone(),
                message_type: message_type.to_string(),
            })
        }
    }
}

fn current_span_ids() -> Vec<String> {
    tracing::Span::current()
        .id()
        .map(|id| vec![format!("{:016x}", id.into_u64())])
        .unwrap_or_default()
}
