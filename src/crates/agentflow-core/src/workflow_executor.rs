//! Embedding a workflow as an executor of a parent workflow
//!
//! A [`WorkflowExecutor`] wraps a complete [`Workflow`] and presents it as a
//! single executor. Inbound messages start (or feed) the inner run; the
//! inner run's yielded outputs are re-sent as parent messages.
//!
//! Request-info events raised inside the sub-workflow take one of two paths:
//!
//! - **bubbling** (default): the request is re-surfaced in the parent run
//!   under the embedding executor's ID, pausing the parent until the caller
//!   responds; the response is routed back down into the inner run.
//! - **interception**: request types registered via
//!   [`with_intercepted_request`](WorkflowExecutor::with_intercepted_request)
//!   are instead wrapped in a [`SubworkflowRequest`] message and delivered
//!   along the embedding executor's outgoing edges to a parent-side
//!   interceptor, which answers with a [`SubworkflowResponse`] targeted back
//!   at the embedding executor. The graph validator enforces at most one
//!   interceptor per (request type, sub-workflow) pair.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::WorkflowContext;
use crate::error::Result;
use crate::events::WorkflowEvent;
use crate::executor::{any_handler, handler, Executor, HandlerMap};
use crate::message::{type_key, TypedData};
use crate::request_info::{RequestInfoEvent, RequestResponse};
use crate::workflow::Workflow;

/// A sub-workflow request re-emitted into the parent graph for interception
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubworkflowRequest {
    /// ID of the embedding [`WorkflowExecutor`]
    pub sub_workflow_id: String,
    /// The inner run's pending request
    pub request: RequestInfoEvent,
}

/// An interceptor's answer to a [`SubworkflowRequest`]
///
/// Send it targeted at the embedding executor's ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubworkflowResponse {
    /// ID of the request being answered
    pub request_id: String,
    /// The response payload
    pub data: TypedData,
}

impl SubworkflowResponse {
    /// Answer a sub-workflow request
    pub fn new(request_id: impl Into<String>, data: TypedData) -> Self {
        Self {
            request_id: request_id.into(),
            data,
        }
    }
}

/// A workflow embedded as an executor of a parent workflow
pub struct WorkflowExecutor {
    id: String,
    workflow: Workflow,
    handlers: HandlerMap,
    intercepted_types: Vec<String>,
}

impl WorkflowExecutor {
    /// Embed `workflow` under the executor ID `id`
    pub fn new(id: impl Into<String>, workflow: Workflow) -> Self {
        let id = id.into();
        let handlers = Self::build_handlers(&id, workflow.clone(), Arc::new(Vec::new()));
        Self {
            id,
            workflow,
            handlers,
            intercepted_types: Vec::new(),
        }
    }

    /// Route sub-workflow requests of type `T` to a parent-side interceptor
    /// instead of bubbling them to the caller
    pub fn with_intercepted_request<T: 'static>(mut self) -> Self {
        self.intercepted_types.push(type_key::<T>());
        // Handlers capture the intercepted set, so rebuild them with the
        // updated list. The inner workflow is shared through its clones.
        self.handlers = Self::build_handlers(
            &self.id,
            self.workflow.clone(),
            Arc::new(self.intercepted_types.clone()),
        );
        self
    }

    fn build_handlers(id: &str, workflow: Workflow, intercepted: Arc<Vec<String>>) -> HandlerMap {
        let mut handlers = HandlerMap::new();

        // Responses to bubbled requests come back from the caller.
        {
            let workflow = workflow.clone();
            let id = id.to_string();
            let intercepted = Arc::clone(&intercepted);
            handlers.insert(
                handler::<RequestResponse, _, _>(move |response, ctx| {
                    let workflow = workflow.clone();
                    let id = id.clone();
                    let intercepted = Arc::clone(&intercepted);
                    async move {
                        let events = workflow
                            .send_responses(
                                [(response.request_id.clone(), response.data)]
                                    .into_iter()
                                    .collect(),
                            )
                            .await?;
                        pump_sub_events(&id, &intercepted, events, &ctx).await
                    }
                })
                .with_any_output(),
            );
        }

        // Responses from a parent-side interceptor.
        {
            let workflow = workflow.clone();
            let id = id.to_string();
            let intercepted = Arc::clone(&intercepted);
            handlers.insert(
                handler::<SubworkflowResponse, _, _>(move |response, ctx| {
                    let workflow = workflow.clone();
                    let id = id.clone();
                    let intercepted = Arc::clone(&intercepted);
                    async move {
                        let events = workflow
                            .send_responses(
                                [(response.request_id.clone(), response.data)]
                                    .into_iter()
                                    .collect(),
                            )
                            .await?;
                        pump_sub_events(&id, &intercepted, events, &ctx).await
                    }
                })
                .with_any_output(),
            );
        }

        // Everything else starts a fresh inner run.
        {
            let id = id.to_string();
            handlers.insert(
                any_handler(move |data, ctx| {
                    let workflow = workflow.clone();
                    let id = id.clone();
                    let intercepted = Arc::clone(&intercepted);
                    async move {
                        let mut stream = workflow.run_stream_data(data, None);
                        let mut events = Vec::new();
                        while let Some(event) = futures::StreamExt::next(&mut stream).await {
                            events.push(event?);
                        }
                        pump_sub_events(&id, &intercepted, events, &ctx).await
                    }
                })
                .with_any_output(),
            );
        }

        handlers
    }
}

async fn pump_sub_events(
    id: &str,
    intercepted: &[String],
    events: Vec<WorkflowEvent>,
    ctx: &WorkflowContext,
) -> Result<()> {
    for event in events {
        match event {
            WorkflowEvent::WorkflowOutput { data, .. } => {
                ctx.send_data(data, None).await?;
            }
            WorkflowEvent::RequestInfo(request) => {
                if intercepted.contains(&request.data.type_name) {
                    ctx.send_message(SubworkflowRequest {
                        sub_workflow_id: id.to_string(),
                        request,
                    })
                    .await?;
                } else {
                    // Bubble upward under this executor's identity, keeping
                    // the request ID so the response routes back down.
                    ctx.forward_request(RequestInfoEvent {
                        source_executor_id: id.to_string(),
                        ..request
                    });
                }
            }
            // The inner run's lifecycle events stay internal.
            _ => {}
        }
    }
    Ok(())
}

impl Executor for WorkflowExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    fn is_subworkflow(&self) -> bool {
        true
    }
}
