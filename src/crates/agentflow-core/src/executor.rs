//! Executors: the units of work in a workflow graph
//!
//! An executor is a named node with one or more typed message handlers.
//! Handlers are registered through [`HandlerMap`] with the [`handler`],
//! [`list_handler`], and [`any_handler`] helpers; each registration records
//! the input type key, the declared outbound type keys, and an invoke shim
//! that decodes the payload and calls the user function. Those records drive
//! runtime dispatch ([`Executor::can_handle`]), send-time output checking,
//! and the static type-compatibility pass of the graph validator.
//!
//! # Example
//!
//! ```rust,ignore
//! use agentflow_core::executor::{handler, FnExecutor};
//!
//! let upper = FnExecutor::builder("upper")
//!     .with_handler(
//!         handler::<String, _, _>(|text, ctx| async move {
//!             ctx.send_message(text.to_uppercase()).await
//!         })
//!         .with_output::<String>(),
//!     )
//!     .build();
//! ```
//!
//! Structs with their own state implement [`Executor`] directly and build a
//! `HandlerMap` in their constructor; the trait's default `execute`
//! dispatches, emits lifecycle events, and wraps the invocation in an
//! `executor.process` span.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;

use agentflow_checkpoint::StateValue;

use crate::context::WorkflowContext;
use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::message::{list_type_key, type_key, Message, TypedData, ANY_TYPE};
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

type HandlerFn = Arc<dyn Fn(TypedData, WorkflowContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A registered message handler: input type, declared outputs, invoke shim
#[derive(Clone)]
pub struct HandlerRegistration {
    input_type: String,
    output_types: Arc<Vec<String>>,
    request_types: Vec<String>,
    invoke: HandlerFn,
}

impl HandlerRegistration {
    /// The input type key this handler accepts
    pub fn input_type(&self) -> &str {
        &self.input_type
    }

    /// The outbound type keys this handler declares
    pub fn output_types(&self) -> &[String] {
        &self.output_types
    }

    /// The request type keys this handler may forward via `request_info`
    pub fn request_types(&self) -> &[String] {
        &self.request_types
    }

    /// Declare an outbound message type
    pub fn with_output<T: 'static>(mut self) -> Self {
        Arc::make_mut(&mut self.output_types).push(type_key::<T>());
        self
    }

    /// Declare an aggregated-list outbound message type
    pub fn with_list_output<T: 'static>(mut self) -> Self {
        Arc::make_mut(&mut self.output_types).push(list_type_key(&type_key::<T>()));
        self
    }

    /// Declare that this handler may send any message type
    pub fn with_any_output(mut self) -> Self {
        Arc::make_mut(&mut self.output_types).push(ANY_TYPE.to_string());
        self
    }

    /// Declare a request type this handler may issue via `request_info`
    pub fn with_request<T: 'static>(mut self) -> Self {
        self.request_types.push(type_key::<T>());
        self
    }

    /// Invoke the handler on a payload
    pub fn invoke(&self, data: TypedData, ctx: WorkflowContext) -> BoxFuture<'static, Result<()>> {
        (self.invoke)(data, ctx)
    }

    pub(crate) fn allowed_outputs(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.output_types)
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("input_type", &self.input_type)
            .field("output_types", &self.output_types)
            .field("request_types", &self.request_types)
            .finish()
    }
}

/// Register a handler for messages of type `T`
pub fn handler<T, F, Fut>(f: F) -> HandlerRegistration
where
    T: serde::de::DeserializeOwned + Send + 'static,
    F: Fn(T, WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    HandlerRegistration {
        input_type: type_key::<T>(),
        output_types: Arc::new(Vec::new()),
        request_types: Vec::new(),
        invoke: Arc::new(move |data, ctx| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let value: T = data.decode()?;
                f(value, ctx).await
            })
        }),
    }
}

/// Register a handler for aggregated fan-in lists of `T`
///
/// The handler's input key is `list<T>`, which is what fan-in edge groups
/// probe for when deciding whether the target can accept an aggregate.
pub fn list_handler<T, F, Fut>(f: F) -> HandlerRegistration
where
    T: serde::de::DeserializeOwned + Send + 'static,
    F: Fn(Vec<T>, WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    HandlerRegistration {
        input_type: list_type_key(&type_key::<T>()),
        output_types: Arc::new(Vec::new()),
        request_types: Vec::new(),
        invoke: Arc::new(move |data, ctx| {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let values: Vec<T> = data.decode()?;
                f(values, ctx).await
            })
        }),
    }
}

/// Register a wildcard handler receiving the raw [`TypedData`]
///
/// A wildcard handler accepts every payload type; it is consulted only when
/// no exact-type handler matches.
pub fn any_handler<F, Fut>(f: F) -> HandlerRegistration
where
    F: Fn(TypedData, WorkflowContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let f = Arc::new(f);
    HandlerRegistration {
        input_type: ANY_TYPE.to_string(),
        output_types: Arc::new(Vec::new()),
        request_types: Vec::new(),
        invoke: Arc::new(move |data, ctx| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(data, ctx).await })
        }),
    }
}

/// The set of handlers registered on an executor
#[derive(Debug, Clone, Default)]
pub struct HandlerMap {
    handlers: Vec<HandlerRegistration>,
}

impl HandlerMap {
    /// Create an empty handler map
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler registration
    ///
    /// A later registration for the same input type replaces the earlier one.
    pub fn insert(&mut self, registration: HandlerRegistration) {
        if let Some(existing) = self
            .handlers
            .iter_mut()
            .find(|h| h.input_type == registration.input_type)
        {
            tracing::warn!(
                input_type = %registration.input_type,
                "replacing previously registered handler for the same input type"
            );
            *existing = registration;
        } else {
            self.handlers.push(registration);
        }
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, registration: HandlerRegistration) -> Self {
        self.insert(registration);
        self
    }

    /// Resolve the handler for a payload type: exact match, then wildcard
    pub fn resolve(&self, type_name: &str) -> Option<&HandlerRegistration> {
        self.handlers
            .iter()
            .find(|h| h.input_type == type_name)
            .or_else(|| self.handlers.iter().find(|h| h.input_type == ANY_TYPE))
    }

    /// Whether some handler accepts the payload type
    pub fn can_handle(&self, type_name: &str) -> bool {
        self.resolve(type_name).is_some()
    }

    /// All registered input type keys
    pub fn input_types(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.input_type.clone()).collect()
    }

    /// All declared outbound type keys, deduplicated
    pub fn output_types(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for h in &self.handlers {
            for output in h.output_types.iter() {
                if !seen.contains(output) {
                    seen.push(output.clone());
                }
            }
        }
        seen
    }

    /// All declared request type keys, deduplicated
    pub fn request_types(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for h in &self.handlers {
            for request in &h.request_types {
                if !seen.contains(request) {
                    seen.push(request.clone());
                }
            }
        }
        seen
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// A request-interception declaration for sub-workflow requests
///
/// Executors downstream of a
/// [`WorkflowExecutor`](crate::workflow_executor::WorkflowExecutor) may
/// declare that they consume a given request type instead of letting it
/// bubble up to the caller. The validator enforces at most one interceptor
/// per (request type, sub-workflow) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorSpec {
    /// Type key of the intercepted request payload
    pub request_type: String,
    /// Restrict interception to one sub-workflow executor ID; `None` means
    /// any sub-workflow this executor is connected to
    pub from_workflow: Option<String>,
}

/// A unit of work in the workflow graph
///
/// One instance per `id` per workflow; the workflow owns it for the run's
/// lifetime. Handlers on one executor never run concurrently with each
/// other (the scheduler serializes them through a per-executor lock), but
/// different executors run in parallel within a superstep.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Stable unique identity within the workflow
    fn id(&self) -> &str;

    /// The registered handlers
    fn handlers(&self) -> &HandlerMap;

    /// Input type keys derived from the registered handlers
    fn input_types(&self) -> Vec<String> {
        self.handlers().input_types()
    }

    /// Declared outbound type keys
    fn output_types(&self) -> Vec<String> {
        self.handlers().output_types()
    }

    /// Declared request type keys (handlers that forward external requests)
    fn request_types(&self) -> Vec<String> {
        self.handlers().request_types()
    }

    /// Whether some handler accepts the payload's runtime type
    fn can_handle(&self, data: &TypedData) -> bool {
        self.handlers().can_handle(&data.type_name)
    }

    /// Request types this executor intercepts from sub-workflows
    fn request_interceptors(&self) -> Vec<InterceptorSpec> {
        Vec::new()
    }

    /// Whether this executor embeds a sub-workflow
    fn is_subworkflow(&self) -> bool {
        false
    }

    /// Dispatch a message to the matching handler
    ///
    /// Emits `ExecutorInvoked`/`ExecutorCompleted` events and wraps the
    /// invocation in an `executor.process` span parented to the caller and
    /// linked to the inbound message's source spans. Fails with
    /// [`WorkflowError::NoApplicableHandler`] when no handler matches.
    async fn execute(
        &self,
        message: Message,
        source_ids: Vec<String>,
        shared_state: SharedState,
        runner: RunnerContext,
    ) -> Result<()> {
        let handler = self.handlers().resolve(&message.data.type_name).ok_or_else(|| {
            WorkflowError::NoApplicableHandler {
                executor_id: self.id().to_string(),
                message_type: message.data.type_name.clone(),
            }
        })?;

        runner.add_event(WorkflowEvent::ExecutorInvoked {
            executor_id: self.id().to_string(),
        });

        let span = tracing::info_span!(
            "executor.process",
            "executor.id" = %self.id(),
            "message.source_id" = %message.source_id,
            "message.source_span_ids" = ?message.source_span_ids,
        );

        let ctx = WorkflowContext::new(
            self.id(),
            source_ids,
            handler.allowed_outputs(),
            shared_state,
            runner.clone(),
        );

        handler.invoke(message.data, ctx).instrument(span).await?;

        runner.add_event(WorkflowEvent::ExecutorCompleted {
            executor_id: self.id().to_string(),
        });
        Ok(())
    }

    /// Capture executor-private state for a checkpoint
    async fn on_checkpoint_save(&self) -> Result<HashMap<String, StateValue>> {
        Ok(HashMap::new())
    }

    /// Restore executor-private state from a checkpoint
    async fn on_checkpoint_restore(&self, _state: HashMap<String, StateValue>) -> Result<()> {
        Ok(())
    }
}

/// An executor assembled from closures, without a dedicated struct
pub struct FnExecutor {
    id: String,
    handlers: HandlerMap,
}

impl FnExecutor {
    /// Start building an executor with the given ID
    pub fn builder(id: impl Into<String>) -> FnExecutorBuilder {
        FnExecutorBuilder {
            id: id.into(),
            handlers: HandlerMap::new(),
        }
    }
}

impl Executor for FnExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }
}

/// Builder for [`FnExecutor`]
pub struct FnExecutorBuilder {
    id: String,
    handlers: HandlerMap,
}

impl FnExecutorBuilder {
    /// Add a handler registration
    pub fn with_handler(mut self, registration: HandlerRegistration) -> Self {
        self.handlers.insert(registration);
        self
    }

    /// Finish, producing a shareable executor
    pub fn build(self) -> Arc<FnExecutor> {
        Arc::new(FnExecutor {
            id: self.id,
            handlers: self.handlers,
        })
    }
}
