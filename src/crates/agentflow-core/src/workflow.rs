//! Workflow assembly and runtime surface
//!
//! [`WorkflowBuilder`] accumulates executors, edges, and edge groups, then
//! `build()` validates the graph, computes its signature hash, and freezes
//! everything into a [`Workflow`]. The workflow exposes the streaming run
//! surface:
//!
//! - [`run_stream`](Workflow::run_stream) - start a fresh run from an input;
//! - [`run_stream_from_checkpoint`](Workflow::run_stream_from_checkpoint) -
//!   resume a checkpointed run (guarded by the graph signature);
//! - [`send_responses_streaming`](Workflow::send_responses_streaming) -
//!   resume a run paused on pending request-info events;
//! - [`as_agent`](Workflow::as_agent) - adapt the workflow into an
//!   [`Agent`] that consumes and produces chat messages.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let workflow = WorkflowBuilder::new(upper.clone())
//!     .add_edge(upper.clone(), reverse.clone())
//!     .with_checkpointing(storage)
//!     .build()?;
//!
//! let mut stream = workflow.run_stream("hello".to_string())?;
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event?);
//! }
//! ```

use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use agentflow_checkpoint::{CheckpointError, CheckpointStorage};
use async_trait::async_trait;

use crate::edge::{Case, Condition, DefaultCase, Edge, EdgeGroup, SelectionFn};
use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::executor::Executor;
use crate::message::TypedData;
use crate::messages::{Agent, AgentRunResponse, ChatMessage};
use crate::runner::Runner;
use crate::validation::validate_workflow_graph;

/// Boxed stream of workflow events
pub type WorkflowEventStream = Pin<Box<dyn Stream<Item = Result<WorkflowEvent>> + Send>>;

/// Builder assembling a workflow graph
pub struct WorkflowBuilder {
    name: Option<String>,
    executors: HashMap<String, Arc<dyn Executor>>,
    duplicate_ids: Vec<String>,
    edge_groups: Vec<EdgeGroup>,
    start_id: String,
    storage: Option<Arc<dyn CheckpointStorage>>,
    pending_error: Option<WorkflowError>,
}

impl WorkflowBuilder {
    /// Start building a workflow with the given start executor
    pub fn new(start_executor: Arc<dyn Executor>) -> Self {
        let start_id = start_executor.id().to_string();
        let mut builder = Self {
            name: None,
            executors: HashMap::new(),
            duplicate_ids: Vec::new(),
            edge_groups: Vec::new(),
            start_id,
            storage: None,
            pending_error: None,
        };
        builder.register(start_executor);
        builder
    }

    /// Name the workflow (used in checkpoints and listings)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register an executor without wiring an edge
    pub fn add_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.register(executor);
        self
    }

    /// Add a direct edge between two executors
    pub fn add_edge(mut self, source: Arc<dyn Executor>, target: Arc<dyn Executor>) -> Self {
        let edge = Edge::new(source.id(), target.id());
        self.register(source);
        self.register(target);
        self.edge_groups.push(EdgeGroup::single(edge));
        self
    }

    /// Add a conditional edge between two executors
    pub fn add_edge_with_condition(
        mut self,
        source: Arc<dyn Executor>,
        target: Arc<dyn Executor>,
        condition: Condition,
    ) -> Self {
        let edge = Edge::new(source.id(), target.id()).with_condition(condition);
        self.register(source);
        self.register(target);
        self.edge_groups.push(EdgeGroup::single(edge));
        self
    }

    /// Fan out from a source to every target (optionally narrowed per message)
    pub fn add_fan_out(
        mut self,
        source: Arc<dyn Executor>,
        targets: Vec<Arc<dyn Executor>>,
    ) -> Self {
        self.push_fan_out(source, targets, None);
        self
    }

    /// Fan out with a selection function choosing a subset of targets
    pub fn add_fan_out_with_selection(
        mut self,
        source: Arc<dyn Executor>,
        targets: Vec<Arc<dyn Executor>>,
        selection: SelectionFn,
    ) -> Self {
        self.push_fan_out(source, targets, Some(selection));
        self
    }

    /// Aggregate messages from every source into one list delivery
    pub fn add_fan_in(mut self, sources: Vec<Arc<dyn Executor>>, target: Arc<dyn Executor>) -> Self {
        let source_ids: Vec<String> = sources.iter().map(|s| s.id().to_string()).collect();
        let target_id = target.id().to_string();
        for source in sources {
            self.register(source);
        }
        self.register(target);
        match EdgeGroup::fan_in(source_ids, target_id) {
            Ok(group) => self.edge_groups.push(group),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Route by ordered cases with a mandatory default
    ///
    /// Case and default targets must be registered (via other edges or
    /// [`add_executor`](Self::add_executor)) so validation can see them.
    pub fn add_switch(
        mut self,
        source: Arc<dyn Executor>,
        cases: Vec<Case>,
        default: DefaultCase,
    ) -> Self {
        let source_id = source.id().to_string();
        self.register(source);
        match EdgeGroup::switch_case(source_id, cases, default) {
            Ok(group) => self.edge_groups.push(group),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Configure build-time checkpoint storage
    pub fn with_checkpointing(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Validate the graph and freeze it into a runnable workflow
    pub fn build(self) -> Result<Workflow> {
        if let Some(err) = self.pending_error {
            return Err(err);
        }

        validate_workflow_graph(
            &self.edge_groups,
            &self.executors,
            &self.start_id,
            &self.duplicate_ids,
        )?;

        let name = self.name.unwrap_or_else(|| format!("workflow-{}", self.start_id));
        let signature =
            compute_graph_signature(&self.executors, &self.start_id, &self.edge_groups);

        Ok(Workflow {
            name,
            executors: Arc::new(self.executors),
            edge_groups: Arc::new(self.edge_groups),
            start_id: self.start_id,
            storage: self.storage,
            signature,
            runner: Arc::new(Mutex::new(None)),
        })
    }

    fn push_fan_out(
        &mut self,
        source: Arc<dyn Executor>,
        targets: Vec<Arc<dyn Executor>>,
        selection: Option<SelectionFn>,
    ) {
        let source_id = source.id().to_string();
        let target_ids: Vec<String> = targets.iter().map(|t| t.id().to_string()).collect();
        self.register(source);
        for target in targets {
            self.register(target);
        }
        match EdgeGroup::fan_out(source_id, target_ids, selection) {
            Ok(group) => self.edge_groups.push(group),
            Err(err) => self.record_error(err),
        }
    }

    fn register(&mut self, executor: Arc<dyn Executor>) {
        let id = executor.id().to_string();
        match self.executors.get(&id) {
            // Re-adding the same instance is a no-op; a different instance
            // under the same ID is a duplicate the validator will reject.
            Some(existing) if !Arc::ptr_eq(existing, &executor) => {
                if !self.duplicate_ids.contains(&id) {
                    self.duplicate_ids.push(id);
                }
            }
            Some(_) => {}
            None => {
                self.executors.insert(id, executor);
            }
        }
    }

    fn record_error(&mut self, err: WorkflowError) {
        if self.pending_error.is_none() {
            self.pending_error = Some(err);
        }
    }
}

/// Stable hash of the workflow topology
///
/// Covers the sorted executor-ID set, the start node, and every edge group's
/// kind plus its ordered edge endpoints. Group descriptions are sorted, so
/// independent builder operations commute; any change to an executor ID,
/// edge endpoint, or group kind changes the hash.
fn compute_graph_signature(
    executors: &HashMap<String, Arc<dyn Executor>>,
    start_id: &str,
    edge_groups: &[EdgeGroup],
) -> String {
    let mut executor_ids: Vec<&str> = executors.keys().map(String::as_str).collect();
    executor_ids.sort_unstable();

    let mut group_descriptions: Vec<String> = edge_groups
        .iter()
        .map(|group| {
            let edges: Vec<String> = group
                .edges()
                .iter()
                .map(|edge| format!("{}->{}", edge.source_id, edge.target_id))
                .collect();
            format!("{}[{}]", group.kind_name(), edges.join(";"))
        })
        .collect();
    group_descriptions.sort_unstable();

    let canonical = format!(
        "executors:{}\nstart:{}\ngroups:{}",
        executor_ids.join(","),
        start_id,
        group_descriptions.join("|"),
    );

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A validated, frozen workflow graph with its runtime surface
///
/// Cloning is shallow: clones share the graph and the active run, which is
/// what the agent adapter and sub-workflow embedding rely on.
#[derive(Clone)]
pub struct Workflow {
    name: String,
    executors: Arc<HashMap<String, Arc<dyn Executor>>>,
    edge_groups: Arc<Vec<EdgeGroup>>,
    start_id: String,
    storage: Option<Arc<dyn CheckpointStorage>>,
    signature: String,
    runner: Arc<Mutex<Option<Runner>>>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("start_id", &self.start_id)
            .field("signature", &self.signature)
            .finish()
    }
}

impl Workflow {
    /// The workflow's name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The start executor's ID
    pub fn start_executor_id(&self) -> &str {
        &self.start_id
    }

    /// The topology hash used by the checkpoint resume guard
    pub fn graph_signature(&self) -> &str {
        &self.signature
    }

    /// Start a fresh run from a typed input
    pub fn run_stream<T: Serialize + 'static>(&self, input: T) -> Result<WorkflowEventStream> {
        Ok(self.run_stream_data(TypedData::new(&input)?, None))
    }

    /// Start a fresh run with an explicit checkpoint store for this run
    ///
    /// The runtime store wins over the build-time store; neither writes to
    /// the other.
    pub fn run_stream_with_storage<T: Serialize + 'static>(
        &self,
        input: T,
        storage: Arc<dyn CheckpointStorage>,
    ) -> Result<WorkflowEventStream> {
        Ok(self.run_stream_data(TypedData::new(&input)?, Some(storage)))
    }

    /// Start a fresh run from a pre-encoded payload
    pub fn run_stream_data(
        &self,
        data: TypedData,
        storage_override: Option<Arc<dyn CheckpointStorage>>,
    ) -> WorkflowEventStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut slot = this.runner.lock().await;
                let mut runner = this.make_runner(storage_override);
                runner.context().attach_events(tx);
                if let Err(err) = runner.enqueue_input(data) {
                    yield Err(err);
                    return;
                }
                *slot = Some(runner);
            }

            let handle = tokio::spawn(drive_run(Arc::clone(&this.runner)));
            while let Some(event) = rx.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(Ok(_state)) => {}
                Ok(Err(err)) => yield Err(err),
                Err(join_err) => {
                    yield Err(WorkflowError::Execution(format!("run task failed: {join_err}")))
                }
            }
        })
    }

    /// Resume a checkpointed run
    ///
    /// Loads the checkpoint from the runtime store when given, otherwise the
    /// build-time store, verifies the graph-signature guard, restores the
    /// runner, and continues supersteps.
    pub fn run_stream_from_checkpoint(
        &self,
        checkpoint_id: impl Into<String>,
        storage_override: Option<Arc<dyn CheckpointStorage>>,
    ) -> WorkflowEventStream {
        let this = self.clone();
        let checkpoint_id = checkpoint_id.into();
        Box::pin(async_stream::stream! {
            let Some(storage) = storage_override.or_else(|| this.storage.clone()) else {
                yield Err(WorkflowError::Execution(
                    "no checkpoint storage configured for resume".into(),
                ));
                return;
            };

            let checkpoint = match storage.load(&checkpoint_id).await {
                Ok(checkpoint) => checkpoint,
                Err(err) => {
                    yield Err(err.into());
                    return;
                }
            };

            if checkpoint.graph_signature_hash != this.signature {
                yield Err(CheckpointError::GraphMismatch(format!(
                    "checkpoint '{checkpoint_id}' was created by a different graph"
                ))
                .into());
                return;
            }

            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut slot = this.runner.lock().await;
                let mut runner = this.make_runner(Some(storage));
                runner.context().attach_events(tx);
                if let Err(err) = runner.restore_from_checkpoint(checkpoint).await {
                    yield Err(err);
                    return;
                }
                *slot = Some(runner);
            }

            let handle = tokio::spawn(drive_run(Arc::clone(&this.runner)));
            while let Some(event) = rx.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(Ok(_state)) => {}
                Ok(Err(err)) => yield Err(err),
                Err(join_err) => {
                    yield Err(WorkflowError::Execution(format!("run task failed: {join_err}")))
                }
            }
        })
    }

    /// Resume the active run from a pending-request pause
    ///
    /// `responses` maps request IDs (from
    /// [`RequestInfoEvent`](crate::request_info::RequestInfoEvent)s) to
    /// response payloads. An unknown ID fails the call without consuming any
    /// response; the run stays resumable.
    pub fn send_responses_streaming(
        &self,
        responses: HashMap<String, TypedData>,
    ) -> WorkflowEventStream {
        let this = self.clone();
        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            {
                let mut slot = this.runner.lock().await;
                let Some(runner) = slot.as_mut() else {
                    yield Err(WorkflowError::Execution(
                        "no active run to send responses to".into(),
                    ));
                    return;
                };
                runner.context().attach_events(tx);
                if let Err(err) = runner.enqueue_responses(responses) {
                    runner.context().detach_events();
                    yield Err(err);
                    return;
                }
            }

            let handle = tokio::spawn(drive_run(Arc::clone(&this.runner)));
            while let Some(event) = rx.recv().await {
                yield Ok(event);
            }
            match handle.await {
                Ok(Ok(_state)) => {}
                Ok(Err(err)) => yield Err(err),
                Err(join_err) => {
                    yield Err(WorkflowError::Execution(format!("run task failed: {join_err}")))
                }
            }
        })
    }

    /// Run to completion, collecting every event
    pub async fn run<T: Serialize + 'static>(&self, input: T) -> Result<Vec<WorkflowEvent>> {
        collect_events(self.run_stream(input)?).await
    }

    /// Send responses and collect the resulting events
    pub async fn send_responses(
        &self,
        responses: HashMap<String, TypedData>,
    ) -> Result<Vec<WorkflowEvent>> {
        collect_events(self.send_responses_streaming(responses)).await
    }

    /// Cancel the active run, if any
    pub async fn cancel(&self) {
        if let Some(runner) = self.runner.lock().await.as_ref() {
            runner.context().cancel();
        }
    }

    /// Adapt this workflow into an [`Agent`] over chat messages
    ///
    /// The workflow's start executor must accept `Vec<ChatMessage>`; yielded
    /// outputs that decode as chat messages (or plain strings) become the
    /// agent's reply.
    pub fn as_agent(&self, name: impl Into<String>) -> WorkflowAgent {
        WorkflowAgent {
            name: name.into(),
            workflow: self.clone(),
        }
    }

    fn make_runner(&self, storage_override: Option<Arc<dyn CheckpointStorage>>) -> Runner {
        let storage = storage_override.or_else(|| self.storage.clone());
        Runner::new(
            self.name.clone(),
            self.signature.clone(),
            Arc::clone(&self.executors),
            &self.edge_groups,
            self.start_id.clone(),
            storage,
        )
    }
}

async fn drive_run(slot: Arc<Mutex<Option<Runner>>>) -> Result<crate::events::RunState> {
    let mut guard = slot.lock().await;
    let runner = guard.as_mut().expect("runner installed before drive");
    let result = runner.run_until_idle().await;
    runner.context().detach_events();
    result
}

async fn collect_events(mut stream: WorkflowEventStream) -> Result<Vec<WorkflowEvent>> {
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event?);
    }
    Ok(events)
}

/// A workflow adapted to the [`Agent`] trait
pub struct WorkflowAgent {
    name: String,
    workflow: Workflow,
}

impl WorkflowAgent {
    /// Stream the underlying workflow's events for a conversation
    ///
    /// The streaming counterpart of [`Agent::run`]: callers that want
    /// `AgentRunUpdate` fragments and status transitions consume this
    /// instead of waiting for the collected response.
    pub fn run_stream(&self, messages: &[ChatMessage]) -> Result<WorkflowEventStream> {
        self.workflow.run_stream(messages.to_vec())
    }
}

#[async_trait]
impl Agent for WorkflowAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, messages: &[ChatMessage]) -> Result<AgentRunResponse> {
        let events = self.workflow.run(messages.to_vec()).await?;
        let mut produced = Vec::new();
        for event in events {
            if let WorkflowEvent::WorkflowOutput { data, .. } = event {
                if data.is::<ChatMessage>() {
                    produced.push(data.decode::<ChatMessage>()?);
                } else if data.is::<Vec<ChatMessage>>() {
                    produced.extend(data.decode::<Vec<ChatMessage>>()?);
                } else if data.is::<String>() {
                    produced.push(ChatMessage::assistant(data.decode::<String>()?));
                } else {
                    produced.push(ChatMessage::assistant(data.value.to_string()));
                }
            }
        }
        Ok(AgentRunResponse::new(produced))
    }
}
