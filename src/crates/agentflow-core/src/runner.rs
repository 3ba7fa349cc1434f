//! The superstep scheduler
//!
//! [`Runner`] drives one workflow run through Pregel-style synchronous
//! rounds:
//!
//! 1. deliver every inbound envelope through the edge groups owned by its
//!    source (envelopes with synthetic sources - the initial input and
//!    request-info responses - dispatch directly to their target);
//! 2. executors run handlers; `send_message` accumulates into the outbox,
//!    `yield_output` and `request_info` emit events;
//! 3. independent executors run in parallel, handlers on one executor
//!    serialize on its invocation lock;
//! 4. the outbox becomes the next superstep's inbound queue;
//! 5. a checkpoint is written when storage is configured and the superstep
//!    made progress (messages, outputs, or pending-request changes);
//! 6. a [`WorkflowStatusEvent`](crate::events::WorkflowEvent::WorkflowStatus)
//!    reports `Running`, `Idle`, or `IdleWithPendingRequests`;
//! 7. the loop continues while the state is `Running`.
//!
//! An envelope accepted by no edge group dead-letters the run. A handler
//! error marks the run `Failed` and propagates without writing a checkpoint
//! for the incomplete superstep. Cancellation aborts at the next superstep
//! boundary and reports `Cancelled`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

use agentflow_checkpoint::{CheckpointStorage, WorkflowCheckpoint};

use crate::edge::EdgeGroup;
use crate::edge_runner::{create_edge_runner, EdgeRunner, ExecutorRegistry};
use crate::error::{Result, WorkflowError};
use crate::events::{RunState, WorkflowEvent};
use crate::executor::Executor;
use crate::message::{Message, TypedData, ANY_TYPE, INPUT_SOURCE, REQUEST_INFO_SOURCE};
use crate::request_info::{RequestInfoEvent, RequestResponse};
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

/// Scheduler state for one workflow run
///
/// A runner persists across `run_stream` and `send_responses_streaming`
/// calls of the same run: pending requests, fan-in buffers, shared state,
/// and the checkpoint chain all live here.
pub struct Runner {
    workflow_name: String,
    graph_signature: String,
    start_id: String,
    executors: Arc<HashMap<String, Arc<dyn Executor>>>,
    registry: ExecutorRegistry,
    runners_by_source: HashMap<String, Vec<Arc<EdgeRunner>>>,
    shared_state: SharedState,
    ctx: RunnerContext,
    inbound: Vec<Message>,
    iteration: u64,
    last_checkpoint_id: Option<String>,
}

impl Runner {
    /// Build a runner over a validated graph
    pub fn new(
        workflow_name: impl Into<String>,
        graph_signature: impl Into<String>,
        executors: Arc<HashMap<String, Arc<dyn Executor>>>,
        edge_groups: &[EdgeGroup],
        start_id: impl Into<String>,
        storage: Option<Arc<dyn CheckpointStorage>>,
    ) -> Self {
        let registry = ExecutorRegistry::new(Arc::clone(&executors));
        let mut runners_by_source: HashMap<String, Vec<Arc<EdgeRunner>>> = HashMap::new();
        for group in edge_groups {
            let runner = Arc::new(create_edge_runner(group, registry.clone()));
            for source_id in group.source_executor_ids() {
                runners_by_source
                    .entry(source_id)
                    .or_default()
                    .push(Arc::clone(&runner));
            }
        }

        let ctx = RunnerContext::new();
        ctx.set_storage(storage);

        Self {
            workflow_name: workflow_name.into(),
            graph_signature: graph_signature.into(),
            start_id: start_id.into(),
            executors,
            registry,
            runners_by_source,
            shared_state: SharedState::new(),
            ctx,
            inbound: Vec::new(),
            iteration: 0,
            last_checkpoint_id: None,
        }
    }

    /// The run's message bus and event sink
    pub fn context(&self) -> &RunnerContext {
        &self.ctx
    }

    /// The run's shared state
    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    /// Queue the initial input envelope, targeted at the start executor
    pub fn enqueue_input(&mut self, data: TypedData) -> Result<()> {
        let start = self
            .executors
            .get(&self.start_id)
            .ok_or_else(|| WorkflowError::Execution(format!("start executor '{}' missing", self.start_id)))?;
        if !start.can_handle(&data) {
            return Err(WorkflowError::NoApplicableHandler {
                executor_id: self.start_id.clone(),
                message_type: data.type_name.clone(),
            });
        }
        self.ctx.mark_progress();
        self.inbound
            .push(Message::new(data, INPUT_SOURCE).with_target(self.start_id.clone()));
        Ok(())
    }

    /// Queue response envelopes for pending request-info events
    ///
    /// Validates every request ID before touching the pending map, so an
    /// unknown ID fails the call without consuming any response.
    pub fn enqueue_responses(&mut self, responses: HashMap<String, TypedData>) -> Result<()> {
        for request_id in responses.keys() {
            self.ctx.ensure_request(request_id)?;
        }
        for (request_id, data) in responses {
            let event = self
                .ctx
                .take_request(&request_id)
                .expect("request validated above");
            if event.response_type != ANY_TYPE && data.type_name != event.response_type {
                warn!(
                    request_id = %request_id,
                    expected = %event.response_type,
                    received = %data.type_name,
                    "response payload type differs from the requested response type"
                );
            }
            let response = RequestResponse::new(request_id, data);
            let payload = TypedData::new(&response)?;
            self.inbound.push(
                Message::new(payload, REQUEST_INFO_SOURCE)
                    .with_target(event.source_executor_id.clone()),
            );
        }
        Ok(())
    }

    /// Run supersteps until the workflow idles, pauses, or terminates
    pub async fn run_until_idle(&mut self) -> Result<RunState> {
        match self.run_loop().await {
            Ok(state) => Ok(state),
            Err(WorkflowError::Cancelled) => {
                self.ctx.add_event(WorkflowEvent::status(RunState::Cancelled));
                Ok(RunState::Cancelled)
            }
            Err(err) => {
                self.ctx.add_event(WorkflowEvent::status(RunState::Failed));
                Err(err)
            }
        }
    }

    async fn run_loop(&mut self) -> Result<RunState> {
        // The checkpoint covering the freshly enqueued input (or responses),
        // before the first superstep runs.
        self.maybe_checkpoint().await?;

        while !self.inbound.is_empty() {
            if self.ctx.is_cancelled() {
                return Err(WorkflowError::Cancelled);
            }

            let inbound = std::mem::take(&mut self.inbound);
            let deliveries = inbound.into_iter().map(|message| self.deliver(message));
            for result in futures::future::join_all(deliveries).await {
                result?;
            }

            self.inbound = self.ctx.drain_messages();
            self.iteration += 1;
            self.maybe_checkpoint().await?;

            let state = self.current_state();
            self.ctx.add_event(WorkflowEvent::status(state));
            if !state.is_running() {
                return Ok(state);
            }
        }

        // Nothing queued: report where the run stands (idle, or paused on
        // pending requests after a resume).
        let state = self.current_state();
        self.ctx.add_event(WorkflowEvent::status(state));
        Ok(state)
    }

    fn current_state(&self) -> RunState {
        if !self.inbound.is_empty() {
            RunState::Running
        } else if self.ctx.has_pending_requests() {
            RunState::IdleWithPendingRequests
        } else {
            RunState::Idle
        }
    }

    async fn deliver(&self, message: Message) -> Result<()> {
        if self.ctx.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        // Synthetic sources have no edge groups; their envelopes dispatch
        // directly to the addressed executor.
        if message.source_id == INPUT_SOURCE || message.source_id == REQUEST_INFO_SOURCE {
            let target = message.target_id.clone().ok_or_else(|| {
                WorkflowError::Execution("synthetic-source message has no target".into())
            })?;
            let source = message.source_id.clone();
            return self
                .registry
                .execute_on_target(&target, vec![source], message, &self.shared_state, &self.ctx)
                .await;
        }

        let mut accepted = false;
        if let Some(runners) = self.runners_by_source.get(&message.source_id) {
            for runner in runners {
                if runner
                    .send_message(message.clone(), &self.shared_state, &self.ctx)
                    .await?
                {
                    accepted = true;
                }
            }
        }

        if accepted {
            Ok(())
        } else {
            Err(WorkflowError::DeadLetter {
                source_id: message.source_id,
                message_type: message.data.type_name,
            })
        }
    }

    async fn maybe_checkpoint(&mut self) -> Result<()> {
        let Some(storage) = self.ctx.storage() else {
            self.ctx.take_progress();
            return Ok(());
        };
        if !self.ctx.take_progress() {
            return Ok(());
        }

        let mut checkpoint = WorkflowCheckpoint::new(&self.workflow_name, &self.graph_signature)
            .with_iteration_count(self.iteration);
        if let Some(previous) = &self.last_checkpoint_id {
            checkpoint = checkpoint.with_previous(previous.clone());
        }

        for message in &self.inbound {
            let key = message
                .target_id
                .clone()
                .unwrap_or_else(|| message.source_id.clone());
            checkpoint
                .messages
                .entry(key)
                .or_default()
                .push(serde_json::to_value(message)?);
        }

        checkpoint.shared_state = self.shared_state.snapshot().await;

        for (id, executor) in self.executors.iter() {
            let state = executor.on_checkpoint_save().await?;
            if !state.is_empty() {
                checkpoint.executor_states.insert(id.clone(), state);
            }
        }

        for (request_id, event) in self.ctx.pending_requests() {
            checkpoint
                .pending_request_info
                .insert(request_id, serde_json::to_value(&event)?);
        }

        let checkpoint_id = storage.save(checkpoint).await?;
        self.last_checkpoint_id = Some(checkpoint_id);
        Ok(())
    }

    /// Restore run state from a loaded checkpoint
    ///
    /// The caller has already verified the graph-signature guard.
    pub async fn restore_from_checkpoint(&mut self, checkpoint: WorkflowCheckpoint) -> Result<()> {
        self.shared_state.restore(checkpoint.shared_state).await;

        for (executor_id, state) in checkpoint.executor_states {
            if let Some(executor) = self.executors.get(&executor_id) {
                executor.on_checkpoint_restore(state).await?;
            } else {
                warn!(
                    executor_id = %executor_id,
                    "checkpoint carries state for an executor not present in the rebuilt workflow"
                );
            }
        }

        let mut pending = HashMap::new();
        for (request_id, event) in checkpoint.pending_request_info {
            let event: RequestInfoEvent = serde_json::from_value(event)?;
            pending.insert(request_id, event);
        }
        self.ctx.restore_pending(pending);

        // Deterministic flatten order; cross-source ordering within a
        // superstep is unspecified anyway.
        let grouped: BTreeMap<String, Vec<serde_json::Value>> =
            checkpoint.messages.into_iter().collect();
        self.inbound.clear();
        for (_key, messages) in grouped {
            for message in messages {
                self.inbound.push(serde_json::from_value(message)?);
            }
        }

        self.iteration = checkpoint.iteration_count;
        self.last_checkpoint_id = Some(checkpoint.checkpoint_id);
        // Restoration itself is not progress; the next checkpoint is earned
        // by the next superstep.
        self.ctx.take_progress();
        Ok(())
    }
}
