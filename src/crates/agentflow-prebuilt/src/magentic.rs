//! Magentic orchestration: planner-driven multi-agent runs
//!
//! The Magentic orchestrator keeps a **task ledger** (known facts plus the
//! current plan) and, per iteration, a **progress ledger** judging whether
//! the request is satisfied, whether the team is looping or stalling, who
//! speaks next, and with what instruction. A [`MagenticManager`] produces
//! both ledgers; [`StandardMagenticManager`] derives them from a
//! [`ChatClient`](crate::chat_client::ChatClient) with fixed prompt
//! templates, while tests and custom deployments implement the trait
//! directly.
//!
//! Budgets bound the run: a stall counter (incremented whenever the progress
//! ledger reports no progress or a loop) triggers a **reset** - clearing the
//! chat history and replanning - until the reset budget is exhausted; a
//! round budget caps total participant turns, yielding a partial final
//! answer when reached.
//!
//! With [`with_plan_review`](MagenticBuilder::with_plan_review), the initial
//! plan (and every revision) is surfaced as a
//! [`MagenticPlanReviewRequest`]; the run proceeds only on an approving
//! [`MagenticPlanReviewReply`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

use agentflow_checkpoint::{CheckpointStorage, StateValue};
use agentflow_core::context::WorkflowContext;
use agentflow_core::error::Result as CoreResult;
use agentflow_core::events::WorkflowEvent;
use agentflow_core::executor::{handler, Executor, HandlerMap};
use agentflow_core::messages::{Agent, ChatMessage};
use agentflow_core::request_info::RequestResponse;
use agentflow_core::workflow::{Workflow, WorkflowBuilder};
use async_trait::async_trait;

use crate::agent_executor::{AgentDispatch, AgentExecutor, AgentReply};
use crate::chat_client::ChatClient;
use crate::error::{OrchestrationError, Result};
use crate::group_chat::ParticipantInfo;
use crate::parsing::parse_json_reply;
use crate::prompts;

/// Executor ID (and author name) of the Magentic orchestrator
pub const MAGENTIC_ORCHESTRATOR_ID: &str = "magentic_orchestrator";

/// Terminal message appended when the reset budget is exhausted
pub const MAX_RESET_MESSAGE: &str =
    "Reached the maximum number of resets without completing the task; stopping.";

/// One judgement in a progress ledger: the reason, then the answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry<T> {
    /// Why the manager judged as it did
    pub reason: String,
    /// The judgement itself
    pub answer: T,
}

/// The per-iteration judgement produced by the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressLedger {
    /// Is the original request fully satisfied?
    pub is_request_satisfied: LedgerEntry<bool>,
    /// Is the team repeating itself?
    pub is_in_loop: LedgerEntry<bool>,
    /// Is forward progress being made?
    pub is_progress_being_made: LedgerEntry<bool>,
    /// Who should act next
    pub next_speaker: LedgerEntry<String>,
    /// The instruction or question for the next speaker
    pub instruction_or_question: LedgerEntry<String>,
}

/// The orchestrator-side context handed to the manager
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MagenticContext {
    /// The user's request
    pub task: String,
    /// Conversation accumulated since the last reset
    pub chat_history: Vec<ChatMessage>,
    /// Participants, in registration order
    pub participants: Vec<ParticipantInfo>,
    /// Completed participant turns across the whole run
    pub round_count: usize,
    /// Consecutive no-progress judgements since the last reset
    pub stall_count: usize,
    /// Resets performed so far
    pub reset_count: usize,
}

impl MagenticContext {
    /// Clear the history and stall counter, recording one more reset
    pub fn reset(&mut self) {
        self.chat_history.clear();
        self.stall_count = 0;
        self.reset_count += 1;
    }

    /// Comma-separated participant names
    pub fn participant_names(&self) -> String {
        self.participants
            .iter()
            .map(|p| p.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Name-and-description roster, one participant per line
    pub fn team_description(&self) -> String {
        self.participants
            .iter()
            .map(|p| format!("{}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Planner capabilities the orchestrator drives
#[async_trait]
pub trait MagenticManager: Send + Sync {
    /// Compose the initial task ledger (facts + plan)
    async fn plan(&self, context: &MagenticContext) -> Result<ChatMessage>;

    /// Compose a fresh task ledger after a stall or plan rejection
    async fn replan(&self, context: &MagenticContext) -> Result<ChatMessage>;

    /// Judge the team's progress for this iteration
    async fn create_progress_ledger(&self, context: &MagenticContext) -> Result<ProgressLedger>;

    /// Compose the final answer once the request is satisfied
    async fn prepare_final_answer(&self, context: &MagenticContext) -> Result<ChatMessage>;

    /// Capture manager-private state for a checkpoint
    async fn on_checkpoint_save(&self) -> Result<HashMap<String, StateValue>> {
        Ok(HashMap::new())
    }

    /// Restore manager-private state from a checkpoint
    async fn on_checkpoint_restore(&self, _state: HashMap<String, StateValue>) -> Result<()> {
        Ok(())
    }
}

/// The standard manager: all four capabilities from one chat client
pub struct StandardMagenticManager {
    client: Arc<dyn ChatClient>,
    ledger: Mutex<LedgerSheets>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerSheets {
    facts: String,
    plan: String,
}

impl StandardMagenticManager {
    /// Build a standard manager over a chat client
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            ledger: Mutex::new(LedgerSheets::default()),
        }
    }

    async fn complete_text(&self, context: &MagenticContext, prompt: String) -> Result<String> {
        let mut messages = context.chat_history.clone();
        messages.push(ChatMessage::user(prompt));
        Ok(self.client.complete(&messages).await?.text)
    }

    fn compose_ledger(&self, context: &MagenticContext, sheets: &LedgerSheets) -> ChatMessage {
        let text = prompts::TASK_LEDGER_TEMPLATE
            .replace("{task}", &context.task)
            .replace("{team}", &context.team_description())
            .replace("{facts}", &sheets.facts)
            .replace("{plan}", &sheets.plan);
        ChatMessage::assistant(text).with_author(MAGENTIC_ORCHESTRATOR_ID)
    }
}

#[async_trait]
impl MagenticManager for StandardMagenticManager {
    async fn plan(&self, context: &MagenticContext) -> Result<ChatMessage> {
        let facts = self
            .complete_text(
                context,
                prompts::TASK_LEDGER_FACTS_PROMPT.replace("{task}", &context.task),
            )
            .await?;
        let plan = self
            .complete_text(
                context,
                prompts::TASK_LEDGER_PLAN_PROMPT.replace("{team}", &context.team_description()),
            )
            .await?;

        let mut sheets = self.ledger.lock().await;
        sheets.facts = facts;
        sheets.plan = plan;
        Ok(self.compose_ledger(context, &sheets))
    }

    async fn replan(&self, context: &MagenticContext) -> Result<ChatMessage> {
        let previous_facts = self.ledger.lock().await.facts.clone();
        let facts = self
            .complete_text(
                context,
                prompts::TASK_LEDGER_FACTS_UPDATE_PROMPT
                    .replace("{task}", &context.task)
                    .replace("{facts}", &previous_facts),
            )
            .await?;
        let plan = self
            .complete_text(
                context,
                prompts::TASK_LEDGER_PLAN_UPDATE_PROMPT
                    .replace("{team}", &context.team_description()),
            )
            .await?;

        let mut sheets = self.ledger.lock().await;
        sheets.facts = facts;
        sheets.plan = plan;
        Ok(self.compose_ledger(context, &sheets))
    }

    async fn create_progress_ledger(&self, context: &MagenticContext) -> Result<ProgressLedger> {
        let prompt = prompts::PROGRESS_LEDGER_PROMPT
            .replace("{task}", &context.task)
            .replace("{names}", &context.participant_names());
        let reply = self.complete_text(context, prompt).await?;
        parse_json_reply(&reply)
    }

    async fn prepare_final_answer(&self, context: &MagenticContext) -> Result<ChatMessage> {
        let reply = self
            .complete_text(
                context,
                prompts::FINAL_ANSWER_PROMPT.replace("{task}", &context.task),
            )
            .await?;
        Ok(ChatMessage::assistant(reply).with_author(MAGENTIC_ORCHESTRATOR_ID))
    }

    async fn on_checkpoint_save(&self) -> Result<HashMap<String, StateValue>> {
        let sheets = self.ledger.lock().await;
        Ok([("sheets".to_string(), StateValue::from_serialize(&*sheets)?)]
            .into_iter()
            .collect())
    }

    async fn on_checkpoint_restore(&self, state: HashMap<String, StateValue>) -> Result<()> {
        if let Some(value) = state.get("sheets") {
            *self.ledger.lock().await = value.decode()?;
        }
        Ok(())
    }
}

/// Plan surfaced for human review before execution begins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagenticPlanReviewRequest {
    /// The user's request
    pub task: String,
    /// The task ledger text under review
    pub plan_text: String,
    /// How many reviews have happened for this run (0-based)
    pub round: u32,
}

/// The reviewer's verdict on a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanReviewDecision {
    /// Execute the plan as written
    Approve,
    /// Revise the plan, taking the comments into account
    Revise,
}

/// Response to a [`MagenticPlanReviewRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagenticPlanReviewReply {
    /// The reviewer's verdict
    pub decision: PlanReviewDecision,
    /// Reviewer guidance carried into the replan
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MagenticState {
    context: MagenticContext,
    task_ledger: Option<ChatMessage>,
    review_round: u32,
    terminated: bool,
}

struct MagenticCore {
    state: Mutex<MagenticState>,
    manager: Arc<dyn MagenticManager>,
    max_stall_count: usize,
    max_reset_count: usize,
    max_round_count: usize,
    enable_plan_review: bool,
}

impl MagenticCore {
    fn orchestrator_event(kind: &str, message: impl Into<String>) -> WorkflowEvent {
        WorkflowEvent::Orchestrator {
            executor_id: MAGENTIC_ORCHESTRATOR_ID.to_string(),
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    async fn start(&self, task: Vec<ChatMessage>, ctx: &WorkflowContext) -> CoreResult<()> {
        let task_text = task
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let context = {
            let mut state = self.state.lock().await;
            state.context.task = task_text;
            state.context.chat_history.extend(task);
            state.context.clone()
        };

        let ledger = self.manager.plan(&context).await?;
        {
            let mut state = self.state.lock().await;
            state.context.chat_history.push(ledger.clone());
            state.task_ledger = Some(ledger);
        }
        ctx.add_event(Self::orchestrator_event("planned", "task ledger composed"));

        if self.enable_plan_review {
            self.request_review(ctx).await
        } else {
            self.step(ctx).await
        }
    }

    async fn request_review(&self, ctx: &WorkflowContext) -> CoreResult<()> {
        let (task, plan_text, round) = {
            let state = self.state.lock().await;
            (
                state.context.task.clone(),
                state
                    .task_ledger
                    .as_ref()
                    .map(|message| message.text.clone())
                    .unwrap_or_default(),
                state.review_round,
            )
        };
        ctx.request_info::<MagenticPlanReviewRequest, MagenticPlanReviewReply>(
            MagenticPlanReviewRequest {
                task,
                plan_text,
                round,
            },
        )
        .await?;
        Ok(())
    }

    async fn on_review_reply(
        &self,
        response: RequestResponse,
        ctx: &WorkflowContext,
    ) -> CoreResult<()> {
        let reply: MagenticPlanReviewReply = response.data.decode()?;
        match reply.decision {
            PlanReviewDecision::Approve => {
                ctx.add_event(Self::orchestrator_event("plan_approved", ""));
                self.step(ctx).await
            }
            PlanReviewDecision::Revise => {
                let context = {
                    let mut state = self.state.lock().await;
                    state.review_round += 1;
                    if let Some(comments) = &reply.comments {
                        state.context.chat_history.push(ChatMessage::user(format!(
                            "Plan feedback: {comments}"
                        )));
                    }
                    state.context.clone()
                };
                let ledger = self.manager.replan(&context).await?;
                {
                    let mut state = self.state.lock().await;
                    state.context.chat_history.push(ledger.clone());
                    state.task_ledger = Some(ledger);
                }
                ctx.add_event(Self::orchestrator_event("replanned", "plan revised"));
                // Every revision goes back for approval before execution.
                self.request_review(ctx).await
            }
        }
    }

    async fn ingest_reply(&self, reply: AgentReply, ctx: &WorkflowContext) -> CoreResult<()> {
        {
            let mut state = self.state.lock().await;
            state.context.chat_history.extend(reply.messages);
            state.context.round_count += 1;
        }
        self.step(ctx).await
    }

    /// One pass of the outer loop: judge progress, then dispatch or stop.
    async fn step(&self, ctx: &WorkflowContext) -> CoreResult<()> {
        loop {
            let context = {
                let state = self.state.lock().await;
                if state.terminated {
                    return Ok(());
                }
                state.context.clone()
            };

            let ledger = self.manager.create_progress_ledger(&context).await?;

            if ledger.is_request_satisfied.answer {
                let answer = self.manager.prepare_final_answer(&context).await?;
                ctx.add_event(Self::orchestrator_event(
                    "completed",
                    ledger.is_request_satisfied.reason.clone(),
                ));
                self.finish(answer, ctx).await?;
                return Ok(());
            }

            let stalled = !ledger.is_progress_being_made.answer || ledger.is_in_loop.answer;
            if stalled {
                let needs_reset = {
                    let mut state = self.state.lock().await;
                    state.context.stall_count += 1;
                    state.context.stall_count > self.max_stall_count
                };
                if needs_reset {
                    let can_reset = {
                        let state = self.state.lock().await;
                        state.context.reset_count < self.max_reset_count
                    };
                    if !can_reset {
                        ctx.add_event(Self::orchestrator_event(
                            "reset_budget_exhausted",
                            MAX_RESET_MESSAGE,
                        ));
                        self.finish(
                            ChatMessage::assistant(MAX_RESET_MESSAGE)
                                .with_author(MAGENTIC_ORCHESTRATOR_ID),
                            ctx,
                        )
                        .await?;
                        return Ok(());
                    }

                    let context = {
                        let mut state = self.state.lock().await;
                        state.context.reset();
                        state.task_ledger = None;
                        state.context.clone()
                    };
                    let ledger_message = self.manager.replan(&context).await?;
                    {
                        let mut state = self.state.lock().await;
                        state.context.chat_history.push(ledger_message.clone());
                        state.task_ledger = Some(ledger_message);
                    }
                    ctx.add_event(Self::orchestrator_event("reset", "stall budget exceeded"));
                    if self.enable_plan_review {
                        return self.request_review(ctx).await;
                    }
                    // Re-evaluate progress against the fresh plan.
                    continue;
                }
            }

            let round_count = self.state.lock().await.context.round_count;
            if round_count >= self.max_round_count {
                let partial = self.manager.prepare_final_answer(&context).await?;
                ctx.add_event(Self::orchestrator_event(
                    "round_limit",
                    "maximum round count reached; yielding partial result",
                ));
                self.finish(partial, ctx).await?;
                return Ok(());
            }

            let speaker = ledger.next_speaker.answer.clone();
            if context.participants.iter().all(|p| p.name != speaker) {
                return Err(OrchestrationError::UnknownParticipant(speaker).into());
            }

            let instruction = ledger.instruction_or_question.answer.clone();
            let conversation = {
                let mut state = self.state.lock().await;
                state
                    .context
                    .chat_history
                    .push(ChatMessage::user(instruction.clone()).with_author(MAGENTIC_ORCHESTRATOR_ID));
                state.context.chat_history.clone()
            };

            ctx.add_event(Self::orchestrator_event("speaker_selected", speaker.clone()));
            ctx.send_message_to(
                AgentDispatch {
                    conversation,
                    instruction: None,
                },
                speaker,
            )
            .await?;
            return Ok(());
        }
    }

    async fn finish(&self, answer: ChatMessage, ctx: &WorkflowContext) -> CoreResult<()> {
        {
            let mut state = self.state.lock().await;
            state.context.chat_history.push(answer.clone());
            state.terminated = true;
        }
        ctx.yield_output(answer).await
    }
}

/// The orchestrator executor driving a Magentic run
pub struct MagenticOrchestrator {
    core: Arc<MagenticCore>,
    handlers: HandlerMap,
}

impl MagenticOrchestrator {
    fn new(core: Arc<MagenticCore>) -> Self {
        let mut handlers = HandlerMap::new();

        let c = Arc::clone(&core);
        handlers.insert(
            handler::<String, _, _>(move |task, ctx| {
                let core = Arc::clone(&c);
                async move { core.start(vec![ChatMessage::user(task)], &ctx).await }
            })
            .with_output::<AgentDispatch>(),
        );

        let c = Arc::clone(&core);
        handlers.insert(
            handler::<ChatMessage, _, _>(move |message, ctx| {
                let core = Arc::clone(&c);
                async move { core.start(vec![message], &ctx).await }
            })
            .with_output::<AgentDispatch>(),
        );

        let c = Arc::clone(&core);
        handlers.insert(
            handler::<Vec<ChatMessage>, _, _>(move |conversation, ctx| {
                let core = Arc::clone(&c);
                async move { core.start(conversation, &ctx).await }
            })
            .with_output::<AgentDispatch>(),
        );

        let c = Arc::clone(&core);
        handlers.insert(
            handler::<AgentReply, _, _>(move |reply, ctx| {
                let core = Arc::clone(&c);
                async move { core.ingest_reply(reply, &ctx).await }
            })
            .with_output::<AgentDispatch>(),
        );

        let c = Arc::clone(&core);
        handlers.insert(
            handler::<RequestResponse, _, _>(move |response, ctx| {
                let core = Arc::clone(&c);
                async move { core.on_review_reply(response, &ctx).await }
            })
            .with_output::<AgentDispatch>()
            .with_request::<MagenticPlanReviewRequest>(),
        );

        Self { core, handlers }
    }
}

#[async_trait]
impl Executor for MagenticOrchestrator {
    fn id(&self) -> &str {
        MAGENTIC_ORCHESTRATOR_ID
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    async fn on_checkpoint_save(&self) -> CoreResult<HashMap<String, StateValue>> {
        let mut saved = HashMap::new();
        {
            let state = self.core.state.lock().await;
            saved.insert("state".to_string(), StateValue::from_serialize(&*state)?);
        }
        for (key, value) in self.core.manager.on_checkpoint_save().await? {
            saved.insert(format!("manager:{key}"), value);
        }
        Ok(saved)
    }

    async fn on_checkpoint_restore(&self, saved: HashMap<String, StateValue>) -> CoreResult<()> {
        if let Some(value) = saved.get("state") {
            *self.core.state.lock().await = value.decode()?;
        }
        let manager_state: HashMap<String, StateValue> = saved
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix("manager:")
                    .map(|stripped| (stripped.to_string(), value))
            })
            .collect();
        if !manager_state.is_empty() {
            self.core.manager.on_checkpoint_restore(manager_state).await?;
        }
        Ok(())
    }
}

/// Factory producing fresh participant agents per `build()`
pub type AgentFactory = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// Factory producing fresh managers per `build()`
pub type ManagerFactory = Arc<dyn Fn() -> Arc<dyn MagenticManager> + Send + Sync>;

/// Builder for Magentic workflows
#[derive(Default)]
pub struct MagenticBuilder {
    participants: Option<Vec<Arc<dyn Agent>>>,
    participant_factories: Option<Vec<AgentFactory>>,
    manager: Option<Arc<dyn MagenticManager>>,
    manager_factory: Option<ManagerFactory>,
    max_stall_count: usize,
    max_reset_count: usize,
    max_round_count: usize,
    enable_plan_review: bool,
    storage: Option<Arc<dyn CheckpointStorage>>,
    error: Option<String>,
}

impl MagenticBuilder {
    /// Start a builder with the default budgets
    pub fn new() -> Self {
        Self {
            max_stall_count: 3,
            max_reset_count: 2,
            max_round_count: 20,
            ..Self::default()
        }
    }

    /// Register participant agent instances
    pub fn participants(mut self, participants: Vec<Arc<dyn Agent>>) -> Self {
        if self.participants.is_some() {
            self.record_error("participants may only be registered once");
        } else if self.participant_factories.is_some() {
            self.record_error("participants and participant factories cannot be mixed");
        } else if participants.is_empty() {
            self.record_error("at least one participant is required");
        } else {
            self.participants = Some(participants);
        }
        self
    }

    /// Register participant factories, making the builder reusable
    pub fn participant_factories(mut self, factories: Vec<AgentFactory>) -> Self {
        if self.participant_factories.is_some() {
            self.record_error("participant factories may only be registered once");
        } else if self.participants.is_some() {
            self.record_error("participants and participant factories cannot be mixed");
        } else if factories.is_empty() {
            self.record_error("at least one participant factory is required");
        } else {
            self.participant_factories = Some(factories);
        }
        self
    }

    /// Use a manager instance
    pub fn manager(mut self, manager: Arc<dyn MagenticManager>) -> Self {
        if self.manager.is_some() || self.manager_factory.is_some() {
            self.record_error("only one of manager or manager_factory may be configured");
        } else {
            self.manager = Some(manager);
        }
        self
    }

    /// Use a manager factory, constructed fresh per `build()`
    pub fn manager_factory(mut self, factory: ManagerFactory) -> Self {
        if self.manager.is_some() || self.manager_factory.is_some() {
            self.record_error("only one of manager or manager_factory may be configured");
        } else {
            self.manager_factory = Some(factory);
        }
        self
    }

    /// Consecutive no-progress judgements tolerated before a reset
    pub fn max_stall_count(mut self, count: usize) -> Self {
        self.max_stall_count = count;
        self
    }

    /// Resets allowed before the run terminates
    pub fn max_reset_count(mut self, count: usize) -> Self {
        self.max_reset_count = count;
        self
    }

    /// Total participant turns allowed
    pub fn max_round_count(mut self, count: usize) -> Self {
        self.max_round_count = count;
        self
    }

    /// Surface every plan (and revision) for approval before execution
    pub fn with_plan_review(mut self) -> Self {
        self.enable_plan_review = true;
        self
    }

    /// Configure checkpoint storage for built workflows
    pub fn with_checkpointing(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Assemble the Magentic workflow
    pub fn build(&self) -> Result<Workflow> {
        if let Some(message) = &self.error {
            return Err(OrchestrationError::Builder(message.clone()));
        }

        let participants: Vec<Arc<dyn Agent>> = match (&self.participants, &self.participant_factories)
        {
            (Some(instances), _) => instances.clone(),
            (None, Some(factories)) => factories.iter().map(|factory| factory()).collect(),
            (None, None) => {
                return Err(OrchestrationError::Builder(
                    "at least one participant is required".into(),
                ))
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut infos = Vec::new();
        for participant in &participants {
            let name = participant.name().to_string();
            if name.is_empty() {
                return Err(OrchestrationError::Builder(
                    "participant names must not be empty".into(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(OrchestrationError::Builder(format!(
                    "duplicate participant name '{name}'"
                )));
            }
            infos.push(ParticipantInfo {
                name,
                description: participant.description().to_string(),
            });
        }

        let manager = match (&self.manager, &self.manager_factory) {
            (Some(manager), None) => Arc::clone(manager),
            (None, Some(factory)) => factory(),
            (None, None) => {
                return Err(OrchestrationError::Builder(
                    "exactly one of manager or manager_factory is required".into(),
                ))
            }
            _ => {
                return Err(OrchestrationError::Builder(
                    "only one of manager or manager_factory may be configured".into(),
                ))
            }
        };

        let core = Arc::new(MagenticCore {
            state: Mutex::new(MagenticState {
                context: MagenticContext {
                    participants: infos,
                    ..MagenticContext::default()
                },
                ..MagenticState::default()
            }),
            manager,
            max_stall_count: self.max_stall_count,
            max_reset_count: self.max_reset_count,
            max_round_count: self.max_round_count,
            enable_plan_review: self.enable_plan_review,
        });
        let orchestrator = Arc::new(MagenticOrchestrator::new(core));

        let executors: Vec<Arc<AgentExecutor>> = participants
            .iter()
            .map(|participant| Arc::new(AgentExecutor::new(Arc::clone(participant))))
            .collect();

        let mut builder = WorkflowBuilder::new(orchestrator.clone()).with_name("magentic");
        if executors.len() == 1 {
            builder = builder.add_edge(orchestrator.clone(), executors[0].clone());
        } else {
            builder = builder.add_fan_out(
                orchestrator.clone(),
                executors
                    .iter()
                    .map(|executor| executor.clone() as Arc<dyn Executor>)
                    .collect(),
            );
        }
        for executor in &executors {
            builder = builder.add_edge(executor.clone(), orchestrator.clone());
        }
        if let Some(storage) = &self.storage {
            builder = builder.with_checkpointing(Arc::clone(storage));
        }

        builder.build().map_err(OrchestrationError::from)
    }

    fn record_error(&mut self, message: &str) {
        if self.error.is_none() {
            self.error = Some(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_executor::testing::StubAgent;
    use crate::chat_client::testing::ScriptedChatClient;
    use agentflow_checkpoint::InMemoryCheckpointStorage;
    use agentflow_core::message::TypedData;
    use agentflow_core::{CheckpointError, RunState, WorkflowError};
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn progressing_ledger(speaker: &str) -> ProgressLedger {
        ProgressLedger {
            is_request_satisfied: LedgerEntry {
                reason: "work remains".into(),
                answer: false,
            },
            is_in_loop: LedgerEntry {
                reason: "fresh ground".into(),
                answer: false,
            },
            is_progress_being_made: LedgerEntry {
                reason: "moving".into(),
                answer: true,
            },
            next_speaker: LedgerEntry {
                reason: "their turn".into(),
                answer: speaker.to_string(),
            },
            instruction_or_question: LedgerEntry {
                reason: "next step".into(),
                answer: format!("{speaker}, continue"),
            },
        }
    }

    fn satisfied_ledger() -> ProgressLedger {
        let mut ledger = progressing_ledger("alpha");
        ledger.is_request_satisfied = LedgerEntry {
            reason: "done".into(),
            answer: true,
        };
        ledger
    }

    fn stalled_ledger(speaker: &str) -> ProgressLedger {
        let mut ledger = progressing_ledger(speaker);
        ledger.is_progress_being_made = LedgerEntry {
            reason: "going in circles".into(),
            answer: false,
        };
        ledger
    }

    struct FakeManager {
        ledgers: std::sync::Mutex<Vec<ProgressLedger>>,
        default_ledger: fn() -> ProgressLedger,
        plan_calls: AtomicUsize,
        replan_calls: AtomicUsize,
        final_text: String,
    }

    impl FakeManager {
        fn new(mut script: Vec<ProgressLedger>, default_ledger: fn() -> ProgressLedger) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                ledgers: std::sync::Mutex::new(script),
                default_ledger,
                plan_calls: AtomicUsize::new(0),
                replan_calls: AtomicUsize::new(0),
                final_text: "final answer".into(),
            })
        }
    }

    #[async_trait]
    impl MagenticManager for FakeManager {
        async fn plan(&self, _context: &MagenticContext) -> Result<ChatMessage> {
            self.plan_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatMessage::assistant("task ledger").with_author(MAGENTIC_ORCHESTRATOR_ID))
        }

        async fn replan(&self, _context: &MagenticContext) -> Result<ChatMessage> {
            self.replan_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatMessage::assistant("revised ledger").with_author(MAGENTIC_ORCHESTRATOR_ID))
        }

        async fn create_progress_ledger(
            &self,
            _context: &MagenticContext,
        ) -> Result<ProgressLedger> {
            Ok(self
                .ledgers
                .lock()
                .expect("ledger script lock")
                .pop()
                .unwrap_or_else(|| (self.default_ledger)()))
        }

        async fn prepare_final_answer(&self, _context: &MagenticContext) -> Result<ChatMessage> {
            Ok(ChatMessage::assistant(self.final_text.clone())
                .with_author(MAGENTIC_ORCHESTRATOR_ID))
        }
    }

    fn final_outputs(events: &[WorkflowEvent]) -> Vec<ChatMessage> {
        events
            .iter()
            .filter_map(|event| event.as_output::<ChatMessage>())
            .map(|output| output.unwrap())
            .collect()
    }

    #[test]
    fn test_context_reset_behavior() {
        let mut context = MagenticContext {
            task: "t".into(),
            chat_history: vec![ChatMessage::user("a"), ChatMessage::assistant("b")],
            stall_count: 2,
            reset_count: 0,
            ..MagenticContext::default()
        };
        context.reset();
        assert!(context.chat_history.is_empty());
        assert_eq!(context.stall_count, 0);
        assert_eq!(context.reset_count, 1);
        // The task itself survives a reset.
        assert_eq!(context.task, "t");
    }

    #[tokio::test]
    async fn test_run_completes_with_final_answer() {
        let manager = FakeManager::new(
            vec![progressing_ledger("alpha"), satisfied_ledger()],
            satisfied_ledger,
        );
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "alpha did the work")])
            .manager(manager.clone())
            .build()
            .unwrap();

        let events = workflow.run("solve it".to_string()).await.unwrap();
        let outputs = final_outputs(&events);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].text, "final answer");
        assert_eq!(manager.plan_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.replan_calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            events.last().and_then(|event| event.as_status()),
            Some(RunState::Idle)
        );
    }

    #[tokio::test]
    async fn test_round_limit_produces_partial_result() {
        let manager = FakeManager::new(Vec::new(), || progressing_ledger("alpha"));
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "still working")])
            .manager(manager.clone())
            .max_round_count(1)
            .build()
            .unwrap();

        let events = workflow.run("solve it".to_string()).await.unwrap();
        let outputs = final_outputs(&events);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].text, "final answer");
        assert!(events.iter().any(|event| matches!(
            event,
            WorkflowEvent::Orchestrator { kind, .. } if kind == "round_limit"
        )));
    }

    #[tokio::test]
    async fn test_stall_and_reset_reach_limits() {
        let manager = FakeManager::new(Vec::new(), || stalled_ledger("alpha"));
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "unused")])
            .manager(manager.clone())
            .max_stall_count(0)
            .max_reset_count(1)
            .build()
            .unwrap();

        let events = workflow.run("solve it".to_string()).await.unwrap();
        let outputs = final_outputs(&events);
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].text, MAX_RESET_MESSAGE);
        // One reset happened (with its replan) before the budget ran out.
        assert_eq!(manager.replan_calls.load(Ordering::SeqCst), 1);
        assert!(events.iter().any(|event| matches!(
            event,
            WorkflowEvent::Orchestrator { kind, .. } if kind == "reset"
        )));
    }

    #[tokio::test]
    async fn test_unknown_next_speaker_fails_the_run() {
        let manager = FakeManager::new(vec![progressing_ledger("ghost")], satisfied_ledger);
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "unused")])
            .manager(manager)
            .build()
            .unwrap();

        let err = workflow.run("solve it".to_string()).await.unwrap_err();
        assert!(format!("{err}").contains("Unknown participant 'ghost'"));
    }

    async fn respond_to_review(
        workflow: &Workflow,
        request_id: String,
        decision: PlanReviewDecision,
    ) -> Vec<WorkflowEvent> {
        let responses: HashMap<String, TypedData> = [(
            request_id,
            TypedData::new(&MagenticPlanReviewReply {
                decision,
                comments: Some("feedback".into()),
            })
            .unwrap(),
        )]
        .into_iter()
        .collect();
        workflow.send_responses(responses).await.unwrap()
    }

    #[tokio::test]
    async fn test_plan_review_approval_to_completion() {
        let manager = FakeManager::new(vec![satisfied_ledger()], satisfied_ledger);
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "unused")])
            .manager(manager.clone())
            .with_plan_review()
            .build()
            .unwrap();

        let events = workflow.run("solve it".to_string()).await.unwrap();
        let request = events
            .iter()
            .find_map(|event| event.as_request_info())
            .expect("plan surfaced for review")
            .clone();
        let review: MagenticPlanReviewRequest = request.data.decode().unwrap();
        assert_eq!(review.round, 0);
        assert_eq!(review.plan_text, "task ledger");

        let events =
            respond_to_review(&workflow, request.request_id, PlanReviewDecision::Approve).await;
        let outputs = final_outputs(&events);
        assert_eq!(outputs[0].text, "final answer");
        assert_eq!(manager.replan_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_plan_review_revise_requires_second_approval() {
        let manager = FakeManager::new(vec![satisfied_ledger()], satisfied_ledger);
        let workflow = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "unused")])
            .manager(manager.clone())
            .with_plan_review()
            .build()
            .unwrap();

        let events = workflow.run("solve it".to_string()).await.unwrap();
        let first = events
            .iter()
            .find_map(|event| event.as_request_info())
            .unwrap()
            .clone();

        // Revision triggers a replan and a second review round.
        let events =
            respond_to_review(&workflow, first.request_id, PlanReviewDecision::Revise).await;
        assert_eq!(manager.replan_calls.load(Ordering::SeqCst), 1);
        let second = events
            .iter()
            .find_map(|event| event.as_request_info())
            .expect("revised plan surfaced again")
            .clone();
        let review: MagenticPlanReviewRequest = second.data.decode().unwrap();
        assert_eq!(review.round, 1);
        assert_eq!(review.plan_text, "revised ledger");

        let events =
            respond_to_review(&workflow, second.request_id, PlanReviewDecision::Approve).await;
        assert_eq!(final_outputs(&events)[0].text, "final answer");
    }

    fn checkpointing_builder(
        participant: &'static str,
        storage: Arc<InMemoryCheckpointStorage>,
    ) -> MagenticBuilder {
        MagenticBuilder::new()
            .participants(vec![StubAgent::new(participant, "work")])
            .manager_factory(Arc::new(|| {
                FakeManager::new(
                    vec![progressing_ledger("alpha"), satisfied_ledger()],
                    satisfied_ledger,
                ) as Arc<dyn MagenticManager>
            }))
            .with_checkpointing(storage)
    }

    #[tokio::test]
    async fn test_checkpoint_resume_rejects_participant_renames() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let workflow = checkpointing_builder("alpha", storage.clone()).build().unwrap();
        workflow.run("solve it".to_string()).await.unwrap();

        let latest = storage.get_latest("magentic").await.unwrap().unwrap();
        assert!(latest
            .executor_states
            .contains_key(MAGENTIC_ORCHESTRATOR_ID));

        let renamed = checkpointing_builder("renamedAgent", storage.clone())
            .build()
            .unwrap();
        let mut stream = renamed.run_stream_from_checkpoint(latest.checkpoint_id, None);
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Checkpoint(CheckpointError::GraphMismatch(_))
        ));
        assert!(format!("{err}").contains("Workflow graph has changed"));
    }

    #[tokio::test]
    async fn test_checkpoint_resume_restores_orchestrator_state() {
        let storage = Arc::new(InMemoryCheckpointStorage::new());
        let workflow = checkpointing_builder("alpha", storage.clone()).build().unwrap();
        workflow.run("solve it".to_string()).await.unwrap();

        let latest = storage.get_latest("magentic").await.unwrap().unwrap();
        let rebuilt = checkpointing_builder("alpha", storage.clone()).build().unwrap();
        let mut stream = rebuilt.run_stream_from_checkpoint(latest.checkpoint_id, None);
        let mut last_state = None;
        while let Some(event) = stream.next().await {
            last_state = event.unwrap().as_status().or(last_state);
        }
        // The checkpointed run had already terminated, so the resumed run
        // idles immediately instead of repeating work.
        assert_eq!(last_state, Some(RunState::Idle));
    }

    #[test]
    fn test_builder_requires_exactly_one_manager_option() {
        let err = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "x")])
            .build()
            .unwrap_err();
        assert!(format!("{err}").contains("exactly one of manager"));

        let manager = FakeManager::new(Vec::new(), satisfied_ledger);
        let err = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "x")])
            .manager(manager.clone())
            .manager_factory(Arc::new(move || {
                FakeManager::new(Vec::new(), satisfied_ledger) as Arc<dyn MagenticManager>
            }))
            .build()
            .unwrap_err();
        assert!(format!("{err}").contains("only one of manager"));
    }

    #[test]
    fn test_builder_rejects_mixing_participants_and_factories() {
        let factory: AgentFactory = Arc::new(|| StubAgent::new("made", "x") as Arc<dyn Agent>);
        let err = MagenticBuilder::new()
            .participants(vec![StubAgent::new("alpha", "x")])
            .participant_factories(vec![factory])
            .manager(FakeManager::new(Vec::new(), satisfied_ledger))
            .build()
            .unwrap_err();
        assert!(format!("{err}").contains("cannot be mixed"));
    }

    #[tokio::test]
    async fn test_standard_manager_composes_task_ledger() {
        let client = Arc::new(ScriptedChatClient::new(vec![
            "FACTS: the sky is blue",
            "PLAN: 1. ask alpha",
        ]));
        let manager = StandardMagenticManager::new(client);
        let context = MagenticContext {
            task: "describe the sky".into(),
            participants: vec![ParticipantInfo {
                name: "alpha".into(),
                description: "observer".into(),
            }],
            ..MagenticContext::default()
        };

        let ledger = manager.plan(&context).await.unwrap();
        assert!(ledger.text.contains("describe the sky"));
        assert!(ledger.text.contains("FACTS: the sky is blue"));
        assert!(ledger.text.contains("PLAN: 1. ask alpha"));
        assert!(ledger.text.contains("alpha: observer"));
    }

    #[tokio::test]
    async fn test_standard_manager_parses_progress_ledger() {
        let ledger_json = serde_json::to_string(&progressing_ledger("alpha")).unwrap();
        let reply = format!("```json\n{ledger_json}\n```");
        let client = Arc::new(ScriptedChatClient::new(vec![reply.as_str()]));
        let manager = StandardMagenticManager::new(client);

        let ledger = manager
            .create_progress_ledger(&MagenticContext::default())
            .await
            .unwrap();
        assert_eq!(ledger.next_speaker.answer, "alpha");
        assert!(!ledger.is_request_satisfied.answer);
    }

    #[tokio::test]
    async fn test_standard_manager_rejects_unparseable_ledger() {
        let client = Arc::new(ScriptedChatClient::new(vec!["I cannot answer in JSON"]));
        let manager = StandardMagenticManager::new(client);
        let err = manager
            .create_progress_ledger(&MagenticContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::ManagerResponse(_)));
    }
}
