//! Group-chat orchestration over a shared conversation
//!
//! A [`GroupChatBuilder`] assembles a workflow in which an orchestrator
//! executor loops over a set of participant agents: pick the next speaker,
//! dispatch the conversation, collect the reply, check termination. Speaker
//! selection is either a synchronous [`SelectorFn`] over the chat state or a
//! **manager agent** whose reply is parsed as a structured
//! [`GroupChatManagerDecision`]; configuring both is a builder error.
//!
//! The orchestrator stops and yields the full conversation when:
//!
//! - the manager decides to terminate (appending its `final_message`, or
//!   [`TERMINATION_CONDITION_MET_MESSAGE`] when it returns none);
//! - a user-supplied termination condition over the conversation fires;
//! - the round budget is exhausted (appending a message containing
//!   "maximum number of rounds").
//!
//! With [`with_request_info`](GroupChatBuilder::with_request_info), the
//! orchestrator pauses before dispatching to the named participants (all of
//! them when the list is empty), surfacing a [`GroupChatRequest`] and
//! resuming on the caller's response.
//!
//! # Example
//!
//! ```rust,ignore
//! let workflow = GroupChatBuilder::new()
//!     .participants(vec![researcher, writer])
//!     .select_speaker(Arc::new(|state: &GroupChatState| {
//!         state.participants[state.round_count % 2].name.clone()
//!     }))
//!     .max_rounds(6)
//!     .build()?;
//! let events = workflow.run("Draft the announcement".to_string()).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
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
use std::collections::HashMap;

use crate::agent_executor::{AgentDispatch, AgentExecutor, AgentReply};
use crate::error::{OrchestrationError, Result};
use crate::parsing::parse_json_reply;

/// Message appended when a termination condition ends the chat
pub const TERMINATION_CONDITION_MET_MESSAGE: &str = "Termination condition met.";

/// Message appended when the round budget is exhausted
pub const MAX_ROUNDS_MESSAGE: &str = "Reached the maximum number of rounds.";

/// Executor ID (and author name) of the group-chat orchestrator
pub const GROUP_CHAT_ORCHESTRATOR_ID: &str = "group_chat_orchestrator";

const MANAGER_DECISION_INSTRUCTION: &str = "You are moderating a conversation between these \
participants:\n{participants}\n\nReply with only a JSON object of the shape \
{\"terminate\": bool, \"reason\": string|null, \"next_speaker\": string|null, \
\"final_message\": string|null}. Pick next_speaker from the participant list while the \
conversation should continue; set terminate to true (optionally with a final_message) once it \
is complete.";

/// A synchronous speaker-selection function over the chat state
pub type SelectorFn = Arc<dyn Fn(&GroupChatState) -> String + Send + Sync>;

/// A termination predicate over the conversation so far
pub type TerminationFn = Arc<dyn Fn(&[ChatMessage]) -> bool + Send + Sync>;

/// Factory producing fresh participant agents per `build()`
pub type AgentFactory = Arc<dyn Fn() -> Arc<dyn Agent> + Send + Sync>;

/// One participant as seen by selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    /// Participant name (also its executor ID)
    pub name: String,
    /// Participant description, as supplied by the agent
    pub description: String,
}

/// The orchestrator's mutable state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupChatState {
    /// Participants in registration order
    pub participants: Vec<ParticipantInfo>,
    /// The shared conversation
    pub conversation: Vec<ChatMessage>,
    /// Completed participant turns
    pub round_count: usize,
    /// Round budget
    pub max_rounds: usize,
    /// Whether the chat has ended
    pub terminated: bool,
    /// Why the chat ended, when it has
    pub termination_reason: Option<String>,
    /// Participant awaiting a request-info approval, if any
    pub pending_participant: Option<String>,
}

impl GroupChatState {
    /// Look up a participant by name
    pub fn participant(&self, name: &str) -> Option<&ParticipantInfo> {
        self.participants.iter().find(|p| p.name == name)
    }
}

/// The structured decision parsed from a manager agent's reply
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupChatManagerDecision {
    /// End the conversation
    #[serde(default)]
    pub terminate: bool,
    /// Why the manager decided as it did
    #[serde(default)]
    pub reason: Option<String>,
    /// The next participant to speak, when continuing
    #[serde(default)]
    pub next_speaker: Option<String>,
    /// Closing message appended when terminating
    #[serde(default)]
    pub final_message: Option<String>,
}

/// Payload surfaced when the orchestrator pauses before a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupChatRequest {
    /// The participant about to be dispatched to
    pub next_participant: String,
    /// The conversation so far
    pub conversation: Vec<ChatMessage>,
}

/// Response resuming a paused dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupChatApproval {
    /// Whether to proceed with the dispatch
    pub approved: bool,
}

enum SelectionMode {
    Function(SelectorFn),
    Manager(Arc<dyn Agent>),
}

struct GroupChatCore {
    state: Mutex<GroupChatState>,
    mode: SelectionMode,
    termination: Option<TerminationFn>,
    pause_before: Option<Vec<String>>,
}

impl GroupChatCore {
    fn author_name(&self) -> String {
        match &self.mode {
            SelectionMode::Function(_) => GROUP_CHAT_ORCHESTRATOR_ID.to_string(),
            SelectionMode::Manager(manager) => manager.name().to_string(),
        }
    }

    async fn start(&self, conversation: Vec<ChatMessage>, ctx: &WorkflowContext) -> CoreResult<()> {
        if conversation.is_empty() {
            return Err(OrchestrationError::Builder(
                "group chat task conversation must not be empty".into(),
            )
            .into());
        }
        {
            let mut state = self.state.lock().await;
            state.conversation.extend(conversation);
        }
        self.advance(ctx).await
    }

    async fn ingest_reply(&self, reply: AgentReply, ctx: &WorkflowContext) -> CoreResult<()> {
        let conversation = {
            let mut state = self.state.lock().await;
            state.conversation.extend(reply.messages);
            state.round_count += 1;
            state.conversation.clone()
        };

        if let Some(termination) = &self.termination {
            if termination(&conversation) {
                let author = self.author_name();
                self.finish(
                    ChatMessage::assistant(TERMINATION_CONDITION_MET_MESSAGE).with_author(author),
                    "termination condition met",
                    ctx,
                )
                .await?;
                return Ok(());
            }
        }

        self.advance(ctx).await
    }

    async fn resume_approval(
        &self,
        _response: RequestResponse,
        ctx: &WorkflowContext,
    ) -> CoreResult<()> {
        let pending = {
            let mut state = self.state.lock().await;
            state.pending_participant.take()
        };
        match pending {
            Some(participant) => self.dispatch(participant, ctx).await,
            None => Ok(()),
        }
    }

    async fn advance(&self, ctx: &WorkflowContext) -> CoreResult<()> {
        let snapshot = {
            let state = self.state.lock().await;
            if state.terminated {
                return Ok(());
            }
            state.clone()
        };

        let selected = match &self.mode {
            SelectionMode::Function(selector) => selector(&snapshot),
            SelectionMode::Manager(manager) => {
                match self.manager_decision(manager, &snapshot, ctx).await? {
                    Some(name) => name,
                    // The manager terminated the conversation.
                    None => return Ok(()),
                }
            }
        };

        if snapshot.participant(&selected).is_none() {
            return Err(OrchestrationError::UnknownParticipant(selected).into());
        }

        if snapshot.round_count >= snapshot.max_rounds {
            let author = GROUP_CHAT_ORCHESTRATOR_ID.to_string();
            self.finish(
                ChatMessage::assistant(MAX_ROUNDS_MESSAGE).with_author(author),
                "maximum number of rounds reached",
                ctx,
            )
            .await?;
            return Ok(());
        }

        let should_pause = self
            .pause_before
            .as_ref()
            .map(|names| names.is_empty() || names.iter().any(|name| name == &selected))
            .unwrap_or(false);
        if should_pause {
            {
                let mut state = self.state.lock().await;
                state.pending_participant = Some(selected.clone());
            }
            ctx.request_info::<GroupChatRequest, GroupChatApproval>(GroupChatRequest {
                next_participant: selected,
                conversation: snapshot.conversation,
            })
            .await?;
            return Ok(());
        }

        self.dispatch(selected, ctx).await
    }

    /// Ask the manager agent for a decision; `None` means it terminated.
    async fn manager_decision(
        &self,
        manager: &Arc<dyn Agent>,
        snapshot: &GroupChatState,
        ctx: &WorkflowContext,
    ) -> CoreResult<Option<String>> {
        let roster = snapshot
            .participants
            .iter()
            .map(|p| format!("- {}: {}", p.name, p.description))
            .collect::<Vec<_>>()
            .join("\n");
        let mut conversation = snapshot.conversation.clone();
        conversation.push(ChatMessage::user(
            MANAGER_DECISION_INSTRUCTION.replace("{participants}", &roster),
        ));

        let response = manager.run(&conversation).await?;
        let decision: GroupChatManagerDecision = parse_json_reply(&response.text())?;

        if decision.terminate {
            let text = decision
                .final_message
                .unwrap_or_else(|| TERMINATION_CONDITION_MET_MESSAGE.to_string());
            let message = ChatMessage::assistant(text).with_author(manager.name());
            self.finish(
                message,
                decision.reason.as_deref().unwrap_or("manager terminated"),
                ctx,
            )
            .await?;
            return Ok(None);
        }

        match decision.next_speaker {
            Some(name) => Ok(Some(name)),
            None => Err(OrchestrationError::ManagerResponse(
                "manager neither terminated nor named a next speaker".into(),
            )
            .into()),
        }
    }

    async fn dispatch(&self, participant: String, ctx: &WorkflowContext) -> CoreResult<()> {
        let conversation = self.state.lock().await.conversation.clone();
        ctx.add_event(WorkflowEvent::Orchestrator {
            executor_id: GROUP_CHAT_ORCHESTRATOR_ID.to_string(),
            kind: "speaker_selected".into(),
            message: participant.clone(),
        });
        ctx.send_message_to(
            AgentDispatch {
                conversation,
                instruction: None,
            },
            participant,
        )
        .await
    }

    async fn finish(
        &self,
        message: ChatMessage,
        reason: &str,
        ctx: &WorkflowContext,
    ) -> CoreResult<()> {
        let conversation = {
            let mut state = self.state.lock().await;
            state.conversation.push(message);
            state.terminated = true;
            state.termination_reason = Some(reason.to_string());
            state.conversation.clone()
        };
        ctx.add_event(WorkflowEvent::Orchestrator {
            executor_id: GROUP_CHAT_ORCHESTRATOR_ID.to_string(),
            kind: "terminated".into(),
            message: reason.to_string(),
        });
        ctx.yield_output(conversation).await
    }
}

/// The orchestrator executor driving a group chat
pub struct GroupChatOrchestrator {
    core: Arc<GroupChatCore>,
    handlers: HandlerMap,
}

impl GroupChatOrchestrator {
    fn new(core: Arc<GroupChatCore>) -> Self {
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
                async move { core.resume_approval(response, &ctx).await }
            })
            .with_output::<AgentDispatch>()
            .with_request::<GroupChatRequest>(),
        );

        Self { core, handlers }
    }
}

#[async_trait]
impl Executor for GroupChatOrchestrator {
    fn id(&self) -> &str {
        GROUP_CHAT_ORCHESTRATOR_ID
    }

    fn handlers(&self) -> &HandlerMap {
        &self.handlers
    }

    async fn on_checkpoint_save(&self) -> CoreResult<HashMap<String, StateValue>> {
        let state = self.core.state.lock().await;
        Ok([("state".to_string(), StateValue::from_serialize(&*state)?)]
            .into_iter()
            .collect())
    }

    async fn on_checkpoint_restore(&self, saved: HashMap<String, StateValue>) -> CoreResult<()> {
        if let Some(value) = saved.get("state") {
            *self.core.state.lock().await = value.decode()?;
        }
        Ok(())
    }
}

/// Builder for group-chat workflows
#[derive(Default)]
pub struct GroupChatBuilder {
    participants: Option<Vec<Arc<dyn Agent>>>,
    participant_factories: Option<Vec<AgentFactory>>,
    selector: Option<SelectorFn>,
    manager: Option<Arc<dyn Agent>>,
    manager_factory: Option<AgentFactory>,
    termination: Option<TerminationFn>,
    max_rounds: usize,
    pause_before: Option<Vec<String>>,
    storage: Option<Arc<dyn CheckpointStorage>>,
    error: Option<String>,
}

impl GroupChatBuilder {
    /// Start a builder with the default round budget
    pub fn new() -> Self {
        Self {
            max_rounds: 10,
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

    /// Drive selection with a synchronous function over the chat state
    pub fn select_speaker(mut self, selector: SelectorFn) -> Self {
        if self.orchestrator_configured() {
            self.record_error("only one of select_speaker, manager, or manager_factory may be configured");
        } else {
            self.selector = Some(selector);
        }
        self
    }

    /// Drive selection with a manager agent returning structured decisions
    pub fn manager(mut self, manager: Arc<dyn Agent>) -> Self {
        if self.orchestrator_configured() {
            self.record_error("only one of select_speaker, manager, or manager_factory may be configured");
        } else {
            self.manager = Some(manager);
        }
        self
    }

    /// Like [`manager`](Self::manager), but constructed fresh per `build()`
    pub fn manager_factory(mut self, factory: AgentFactory) -> Self {
        if self.orchestrator_configured() {
            self.record_error("only one of select_speaker, manager, or manager_factory may be configured");
        } else {
            self.manager_factory = Some(factory);
        }
        self
    }

    /// End the chat once the condition over the conversation holds
    pub fn termination_condition(mut self, condition: TerminationFn) -> Self {
        self.termination = Some(condition);
        self
    }

    /// Cap the number of participant turns
    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Pause for approval before dispatching to the named participants
    ///
    /// An empty list pauses before every participant.
    pub fn with_request_info(mut self, agents: Vec<String>) -> Self {
        self.pause_before = Some(agents);
        self
    }

    /// Configure checkpoint storage for built workflows
    pub fn with_checkpointing(mut self, storage: Arc<dyn CheckpointStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Assemble the group-chat workflow
    ///
    /// Can be called repeatedly when participants (and the manager) are
    /// registered as factories; each call produces fresh instances.
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

        let mode = match (&self.selector, &self.manager, &self.manager_factory) {
            (Some(selector), None, None) => SelectionMode::Function(Arc::clone(selector)),
            (None, Some(manager), None) => SelectionMode::Manager(Arc::clone(manager)),
            (None, None, Some(factory)) => SelectionMode::Manager(factory()),
            (None, None, None) => {
                return Err(OrchestrationError::Builder(
                    "exactly one of select_speaker, manager, or manager_factory is required".into(),
                ))
            }
            _ => {
                return Err(OrchestrationError::Builder(
                    "only one of select_speaker, manager, or manager_factory may be configured"
                        .into(),
                ))
            }
        };

        let core = Arc::new(GroupChatCore {
            state: Mutex::new(GroupChatState {
                participants: infos,
                max_rounds: self.max_rounds,
                ..GroupChatState::default()
            }),
            mode,
            termination: self.termination.clone(),
            pause_before: self.pause_before.clone(),
        });
        let orchestrator = Arc::new(GroupChatOrchestrator::new(core));

        let executors: Vec<Arc<AgentExecutor>> = participants
            .iter()
            .map(|participant| Arc::new(AgentExecutor::new(Arc::clone(participant))))
            .collect();

        let mut builder = WorkflowBuilder::new(orchestrator.clone()).with_name("group_chat");
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

    fn orchestrator_configured(&self) -> bool {
        self.selector.is_some() || self.manager.is_some() || self.manager_factory.is_some()
    }

    fn record_error(&mut self, message: &str) {
        if self.error.is_none() {
            self.error = Some(message.to_string());
        }
    }
}
