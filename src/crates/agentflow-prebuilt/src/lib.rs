//! # agentflow-prebuilt - Multi-Participant Orchestrators
//!
//! Ready-to-use orchestration patterns built on the `agentflow-core` graph
//! runtime. Each builder assembles a complete workflow: an orchestrator
//! executor fanned out to one executor per participant agent, with reply
//! edges feeding turns back into the loop.
//!
//! ## Orchestrators
//!
//! ### Group chat
//!
//! [`GroupChatBuilder`] drives a conversation over a shared message list:
//! pick the next speaker (a selection function, or a manager agent returning
//! structured decisions), dispatch, collect the reply, check termination
//! conditions and the round budget.
//!
//! ```rust,ignore
//! let workflow = GroupChatBuilder::new()
//!     .participants(vec![researcher, writer])
//!     .select_speaker(Arc::new(|state| next_name(state)))
//!     .max_rounds(6)
//!     .build()?;
//! ```
//!
//! ### Magentic
//!
//! [`MagenticBuilder`] runs a planner/worker loop: a [`MagenticManager`]
//! composes a task ledger (facts + plan), judges progress each iteration
//! with a [`ProgressLedger`], and dispatches ledger instructions to
//! participants. Stall/reset/round budgets bound the run; optional plan
//! review pauses for human approval before execution.
//!
//! ```rust,ignore
//! let workflow = MagenticBuilder::new()
//!     .participants(vec![coder, web_surfer])
//!     .manager(Arc::new(StandardMagenticManager::new(client)))
//!     .with_plan_review()
//!     .build()?;
//! ```
//!
//! Both builders support participant (and manager) **factories** so one
//! builder can produce many independent workflows, and both orchestrators
//! checkpoint their state through the executor checkpoint hooks, so resumed
//! runs continue mid-conversation. Renaming a participant changes the graph
//! signature and is rejected by the resume guard.

pub mod agent_executor;
pub mod chat_client;
pub mod error;
pub mod group_chat;
pub mod magentic;
mod parsing;
mod prompts;

// Re-export main types
pub use agent_executor::{AgentDispatch, AgentExecutor, AgentReply};
pub use chat_client::ChatClient;
pub use error::{OrchestrationError, Result};
pub use group_chat::{
    GroupChatApproval, GroupChatBuilder, GroupChatManagerDecision, GroupChatOrchestrator,
    GroupChatRequest, GroupChatState, ParticipantInfo, SelectorFn, TerminationFn,
    GROUP_CHAT_ORCHESTRATOR_ID, MAX_ROUNDS_MESSAGE, TERMINATION_CONDITION_MET_MESSAGE,
};
pub use magentic::{
    LedgerEntry, MagenticBuilder, MagenticContext, MagenticManager, MagenticOrchestrator,
    MagenticPlanReviewReply, MagenticPlanReviewRequest, PlanReviewDecision, ProgressLedger,
    StandardMagenticManager, MAGENTIC_ORCHESTRATOR_ID, MAX_RESET_MESSAGE,
};
