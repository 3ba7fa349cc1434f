//! # agentflow-core - Agent Workflows as Typed Message Graphs
//!
//! A runtime for composing and executing **agent workflows**: directed
//! graphs of stateful executors exchanging typed messages, with durable
//! checkpointing, streaming output, human-in-the-loop request/response
//! interrupts, and multi-participant orchestration layered on top (see the
//! `agentflow-prebuilt` crate).
//!
//! ## Overview
//!
//! - **Typed message graphs** - Executors declare handler input types and
//!   outbound types; edge delivery and graph validation share one key space
//! - **Superstep scheduler** - Pregel-style synchronous rounds: deliver,
//!   run ready executors in parallel, collect, checkpoint, repeat
//! - **Edge-group delivery** - Single, fan-out (with selection), fan-in
//!   (buffered aggregation), and switch-case routing disciplines
//! - **Checkpoint/resume** - Durable superstep snapshots chained per run,
//!   guarded by a graph-signature hash on resume
//! - **Request/response interrupts** - Handlers pause the run for external
//!   input; callers resume by supplying responses
//! - **Streaming execution** - Every event is yielded to the caller as it
//!   is produced
//!
//! ## Architecture
//!
//! ```text
//!                ┌──────────────────────────────────────┐
//!                │          WorkflowBuilder             │
//!                │  • add_edge / add_fan_out / add_…    │
//!                │  • with_checkpointing                │
//!                │  • build() → validate + freeze       │
//!                └────────────────┬─────────────────────┘
//!                                 │
//!                                 ▼
//!                ┌──────────────────────────────────────┐
//!                │            Workflow                  │
//!                │  • run_stream()                      │
//!                │  • run_stream_from_checkpoint()      │
//!                │  • send_responses_streaming()        │
//!                │  • as_agent()                        │
//!                └────────────────┬─────────────────────┘
//!                                 │
//!                ┌────────────────┴─────────────────┐
//!                ▼                                  ▼
//!     ┌──────────────────────┐         ┌──────────────────────┐
//!     │   Runner (scheduler) │         │  Checkpoint storage  │
//!     │  • superstep loop    │────────▶│  (agentflow-         │
//!     │  • dead-letter check │         │   checkpoint)        │
//!     │  • status events     │         └──────────────────────┘
//!     └──────────┬───────────┘
//!                │
//!     ┌──────────┴───────────┐
//!     ▼                      ▼
//! ┌─────────────┐    ┌────────────────┐
//! │ EdgeRunners │───▶│   Executors    │
//! │ single/fan- │    │  (handlers +   │
//! │ out/in/case │    │   WorkflowCtx) │
//! └─────────────┘    └────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use agentflow_core::executor::{handler, FnExecutor};
//! use agentflow_core::workflow::WorkflowBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let shout = FnExecutor::builder("shout")
//!         .with_handler(
//!             handler::<String, _, _>(|text, ctx| async move {
//!                 ctx.send_message(text.to_uppercase()).await
//!             })
//!             .with_output::<String>(),
//!         )
//!         .build();
//!
//!     let emit = FnExecutor::builder("emit")
//!         .with_handler(
//!             handler::<String, _, _>(|text, ctx| async move {
//!                 ctx.yield_output(text).await
//!             })
//!             .with_output::<String>(),
//!         )
//!         .build();
//!
//!     let workflow = WorkflowBuilder::new(shout.clone())
//!         .add_edge(shout, emit)
//!         .build()?;
//!
//!     let events = workflow.run("hello".to_string()).await?;
//!     let output: String = events
//!         .iter()
//!         .find_map(|event| event.as_output::<String>())
//!         .unwrap()?;
//!     assert_eq!(output, "HELLO");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! ### Graph model
//! - [`executor`] - [`Executor`] trait, handler registration, [`FnExecutor`]
//! - [`edge`] - [`Edge`], [`EdgeGroup`] kinds, switch-case [`Case`]s
//! - [`message`] - [`TypedData`] payloads and [`Message`] envelopes
//!
//! ### Execution
//! - [`runner`] - the superstep scheduler
//! - [`edge_runner`] - delivery semantics and [`DeliveryStatus`]
//! - [`runner_context`] - per-run message bus and event sink
//! - [`context`] - [`WorkflowContext`], the handler capability surface
//! - [`shared_state`] - run-scoped shared key/value state
//!
//! ### Assembly & control
//! - [`workflow`] - [`WorkflowBuilder`], [`Workflow`], run streams
//! - [`workflow_executor`] - embedding workflows as executors
//! - [`validation`] - static graph validation
//! - [`request_info`] - request/response interrupt types
//! - [`events`] - [`WorkflowEvent`] and [`RunState`]
//! - [`messages`] - chat messages and the [`Agent`] seam
//!
//! ## See Also
//!
//! - `agentflow-checkpoint` - checkpoint model and storage backends
//! - `agentflow-prebuilt` - group-chat and Magentic orchestrators

pub mod context;
pub mod edge;
pub mod edge_runner;
pub mod error;
pub mod events;
pub mod executor;
pub mod message;
pub mod messages;
pub mod request_info;
pub mod runner;
pub mod runner_context;
pub mod shared_state;
pub mod validation;
pub mod workflow;
pub mod workflow_executor;

// Re-export main types
pub use context::WorkflowContext;
pub use edge::{typed_condition, Case, Condition, DefaultCase, Edge, EdgeGroup, SelectionFn};
pub use edge_runner::DeliveryStatus;
pub use error::{Result, ValidationError, ValidationKind, WorkflowError};
pub use events::{RunState, WorkflowEvent};
pub use executor::{
    any_handler, handler, list_handler, Executor, FnExecutor, HandlerMap, HandlerRegistration,
    InterceptorSpec,
};
pub use message::{list_type_key, type_key, Message, TypedData, ANY_TYPE, REQUEST_INFO_SOURCE};
pub use messages::{Agent, AgentRunResponse, ChatMessage, Role};
pub use request_info::{RequestInfoEvent, RequestResponse};
pub use runner::Runner;
pub use runner_context::RunnerContext;
pub use shared_state::SharedState;
pub use workflow::{Workflow, WorkflowAgent, WorkflowBuilder, WorkflowEventStream};
pub use workflow_executor::{SubworkflowRequest, SubworkflowResponse, WorkflowExecutor};

// Re-export the checkpoint crate's surface for convenience
pub use agentflow_checkpoint::{
    CheckpointError, CheckpointStorage, FileCheckpointStorage, InMemoryCheckpointStorage,
    StateValue, WorkflowCheckpoint,
};
