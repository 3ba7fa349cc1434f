//! # agentflow-checkpoint - Durable Superstep Snapshots
//!
//! Checkpoint model and storage backends for the agentflow workflow runtime.
//! The scheduler in `agentflow-core` writes a [`WorkflowCheckpoint`] at the
//! end of every superstep that made progress; this crate owns what a
//! checkpoint contains, how non-JSON values are encoded, and where
//! checkpoints live.
//!
//! ## Overview
//!
//! - **[`WorkflowCheckpoint`]** - Everything needed to resume a run at a
//!   superstep boundary: queued messages, shared state, executor-private
//!   state, pending request-info events, the graph signature hash, and the
//!   link to the previous checkpoint in the run's chain.
//! - **[`StateValue`]** - Opaque value encoding. JSON-native values are
//!   written as plain JSON; byte strings, timestamps, and binary-encoded
//!   user structs are wrapped in `{"$type": …, "$value": …}` envelopes that
//!   decode to equal values of the same declared type.
//! - **[`CheckpointStorage`]** - Async storage trait with
//!   [`InMemoryCheckpointStorage`] (tests, single process) and
//!   [`FileCheckpointStorage`] (one JSON document per checkpoint)
//!   implementations.
//!
//! ## Checkpoint chains
//!
//! ```text
//! ┌────────────────┐     ┌────────────────┐     ┌────────────────┐
//! │ checkpoint #0  │◀────│ checkpoint #1  │◀────│ checkpoint #2  │
//! │ previous: None │     │ previous: #0   │     │ previous: #1   │
//! │ iteration: 0   │     │ iteration: 1   │     │ iteration: 2   │
//! └────────────────┘     └────────────────┘     └────────────────┘
//! ```
//!
//! Within one run, checkpoints form a singly-linked chain through
//! `previous_checkpoint_id` and `iteration_count` increases monotonically.
//!
//! ## Graph-signature guard
//!
//! Each checkpoint records the hash of the workflow topology that produced
//! it. Resume recomputes the hash from the rebuilt workflow and refuses a
//! checkpoint whose hash differs, failing with
//! [`CheckpointError::GraphMismatch`] ("Workflow graph has changed").
//!
//! ## Quick Start
//!
//! ```rust
//! use agentflow_checkpoint::{
//!     CheckpointStorage, InMemoryCheckpointStorage, StateValue, WorkflowCheckpoint,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = InMemoryCheckpointStorage::new();
//!
//!     let mut checkpoint = WorkflowCheckpoint::new("pipeline", "graph-hash");
//!     checkpoint
//!         .shared_state
//!         .insert("attachment".into(), StateValue::Bytes(vec![0xde, 0xad]));
//!
//!     let id = storage.save(checkpoint).await?;
//!     let restored = storage.load(&id).await?;
//!     assert_eq!(
//!         restored.shared_state["attachment"].as_bytes().unwrap(),
//!         &[0xde, 0xad]
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## See Also
//!
//! - `agentflow-core` - the scheduler that produces and consumes checkpoints
//! - [`value`] - the envelope encoding rules in detail

pub mod checkpoint;
pub mod error;
pub mod file;
pub mod memory;
pub mod traits;
pub mod value;

// Re-export main types
pub use checkpoint::{CheckpointId, WorkflowCheckpoint};
pub use error::{CheckpointError, Result};
pub use file::FileCheckpointStorage;
pub use memory::InMemoryCheckpointStorage;
pub use traits::CheckpointStorage;
pub use value::StateValue;
