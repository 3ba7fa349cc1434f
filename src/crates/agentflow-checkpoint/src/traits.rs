//! Storage trait for checkpoint backends
//!
//! [`CheckpointStorage`] is the abstraction the scheduler writes through and
//! resume reads through. This crate ships two implementations:
//!
//! - [`InMemoryCheckpointStorage`](crate::memory::InMemoryCheckpointStorage)
//!   for tests and single-process runs;
//! - [`FileCheckpointStorage`](crate::file::FileCheckpointStorage) writing
//!   one JSON document per checkpoint.
//!
//! Downstream projects can back the trait with a database by implementing
//! the three required methods; `list_checkpoint_ids` and `get_latest` have
//! default implementations in terms of `list_checkpoints`.
//!
//! # Example: attaching storage to a workflow
//!
//! ```rust,ignore
//! use agentflow_checkpoint::InMemoryCheckpointStorage;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(InMemoryCheckpointStorage::new());
//! let workflow = WorkflowBuilder::new(start)
//!     .with_checkpointing(storage.clone())
//!     .build()?;
//! // A checkpoint is written after every superstep that made progress.
//! ```
//!
//! All implementations must be `Send + Sync`; the scheduler may write a
//! checkpoint while the caller is concurrently listing or loading.

use async_trait::async_trait;

use crate::checkpoint::{CheckpointId, WorkflowCheckpoint};
use crate::error::Result;

/// Durable storage backend for workflow checkpoints
#[async_trait]
pub trait CheckpointStorage: Send + Sync {
    /// Persist a checkpoint and return its ID
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<CheckpointId>;

    /// Load a checkpoint by ID
    ///
    /// Fails with [`CheckpointError::NotFound`](crate::CheckpointError::NotFound)
    /// when no checkpoint has that ID.
    async fn load(&self, checkpoint_id: &str) -> Result<WorkflowCheckpoint>;

    /// Delete a checkpoint by ID
    ///
    /// Returns `true` if a checkpoint was removed, `false` if none existed.
    async fn delete(&self, checkpoint_id: &str) -> Result<bool>;

    /// List stored checkpoints, optionally filtered by workflow name
    ///
    /// Results are ordered by `(iteration_count, timestamp)` ascending, so a
    /// run's chain reads front to back. Entries that cannot be decoded are
    /// skipped, not surfaced as errors.
    async fn list_checkpoints(&self, workflow_name: Option<&str>) -> Result<Vec<WorkflowCheckpoint>>;

    /// List stored checkpoint IDs, optionally filtered by workflow name
    async fn list_checkpoint_ids(&self, workflow_name: Option<&str>) -> Result<Vec<CheckpointId>> {
        Ok(self
            .list_checkpoints(workflow_name)
            .await?
            .into_iter()
            .map(|checkpoint| checkpoint.checkpoint_id)
            .collect())
    }

    /// Get the most recent checkpoint for a workflow, if any
    async fn get_latest(&self, workflow_name: &str) -> Result<Option<WorkflowCheckpoint>> {
        Ok(self
            .list_checkpoints(Some(workflow_name))
            .await?
            .into_iter()
            .max_by(|a, b| {
                a.iteration_count
                    .cmp(&b.iteration_count)
                    .then(a.timestamp.cmp(&b.timestamp))
            }))
    }
}
