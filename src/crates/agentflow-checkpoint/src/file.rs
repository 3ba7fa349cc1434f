//! File-based checkpoint storage
//!
//! Writes one JSON document per checkpoint under a base directory, named
//! `<checkpoint_id>.json`. Values that are not JSON-native travel through
//! the tagged envelopes described in [`crate::value`], so byte strings,
//! timestamps, and binary-encoded structs decode to equal values of the same
//! declared type.
//!
//! List operations skip files that fail to parse (logging a warning) rather
//! than failing the whole listing; a corrupted file only surfaces as an
//! error when it is loaded directly by ID.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::checkpoint::{CheckpointId, WorkflowCheckpoint};
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointStorage;

/// Checkpoint storage writing one JSON file per checkpoint
///
/// # Example
///
/// ```rust,no_run
/// use agentflow_checkpoint::{CheckpointStorage, FileCheckpointStorage, WorkflowCheckpoint};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storage = FileCheckpointStorage::new("/var/lib/agentflow/checkpoints");
///     let id = storage.save(WorkflowCheckpoint::new("pipeline", "hash")).await?;
///     let restored = storage.load(&id).await?;
///     assert_eq!(restored.workflow_name, "pipeline");
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FileCheckpointStorage {
    base_dir: PathBuf,
}

impl FileCheckpointStorage {
    /// Create a store rooted at `base_dir`
    ///
    /// The directory is created on first write, not here.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The directory checkpoints are written to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.base_dir.join(format!("{checkpoint_id}.json"))
    }
}

#[async_trait]
impl CheckpointStorage for FileCheckpointStorage {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<CheckpointId> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let id = checkpoint.checkpoint_id.clone();
        let encoded = serde_json::to_vec_pretty(&checkpoint)?;
        tokio::fs::write(self.path_for(&id), encoded).await?;
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<WorkflowCheckpoint> {
        let path = self.path_for(checkpoint_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(checkpoint_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            CheckpointError::Corrupted(format!("{}: {err}", path.display()))
        })
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path_for(checkpoint_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_checkpoints(&self, workflow_name: Option<&str>) -> Result<Vec<WorkflowCheckpoint>> {
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<WorkflowCheckpoint>(&bytes) {
                Ok(checkpoint) => {
                    if workflow_name
                        .map(|name| checkpoint.workflow_name == name)
                        .unwrap_or(true)
                    {
                        checkpoints.push(checkpoint);
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable checkpoint file");
                }
            }
        }

        checkpoints.sort_by(|a, b| {
            a.iteration_count
                .cmp(&b.iteration_count)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(checkpoints)
    }
}
