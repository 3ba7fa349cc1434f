//! In-memory checkpoint storage
//!
//! Reference implementation of [`CheckpointStorage`] backed by a
//! `HashMap` behind an async `RwLock`. Checkpoints are stored as live
//! [`WorkflowCheckpoint`] values, so round-trips preserve every
//! [`StateValue`](crate::StateValue) variant exactly; nothing passes through
//! the wire encoding.
//!
//! Intended for development and tests. All data is lost when the process
//! exits; use [`FileCheckpointStorage`](crate::file::FileCheckpointStorage)
//! or a custom backend for durability.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::checkpoint::{CheckpointId, WorkflowCheckpoint};
use crate::error::{CheckpointError, Result};
use crate::traits::CheckpointStorage;

/// In-memory checkpoint storage
///
/// Cloning is shallow; clones share the same underlying map.
///
/// # Example
///
/// ```rust
/// use agentflow_checkpoint::{CheckpointStorage, InMemoryCheckpointStorage, WorkflowCheckpoint};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let storage = InMemoryCheckpointStorage::new();
///     let checkpoint = WorkflowCheckpoint::new("pipeline", "hash");
///     let id = storage.save(checkpoint).await?;
///     let loaded = storage.load(&id).await?;
///     assert_eq!(loaded.checkpoint_id, id);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStorage {
    checkpoints: Arc<RwLock<HashMap<CheckpointId, WorkflowCheckpoint>>>,
}

impl InMemoryCheckpointStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored checkpoints
    pub async fn checkpoint_count(&self) -> usize {
        self.checkpoints.read().await.len()
    }

    /// Remove all checkpoints (useful between tests)
    pub async fn clear(&self) {
        self.checkpoints.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStorage for InMemoryCheckpointStorage {
    async fn save(&self, checkpoint: WorkflowCheckpoint) -> Result<CheckpointId> {
        let id = checkpoint.checkpoint_id.clone();
        self.checkpoints.write().await.insert(id.clone(), checkpoint);
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<WorkflowCheckpoint> {
        self.checkpoints
            .read()
            .await
            .get(checkpoint_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(checkpoint_id.to_string()))
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<bool> {
        Ok(self.checkpoints.write().await.remove(checkpoint_id).is_some())
    }

    async fn list_checkpoints(&self, workflow_name: Option<&str>) -> Result<Vec<WorkflowCheckpoint>> {
        let checkpoints = self.checkpoints.read().await;
        let mut matching: Vec<WorkflowCheckpoint> = checkpoints
            .values()
            .filter(|checkpoint| {
                workflow_name
                    .map(|name| checkpoint.workflow_name == name)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.iteration_count
                .cmp(&b.iteration_count)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StateValue;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = InMemoryCheckpointStorage::new();
        let checkpoint = WorkflowCheckpoint::new("pipeline", "hash");
        let expected_id = checkpoint.checkpoint_id.clone();

        let saved_id = storage.save(checkpoint).await.unwrap();
        assert_eq!(saved_id, expected_id);

        let loaded = storage.load(&saved_id).await.unwrap();
        assert_eq!(loaded.checkpoint_id, expected_id);
        assert_eq!(loaded.workflow_name, "pipeline");
    }

    #[tokio::test]
    async fn test_load_nonexistent_fails() {
        let storage = InMemoryCheckpointStorage::new();
        let err = storage.load("missing").await.unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_filters_by_workflow_name() {
        let storage = InMemoryCheckpointStorage::new();
        let a1 = WorkflowCheckpoint::new("alpha", "h1");
        let a2 = WorkflowCheckpoint::new("alpha", "h1").with_iteration_count(1);
        let b1 = WorkflowCheckpoint::new("beta", "h2");
        let a1_id = a1.checkpoint_id.clone();
        let a2_id = a2.checkpoint_id.clone();

        storage.save(a1).await.unwrap();
        storage.save(a2).await.unwrap();
        storage.save(b1).await.unwrap();

        let alpha_ids = storage.list_checkpoint_ids(Some("alpha")).await.unwrap();
        assert_eq!(alpha_ids, vec![a1_id, a2_id]);

        let beta = storage.list_checkpoints(Some("beta")).await.unwrap();
        assert_eq!(beta.len(), 1);

        let none = storage.list_checkpoints(Some("nonexistent")).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = InMemoryCheckpointStorage::new();
        let checkpoint = WorkflowCheckpoint::new("pipeline", "hash");
        let id = storage.save(checkpoint).await.unwrap();

        assert!(storage.delete(&id).await.unwrap());
        assert!(!storage.delete(&id).await.unwrap());
        assert!(storage.load(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_get_latest_prefers_highest_iteration() {
        let storage = InMemoryCheckpointStorage::new();
        let first = WorkflowCheckpoint::new("pipeline", "hash");
        let second = WorkflowCheckpoint::new("pipeline", "hash")
            .with_previous(first.checkpoint_id.clone())
            .with_iteration_count(1);
        let second_id = second.checkpoint_id.clone();

        storage.save(first).await.unwrap();
        storage.save(second).await.unwrap();

        let latest = storage.get_latest("pipeline").await.unwrap().unwrap();
        assert_eq!(latest.checkpoint_id, second_id);
        assert!(storage.get_latest("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_state_value_variants() {
        let storage = InMemoryCheckpointStorage::new();
        let mut checkpoint = WorkflowCheckpoint::new("pipeline", "hash");
        checkpoint
            .shared_state
            .insert("blob".into(), StateValue::Bytes(vec![1, 2, 3]));
        checkpoint
            .shared_state
            .insert("when".into(), StateValue::DateTime(Utc::now()));
        checkpoint
            .shared_state
            .insert("plain".into(), StateValue::Json(json!({"k": "v"})));
        let expected = checkpoint.shared_state.clone();

        let id = storage.save(checkpoint).await.unwrap();
        let loaded = storage.load(&id).await.unwrap();

        // No wire encoding is involved: variants come back exactly as stored.
        assert_eq!(loaded.shared_state, expected);
        assert!(matches!(
            loaded.shared_state.get("blob"),
            Some(StateValue::Bytes(_))
        ));
        assert!(matches!(
            loaded.shared_state.get("when"),
            Some(StateValue::DateTime(_))
        ));
    }

    #[tokio::test]
    async fn test_clear() {
        let storage = InMemoryCheckpointStorage::new();
        storage
            .save(WorkflowCheckpoint::new("pipeline", "hash"))
            .await
            .unwrap();
        assert_eq!(storage.checkpoint_count().await, 1);
        storage.clear().await;
        assert_eq!(storage.checkpoint_count().await, 0);
    }
}
