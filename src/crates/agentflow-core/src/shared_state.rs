//! Run-scoped shared key/value state
//!
//! [`SharedState`] is the one documented channel for cross-executor mutable
//! data. Writes within a superstep are visible to later supersteps and are
//! captured by checkpoints. Concurrent writes to the same key are
//! last-writer-wins within a superstep.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use agentflow_checkpoint::StateValue;

use crate::error::Result;

/// Shared key/value store scoped to a single workflow run
///
/// Cloning is shallow; clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    values: Arc<RwLock<HashMap<String, StateValue>>>,
}

impl SharedState {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under a key
    pub async fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let encoded = StateValue::from_serialize(value)?;
        self.values.write().await.insert(key.into(), encoded);
        Ok(())
    }

    /// Store a pre-encoded state value under a key
    pub async fn set_value(&self, key: impl Into<String>, value: StateValue) {
        self.values.write().await.insert(key.into(), value);
    }

    /// Load and decode the value under a key, if present
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.values.read().await.get(key) {
            Some(value) => Ok(Some(value.decode()?)),
            None => Ok(None),
        }
    }

    /// Load the raw state value under a key, if present
    pub async fn get_value(&self, key: &str) -> Option<StateValue> {
        self.values.read().await.get(key).cloned()
    }

    /// Remove the value under a key, returning it if present
    pub async fn remove(&self, key: &str) -> Option<StateValue> {
        self.values.write().await.remove(key)
    }

    /// Whether a key is present
    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    /// Snapshot the full map, for checkpointing
    pub async fn snapshot(&self) -> HashMap<String, StateValue> {
        self.values.read().await.clone()
    }

    /// Replace the full map, when restoring from a checkpoint
    pub async fn restore(&self, values: HashMap<String, StateValue>) {
        *self.values.write().await = values;
    }
}
