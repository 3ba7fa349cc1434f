//! Checkpoint data structure for durable superstep snapshots
//!
//! A [`WorkflowCheckpoint`] captures everything the scheduler needs to resume
//! a run at a superstep boundary:
//!
//! - the messages queued for delivery in the next superstep;
//! - the shared-state snapshot;
//! - per-executor private state (from the checkpoint hooks);
//! - pending request-info events awaiting responses;
//! - the graph signature hash used to refuse resuming into a changed graph.
//!
//! Checkpoints for one run form a singly-linked chain through
//! [`previous_checkpoint_id`](WorkflowCheckpoint::previous_checkpoint_id):
//! the first checkpoint has no predecessor, and `iteration_count` increases
//! monotonically along the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::value::StateValue;

/// Checkpoint ID type
pub type CheckpointId = String;

/// A complete snapshot of a workflow run at a superstep boundary
///
/// Message envelopes and request-info events are owned by the core crate;
/// they are stored here in their serialized JSON form so this crate stays a
/// pure persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    /// Unique identifier of this checkpoint
    pub checkpoint_id: CheckpointId,

    /// Name of the workflow that produced this checkpoint
    pub workflow_name: String,

    /// When the checkpoint was created
    pub timestamp: DateTime<Utc>,

    /// Stable hash of the workflow topology (executor IDs, edges, edge-group
    /// kinds, start node). Resume refuses checkpoints whose hash differs
    /// from the rebuilt workflow.
    pub graph_signature_hash: String,

    /// The checkpoint that preceded this one in the run, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_checkpoint_id: Option<CheckpointId>,

    /// Serialized message envelopes queued for the next superstep, grouped by
    /// delivery key (target executor ID, or source ID for broadcasts)
    #[serde(default)]
    pub messages: HashMap<String, Vec<Value>>,

    /// Snapshot of the run's shared state
    #[serde(default)]
    pub shared_state: HashMap<String, StateValue>,

    /// Executor-private state captured by `on_checkpoint_save` hooks,
    /// keyed by executor ID
    #[serde(default)]
    pub executor_states: HashMap<String, HashMap<String, StateValue>>,

    /// Serialized request-info events still awaiting responses, keyed by
    /// request ID
    #[serde(default)]
    pub pending_request_info: HashMap<String, Value>,

    /// Number of supersteps completed when this checkpoint was taken
    #[serde(default)]
    pub iteration_count: u64,

    /// Free-form metadata attached by the scheduler or the caller
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// Checkpoint format version
    pub version: u32,
}

impl WorkflowCheckpoint {
    /// Current checkpoint format version
    pub const CURRENT_VERSION: u32 = 1;

    /// Create an empty checkpoint for a workflow
    pub fn new(workflow_name: impl Into<String>, graph_signature_hash: impl Into<String>) -> Self {
        Self {
            checkpoint_id: Uuid::new_v4().to_string(),
            workflow_name: workflow_name.into(),
            timestamp: Utc::now(),
            graph_signature_hash: graph_signature_hash.into(),
            previous_checkpoint_id: None,
            messages: HashMap::new(),
            shared_state: HashMap::new(),
            executor_states: HashMap::new(),
            pending_request_info: HashMap::new(),
            iteration_count: 0,
            metadata: HashMap::new(),
            version: Self::CURRENT_VERSION,
        }
    }

    /// Set the predecessor checkpoint, chaining this one after it
    pub fn with_previous(mut self, previous_checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.previous_checkpoint_id = Some(previous_checkpoint_id.into());
        self
    }

    /// Set the superstep count
    pub fn with_iteration_count(mut self, iteration_count: u64) -> Self {
        self.iteration_count = iteration_count;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether the run has work left: queued messages or unanswered requests
    pub fn has_pending_work(&self) -> bool {
        self.messages.values().any(|msgs| !msgs.is_empty())
            || !self.pending_request_info.is_empty()
    }
}
