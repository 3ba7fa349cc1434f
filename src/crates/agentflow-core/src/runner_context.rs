//! Per-run message bus and event sink
//!
//! [`RunnerContext`] is the mutable heart of a single workflow run. It owns:
//!
//! - the **outbox**: messages produced during the current superstep, drained
//!   by the scheduler to become the next superstep's inbound queue;
//! - the **event channel**: everything yielded to the caller's stream;
//! - the **pending request map**: request-info events awaiting responses;
//! - the configured **checkpoint storage** (possibly overridden per run);
//! - the run's **cancellation token** and the progress flag that decides
//!   whether a superstep earns a checkpoint.
//!
//! Cloning is shallow; executors, edge runners, and the scheduler all hold
//! clones of the same context. Every accessor is synchronous and holds its
//! lock only briefly, so the context is safe to use from any task without
//! holding locks across await points.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use agentflow_checkpoint::CheckpointStorage;

use crate::error::{Result, WorkflowError};
use crate::events::WorkflowEvent;
use crate::message::Message;
use crate::request_info::RequestInfoEvent;

#[derive(Default)]
struct RunnerContextInner {
    outbox: Mutex<Vec<Message>>,
    events: Mutex<Option<mpsc::UnboundedSender<WorkflowEvent>>>,
    pending_requests: Mutex<HashMap<String, RequestInfoEvent>>,
    storage: Mutex<Option<Arc<dyn CheckpointStorage>>>,
    progress: AtomicBool,
}

/// Shared per-run message bus
#[derive(Clone)]
pub struct RunnerContext {
    inner: Arc<RunnerContextInner>,
    cancellation: CancellationToken,
}

impl Default for RunnerContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerContext {
    /// Create a fresh context for a new run
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunnerContextInner::default()),
            cancellation: CancellationToken::new(),
        }
    }

    // --- event stream ---

    /// Attach the sender side of the caller's event stream
    pub fn attach_events(&self, sender: mpsc::UnboundedSender<WorkflowEvent>) {
        *self.inner.events.lock().expect("events lock") = Some(sender);
    }

    /// Detach the event sender, closing the caller's stream
    pub fn detach_events(&self) {
        self.inner.events.lock().expect("events lock").take();
    }

    /// Emit an event to the caller's stream
    ///
    /// Silently drops events when no stream is attached (e.g. work done by a
    /// sub-workflow whose parent consumes events differently).
    pub fn add_event(&self, event: WorkflowEvent) {
        if let Some(sender) = self.inner.events.lock().expect("events lock").as_ref() {
            let _ = sender.send(event);
        }
    }

    // --- message queue ---

    /// Enqueue a message for delivery in the next superstep
    pub fn send_message(&self, message: Message) {
        self.mark_progress();
        self.inner.outbox.lock().expect("outbox lock").push(message);
    }

    /// Drain all queued messages (the next superstep's inbound queue)
    pub fn drain_messages(&self) -> Vec<Message> {
        std::mem::take(&mut *self.inner.outbox.lock().expect("outbox lock"))
    }

    /// Whether any messages are queued
    pub fn has_pending_messages(&self) -> bool {
        !self.inner.outbox.lock().expect("outbox lock").is_empty()
    }

    // --- pending requests ---

    /// Record a request-info event as pending and surface it to the caller
    pub fn register_request(&self, event: RequestInfoEvent) {
        self.mark_progress();
        self.inner
            .pending_requests
            .lock()
            .expect("pending lock")
            .insert(event.request_id.clone(), event.clone());
        self.add_event(WorkflowEvent::RequestInfo(event));
    }

    /// Remove and return a pending request by ID
    pub fn take_request(&self, request_id: &str) -> Option<RequestInfoEvent> {
        let taken = self
            .inner
            .pending_requests
            .lock()
            .expect("pending lock")
            .remove(request_id);
        if taken.is_some() {
            self.mark_progress();
        }
        taken
    }

    /// Fail unless the request ID is pending
    pub fn ensure_request(&self, request_id: &str) -> Result<()> {
        if self
            .inner
            .pending_requests
            .lock()
            .expect("pending lock")
            .contains_key(request_id)
        {
            Ok(())
        } else {
            Err(WorkflowError::UnknownRequestId(request_id.to_string()))
        }
    }

    /// Whether any requests await responses
    pub fn has_pending_requests(&self) -> bool {
        !self
            .inner
            .pending_requests
            .lock()
            .expect("pending lock")
            .is_empty()
    }

    /// Snapshot the pending request map, for checkpointing
    pub fn pending_requests(&self) -> HashMap<String, RequestInfoEvent> {
        self.inner
            .pending_requests
            .lock()
            .expect("pending lock")
            .clone()
    }

    /// Replace the pending request map, when restoring from a checkpoint
    pub fn restore_pending(&self, pending: HashMap<String, RequestInfoEvent>) {
        *self.inner.pending_requests.lock().expect("pending lock") = pending;
    }

    // --- checkpoint storage ---

    /// Configure the checkpoint storage used by this run
    pub fn set_storage(&self, storage: Option<Arc<dyn CheckpointStorage>>) {
        *self.inner.storage.lock().expect("storage lock") = storage;
    }

    /// The checkpoint storage in effect for this run, if any
    pub fn storage(&self) -> Option<Arc<dyn CheckpointStorage>> {
        self.inner.storage.lock().expect("storage lock").clone()
    }

    // --- progress & cancellation ---

    /// Mark that this superstep produced messages, outputs, or request changes
    pub fn mark_progress(&self) {
        self.inner.progress.store(true, Ordering::SeqCst);
    }

    /// Consume the progress flag (true if the superstep earned a checkpoint)
    pub fn take_progress(&self) -> bool {
        self.inner.progress.swap(false, Ordering::SeqCst)
    }

    /// The run's cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Request cancellation of the run
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
