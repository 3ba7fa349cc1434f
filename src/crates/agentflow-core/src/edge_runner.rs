//! Runtime delivery for each edge-group kind
//!
//! Every [`EdgeGroup`] has a paired runner that applies its delivery
//! discipline at runtime: conditions, fan-out selection, fan-in buffering.
//! Each delivery attempt is wrapped in an `edge_group.process` span carrying
//! the group kind and ID, the message endpoints, and a
//! [`DeliveryStatus`] attribute recording the outcome.
//!
//! Return-value discipline (mirrored by the scheduler's dead-letter check):
//!
//! | Status | Runner returns |
//! |--------|----------------|
//! | `DELIVERED`, `BUFFERED`, `DROPPED_CONDITION_FALSE` | `Ok(true)` - the message was accepted or validly processed |
//! | `DROPPED_TYPE_MISMATCH`, `DROPPED_TARGET_MISMATCH` | `Ok(false)` - another group may claim the message |
//! | `EXCEPTION` | `Err(_)` - propagated, fatal for the run |
//!
//! Handler execution happens after the routing span closes; each executor
//! invocation opens its own `executor.process` span.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Span;

use crate::edge::{Edge, EdgeGroup, FanOutEdgeGroup, SelectionFn, SingleEdgeGroup};
use crate::error::{Result, WorkflowError};
use crate::executor::Executor;
use crate::message::{list_type_key, Message, TypedData};
use crate::runner_context::RunnerContext;
use crate::shared_state::SharedState;

/// The per-envelope outcome of an edge-runner delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The message reached at least one target handler
    Delivered,
    /// The message was buffered awaiting fan-in aggregation
    Buffered,
    /// An edge condition evaluated false; the message was validly processed
    DroppedConditionFalse,
    /// No target handler accepts the payload type
    DroppedTypeMismatch,
    /// The envelope's explicit target is not served by this group
    DroppedTargetMismatch,
    /// Routing raised an error
    Exception,
}

impl DeliveryStatus {
    /// Stable tag used for the span attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "DELIVERED",
            Self::Buffered => "BUFFERED",
            Self::DroppedConditionFalse => "DROPPED_CONDITION_FALSE",
            Self::DroppedTypeMismatch => "DROPPED_TYPE_MISMATCH",
            Self::DroppedTargetMismatch => "DROPPED_TARGET_MISMATCH",
            Self::Exception => "EXCEPTION",
        }
    }

    fn delivered(&self) -> bool {
        matches!(self, Self::Delivered | Self::Buffered)
    }
}

/// Executor lookup shared by all runners of a workflow
///
/// Also owns the per-executor invocation locks: handlers on one executor
/// never run concurrently, while different executors proceed in parallel.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: Arc<HashMap<String, Arc<dyn Executor>>>,
    locks: Arc<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExecutorRegistry {
    /// Build a registry over the workflow's executors
    pub fn new(executors: Arc<HashMap<String, Arc<dyn Executor>>>) -> Self {
        let locks = executors
            .keys()
            .map(|id| (id.clone(), Arc::new(tokio::sync::Mutex::new(()))))
            .collect();
        Self {
            executors,
            locks: Arc::new(locks),
        }
    }

    /// Whether the executor exists and accepts the payload type
    pub fn can_handle(&self, executor_id: &str, data: &TypedData) -> bool {
        self.executors
            .get(executor_id)
            .map(|executor| executor.can_handle(data))
            .unwrap_or(false)
    }

    /// Invoke the target executor under its invocation lock
    pub async fn execute_on_target(
        &self,
        target_id: &str,
        source_ids: Vec<String>,
        message: Message,
        shared_state: &SharedState,
        ctx: &RunnerContext,
    ) -> Result<()> {
        let executor = self
            .executors
            .get(target_id)
            .ok_or_else(|| WorkflowError::Execution(format!("Target executor '{target_id}' not found")))?;
        let lock = self
            .locks
            .get(target_id)
            .cloned()
            .expect("lock exists for every registered executor");
        let _guard = lock.lock().await;
        executor
            .execute(message, source_ids, shared_state.clone(), ctx.clone())
            .await
    }
}

fn processing_span(kind: &'static str, group_id: &str, message: &Message) -> Span {
    tracing::info_span!(
        "edge_group.process",
        "edge_group.type" = kind,
        "edge_group.id" = %group_id,
        "edge_group.delivered" = tracing::field::Empty,
        "edge_group.delivery_status" = tracing::field::Empty,
        "message.source_id" = %message.source_id,
        "message.target_id" = message.target_id.as_deref().unwrap_or(""),
        "message.source_span_ids" = ?message.source_span_ids,
    )
}

fn record_status(span: &Span, status: DeliveryStatus) {
    span.record("edge_group.delivered", status.delivered());
    span.record("edge_group.delivery_status", status.as_str());
}

/// Runner for single-edge groups
pub struct SingleEdgeRunner {
    group_id: String,
    edge: Edge,
    registry: ExecutorRegistry,
}

impl SingleEdgeRunner {
    fn new(group: &SingleEdgeGroup, registry: ExecutorRegistry) -> Self {
        Self {
            group_id: group.id.clone(),
            edge: group.edge.clone(),
            registry,
        }
    }

    async fn send_message(
        &self,
        message: Message,
        shared_state: &SharedState,
        ctx: &RunnerContext,
    ) -> Result<bool> {
        let span = processing_span("SingleEdgeGroup", &self.group_id, &message);

        let status = span.in_scope(|| {
            if message
                .target_id
                .as_ref()
                .map(|target| target != &self.edge.target_id)
                .unwrap_or(false)
            {
                DeliveryStatus::DroppedTargetMismatch
            } else if !self.registry.can_handle(&self.edge.target_id, &message.data) {
                DeliveryStatus::DroppedTypeMismatch
            } else if !self.edge.should_route(&message.data) {
                DeliveryStatus::DroppedConditionFalse
            } else {
                DeliveryStatus::Delivered
            }
        });
        record_status(&span, status);
        drop(span);

        match status {
            DeliveryStatus::Delivered => {
                self.registry
                    .execute_on_target(
                        &self.edge.target_id,
                        vec![self.edge.source_id.clone()],
                        message,
                        shared_state,
                        ctx,
                    )
                    .await?;
                Ok(true)
            }
            // Condition failure means the message was processed, just not routed.
            DeliveryStatus::DroppedConditionFalse => Ok(true),
            _ => Ok(false),
        }
    }
}

/// Runner for fan-out and switch-case groups
pub struct FanOutEdgeRunner {
    group_id: String,
    kind: &'static str,
    target_ids: Vec<String>,
    target_map: HashMap<String, Edge>,
    selection: Option<SelectionFn>,
    registry: ExecutorRegistry,
}

impl FanOutEdgeRunner {
    fn new(group: &FanOutEdgeGroup, kind: &'static str, registry: ExecutorRegistry) -> Self {
        let target_map = group
            .edges
            .iter()
            .map(|edge| (edge.target_id.clone(), edge.clone()))
            .collect();
        Self {
            group_id: group.id.clone(),
            kind,
            target_ids: group.target_ids.clone(),
            target_map,
            selection: group.selection.clone(),
            registry,
        }
    }

    async fn send_message(
        &self,
        message: Message,
        shared_state: &SharedState,
        ctx: &RunnerContext,
    ) -> Result<bool> {
        let span = processing_span(self.kind, &self.group_id, &message);

        enum Routed {
            Status(DeliveryStatus),
            Invalid(Vec<String>),
            Targets(Vec<Edge>),
        }

        let routed = span.in_scope(|| {
            let selected = match &self.selection {
                Some(selection) => selection(&message.data, &self.target_ids),
                None => self.target_ids.clone(),
            };
            if !selected.iter().all(|id| self.target_ids.contains(id)) {
                return Routed::Invalid(selected);
            }

            if let Some(target) = &message.target_id {
                if !selected.contains(target) {
                    return Routed::Status(DeliveryStatus::DroppedTargetMismatch);
                }
                let edge = &self.target_map[target];
                if !self.registry.can_handle(&edge.target_id, &message.data) {
                    return Routed::Status(DeliveryStatus::DroppedTypeMismatch);
                }
                if !edge.should_route(&message.data) {
                    return Routed::Status(DeliveryStatus::DroppedConditionFalse);
                }
                return Routed::Targets(vec![edge.clone()]);
            }

            let deliverable: Vec<Edge> = selected
                .iter()
                .map(|id| self.target_map[id].clone())
                .filter(|edge| {
                    self.registry.can_handle(&edge.target_id, &message.data)
                        && edge.should_route(&message.data)
                })
                .collect();
            if deliverable.is_empty() {
                Routed::Status(DeliveryStatus::DroppedTypeMismatch)
            } else {
                Routed::Targets(deliverable)
            }
        });

        let edges = match routed {
            Routed::Invalid(selected) => {
                record_status(&span, DeliveryStatus::Exception);
                return Err(WorkflowError::Execution(format!(
                    "Invalid selection result: {selected:?}. Expected selections to be a subset of \
                     valid target executor IDs: {:?}.",
                    self.target_ids
                )));
            }
            Routed::Status(status) => {
                record_status(&span, status);
                return Ok(matches!(status, DeliveryStatus::DroppedConditionFalse));
            }
            Routed::Targets(edges) => {
                record_status(&span, DeliveryStatus::Delivered);
                edges
            }
        };
        drop(span);

        // Deliver to every selected target in parallel.
        let deliveries = edges.iter().map(|edge| {
            self.registry.execute_on_target(
                &edge.target_id,
                vec![edge.source_id.clone()],
                message.clone(),
                shared_state,
                ctx,
            )
        });
        for result in futures::future::join_all(deliveries).await {
            result?;
        }
        Ok(true)
    }
}

/// Runner for fan-in groups, buffering per source until all sources have data
pub struct FanInEdgeRunner {
    group_id: String,
    edges: Vec<Edge>,
    target_id: String,
    buffer: Mutex<HashMap<String, Vec<Message>>>,
    registry: ExecutorRegistry,
}

impl FanInEdgeRunner {
    fn new(group_id: String, edges: Vec<Edge>, registry: ExecutorRegistry) -> Self {
        let target_id = edges[0].target_id.clone();
        Self {
            group_id,
            edges,
            target_id,
            buffer: Mutex::new(HashMap::new()),
            registry,
        }
    }

    async fn send_message(
        &self,
        message: Message,
        shared_state: &SharedState,
        ctx: &RunnerContext,
    ) -> Result<bool> {
        let span = processing_span("FanInEdgeGroup", &self.group_id, &message);

        let aggregate = span.in_scope(|| {
            if message
                .target_id
                .as_ref()
                .map(|target| target != &self.target_id)
                .unwrap_or(false)
            {
                record_status(&span, DeliveryStatus::DroppedTargetMismatch);
                return Err(());
            }

            // The target receives one aggregated list, so it must accept
            // `list<payload>` rather than the bare payload type.
            let list_probe = TypedData::from_parts(
                list_type_key(&message.data.type_name),
                serde_json::Value::Null,
            );
            if !self.registry.can_handle(&self.target_id, &list_probe) {
                record_status(&span, DeliveryStatus::DroppedTypeMismatch);
                return Err(());
            }

            let mut buffer = self.buffer.lock().expect("fan-in buffer lock");
            buffer
                .entry(message.source_id.clone())
                .or_default()
                .push(message.clone());

            let ready = self
                .edges
                .iter()
                .all(|edge| buffer.get(&edge.source_id).map(|b| !b.is_empty()).unwrap_or(false));
            if !ready {
                record_status(&span, DeliveryStatus::Buffered);
                return Ok(None);
            }

            // Drain every source's buffered envelopes in source-declaration
            // order into one aggregate message.
            let mut consumed: Vec<Message> = Vec::new();
            for edge in &self.edges {
                if let Some(messages) = buffer.remove(&edge.source_id) {
                    consumed.extend(messages);
                }
            }
            buffer.clear();

            let element_type = consumed[0].data.type_name.clone();
            let values: Vec<serde_json::Value> =
                consumed.iter().map(|m| m.data.value.clone()).collect();
            let trace_contexts = consumed
                .iter()
                .flat_map(|m| m.trace_contexts.clone())
                .collect();
            let source_span_ids = consumed
                .iter()
                .flat_map(|m| m.source_span_ids.clone())
                .collect();

            let aggregated = Message::new(
                TypedData::from_parts(
                    list_type_key(&element_type),
                    serde_json::Value::Array(values),
                ),
                "FanInEdgeGroup",
            )
            .with_trace(trace_contexts, source_span_ids);

            record_status(&span, DeliveryStatus::Delivered);
            Ok(Some(aggregated))
        });
        drop(span);

        match aggregate {
            Err(()) => Ok(false),
            Ok(None) => Ok(true),
            Ok(Some(aggregated)) => {
                let source_ids = self.edges.iter().map(|e| e.source_id.clone()).collect();
                self.registry
                    .execute_on_target(&self.target_id, source_ids, aggregated, shared_state, ctx)
                    .await?;
                Ok(true)
            }
        }
    }
}

/// The runtime counterpart of an [`EdgeGroup`]
pub enum EdgeRunner {
    /// Runner for [`EdgeGroup::Single`]
    Single(SingleEdgeRunner),
    /// Runner for [`EdgeGroup::FanOut`] and [`EdgeGroup::SwitchCase`]
    FanOut(FanOutEdgeRunner),
    /// Runner for [`EdgeGroup::FanIn`]
    FanIn(FanInEdgeRunner),
}

impl EdgeRunner {
    /// Attempt to deliver a message through this group
    pub async fn send_message(
        &self,
        message: Message,
        shared_state: &SharedState,
        ctx: &RunnerContext,
    ) -> Result<bool> {
        match self {
            Self::Single(runner) => runner.send_message(message, shared_state, ctx).await,
            Self::FanOut(runner) => runner.send_message(message, shared_state, ctx).await,
            Self::FanIn(runner) => runner.send_message(message, shared_state, ctx).await,
        }
    }
}

/// Create the appropriate runner for an edge group
pub fn create_edge_runner(group: &EdgeGroup, registry: ExecutorRegistry) -> EdgeRunner {
    match group {
        EdgeGroup::Single(single) => EdgeRunner::Single(SingleEdgeRunner::new(single, registry)),
        EdgeGroup::FanOut(fan_out) => {
            EdgeRunner::FanOut(FanOutEdgeRunner::new(fan_out, "FanOutEdgeGroup", registry))
        }
        EdgeGroup::SwitchCase(fan_out) => {
            EdgeRunner::FanOut(FanOutEdgeRunner::new(fan_out, "SwitchCaseEdgeGroup", registry))
        }
        EdgeGroup::FanIn(fan_in) => EdgeRunner::FanIn(FanInEdgeRunner::new(
            fan_in.id.clone(),
            fan_in.edges.clone(),
            registry,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::{typed_condition, Case, DefaultCase};
    use crate::executor::{handler, list_handler, FnExecutor};

    fn recorder(id: &str) -> Arc<FnExecutor> {
        let id_owned = id.to_string();
        FnExecutor::builder(id)
            .with_handler(
                handler::<String, _, _>(move |text, ctx| {
                    let id = id_owned.clone();
                    async move {
                        ctx.shared_state().set(&id, &text).await?;
                        Ok(())
                    }
                })
                .with_output::<String>(),
            )
            .build()
    }

    fn registry(executors: Vec<Arc<FnExecutor>>) -> ExecutorRegistry {
        let map: HashMap<String, Arc<dyn Executor>> = executors
            .into_iter()
            .map(|e| (e.id().to_string(), e as Arc<dyn Executor>))
            .collect();
        ExecutorRegistry::new(Arc::new(map))
    }

    fn text_message(text: &str, source: &str) -> Message {
        Message::new(TypedData::new(&text.to_string()).unwrap(), source)
    }

    #[tokio::test]
    async fn test_single_runner_delivers() {
        let registry = registry(vec![recorder("sink")]);
        let group = EdgeGroup::single(Edge::new("src", "sink"));
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();
        let ctx = RunnerContext::new();

        let accepted = runner
            .send_message(text_message("hello", "src"), &shared, &ctx)
            .await
            .unwrap();
        assert!(accepted);
        assert_eq!(
            shared.get::<String>("sink").await.unwrap().as_deref(),
            Some("hello")
        );
    }

    #[tokio::test]
    async fn test_single_runner_target_mismatch_rejects() {
        let registry = registry(vec![recorder("sink")]);
        let group = EdgeGroup::single(Edge::new("src", "sink"));
        let runner = create_edge_runner(&group, registry);

        let message = text_message("hello", "src").with_target("other");
        let accepted = runner
            .send_message(message, &SharedState::new(), &RunnerContext::new())
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_single_runner_type_mismatch_rejects() {
        let registry = registry(vec![recorder("sink")]);
        let group = EdgeGroup::single(Edge::new("src", "sink"));
        let runner = create_edge_runner(&group, registry);

        let message = Message::new(TypedData::new(&42u32).unwrap(), "src");
        let accepted = runner
            .send_message(message, &SharedState::new(), &RunnerContext::new())
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_single_runner_condition_false_is_processed() {
        let registry = registry(vec![recorder("sink")]);
        let edge = Edge::new("src", "sink")
            .with_condition(typed_condition::<String, _>(|text| text.starts_with('x')));
        let group = EdgeGroup::single(edge);
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();

        let accepted = runner
            .send_message(text_message("hello", "src"), &shared, &RunnerContext::new())
            .await
            .unwrap();
        // Processed (true) but not delivered.
        assert!(accepted);
        assert!(!shared.contains("sink").await);
    }

    #[tokio::test]
    async fn test_fan_out_broadcasts_to_all_targets() {
        let registry = registry(vec![recorder("a"), recorder("b")]);
        let group = EdgeGroup::fan_out("src", vec!["a".into(), "b".into()], None).unwrap();
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();

        runner
            .send_message(text_message("fan", "src"), &shared, &RunnerContext::new())
            .await
            .unwrap();
        assert_eq!(shared.get::<String>("a").await.unwrap().as_deref(), Some("fan"));
        assert_eq!(shared.get::<String>("b").await.unwrap().as_deref(), Some("fan"));
    }

    #[tokio::test]
    async fn test_fan_out_selection_narrows_targets() {
        let registry = registry(vec![recorder("a"), recorder("b")]);
        let selection: SelectionFn = Arc::new(|_, _| vec!["b".to_string()]);
        let group =
            EdgeGroup::fan_out("src", vec!["a".into(), "b".into()], Some(selection)).unwrap();
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();

        runner
            .send_message(text_message("fan", "src"), &shared, &RunnerContext::new())
            .await
            .unwrap();
        assert!(!shared.contains("a").await);
        assert!(shared.contains("b").await);
    }

    #[tokio::test]
    async fn test_fan_out_invalid_selection_is_an_error() {
        let registry = registry(vec![recorder("a"), recorder("b")]);
        let selection: SelectionFn = Arc::new(|_, _| vec!["nowhere".to_string()]);
        let group =
            EdgeGroup::fan_out("src", vec!["a".into(), "b".into()], Some(selection)).unwrap();
        let runner = create_edge_runner(&group, registry);

        let err = runner
            .send_message(
                text_message("fan", "src"),
                &SharedState::new(),
                &RunnerContext::new(),
            )
            .await
            .unwrap_err();
        assert!(format!("{err}").contains("Invalid selection result"));
    }

    #[tokio::test]
    async fn test_fan_out_targeted_message_not_in_selection_rejects() {
        let registry = registry(vec![recorder("a"), recorder("b")]);
        let selection: SelectionFn = Arc::new(|_, _| vec!["b".to_string()]);
        let group =
            EdgeGroup::fan_out("src", vec!["a".into(), "b".into()], Some(selection)).unwrap();
        let runner = create_edge_runner(&group, registry);

        let message = text_message("fan", "src").with_target("a");
        let accepted = runner
            .send_message(message, &SharedState::new(), &RunnerContext::new())
            .await
            .unwrap();
        assert!(!accepted);
    }

    fn sum_sink(id: &str) -> Arc<FnExecutor> {
        let key = id.to_string();
        FnExecutor::builder(id)
            .with_handler(
                list_handler::<i64, _, _>(move |values, ctx| {
                    let key = key.clone();
                    async move {
                        ctx.shared_state()
                            .set(&key, &values.iter().sum::<i64>())
                            .await
                    }
                })
                .with_output::<i64>(),
            )
            .build()
    }

    #[tokio::test]
    async fn test_fan_in_buffers_until_all_sources_ready() {
        let registry = registry(vec![sum_sink("sum")]);
        let group = EdgeGroup::fan_in(vec!["dbl".into(), "sqr".into()], "sum").unwrap();
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();
        let ctx = RunnerContext::new();

        let first = Message::new(TypedData::new(&10i64).unwrap(), "dbl");
        assert!(runner.send_message(first, &shared, &ctx).await.unwrap());
        // Only one source buffered: nothing delivered yet.
        assert!(!shared.contains("sum").await);

        let second = Message::new(TypedData::new(&25i64).unwrap(), "sqr");
        assert!(runner.send_message(second, &shared, &ctx).await.unwrap());
        assert_eq!(shared.get::<i64>("sum").await.unwrap(), Some(35));

        // Buffers are empty after aggregation: a lone follow-up buffers again.
        let third = Message::new(TypedData::new(&1i64).unwrap(), "dbl");
        assert!(runner.send_message(third, &shared, &ctx).await.unwrap());
        assert_eq!(shared.get::<i64>("sum").await.unwrap(), Some(35));
    }

    #[tokio::test]
    async fn test_fan_in_type_mismatch_rejects() {
        // The sink accepts list<i64>, not list<String>.
        let registry = registry(vec![sum_sink("sum")]);
        let group = EdgeGroup::fan_in(vec!["a".into(), "b".into()], "sum").unwrap();
        let runner = create_edge_runner(&group, registry);

        let accepted = runner
            .send_message(
                text_message("nope", "a"),
                &SharedState::new(),
                &RunnerContext::new(),
            )
            .await
            .unwrap();
        assert!(!accepted);
    }

    #[tokio::test]
    async fn test_fan_in_aggregates_in_source_declaration_order() {
        let collector = FnExecutor::builder("collect")
            .with_handler(
                list_handler::<String, _, _>(|values, ctx| async move {
                    ctx.shared_state().set("order", &values.join(",")).await
                })
                .with_output::<String>(),
            )
            .build();
        let registry = registry(vec![collector]);
        let group = EdgeGroup::fan_in(vec!["first".into(), "second".into()], "collect").unwrap();
        let runner = create_edge_runner(&group, registry);
        let shared = SharedState::new();
        let ctx = RunnerContext::new();

        // Arrive out of declaration order.
        runner
            .send_message(text_message("s", "second"), &shared, &ctx)
            .await
            .unwrap();
        runner
            .send_message(text_message("f", "first"), &shared, &ctx)
            .await
            .unwrap();

        assert_eq!(
            shared.get::<String>("order").await.unwrap().as_deref(),
            Some("f,s")
        );
    }

    fn int_recorder(id: &str) -> Arc<FnExecutor> {
        let key = id.to_string();
        FnExecutor::builder(id)
            .with_handler(
                handler::<i64, _, _>(move |n, ctx| {
                    let key = key.clone();
                    async move { ctx.shared_state().set(&key, &n).await }
                })
                .with_output::<i64>(),
            )
            .build()
    }

    #[tokio::test]
    async fn test_switch_case_routes_first_match_then_default() {
        let group = EdgeGroup::switch_case(
            "router",
            vec![
                Case::new::<i64, _>(|n| *n < 0, "neg"),
                Case::new::<i64, _>(|n| *n == 0, "zero"),
            ],
            DefaultCase::new("pos"),
        )
        .unwrap();
        let registry = registry(vec![
            int_recorder("neg"),
            int_recorder("zero"),
            int_recorder("pos"),
        ]);
        let runner = create_edge_runner(&group, registry);

        let shared = SharedState::new();
        let ctx = RunnerContext::new();
        for (value, expected) in [(-3i64, "neg"), (0, "zero"), (7, "pos")] {
            runner
                .send_message(
                    Message::new(TypedData::new(&value).unwrap(), "router"),
                    &shared,
                    &ctx,
                )
                .await
                .unwrap();
            assert_eq!(shared.get::<i64>(expected).await.unwrap(), Some(value));
        }
    }
}
