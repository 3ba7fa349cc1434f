//! Declarative graph topology: edges and edge groups
//!
//! An [`Edge`] is a directed connection between two executors with an
//! optional routing condition. Edges are always owned by an [`EdgeGroup`],
//! the topological unit with a shared delivery discipline:
//!
//! - [`EdgeGroup::Single`] - exactly one edge;
//! - [`EdgeGroup::FanOut`] - one source, two or more targets, optional
//!   selection function choosing a subset per message;
//! - [`EdgeGroup::FanIn`] - two or more sources aggregated into one target,
//!   which must accept a list of the per-source payload type;
//! - [`EdgeGroup::SwitchCase`] - ordered conditional routing: the first
//!   matching [`Case`] wins, the [`DefaultCase`] fires when none match.
//!   Implemented as a fan-out whose selection walks the cases.
//!
//! Groups are constructed through [`WorkflowBuilder`](crate::workflow::WorkflowBuilder)
//! methods; the runtime counterpart of each group kind lives in
//! [`edge_runner`](crate::edge_runner).

use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, WorkflowError};
use crate::message::TypedData;

/// Separator used in edge IDs (`"source->target"`)
pub const EDGE_ID_SEPARATOR: &str = "->";

/// A routing predicate over a message payload
pub type Condition = Arc<dyn Fn(&TypedData) -> bool + Send + Sync>;

/// A fan-out selection function: `(payload, targets) -> selected subset`
pub type SelectionFn = Arc<dyn Fn(&TypedData, &[String]) -> Vec<String> + Send + Sync>;

/// Build a condition over a decoded payload of type `T`
///
/// Payloads that fail to decode as `T` are logged and treated as
/// non-matching rather than failing delivery.
pub fn typed_condition<T, F>(condition: F) -> Condition
where
    T: DeserializeOwned + 'static,
    F: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(move |data: &TypedData| match data.decode::<T>() {
        Ok(value) => condition(&value),
        Err(err) => {
            warn!(message_type = %data.type_name, error = %err, "condition payload failed to decode; treating as no match");
            false
        }
    })
}

/// A directed edge in the workflow graph
#[derive(Clone)]
pub struct Edge {
    /// ID of the source executor
    pub source_id: String,
    /// ID of the target executor
    pub target_id: String,
    condition: Option<Condition>,
    /// Optional display name of the condition, kept for serialization and
    /// debugging
    pub condition_name: Option<String>,
}

impl Edge {
    /// Create an unconditional edge
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            condition: None,
            condition_name: None,
        }
    }

    /// Attach a routing condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Attach a named routing condition
    pub fn with_named_condition(mut self, condition: Condition, name: impl Into<String>) -> Self {
        self.condition = Some(condition);
        self.condition_name = Some(name.into());
        self
    }

    /// Unique edge ID: `"source->target"`
    pub fn id(&self) -> String {
        format!("{}{}{}", self.source_id, EDGE_ID_SEPARATOR, self.target_id)
    }

    /// Whether the message should be routed through this edge
    pub fn should_route(&self, data: &TypedData) -> bool {
        match &self.condition {
            Some(condition) => condition(data),
            None => true,
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("source_id", &self.source_id)
            .field("target_id", &self.target_id)
            .field("condition", &self.condition.as_ref().map(|_| "<condition>"))
            .field("condition_name", &self.condition_name)
            .finish()
    }
}

/// A single case in a switch-case group
pub struct Case {
    /// Target executor for this case
    pub target_id: String,
    condition: Condition,
    /// Optional display name of the condition
    pub condition_name: Option<String>,
}

impl Case {
    /// Create a case from a typed condition
    pub fn new<T, F>(condition: F, target_id: impl Into<String>) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            target_id: target_id.into(),
            condition: typed_condition(condition),
            condition_name: None,
        }
    }

    /// Create a case from a raw condition over [`TypedData`]
    pub fn from_condition(condition: Condition, target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            condition,
            condition_name: None,
        }
    }

    /// Whether the case's condition matches the payload
    pub fn matches(&self, data: &TypedData) -> bool {
        (self.condition)(data)
    }
}

impl std::fmt::Debug for Case {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Case")
            .field("target_id", &self.target_id)
            .field("condition_name", &self.condition_name)
            .finish()
    }
}

/// The default case of a switch-case group, fired when no case matches
#[derive(Debug, Clone)]
pub struct DefaultCase {
    /// Target executor for the default case
    pub target_id: String,
}

impl DefaultCase {
    /// Create a default case
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
        }
    }
}

/// A single-edge group
#[derive(Debug, Clone)]
pub struct SingleEdgeGroup {
    /// Unique group ID
    pub id: String,
    /// The group's only edge
    pub edge: Edge,
}

/// A fan-out group: one source, many targets, optional selection
#[derive(Clone)]
pub struct FanOutEdgeGroup {
    /// Unique group ID
    pub id: String,
    /// One edge per target, in declaration order
    pub edges: Vec<Edge>,
    /// Target executor IDs in declaration order
    pub target_ids: Vec<String>,
    /// Optional selection function; `None` selects all targets
    pub selection: Option<SelectionFn>,
    /// Optional display name of the selection function
    pub selection_name: Option<String>,
}

impl std::fmt::Debug for FanOutEdgeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutEdgeGroup")
            .field("id", &self.id)
            .field("edges", &self.edges)
            .field("selection", &self.selection.as_ref().map(|_| "<selection>"))
            .field("selection_name", &self.selection_name)
            .finish()
    }
}

/// A fan-in group: many sources aggregated into one target
#[derive(Debug, Clone)]
pub struct FanInEdgeGroup {
    /// Unique group ID
    pub id: String,
    /// One edge per source, in declaration order; aggregation preserves
    /// this order
    pub edges: Vec<Edge>,
}

/// A group of edges sharing a delivery discipline
#[derive(Debug, Clone)]
pub enum EdgeGroup {
    /// Exactly one edge
    Single(SingleEdgeGroup),
    /// One source, many targets
    FanOut(FanOutEdgeGroup),
    /// Many sources, one aggregating target
    FanIn(FanInEdgeGroup),
    /// Ordered conditional routing; shares the fan-out runtime shape
    SwitchCase(FanOutEdgeGroup),
}

fn group_id(kind: &str) -> String {
    format!("{kind}/{}", Uuid::new_v4())
}

impl EdgeGroup {
    /// Create a single-edge group
    pub fn single(edge: Edge) -> Self {
        Self::Single(SingleEdgeGroup {
            id: group_id("SingleEdgeGroup"),
            edge,
        })
    }

    /// Create a fan-out group over at least two targets
    pub fn fan_out(
        source_id: impl Into<String>,
        target_ids: Vec<String>,
        selection: Option<SelectionFn>,
    ) -> Result<Self> {
        if target_ids.len() <= 1 {
            return Err(WorkflowError::EdgeGroup(
                "fan-out group must contain at least two targets".into(),
            ));
        }
        let source_id = source_id.into();
        let edges = target_ids
            .iter()
            .map(|target_id| Edge::new(source_id.clone(), target_id.clone()))
            .collect();
        Ok(Self::FanOut(FanOutEdgeGroup {
            id: group_id("FanOutEdgeGroup"),
            edges,
            target_ids,
            selection,
            selection_name: None,
        }))
    }

    /// Create a fan-in group over at least two sources
    pub fn fan_in(source_ids: Vec<String>, target_id: impl Into<String>) -> Result<Self> {
        if source_ids.len() <= 1 {
            return Err(WorkflowError::EdgeGroup(
                "fan-in group must contain at least two sources".into(),
            ));
        }
        let target_id = target_id.into();
        let edges = source_ids
            .into_iter()
            .map(|source_id| Edge::new(source_id, target_id.clone()))
            .collect();
        Ok(Self::FanIn(FanInEdgeGroup {
            id: group_id("FanInEdgeGroup"),
            edges,
        }))
    }

    /// Create a switch-case group: ordered cases plus exactly one default
    ///
    /// The first case whose condition matches wins; the default fires when
    /// none match. A condition failure (e.g. a payload the condition cannot
    /// decode) is treated as a non-match, falling through to later cases.
    pub fn switch_case(
        source_id: impl Into<String>,
        cases: Vec<Case>,
        default: DefaultCase,
    ) -> Result<Self> {
        if cases.is_empty() {
            return Err(WorkflowError::EdgeGroup(
                "switch-case group must contain at least one case besides the default".into(),
            ));
        }

        let source_id = source_id.into();
        let mut target_ids: Vec<String> = cases.iter().map(|case| case.target_id.clone()).collect();
        target_ids.push(default.target_id.clone());

        let edges = target_ids
            .iter()
            .map(|target_id| Edge::new(source_id.clone(), target_id.clone()))
            .collect();

        let cases = Arc::new(cases);
        let default_target = default.target_id;
        let selection: SelectionFn = Arc::new(move |data, _targets| {
            for case in cases.iter() {
                if case.matches(data) {
                    return vec![case.target_id.clone()];
                }
            }
            vec![default_target.clone()]
        });

        Ok(Self::SwitchCase(FanOutEdgeGroup {
            id: group_id("SwitchCaseEdgeGroup"),
            edges,
            target_ids,
            selection: Some(selection),
            selection_name: Some("switch_case".into()),
        }))
    }

    /// The group's unique ID
    pub fn id(&self) -> &str {
        match self {
            Self::Single(group) => &group.id,
            Self::FanOut(group) | Self::SwitchCase(group) => &group.id,
            Self::FanIn(group) => &group.id,
        }
    }

    /// The group kind name, used in telemetry and the graph signature
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Single(_) => "SingleEdgeGroup",
            Self::FanOut(_) => "FanOutEdgeGroup",
            Self::FanIn(_) => "FanInEdgeGroup",
            Self::SwitchCase(_) => "SwitchCaseEdgeGroup",
        }
    }

    /// The edges owned by this group, in declaration order
    pub fn edges(&self) -> &[Edge] {
        match self {
            Self::Single(group) => std::slice::from_ref(&group.edge),
            Self::FanOut(group) | Self::SwitchCase(group) => &group.edges,
            Self::FanIn(group) => &group.edges,
        }
    }

    /// Distinct source executor IDs, in declaration order
    pub fn source_executor_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for edge in self.edges() {
            if !ids.contains(&edge.source_id) {
                ids.push(edge.source_id.clone());
            }
        }
        ids
    }

    /// Distinct target executor IDs, in declaration order
    pub fn target_executor_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for edge in self.edges() {
            if !ids.contains(&edge.target_id) {
                ids.push(edge.target_id.clone());
            }
        }
        ids
    }
}
