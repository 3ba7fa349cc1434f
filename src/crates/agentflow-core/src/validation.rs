//! Static validation of the workflow graph
//!
//! Runs once during `build()` and again on resume after the graph is
//! rebuilt. Hard violations raise a typed
//! [`ValidationError`](crate::error::ValidationError); structural smells
//! that can be intentional (cycles, self-loops, dead ends) and missing type
//! annotations are logged instead of raised.
//!
//! Checks, in order:
//!
//! 1. the start executor is present (and referenced by an edge, when edges
//!    exist);
//! 2. executor IDs are unique;
//! 3. no duplicate edges by `source->target` pair;
//! 4. every edge connects type-compatible executors (fan-in targets must
//!    accept `list<source type>`); missing annotations downgrade to a
//!    warning;
//! 5. every executor is reachable from the start and none is isolated;
//! 6. self-loops and cycles are warnings, dead ends an info log;
//! 7. at most one executor intercepts a given request type from a given
//!    sub-workflow.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::edge::{Edge, EdgeGroup};
use crate::error::{Result, ValidationError, ValidationKind};
use crate::executor::Executor;
use crate::message::{list_type_key, ANY_TYPE};

/// Validate the entire workflow graph
pub fn validate_workflow_graph(
    edge_groups: &[EdgeGroup],
    executors: &HashMap<String, Arc<dyn Executor>>,
    start_executor_id: &str,
    duplicate_executor_ids: &[String],
) -> Result<()> {
    let edges: Vec<&Edge> = edge_groups.iter().flat_map(|group| group.edges()).collect();

    if !executors.contains_key(start_executor_id) {
        return Err(ValidationError::new(
            ValidationKind::GraphConnectivity,
            format!("Start executor '{start_executor_id}' is not present in the workflow graph"),
        )
        .into());
    }

    // A start executor that no edge references, while other executors are
    // wired up, is effectively disconnected from the defined topology.
    if !edges.is_empty() {
        let referenced: HashSet<&str> = edges
            .iter()
            .flat_map(|edge| [edge.source_id.as_str(), edge.target_id.as_str()])
            .collect();
        if !referenced.contains(start_executor_id) {
            return Err(ValidationError::new(
                ValidationKind::GraphConnectivity,
                format!("Start executor '{start_executor_id}' is not present in the workflow graph"),
            )
            .into());
        }
    }

    for edge in &edges {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !executors.contains_key(endpoint) {
                return Err(ValidationError::new(
                    ValidationKind::GraphConnectivity,
                    format!(
                        "Edge '{}' references executor '{endpoint}', which is not registered in \
                         the workflow",
                        edge.id()
                    ),
                )
                .into());
            }
        }
    }

    validate_executor_id_uniqueness(duplicate_executor_ids)?;
    validate_edge_duplication(&edges)?;
    validate_type_compatibility(edge_groups, executors)?;
    validate_graph_connectivity(&edges, executors, start_executor_id)?;
    validate_self_loops(&edges);
    validate_dead_ends(&edges, executors);
    validate_cycles(&edges, executors);
    validate_interceptor_uniqueness(&edges, executors)?;

    Ok(())
}

fn validate_executor_id_uniqueness(duplicate_executor_ids: &[String]) -> Result<()> {
    if let Some(first) = duplicate_executor_ids.iter().min() {
        return Err(ValidationError::new(
            ValidationKind::ExecutorDuplication,
            format!(
                "Duplicate executor id detected: '{first}'. Executor ids must be globally unique \
                 within a workflow."
            ),
        )
        .into());
    }
    Ok(())
}

fn validate_edge_duplication(edges: &[&Edge]) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();
    for edge in edges {
        let edge_id = edge.id();
        if !seen.insert(edge_id.clone()) {
            return Err(ValidationError::new(
                ValidationKind::EdgeDuplication,
                format!("Duplicate edge detected: {edge_id}. Each edge in the workflow must be unique."),
            )
            .into());
        }
    }
    Ok(())
}

fn validate_type_compatibility(
    edge_groups: &[EdgeGroup],
    executors: &HashMap<String, Arc<dyn Executor>>,
) -> Result<()> {
    for group in edge_groups {
        let is_fan_in = matches!(group, EdgeGroup::FanIn(_));
        for edge in group.edges() {
            validate_edge_type_compatibility(edge, is_fan_in, executors)?;
        }
    }
    Ok(())
}

fn validate_edge_type_compatibility(
    edge: &Edge,
    is_fan_in: bool,
    executors: &HashMap<String, Arc<dyn Executor>>,
) -> Result<()> {
    let (Some(source), Some(target)) = (executors.get(&edge.source_id), executors.get(&edge.target_id))
    else {
        // Endpoint presence was verified up front.
        return Ok(());
    };

    // Intercepted request types can be forwarded downstream, so they count
    // as potential source outputs.
    let mut source_outputs = source.output_types();
    source_outputs.extend(source.request_types());
    let target_inputs = target.input_types();

    // Dynamic-typing escape hatch: without annotations on either side we can
    // only warn about the reduced validation coverage.
    if source_outputs.is_empty() || target_inputs.is_empty() {
        if source_outputs.is_empty() {
            warn!(
                executor_id = %source.id(),
                "executor has no output type annotations; type compatibility validation will be \
                 skipped for edges from this executor"
            );
        }
        if target_inputs.is_empty() {
            warn!(
                executor_id = %target.id(),
                "executor has no input type annotations; type compatibility validation will be \
                 skipped for edges to this executor"
            );
        }
        return Ok(());
    }

    let compatible = source_outputs.iter().any(|source_type| {
        target_inputs.iter().any(|target_type| {
            if is_fan_in {
                // Fan-in targets receive one aggregated list per round.
                is_type_compatible(&list_type_key(source_type), target_type)
            } else {
                is_type_compatible(source_type, target_type)
            }
        })
    });

    if compatible {
        debug!(
            source = %edge.source_id,
            target = %edge.target_id,
            "type compatibility validated for edge"
        );
        Ok(())
    } else {
        Err(ValidationError::new(
            ValidationKind::TypeCompatibility,
            format!(
                "Type incompatibility between executors '{}' -> '{}'. Source executor outputs \
                 types {:?} but target executor can only handle types {:?}.",
                edge.source_id, edge.target_id, source_outputs, target_inputs
            ),
        )
        .into())
    }
}

fn is_type_compatible(source_type: &str, target_type: &str) -> bool {
    if source_type == ANY_TYPE || target_type == ANY_TYPE {
        return true;
    }
    if source_type == target_type {
        return true;
    }
    // A wildcard source inside a list key matches any list target.
    if source_type == list_type_key(ANY_TYPE) {
        return target_type.starts_with("list<");
    }
    false
}

fn validate_graph_connectivity(
    edges: &[&Edge],
    executors: &HashMap<String, Arc<dyn Executor>>,
    start_executor_id: &str,
) -> Result<()> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        graph
            .entry(edge.source_id.as_str())
            .or_default()
            .push(edge.target_id.as_str());
    }

    // DFS from the start.
    let mut reachable: HashSet<&str> = HashSet::new();
    let mut stack = vec![start_executor_id];
    while let Some(node) = stack.pop() {
        if reachable.insert(node) {
            if let Some(targets) = graph.get(node) {
                stack.extend(targets.iter().copied());
            }
        }
    }

    let mut unreachable: Vec<&str> = executors
        .keys()
        .map(String::as_str)
        .filter(|id| !reachable.contains(*id))
        .collect();
    if !unreachable.is_empty() {
        unreachable.sort_unstable();
        return Err(ValidationError::new(
            ValidationKind::GraphConnectivity,
            format!(
                "The following executors are unreachable from the start executor \
                 '{start_executor_id}': {unreachable:?}. This may indicate a disconnected \
                 workflow graph."
            ),
        )
        .into());
    }

    let mut isolated: Vec<&str> = executors
        .keys()
        .map(String::as_str)
        .filter(|id| {
            *id != start_executor_id
                && !edges
                    .iter()
                    .any(|edge| edge.source_id == *id || edge.target_id == *id)
        })
        .collect();
    if !isolated.is_empty() {
        isolated.sort_unstable();
        return Err(ValidationError::new(
            ValidationKind::GraphConnectivity,
            format!(
                "The following executors are isolated (no incoming or outgoing edges): \
                 {isolated:?}. Isolated executors will never be executed."
            ),
        )
        .into());
    }

    Ok(())
}

fn validate_self_loops(edges: &[&Edge]) {
    for edge in edges.iter().filter(|edge| edge.source_id == edge.target_id) {
        warn!(
            executor_id = %edge.source_id,
            "self-loop detected: executor connects to itself; this may cause infinite recursion \
             if not properly handled with conditions"
        );
    }
}

fn validate_dead_ends(edges: &[&Edge], executors: &HashMap<String, Arc<dyn Executor>>) {
    let with_outgoing: HashSet<&str> = edges.iter().map(|edge| edge.source_id.as_str()).collect();
    let mut dead_ends: Vec<&str> = executors
        .keys()
        .map(String::as_str)
        .filter(|id| !with_outgoing.contains(*id))
        .collect();
    if !dead_ends.is_empty() {
        dead_ends.sort_unstable();
        info!(
            executors = ?dead_ends,
            "dead-end executors detected (no outgoing edges); verify these are intended as final \
             nodes in the workflow"
        );
    }
}

fn validate_cycles(edges: &[&Edge], executors: &HashMap<String, Arc<dyn Executor>>) {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        graph
            .entry(edge.source_id.as_str())
            .or_default()
            .push(edge.target_id.as_str());
    }

    // Three-color DFS: a back edge into the in-progress set is a cycle.
    let mut unvisited: HashSet<&str> = executors.keys().map(String::as_str).collect();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut done: HashSet<&str> = HashSet::new();

    fn has_cycle<'a>(
        node: &'a str,
        graph: &HashMap<&'a str, Vec<&'a str>>,
        unvisited: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> bool {
        if in_progress.contains(node) {
            return true;
        }
        if done.contains(node) {
            return false;
        }
        unvisited.remove(node);
        in_progress.insert(node);
        if let Some(targets) = graph.get(node) {
            for target in targets.clone() {
                if has_cycle(target, graph, unvisited, in_progress, done) {
                    return true;
                }
            }
        }
        in_progress.remove(node);
        done.insert(node);
        false
    }

    while let Some(&start) = unvisited.iter().next() {
        if has_cycle(start, &graph, &mut unvisited, &mut in_progress, &mut done) {
            warn!(
                "cycle detected in the workflow graph; ensure proper termination conditions exist \
                 to prevent infinite loops"
            );
            return;
        }
    }
}

fn validate_interceptor_uniqueness(
    edges: &[&Edge],
    executors: &HashMap<String, Arc<dyn Executor>>,
) -> Result<()> {
    for (workflow_id, _executor) in executors
        .iter()
        .filter(|(_, executor)| executor.is_subworkflow())
    {
        // Executors with edges from this sub-workflow are the potential
        // interceptors of its requests.
        let mut interceptors_by_type: HashMap<String, Vec<String>> = HashMap::new();
        for edge in edges.iter().filter(|edge| &edge.source_id == workflow_id) {
            let Some(target) = executors.get(&edge.target_id) else {
                continue;
            };
            for spec in target.request_interceptors() {
                let in_scope = spec
                    .from_workflow
                    .as_ref()
                    .map(|scoped| scoped == workflow_id)
                    .unwrap_or(true);
                if in_scope {
                    interceptors_by_type
                        .entry(spec.request_type)
                        .or_default()
                        .push(edge.target_id.clone());
                }
            }
        }

        for (request_type, mut executor_ids) in interceptors_by_type {
            executor_ids.sort_unstable();
            executor_ids.dedup();
            if executor_ids.len() > 1 {
                return Err(ValidationError::new(
                    ValidationKind::InterceptorConflict,
                    format!(
                        "Multiple executors intercept the same request type '{request_type}' from \
                         sub-workflow '{workflow_id}': {}. Only one executor should intercept a \
                         given request type from a specific sub-workflow to ensure deterministic \
                         behavior.",
                        executor_ids.join(", ")
                    ),
                )
                .into());
            }
        }
    }
    Ok(())
}
