//! Execution order of plan steps.
//!
//! The default is the declared order: steps run exactly as listed, and a
//! dependency listed after its dependent fails at run time. The topological
//! order runs every step after its dependencies, keeping declared order among
//! steps that are ready at the same time.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::core::types::ExecutionPlan;
use crate::error::ExecutionError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    #[default]
    Declared,
    Topological,
}

/// Indices into `plan.steps` in the order they should run.
pub fn execution_order(
    plan: &ExecutionPlan,
    order: ExecutionOrder,
) -> Result<Vec<usize>, ExecutionError> {
    match order {
        ExecutionOrder::Declared => Ok((0..plan.steps.len()).collect()),
        ExecutionOrder::Topological => topological_order(plan),
    }
}

fn topological_order(plan: &ExecutionPlan) -> Result<Vec<usize>, ExecutionError> {
    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(plan.steps.len(), 0);
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();
    for (position, step) in plan.steps.iter().enumerate() {
        let node = graph.add_node(position);
        index_of.entry(step.id.as_str()).or_insert(node);
    }

    // Edges run from dependency to dependent. Unknown ids get no edge; the
    // executor reports them as unsatisfied when the step is reached.
    for (position, step) in plan.steps.iter().enumerate() {
        let dependent = NodeIndex::new(position);
        for dependency in &step.dependencies {
            if let Some(&from) = index_of.get(dependency.as_str()) {
                graph.add_edge(from, dependent, ());
            }
        }
    }

    toposort(&graph, None).map_err(|cycle| ExecutionError::DependencyCycle {
        step_id: plan.steps[graph[cycle.node_id()]].id.clone(),
    })?;

    let mut pending: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<usize>> = pending
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(position, _)| Reverse(position))
        .collect();

    let mut ordered = Vec::with_capacity(plan.steps.len());
    while let Some(Reverse(position)) = ready.pop() {
        ordered.push(position);
        for next in graph.neighbors_directed(NodeIndex::new(position), Direction::Outgoing) {
            let count = &mut pending[next.index()];
            *count -= 1;
            if *count == 0 {
                ready.push(Reverse(next.index()));
            }
        }
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{plan_of, step_after};

    fn ids(plan: &ExecutionPlan, order: &[usize]) -> Vec<String> {
        order.iter().map(|&idx| plan.steps[idx].id.clone()).collect()
    }

    #[test]
    fn declared_order_keeps_array_order() {
        let plan = plan_of(vec![step_after("b", &["a"]), step_after("a", &[])]);
        let order = execution_order(&plan, ExecutionOrder::Declared).expect("order");
        assert_eq!(ids(&plan, &order), vec!["b", "a"]);
    }

    #[test]
    fn topological_order_runs_dependencies_first() {
        let plan = plan_of(vec![
            step_after("c", &["b"]),
            step_after("b", &["a"]),
            step_after("a", &[]),
        ]);
        let order = execution_order(&plan, ExecutionOrder::Topological).expect("order");
        assert_eq!(ids(&plan, &order), vec!["a", "b", "c"]);
    }

    #[test]
    fn topological_order_is_stable_for_independent_steps() {
        let plan = plan_of(vec![
            step_after("x", &[]),
            step_after("join", &["y", "x"]),
            step_after("y", &[]),
            step_after("z", &[]),
        ]);
        let order = execution_order(&plan, ExecutionOrder::Topological).expect("order");
        assert_eq!(ids(&plan, &order), vec!["x", "y", "join", "z"]);
    }

    #[test]
    fn unknown_dependencies_do_not_affect_order() {
        let plan = plan_of(vec![step_after("a", &["ghost"]), step_after("b", &[])]);
        let order = execution_order(&plan, ExecutionOrder::Topological).expect("order");
        assert_eq!(ids(&plan, &order), vec!["a", "b"]);
    }

    #[test]
    fn cycles_are_rejected() {
        let plan = plan_of(vec![step_after("a", &["b"]), step_after("b", &["a"])]);
        let err = execution_order(&plan, ExecutionOrder::Topological).expect_err("cycle");
        assert!(matches!(err, ExecutionError::DependencyCycle { .. }));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let plan = plan_of(vec![step_after("a", &["a"])]);
        let err = execution_order(&plan, ExecutionOrder::Topological).expect_err("cycle");
        assert_eq!(err.step_id(), "a");
    }
}
