//! Topological analysis of workflow graphs: execution order derivation
//! and the level partition used by parallel runs.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use wirecore::{GraphError, Workflow};

/// Derive the order nodes execute in.
///
/// Every node appears exactly once, consistent with dependency edges;
/// a cycle fails with an error naming a node on it. Dependencies are
/// visited depth-first seeded from the entry points, so nodes reachable
/// from an entry tend to run ahead of disconnected ones.
pub fn execution_order(workflow: &Workflow) -> Result<Vec<String>, GraphError> {
    let (graph, index_of) = build_graph(workflow)?;

    // Cycle detection up front; the back-edge names the offending node
    toposort(&graph, None).map_err(|cycle| GraphError::CycleDetected {
        node_id: graph[cycle.node_id()].clone(),
    })?;

    let mut order = Vec::with_capacity(workflow.nodes.len());
    let mut done: HashSet<NodeIndex> = HashSet::new();

    let seeds = workflow
        .entry_points
        .iter()
        .filter_map(|id| index_of.get(id.as_str()).copied())
        .chain(workflow.nodes.iter().filter_map(|n| index_of.get(n.id.as_str()).copied()));

    for seed in seeds {
        // Emit each node after its dependencies, iteratively
        let mut stack = vec![(seed, false)];
        while let Some((index, expanded)) = stack.pop() {
            if done.contains(&index) {
                continue;
            }
            if expanded {
                done.insert(index);
                order.push(graph[index].clone());
            } else {
                stack.push((index, true));
                for dependency in graph.neighbors_directed(index, Direction::Incoming) {
                    if !done.contains(&dependency) {
                        stack.push((dependency, false));
                    }
                }
            }
        }
    }

    Ok(order)
}

/// Partition a topological order into concurrency cohorts by
/// longest-path depth: level 0 holds nodes with no predecessors, and a
/// node's level is one past the deepest of its predecessors.
pub fn level_partition(workflow: &Workflow, order: &[String]) -> Vec<Vec<String>> {
    let mut level_of: HashMap<&str, usize> = HashMap::new();
    let mut levels: Vec<Vec<String>> = Vec::new();

    for node_id in order {
        let depth = workflow
            .incoming(node_id)
            .filter_map(|conn| level_of.get(conn.source_node.as_str()))
            .map(|level| level + 1)
            .max()
            .unwrap_or(0);
        level_of.insert(node_id.as_str(), depth);
        if levels.len() <= depth {
            levels.resize_with(depth + 1, Vec::new);
        }
        levels[depth].push(node_id.clone());
    }

    levels
}

fn build_graph(workflow: &Workflow) -> Result<(DiGraph<String, ()>, HashMap<&str, NodeIndex>), GraphError> {
    let mut graph = DiGraph::new();
    let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

    for node in &workflow.nodes {
        let index = graph.add_node(node.id.clone());
        index_of.insert(node.id.as_str(), index);
    }
    for conn in &workflow.connections {
        let from = index_of
            .get(conn.source_node.as_str())
            .ok_or_else(|| GraphError::NodeNotFound(conn.source_node.clone()))?;
        let to = index_of
            .get(conn.target_node.as_str())
            .ok_or_else(|| GraphError::NodeNotFound(conn.target_node.clone()))?;
        graph.add_edge(*from, *to, ());
    }

    Ok((graph, index_of))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirecore::{Node, Port};

    fn workflow(node_ids: &[&str], edges: &[(&str, &str)]) -> Workflow {
        let mut wf = Workflow::new("wf", "test");
        for id in node_ids {
            wf.add_node(
                Node::new(*id, "test", *id)
                    .with_input(Port::input("in", "any"))
                    .with_output(Port::output("out", "any")),
            )
            .unwrap();
        }
        for (from, to) in edges {
            wf.connect(from, "out", to, "in").unwrap();
        }
        wf
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn linear_chain_orders_by_dependency() {
        let wf = workflow(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let order = execution_order(&wf).unwrap();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_respects_all_edges() {
        let mut wf = Workflow::new("wf", "test");
        for id in ["s", "l", "r", "j"] {
            wf.add_node(
                Node::new(id, "test", id)
                    .with_input(Port::input("a", "any"))
                    .with_input(Port::input("b", "any"))
                    .with_output(Port::output("out", "any")),
            )
            .unwrap();
        }
        wf.connect("s", "out", "l", "a").unwrap();
        wf.connect("s", "out", "r", "a").unwrap();
        wf.connect("l", "out", "j", "a").unwrap();
        wf.connect("r", "out", "j", "b").unwrap();

        let order = execution_order(&wf).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(&order, "s") < position(&order, "l"));
        assert!(position(&order, "s") < position(&order, "r"));
        assert!(position(&order, "l") < position(&order, "j"));
        assert!(position(&order, "r") < position(&order, "j"));

        let levels = level_partition(&wf, &order);
        assert_eq!(levels[0], vec!["s"]);
        assert_eq!(levels[1].len(), 2);
        assert_eq!(levels[2], vec!["j"]);
    }

    #[test]
    fn cycle_is_reported_with_a_member_node() {
        let wf = workflow(&["a", "b"], &[("a", "b"), ("b", "a")]);
        let err = execution_order(&wf).unwrap_err();
        match err {
            GraphError::CycleDetected { node_id } => {
                assert!(node_id == "a" || node_id == "b");
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn disconnected_nodes_still_scheduled_once() {
        let mut wf = workflow(&["a", "b", "lone"], &[("a", "b")]);
        wf.mark_entry("a");

        let order = execution_order(&wf).unwrap();
        assert_eq!(order.len(), 3);
        assert!(position(&order, "a") < position(&order, "b"));
        // Entry-reachable nodes come ahead of the disconnected one
        assert_eq!(order[2], "lone");
    }

    #[test]
    fn unreached_predecessors_run_before_their_dependents() {
        // "side" feeds "join" but is not itself reachable from the entry
        let mut wf = Workflow::new("wf", "test");
        for id in ["a", "side", "join"] {
            wf.add_node(
                Node::new(id, "test", id)
                    .with_input(Port::input("x", "any"))
                    .with_input(Port::input("y", "any"))
                    .with_output(Port::output("out", "any")),
            )
            .unwrap();
        }
        wf.connect("a", "out", "join", "x").unwrap();
        wf.connect("side", "out", "join", "y").unwrap();
        wf.mark_entry("a");

        let order = execution_order(&wf).unwrap();
        assert!(position(&order, "side") < position(&order, "join"));
        assert!(position(&order, "a") < position(&order, "join"));
    }

    #[test]
    fn empty_workflow_yields_empty_order() {
        let wf = Workflow::new("wf", "empty");
        assert!(execution_order(&wf).unwrap().is_empty());
        assert!(level_partition(&wf, &[]).is_empty());
    }

    #[test]
    fn levels_use_longest_path_depth() {
        // a → b → d and a → d directly: d sits at level 2, not 1
        let mut wf = Workflow::new("wf", "test");
        for id in ["a", "b", "d"] {
            wf.add_node(
                Node::new(id, "test", id)
                    .with_input(Port::input("x", "any"))
                    .with_input(Port::input("y", "any"))
                    .with_output(Port::output("out", "any")),
            )
            .unwrap();
        }
        wf.connect("a", "out", "b", "x").unwrap();
        wf.connect("b", "out", "d", "x").unwrap();
        wf.connect("a", "out", "d", "y").unwrap();

        let order = execution_order(&wf).unwrap();
        let levels = level_partition(&wf, &order);
        assert_eq!(levels, vec![vec!["a"], vec!["b"], vec!["d"]]);
    }
}
