//! Graph validator - structural checks, arity rules, cycle detection and ordering
//!
//! `validate_graph` collects every problem it can find instead of stopping at
//! the first one, so an editor can show them all at once. The traversal helpers
//! (`find_root_nodes`, `reachable_from`, `topological_order`) are diagnostics;
//! execution itself is driven by dependencies at run time.

use super::graph::{Edge, Node, PortDirection, WorkflowGraph};
use crate::error::GraphError;
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of [`validate_graph`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<GraphError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert into a result, folding all errors into [`GraphError::Invalid`]
    pub fn into_result(self) -> Result<(), GraphError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Invalid(self.errors))
        }
    }
}

/// Check every graph invariant and collect all violations
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> ValidationReport {
    let mut report = ValidationReport::default();

    // Node ids
    let mut by_id: HashMap<&str, &Node> = HashMap::new();
    for node in nodes {
        if by_id.insert(node.id.as_str(), node).is_some() {
            report.errors.push(GraphError::DuplicateNode(node.id.clone()));
        }
    }

    // Exactly one start node
    let starts: Vec<&Node> = nodes.iter().filter(|n| n.is_start()).collect();
    match starts.len() {
        0 => report.errors.push(GraphError::NoStartNode),
        1 => {}
        _ => report.errors.push(GraphError::MultipleStartNodes(
            starts.iter().map(|n| n.id.clone()).collect(),
        )),
    }

    // Edge endpoints and ports
    let mut edge_ids = HashSet::new();
    let mut known_edges: Vec<&Edge> = Vec::new();
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            report.errors.push(GraphError::DuplicateEdge(edge.id.clone()));
        }

        let mut endpoints_ok = true;
        for endpoint in [&edge.source, &edge.target] {
            if !by_id.contains_key(endpoint.as_str()) {
                report.errors.push(GraphError::UnknownNode {
                    edge: edge.id.clone(),
                    node: endpoint.clone(),
                });
                endpoints_ok = false;
            }
        }
        if !endpoints_ok {
            continue;
        }

        if let Err(e) = check_ports(&by_id, edge) {
            report.errors.push(e);
        }
        known_edges.push(edge);
    }

    // Start node takes no input
    for start in &starts {
        if known_edges.iter().any(|e| e.target == start.id) {
            report.errors.push(GraphError::StartHasIncoming(start.id.clone()));
        }
    }

    // Parent arity; branch edges from condition nodes may merge
    for node in nodes {
        let plain_parents: Vec<String> = known_edges
            .iter()
            .filter(|e| e.target == node.id && !is_condition_branch(&by_id, e))
            .map(|e| e.source.clone())
            .collect();
        if plain_parents.len() > 1 {
            report.errors.push(GraphError::MultipleParents {
                node: node.id.clone(),
                parents: plain_parents,
            });
        }
    }

    // Each condition branch port drives at most one edge
    for node in nodes.iter().filter(|n| n.is_condition()) {
        let mut seen = HashSet::new();
        for edge in known_edges
            .iter()
            .filter(|e| e.source == node.id && e.is_branch_edge())
        {
            if !seen.insert(edge.branch()) {
                report.errors.push(GraphError::BranchPortOccupied {
                    node: node.id.clone(),
                    port: edge.branch().to_string(),
                });
            }
        }
    }

    // Cycles
    let owned: Vec<Edge> = known_edges.iter().map(|e| (*e).clone()).collect();
    if let Some(cycle) = find_cycle(&adjacency(&owned)) {
        report.errors.push(GraphError::CycleDetected(cycle));
    }

    // Warnings: unreachable nodes and unconnected required inputs
    if let [start] = starts.as_slice() {
        let reachable: HashSet<String> = reachable_from(&owned, &start.id).into_iter().collect();
        for node in nodes {
            if !reachable.contains(&node.id) {
                report
                    .warnings
                    .push(format!("node {} is not reachable from start", node.id));
            }
        }
    }
    for node in nodes {
        for port in node.ports() {
            if port.direction == PortDirection::Input
                && port.required
                && !known_edges
                    .iter()
                    .any(|e| e.target == node.id && e.input_port() == port.id)
            {
                report.warnings.push(format!(
                    "required input {} on node {} is not connected",
                    port.id, node.id
                ));
            }
        }
    }

    report
}

/// Whether adding `source -> target` to `edges` would close a cycle
pub fn would_create_cycle(edges: &[Edge], source: &str, target: &str) -> bool {
    let mut adj = adjacency(edges);
    adj.entry(source.to_string())
        .or_default()
        .push(target.to_string());
    find_cycle(&adj).is_some()
}

/// Nodes with no incoming edges
pub fn find_root_nodes<'a>(nodes: &'a [Node], edges: &[Edge]) -> Vec<&'a Node> {
    let targets: HashSet<&str> = edges.iter().map(|e| e.target.as_str()).collect();
    nodes
        .iter()
        .filter(|n| !targets.contains(n.id.as_str()))
        .collect()
}

/// Breadth-first walk from `start`, in visit order (including `start`)
pub fn reachable_from(edges: &[Edge], start: &str) -> Vec<String> {
    let adj = adjacency(edges);
    let mut seen = HashSet::from([start.to_string()]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([start.to_string()]);

    while let Some(id) = queue.pop_front() {
        if let Some(next) = adj.get(&id) {
            for n in next {
                if seen.insert(n.clone()) {
                    queue.push_back(n.clone());
                }
            }
        }
        order.push(id);
    }

    order
}

/// Static execution order using Kahn's algorithm
///
/// Ties are broken by node declaration order, so the result is deterministic.
pub fn topological_order(nodes: &[Node], edges: &[Edge]) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    for edge in edges {
        if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
            *deg += 1;
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.to_string());
        for edge in edges.iter().filter(|e| e.source == id) {
            if let Some(deg) = in_degree.get_mut(edge.target.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(edge.target.as_str());
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let stuck: Vec<String> = nodes
            .iter()
            .filter(|n| in_degree[n.id.as_str()] > 0)
            .map(|n| n.id.clone())
            .collect();
        return Err(GraphError::CycleDetected(stuck));
    }

    Ok(order)
}

/// Check a single proposed connection against the existing graph
pub fn validate_connection(
    nodes: &[Node],
    edges: &[Edge],
    source: &str,
    source_port: &str,
    target: &str,
    target_port: &str,
) -> Result<(), GraphError> {
    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let proposed = Edge::new("proposed", source, target)
        .from_port(source_port)
        .to_port(target_port);

    for endpoint in [source, target] {
        if !by_id.contains_key(endpoint) {
            return Err(GraphError::UnknownNode {
                edge: proposed.id.clone(),
                node: endpoint.to_string(),
            });
        }
    }
    check_ports(&by_id, &proposed)?;

    if source == target {
        return Err(GraphError::SelfLoop(source.to_string()));
    }

    // Condition branch ports drive a single edge each
    if is_condition_branch(&by_id, &proposed)
        && edges
            .iter()
            .any(|e| e.source == source && e.branch() == source_port)
    {
        return Err(GraphError::BranchPortOccupied {
            node: source.to_string(),
            port: source_port.to_string(),
        });
    }

    // Input occupancy, honoring branch merges
    if !is_condition_branch(&by_id, &proposed)
        && edges
            .iter()
            .any(|e| e.target == target && !is_condition_branch(&by_id, e))
    {
        return Err(GraphError::InputPortOccupied {
            node: target.to_string(),
            port: target_port.to_string(),
        });
    }

    if would_create_cycle(edges, source, target) {
        return Err(GraphError::WouldCreateCycle {
            from: source.to_string(),
            to: target.to_string(),
        });
    }

    Ok(())
}

impl WorkflowGraph {
    /// Run [`validate_graph`] over this document
    pub fn validate(&self) -> ValidationReport {
        validate_graph(&self.nodes, &self.edges)
    }
}

fn check_ports(by_id: &HashMap<&str, &Node>, edge: &Edge) -> Result<(), GraphError> {
    let checks = [
        (&edge.source, edge.branch(), PortDirection::Output),
        (&edge.target, edge.input_port(), PortDirection::Input),
    ];
    for (node_id, port, direction) in checks {
        let Some(node) = by_id.get(node_id.as_str()) else {
            continue;
        };
        // Conditions only route through their true/false ports
        let unroutable = direction == PortDirection::Output
            && node.is_condition()
            && !edge.is_branch_edge();
        // Otherwise an edge without a source port leaves the node's first output
        if !unroutable && direction == PortDirection::Output && edge.source_port.is_none() {
            continue;
        }
        if unroutable || !node.has_port(port, direction) {
            return Err(GraphError::UnknownPort {
                node: node_id.clone(),
                port: port.to_string(),
                direction: match direction {
                    PortDirection::Input => "input",
                    PortDirection::Output => "output",
                },
            });
        }
    }
    Ok(())
}

fn is_condition_branch(by_id: &HashMap<&str, &Node>, edge: &Edge) -> bool {
    edge.is_branch_edge()
        && by_id
            .get(edge.source.as_str())
            .map(|n| n.is_condition())
            .unwrap_or(false)
}

fn adjacency(edges: &[Edge]) -> HashMap<String, Vec<String>> {
    let mut adj: HashMap<String, Vec<String>> = HashMap::new();
    for edge in edges {
        adj.entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
    }
    adj
}

/// Depth-first search with an explicit recursion stack
///
/// Returns the cycle path (first node repeated at the end) when a back-edge to
/// a node on the active stack is found.
fn find_cycle(adj: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut starts: Vec<&String> = adj.keys().collect();
    starts.sort();

    let mut visited: HashSet<&str> = HashSet::new();
    for root in starts {
        if visited.contains(root.as_str()) {
            continue;
        }

        // (node, index of next child to explore)
        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        let mut on_stack: HashSet<&str> = HashSet::from([root.as_str()]);
        visited.insert(root.as_str());

        while let Some((node, child_idx)) = stack.last_mut() {
            let children = adj.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(child) = children.get(*child_idx) {
                *child_idx += 1;
                let child = child.as_str();
                if on_stack.contains(child) {
                    let pos = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[pos..].iter().map(|(n, _)| n.to_string()).collect();
                    path.push(child.to_string());
                    return Some(path);
                }
                if visited.insert(child) {
                    on_stack.insert(child);
                    stack.push((child, 0));
                }
            } else {
                on_stack.remove(*node);
                stack.pop();
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{
        ConditionAttrs, EndAttrs, NodeKind, StartAttrs, TaskAttrs, PORT_FALSE, PORT_TRUE,
    };

    fn start(id: &str) -> Node {
        Node::new(id, NodeKind::Start(StartAttrs::default()))
    }

    fn task(id: &str) -> Node {
        Node::new(id, NodeKind::Task(TaskAttrs::default()))
    }

    fn cond(id: &str) -> Node {
        Node::new(id, NodeKind::Condition(ConditionAttrs::default()))
    }

    fn end(id: &str) -> Node {
        Node::new(id, NodeKind::End(EndAttrs::default()))
    }

    fn edge(source: &str, target: &str) -> Edge {
        Edge::new(format!("{}-{}", source, target), source, target)
    }

    fn branch(source: &str, port: &str, target: &str) -> Edge {
        Edge::new(format!("{}-{}-{}", source, port, target), source, target).from_port(port)
    }

    #[test]
    fn test_valid_linear_graph() {
        let nodes = vec![start("s"), task("a"), end("e")];
        let edges = vec![edge("s", "a"), edge("a", "e")];
        let report = validate_graph(&nodes, &edges);
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_start_node_count() {
        let report = validate_graph(&[task("a")], &[]);
        assert!(report.errors.contains(&GraphError::NoStartNode));

        let report = validate_graph(&[start("s1"), start("s2")], &[]);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, GraphError::MultipleStartNodes(ids) if ids.len() == 2)));
    }

    #[test]
    fn test_cycle_and_multiple_parents_are_distinct() {
        // s -> a -> b -> a, plus s -> b gives b two plain parents
        let nodes = vec![start("s"), task("a"), task("b")];
        let edges = vec![edge("s", "a"), edge("a", "b"), edge("b", "a"), edge("s", "b")];
        let report = validate_graph(&nodes, &edges);

        let cycle = report
            .errors
            .iter()
            .find(|e| matches!(e, GraphError::CycleDetected(_)))
            .expect("cycle reported");
        let parents = report
            .errors
            .iter()
            .find(|e| matches!(e, GraphError::MultipleParents { .. }))
            .expect("multiple parents reported");
        assert_ne!(cycle.to_string(), parents.to_string());
    }

    #[test]
    fn test_branch_merge_allowed() {
        // c.true -> m and x -> m: one plain parent plus a branch edge
        let nodes = vec![start("s"), cond("c"), task("x"), task("m")];
        let edges = vec![
            edge("s", "c"),
            branch("c", PORT_TRUE, "m"),
            branch("c", PORT_FALSE, "x"),
            edge("x", "m"),
        ];
        let report = validate_graph(&nodes, &edges);
        assert!(report.is_valid(), "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_branch_port_fan_out_rejected() {
        let nodes = vec![start("s"), cond("c"), task("a"), task("b")];
        let edges = vec![
            edge("s", "c"),
            branch("c", PORT_TRUE, "a"),
            branch("c", PORT_TRUE, "b"),
        ];
        let report = validate_graph(&nodes, &edges);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, GraphError::BranchPortOccupied { port, .. } if port == "true")));
    }

    #[test]
    fn test_unknown_nodes_and_ports() {
        let nodes = vec![start("s"), task("a")];
        let edges = vec![edge("s", "ghost"), branch("s", "true", "a")];
        let report = validate_graph(&nodes, &edges);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, GraphError::UnknownNode { node, .. } if node == "ghost")));
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, GraphError::UnknownPort { port, .. } if port == "true")));
    }

    #[test]
    fn test_condition_edge_needs_branch_port() {
        let nodes = vec![start("s"), cond("c"), task("t")];
        let edges = vec![edge("s", "c"), edge("c", "t")];
        let report = validate_graph(&nodes, &edges);
        assert!(report.errors.iter().any(|e| matches!(
            e,
            GraphError::UnknownPort { node, port, .. } if node == "c" && port == "default"
        )));

        let edges = vec![edge("s", "c")];
        assert!(matches!(
            validate_connection(&nodes, &edges, "c", "out", "t", "in"),
            Err(GraphError::UnknownPort { .. })
        ));
        assert!(validate_connection(&nodes, &edges, "c", PORT_TRUE, "t", "in").is_ok());
    }

    #[test]
    fn test_start_with_incoming_edge() {
        let nodes = vec![start("s"), task("a")];
        let edges = vec![edge("s", "a"), edge("a", "s").to_port("in")];
        let report = validate_graph(&nodes, &edges);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, GraphError::StartHasIncoming(_))));
    }

    #[test]
    fn test_unreachable_node_warning() {
        let nodes = vec![start("s"), end("e"), task("orphan")];
        let edges = vec![edge("s", "e")];
        let report = validate_graph(&nodes, &edges);
        assert!(report.is_valid());
        assert!(report.warnings.iter().any(|w| w.contains("orphan")));
    }

    #[test]
    fn test_would_create_cycle() {
        let edges = vec![edge("a", "b"), edge("b", "c")];
        assert!(would_create_cycle(&edges, "c", "a"));
        assert!(would_create_cycle(&edges, "a", "a"));
        assert!(!would_create_cycle(&edges, "a", "c"));
        assert!(!would_create_cycle(&edges, "c", "d"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let edges = vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")];
        assert!(!would_create_cycle(&edges, "a", "d"));
        assert!(would_create_cycle(&edges, "d", "a"));
    }

    #[test]
    fn test_roots_reachability_and_order() {
        let nodes = vec![start("s"), task("b"), task("a"), end("e"), task("lonely")];
        let edges = vec![edge("s", "a"), edge("s", "b"), edge("a", "e")];

        let roots: Vec<&str> = find_root_nodes(&nodes, &edges)
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(roots, vec!["s", "lonely"]);

        assert_eq!(reachable_from(&edges, "s"), vec!["s", "a", "b", "e"]);

        let order = topological_order(&nodes, &edges).unwrap();
        let pos = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert_eq!(order.len(), 5);
        assert!(pos("s") < pos("a"));
        assert!(pos("a") < pos("e"));
    }

    #[test]
    fn test_topological_order_reports_cycle() {
        let nodes = vec![task("a"), task("b")];
        let edges = vec![edge("a", "b"), edge("b", "a")];
        assert!(matches!(
            topological_order(&nodes, &edges),
            Err(GraphError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_validate_connection() {
        let nodes = vec![start("s"), cond("c"), task("a"), task("b")];
        let edges = vec![edge("s", "c"), branch("c", PORT_TRUE, "a")];

        assert!(validate_connection(&nodes, &edges, "c", PORT_FALSE, "b", "in").is_ok());
        assert!(matches!(
            validate_connection(&nodes, &edges, "a", "out", "a", "in"),
            Err(GraphError::SelfLoop(_))
        ));
        assert!(matches!(
            validate_connection(&nodes, &edges, "c", "nope", "b", "in"),
            Err(GraphError::UnknownPort { .. })
        ));
        assert!(matches!(
            validate_connection(&nodes, &edges, "c", PORT_TRUE, "b", "in"),
            Err(GraphError::BranchPortOccupied { .. })
        ));
        assert!(matches!(
            validate_connection(&nodes, &edges, "a", "out", "c", "in"),
            Err(GraphError::InputPortOccupied { .. })
        ));
        assert!(matches!(
            validate_connection(&nodes, &edges, "s", "out", "ghost", "in"),
            Err(GraphError::UnknownNode { .. })
        ));
    }

    #[test]
    fn test_validate_connection_branch_merge_and_cycle() {
        let nodes = vec![start("s"), cond("c"), task("a"), task("b")];
        let edges = vec![
            edge("s", "c"),
            branch("c", PORT_FALSE, "a"),
            edge("a", "b"),
        ];
        // b already has a plain parent; a branch edge may still merge into it
        assert!(validate_connection(&nodes, &edges, "c", PORT_TRUE, "b", "in").is_ok());

        let nodes = vec![start("s"), task("a"), task("b"), task("x")];
        let edges = vec![edge("s", "a"), edge("a", "b")];
        assert!(validate_connection(&nodes, &edges, "b", "out", "x", "in").is_ok());
        let edges = vec![edge("a", "b"), edge("b", "x")];
        assert!(matches!(
            validate_connection(&nodes, &edges, "x", "out", "a", "in"),
            Err(GraphError::WouldCreateCycle { .. })
        ));
    }
}
