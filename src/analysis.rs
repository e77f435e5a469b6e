//! Read-only structural checks over a graph snapshot.
//!
//! Each pass runs independently over the same nodes and edges; the result
//! is the concatenation of every pass in a fixed pass order, each pass
//! reporting in the order it walks the graph.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ir::{Edge, EdgeKind, FeatureEdgeKind, FlowKind, Node, NodeId, NodeKind, NodeStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueKind {
    Cycle,
    Orphan,
    Blocked,
    DanglingReference,
    SelfLoop,
    MissingStart,
    DuplicateStart,
    DecisionBranches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub involved_node_ids: Vec<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl Issue {
    fn new(kind: IssueKind, severity: Severity, message: String, involved: Vec<NodeId>) -> Self {
        Self {
            kind,
            severity,
            message,
            involved_node_ids: involved,
            suggestions: Vec::new(),
        }
    }

    fn with_suggestions(mut self, suggestions: &[&str]) -> Self {
        self.suggestions = suggestions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Id-indexed view of a snapshot shared by all passes.
struct GraphView<'a> {
    nodes: IndexMap<&'a str, &'a Node>,
    edges: Vec<&'a Edge>,
}

impl GraphView<'_> {
    fn label(&self, id: &str) -> String {
        match self.nodes.get(id) {
            Some(node) if !node.label.is_empty() => node.label.clone(),
            _ => id.to_string(),
        }
    }

    fn resolves(&self, edge: &Edge) -> bool {
        self.nodes.contains_key(edge.source_node_id.as_str())
            && self.nodes.contains_key(edge.target_node_id.as_str())
    }
}

/// Runs every pass and concatenates their findings.
pub fn analyze<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
    edges: impl IntoIterator<Item = &'a Edge>,
) -> Vec<Issue> {
    let view = GraphView {
        nodes: nodes.into_iter().map(|n| (n.id.as_str(), n)).collect(),
        edges: edges.into_iter().collect(),
    };

    let mut issues = Vec::new();
    issues.extend(detect_cycles(&view));
    issues.extend(detect_orphans(&view));
    issues.extend(detect_blocked(&view));
    issues.extend(detect_dangling(&view));
    issues.extend(detect_self_loops(&view));
    issues.extend(check_flow(&view));
    debug!(
        nodes = view.nodes.len(),
        edges = view.edges.len(),
        issues = issues.len();
        "Graph analyzed"
    );
    issues
}

/// Depth-first search over dependency edges with an explicit recursion
/// stack; reaching a node already on the stack reports the stack slice
/// from that node to the current tail.
fn detect_cycles(view: &GraphView<'_>) -> Vec<Issue> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &view.edges {
        if edge.kind.is_dependency() && view.resolves(edge) {
            adjacency
                .entry(edge.source_node_id.as_str())
                .or_default()
                .push(edge.target_node_id.as_str());
        }
    }

    let mut issues = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    for &root in view.nodes.keys() {
        if visited.contains(root) {
            continue;
        }
        visited.insert(root);
        let mut path: Vec<&str> = vec![root];
        let mut on_path: HashSet<&str> = HashSet::from([root]);
        let mut frames: Vec<(&str, usize)> = vec![(root, 0)];

        while let Some(&(node, next)) = frames.last() {
            let neighbors = adjacency.get(node).map(Vec::as_slice).unwrap_or(&[]);
            let Some(&target) = neighbors.get(next) else {
                frames.pop();
                path.pop();
                on_path.remove(node);
                continue;
            };
            if let Some(frame) = frames.last_mut() {
                frame.1 += 1;
            }

            if on_path.contains(target) {
                let start = path.iter().position(|id| *id == target).unwrap_or(0);
                let cycle: Vec<NodeId> = path[start..].iter().map(|id| id.to_string()).collect();
                let mut names: Vec<String> = cycle.iter().map(|id| view.label(id)).collect();
                names.push(view.label(target));
                issues.push(
                    Issue::new(
                        IssueKind::Cycle,
                        Severity::Error,
                        format!("Circular dependency detected: {}", names.join(" -> ")),
                        cycle,
                    )
                    .with_suggestions(&[
                        "Remove one of the dependency edges in the cycle",
                        "Restructure the items so dependencies point one way",
                    ]),
                );
            } else if visited.insert(target) {
                path.push(target);
                on_path.insert(target);
                frames.push((target, 0));
            }
        }
    }
    issues
}

/// A node with no edges in either direction and no hierarchy links.
fn detect_orphans(view: &GraphView<'_>) -> Vec<Issue> {
    let mut touched: HashSet<&str> = HashSet::new();
    for edge in &view.edges {
        touched.insert(edge.source_node_id.as_str());
        touched.insert(edge.target_node_id.as_str());
    }
    view.nodes
        .values()
        .filter(|node| {
            !touched.contains(node.id.as_str())
                && node.parent_id.is_none()
                && node.children.is_empty()
        })
        .map(|node| {
            Issue::new(
                IssueKind::Orphan,
                Severity::Warning,
                format!("\"{}\" has no relationships", view.label(&node.id)),
                vec![node.id.clone()],
            )
            .with_suggestions(&[
                "Connect it to a related item",
                "Move it under a parent or delete it",
            ])
        })
        .collect()
}

fn is_incomplete(node: &Node) -> bool {
    node.status.is_some_and(|status| !status.is_complete())
}

/// A not-started item that depends on an incomplete item. `dependency`
/// edges point from the dependent item to its prerequisite; `blocks`
/// edges point from the prerequisite to the item it holds up.
fn detect_blocked(view: &GraphView<'_>) -> Vec<Issue> {
    let mut issues = Vec::new();
    for edge in &view.edges {
        let (waiting_id, blocker_id) = match edge.kind {
            EdgeKind::Feature(FeatureEdgeKind::Dependency) => {
                (edge.source_node_id.as_str(), edge.target_node_id.as_str())
            }
            EdgeKind::Feature(FeatureEdgeKind::Blocks) => {
                (edge.target_node_id.as_str(), edge.source_node_id.as_str())
            }
            _ => continue,
        };
        if waiting_id == blocker_id {
            continue;
        }
        let (Some(waiting), Some(blocker)) =
            (view.nodes.get(waiting_id), view.nodes.get(blocker_id))
        else {
            continue;
        };
        if waiting.status == Some(NodeStatus::NotStarted) && is_incomplete(blocker) {
            issues.push(
                Issue::new(
                    IssueKind::Blocked,
                    Severity::Warning,
                    format!(
                        "\"{}\" is blocked by incomplete \"{}\"",
                        view.label(waiting_id),
                        view.label(blocker_id)
                    ),
                    vec![waiting.id.clone(), blocker.id.clone()],
                )
                .with_suggestions(&["Finish the prerequisite first"]),
            );
        }
    }
    issues
}

fn detect_dangling(view: &GraphView<'_>) -> Vec<Issue> {
    view.edges
        .iter()
        .filter(|edge| !view.resolves(edge))
        .map(|edge| {
            let missing: Vec<&str> = [&edge.source_node_id, &edge.target_node_id]
                .into_iter()
                .filter(|id| !view.nodes.contains_key(id.as_str()))
                .map(String::as_str)
                .collect();
            Issue::new(
                IssueKind::DanglingReference,
                Severity::Error,
                format!(
                    "Edge {} references missing node(s): {}",
                    edge.id,
                    missing.join(", ")
                ),
                vec![edge.source_node_id.clone(), edge.target_node_id.clone()],
            )
            .with_suggestions(&["Delete the edge or restore the missing node"])
        })
        .collect()
}

/// Dependency self-loops are already cycles; this covers the other kinds.
fn detect_self_loops(view: &GraphView<'_>) -> Vec<Issue> {
    view.edges
        .iter()
        .filter(|edge| edge.is_self_loop() && !edge.kind.is_dependency() && view.resolves(edge))
        .map(|edge| {
            Issue::new(
                IssueKind::SelfLoop,
                Severity::Warning,
                format!("\"{}\" connects to itself", view.label(&edge.source_node_id)),
                vec![edge.source_node_id.clone()],
            )
        })
        .collect()
}

/// Start-node and decision-branch checks, only for graphs holding flow nodes.
fn check_flow(view: &GraphView<'_>) -> Vec<Issue> {
    let flow_nodes: Vec<&Node> = view
        .nodes
        .values()
        .copied()
        .filter(|node| matches!(node.kind, NodeKind::Flow(_)))
        .collect();
    if flow_nodes.is_empty() {
        return Vec::new();
    }

    let mut issues = Vec::new();
    let starts: Vec<NodeId> = flow_nodes
        .iter()
        .filter(|node| node.kind.is_flow_start())
        .map(|node| node.id.clone())
        .collect();
    match starts.len() {
        0 => issues.push(
            Issue::new(
                IssueKind::MissingStart,
                Severity::Error,
                "Flow has no start node".to_string(),
                Vec::new(),
            )
            .with_suggestions(&["Add a start node"]),
        ),
        1 => {}
        count => issues.push(
            Issue::new(
                IssueKind::DuplicateStart,
                Severity::Error,
                format!("Flow has {count} start nodes; exactly one is required"),
                starts,
            )
            .with_suggestions(&["Keep a single start node"]),
        ),
    }

    for node in flow_nodes
        .iter()
        .filter(|node| node.kind == NodeKind::Flow(FlowKind::Decision))
    {
        let branches = view
            .edges
            .iter()
            .filter(|edge| edge.source_node_id == node.id && view.resolves(edge))
            .count();
        if branches < 2 {
            issues.push(
                Issue::new(
                    IssueKind::DecisionBranches,
                    Severity::Warning,
                    format!(
                        "Decision \"{}\" has {branches} outgoing branch(es); at least 2 expected",
                        view.label(&node.id)
                    ),
                    vec![node.id.clone()],
                )
                .with_suggestions(&["Add a yes and a no branch"]),
            );
        }
    }
    issues
}
