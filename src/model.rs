//! The canonical store of nodes, edges and layers.
//!
//! All three collections are id-indexed arenas kept in creation order.
//! Hierarchy is stored as ids (`parent_id`, `children`), never as
//! references. Every mutation validates before it touches anything, so a
//! returned error always leaves the model as it was.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, trace};

use crate::error::GraphError;
use crate::geometry::{Point, Rect, Size};
use crate::ir::{
    Edge, EdgeId, EdgeKind, EdgePatch, Layer, LayerId, LayerPatch, Node, NodeId, NodeKind,
    NodePatch,
};

/// Smallest width/height a node may be resized to.
const MIN_NODE_EXTENT: f32 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphMetadata {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl GraphMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Hands out `prefix-N` ids that are not yet taken.
#[derive(Debug, Clone, Default)]
struct IdAllocator {
    next_node: u64,
    next_edge: u64,
    next_layer: u64,
}

impl IdAllocator {
    fn fresh(counter: &mut u64, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
        loop {
            *counter += 1;
            let candidate = format!("{prefix}-{counter}");
            if !taken(&candidate) {
                return candidate;
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphModel {
    metadata: GraphMetadata,
    nodes: IndexMap<NodeId, Node>,
    edges: IndexMap<EdgeId, Edge>,
    layers: IndexMap<LayerId, Layer>,
    active_layer: LayerId,
    ids: IdAllocator,
}

impl GraphModel {
    /// Creates an empty graph holding a single default layer.
    pub fn new(name: impl Into<String>) -> Self {
        let mut ids = IdAllocator::default();
        let layer_id = IdAllocator::fresh(&mut ids.next_layer, "layer", |_| false);
        let mut layers = IndexMap::new();
        layers.insert(layer_id.clone(), Layer::new(layer_id.clone(), "Layer 1", 0));
        Self {
            metadata: GraphMetadata::new(name),
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            layers,
            active_layer: layer_id,
            ids,
        }
    }

    /// Builds a model from already-identified parts, checking every
    /// structural invariant except edge endpoints: dangling edges are kept
    /// and left for the analyzer to report.
    pub fn from_parts(
        metadata: GraphMetadata,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        layers: Vec<Layer>,
    ) -> Result<Self, GraphError> {
        if layers.is_empty() {
            return Err(GraphError::Validation(
                "a graph needs at least one layer".to_string(),
            ));
        }

        let mut layer_map: IndexMap<LayerId, Layer> = IndexMap::new();
        for layer in layers {
            if layer_map.contains_key(&layer.id) {
                return Err(GraphError::Validation(format!(
                    "duplicate layer id {}",
                    layer.id
                )));
            }
            layer_map.insert(layer.id.clone(), layer);
        }

        let mut node_map: IndexMap<NodeId, Node> = IndexMap::new();
        for node in nodes {
            if node_map.contains_key(&node.id) {
                return Err(GraphError::Validation(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            node_map.insert(node.id.clone(), node);
        }

        let mut edge_map: IndexMap<EdgeId, Edge> = IndexMap::new();
        for edge in edges {
            if edge_map.contains_key(&edge.id) {
                return Err(GraphError::Validation(format!(
                    "duplicate edge id {}",
                    edge.id
                )));
            }
            edge_map.insert(edge.id.clone(), edge);
        }

        check_layer_membership(&node_map, &layer_map)?;
        check_hierarchy(&node_map)?;

        let active_layer = layer_map
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| GraphError::Validation("a graph needs at least one layer".to_string()))?;

        Ok(Self {
            metadata,
            nodes: node_map,
            edges: edge_map,
            layers: layer_map,
            active_layer,
            ids: IdAllocator::default(),
        })
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.metadata.name = name.into();
    }

    // ── Queries ─────────────────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.get(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Edges in creation order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    pub fn layers(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.layers.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn active_layer(&self) -> &str {
        &self.active_layer
    }

    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .values()
            .filter(move |edge| edge.source_node_id == node_id)
    }

    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .values()
            .filter(move |edge| edge.target_node_id == node_id)
    }

    pub fn is_node_locked(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .and_then(|node| self.layers.get(&node.layer_id))
            .is_some_and(|layer| layer.locked)
    }

    /// Top-most visible node whose rectangle contains `point` (world space).
    ///
    /// Layers are searched from the highest z-index down; within a layer the
    /// most recently added member wins.
    pub fn node_at(&self, point: Point) -> Option<&Node> {
        let mut layers: Vec<&Layer> = self.layers.values().filter(|l| l.visible).collect();
        layers.sort_by(|a, b| b.z_index.cmp(&a.z_index));
        layers.iter().find_map(|layer| {
            layer
                .nodes
                .iter()
                .rev()
                .filter_map(|id| self.nodes.get(id))
                .find(|node| node.bounds().contains(point))
        })
    }

    /// Bounding box of every node, or `None` for an empty graph.
    pub fn content_bounds(&self) -> Option<Rect> {
        self.nodes
            .values()
            .map(Node::bounds)
            .reduce(|acc, rect| acc.union(&rect))
    }

    // ── Nodes ───────────────────────────────────────────────────────────

    /// Adds a node of `kind` to the active layer with the kind's default
    /// size and label.
    pub fn add_node(&mut self, kind: NodeKind, position: Point) -> Node {
        let nodes = &self.nodes;
        let id = IdAllocator::fresh(&mut self.ids.next_node, "node", |id| nodes.contains_key(id));
        let node = Node::new(id.clone(), kind, position, self.active_layer.clone());
        if let Some(layer) = self.layers.get_mut(&self.active_layer) {
            layer.nodes.push(id.clone());
        }
        self.nodes.insert(id.clone(), node.clone());
        debug!(node_id:% = id, kind:? = kind; "Node added");
        node
    }

    /// Adds a node and attaches it as the last child of `parent_id`.
    pub fn add_child_node(
        &mut self,
        parent_id: &str,
        kind: NodeKind,
        position: Point,
    ) -> Result<Node, GraphError> {
        if !self.nodes.contains_key(parent_id) {
            return Err(GraphError::node_not_found(parent_id));
        }
        let node = self.add_node(kind, position);
        self.update_node(&node.id, NodePatch::parent(Some(parent_id.to_string())))?;
        self.nodes
            .get(&node.id)
            .cloned()
            .ok_or_else(|| GraphError::node_not_found(node.id))
    }

    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<(), GraphError> {
        let Some(current) = self.nodes.get(id) else {
            return Err(GraphError::node_not_found(id));
        };

        if let Some(layer_id) = &patch.layer_id {
            if !self.layers.contains_key(layer_id) {
                return Err(GraphError::layer_not_found(layer_id.clone()));
            }
        }
        if let Some(position) = patch.position
            && !position.is_finite()
        {
            return Err(GraphError::Validation(format!(
                "node {id} position must be finite"
            )));
        }
        if let Some(size) = patch.size
            && !size.is_finite()
        {
            return Err(GraphError::Validation(format!(
                "node {id} size must be finite"
            )));
        }
        if let Some(Some(style)) = &patch.style
            && !style.is_finite()
        {
            return Err(GraphError::Validation(format!(
                "node {id} style values must be finite"
            )));
        }
        if let Some(Some(parent_id)) = &patch.parent_id {
            if !self.nodes.contains_key(parent_id) {
                return Err(GraphError::node_not_found(parent_id.clone()));
            }
            if parent_id == id || self.is_ancestor(id, parent_id) {
                return Err(GraphError::Validation(format!(
                    "making {parent_id} the parent of {id} would create a hierarchy cycle"
                )));
            }
        }

        let old_parent = current.parent_id.clone();
        let old_layer = current.layer_id.clone();

        if let Some(new_parent) = &patch.parent_id {
            if *new_parent != old_parent {
                if let Some(old) = old_parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
                    old.children.retain(|child| child != id);
                }
                if let Some(new) = new_parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
                    new.children.push(id.to_string());
                }
            }
        }

        if let Some(layer_id) = &patch.layer_id {
            if *layer_id != old_layer {
                if let Some(layer) = self.layers.get_mut(&old_layer) {
                    layer.nodes.retain(|member| member != id);
                }
                if let Some(layer) = self.layers.get_mut(layer_id) {
                    layer.nodes.push(id.to_string());
                }
            }
        }

        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::node_not_found(id))?;
        if let Some(kind) = patch.kind {
            node.kind = kind;
        }
        if let Some(position) = patch.position {
            trace!(node_id:% = id, x = position.x, y = position.y; "Node moved");
            node.position = position;
        }
        if let Some(size) = patch.size {
            node.size = Size::new(
                size.width.max(MIN_NODE_EXTENT),
                size.height.max(MIN_NODE_EXTENT),
            );
        }
        if let Some(label) = patch.label {
            node.label = label;
        }
        if let Some(description) = patch.description {
            node.description = description;
        }
        if let Some(properties) = patch.properties {
            merge_properties(&mut node.properties, properties);
        }
        if let Some(style) = patch.style {
            node.style = style;
        }
        if let Some(parent_id) = patch.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(layer_id) = patch.layer_id {
            node.layer_id = layer_id;
        }
        if let Some(status) = patch.status {
            node.status = status;
        }
        if let Some(condition) = patch.condition {
            node.condition = condition;
        }
        Ok(())
    }

    /// Deletes a node together with its descendants and every edge touching
    /// any of them. Returns the removed node ids, the requested node first.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<NodeId>, GraphError> {
        let Some(node) = self.nodes.get(id) else {
            return Err(GraphError::node_not_found(id));
        };
        let parent = node.parent_id.clone();

        let mut removed: Vec<NodeId> = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for child in node.children.iter().rev() {
                    stack.push(child.clone());
                }
            }
            removed.push(current);
        }

        if let Some(parent) = parent.as_ref().and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|child| child != id);
        }
        self.edges.retain(|_, edge| {
            !seen.contains(&edge.source_node_id) && !seen.contains(&edge.target_node_id)
        });
        for layer in self.layers.values_mut() {
            layer.nodes.retain(|member| !seen.contains(member));
        }
        for node_id in &removed {
            self.nodes.shift_remove(node_id);
        }
        debug!(node_id:% = id, removed = removed.len(); "Node deleted");
        Ok(removed)
    }

    fn is_ancestor(&self, ancestor: &str, node_id: &str) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = self.nodes.get(node_id).and_then(|n| n.parent_id.as_deref());
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id) {
                return false;
            }
            current = self.nodes.get(id).and_then(|n| n.parent_id.as_deref());
        }
        false
    }

    // ── Edges ───────────────────────────────────────────────────────────

    /// Connects two existing nodes. Self-loops are accepted here and
    /// reported by the analyzer instead.
    pub fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: EdgeKind,
    ) -> Result<Edge, GraphError> {
        if !self.nodes.contains_key(source_id) {
            return Err(GraphError::node_not_found(source_id));
        }
        if !self.nodes.contains_key(target_id) {
            return Err(GraphError::node_not_found(target_id));
        }
        let edges = &self.edges;
        let id = IdAllocator::fresh(&mut self.ids.next_edge, "edge", |id| edges.contains_key(id));
        let edge = Edge {
            id: id.clone(),
            source_node_id: source_id.to_string(),
            target_node_id: target_id.to_string(),
            kind,
            label: None,
            style: None,
        };
        self.edges.insert(id.clone(), edge.clone());
        debug!(edge_id:% = id, source:% = source_id, target:% = target_id; "Edge added");
        Ok(edge)
    }

    pub fn update_edge(&mut self, id: &str, patch: EdgePatch) -> Result<(), GraphError> {
        if !self.edges.contains_key(id) {
            return Err(GraphError::edge_not_found(id));
        }
        for endpoint in [&patch.source_node_id, &patch.target_node_id]
            .into_iter()
            .flatten()
        {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::node_not_found(endpoint.clone()));
            }
        }
        if let Some(Some(style)) = &patch.style
            && !style.is_finite()
        {
            return Err(GraphError::Validation(format!(
                "edge {id} style values must be finite"
            )));
        }
        let edge = self
            .edges
            .get_mut(id)
            .ok_or_else(|| GraphError::edge_not_found(id))?;
        if let Some(source) = patch.source_node_id {
            edge.source_node_id = source;
        }
        if let Some(target) = patch.target_node_id {
            edge.target_node_id = target;
        }
        if let Some(kind) = patch.kind {
            edge.kind = kind;
        }
        if let Some(label) = patch.label {
            edge.label = label;
        }
        if let Some(style) = patch.style {
            edge.style = style;
        }
        Ok(())
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<Edge, GraphError> {
        let edge = self
            .edges
            .shift_remove(id)
            .ok_or_else(|| GraphError::edge_not_found(id))?;
        debug!(edge_id:% = id; "Edge deleted");
        Ok(edge)
    }

    // ── Layers ──────────────────────────────────────────────────────────

    /// Adds an empty layer stacked above every existing one.
    pub fn add_layer(&mut self, name: impl Into<String>) -> Layer {
        let layers = &self.layers;
        let id = IdAllocator::fresh(&mut self.ids.next_layer, "layer", |id| {
            layers.contains_key(id)
        });
        let z_index = self
            .layers
            .values()
            .map(|layer| layer.z_index)
            .max()
            .map_or(0, |z| z + 1);
        let layer = Layer::new(id.clone(), name, z_index);
        self.layers.insert(id.clone(), layer.clone());
        debug!(layer_id:% = id, z_index = z_index; "Layer added");
        layer
    }

    pub fn update_layer(&mut self, id: &str, patch: LayerPatch) -> Result<(), GraphError> {
        let layer = self
            .layers
            .get_mut(id)
            .ok_or_else(|| GraphError::layer_not_found(id))?;
        if let Some(name) = patch.name {
            layer.name = name;
        }
        if let Some(visible) = patch.visible {
            layer.visible = visible;
        }
        if let Some(locked) = patch.locked {
            layer.locked = locked;
        }
        if let Some(opacity) = patch.opacity {
            layer.opacity = if opacity.is_nan() {
                1.0
            } else {
                opacity.clamp(0.0, 1.0)
            };
        }
        if let Some(z_index) = patch.z_index {
            layer.z_index = z_index;
        }
        Ok(())
    }

    /// Chooses the layer that receives nodes created by [`Self::add_node`].
    pub fn set_active_layer(&mut self, id: &str) -> Result<(), GraphError> {
        if !self.layers.contains_key(id) {
            return Err(GraphError::layer_not_found(id));
        }
        self.active_layer = id.to_string();
        Ok(())
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Content equality: metadata plus every collection in creation order.
/// Id allocation state and the active layer are editor state, not content.
impl PartialEq for GraphModel {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata
            && self.nodes.len() == other.nodes.len()
            && self.nodes.values().eq(other.nodes.values())
            && self.edges.values().eq(other.edges.values())
            && self.layers.values().eq(other.layers.values())
    }
}

fn merge_properties(
    target: &mut BTreeMap<String, serde_json::Value>,
    patch: BTreeMap<String, serde_json::Value>,
) {
    for (key, value) in patch {
        if value.is_null() {
            target.remove(&key);
        } else {
            target.insert(key, value);
        }
    }
}

fn check_layer_membership(
    nodes: &IndexMap<NodeId, Node>,
    layers: &IndexMap<LayerId, Layer>,
) -> Result<(), GraphError> {
    for node in nodes.values() {
        let Some(layer) = layers.get(&node.layer_id) else {
            return Err(GraphError::Validation(format!(
                "node {} references unknown layer {}",
                node.id, node.layer_id
            )));
        };
        if !layer.nodes.contains(&node.id) {
            return Err(GraphError::Validation(format!(
                "layer {} does not list its member node {}",
                layer.id, node.id
            )));
        }
    }
    let mut listed: HashSet<&str> = HashSet::new();
    for layer in layers.values() {
        for member in &layer.nodes {
            let owner = nodes.get(member).map(|node| node.layer_id.as_str());
            if owner != Some(layer.id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "layer {} lists node {member} that does not belong to it",
                    layer.id
                )));
            }
            if !listed.insert(member.as_str()) {
                return Err(GraphError::Validation(format!(
                    "node {member} is listed twice"
                )));
            }
        }
    }
    Ok(())
}

fn check_hierarchy(nodes: &IndexMap<NodeId, Node>) -> Result<(), GraphError> {
    for node in nodes.values() {
        if let Some(parent_id) = &node.parent_id {
            let listed = nodes
                .get(parent_id)
                .is_some_and(|parent| parent.children.contains(&node.id));
            if !listed {
                return Err(GraphError::Validation(format!(
                    "node {} names parent {parent_id} which does not list it as a child",
                    node.id
                )));
            }
        }
        for child_id in &node.children {
            let consistent = nodes
                .get(child_id)
                .is_some_and(|child| child.parent_id.as_deref() == Some(node.id.as_str()));
            if !consistent {
                return Err(GraphError::Validation(format!(
                    "node {} lists child {child_id} whose parent link disagrees",
                    node.id
                )));
            }
        }
    }

    // Every parent chain must reach a root.
    for node in nodes.values() {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut current = Some(node.id.as_str());
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(GraphError::Validation(format!(
                    "parent links through {} form a cycle",
                    node.id
                )));
            }
            current = nodes.get(id).and_then(|n| n.parent_id.as_deref());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Entity;
    use crate::ir::{FeatureEdgeKind, FeatureKind, FlowKind, NodeStyle};

    fn feature_edge() -> EdgeKind {
        EdgeKind::Feature(FeatureEdgeKind::Dependency)
    }

    #[test]
    fn add_node_assigns_fresh_ids_and_defaults() {
        let mut model = GraphModel::new("test");
        let a = model.add_node(NodeKind::Flow(FlowKind::Decision), Point::new(10.0, 20.0));
        let b = model.add_node(NodeKind::Flow(FlowKind::Decision), Point::ORIGIN);
        assert_ne!(a.id, b.id);
        assert_eq!(a.size, Size::new(120.0, 120.0));
        assert_eq!(a.label, "Decision");
        assert_eq!(a.layer_id, model.active_layer());
        let layer = model.layer(model.active_layer()).unwrap();
        assert_eq!(layer.nodes, vec![a.id.clone(), b.id.clone()]);
    }

    #[test]
    fn update_unknown_node_is_not_found() {
        let mut model = GraphModel::new("test");
        let err = model
            .update_node("missing", NodePatch::label("x"))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::NotFound {
                entity: Entity::Node,
                id: "missing".to_string()
            }
        );
    }

    #[test]
    fn rejected_update_leaves_model_unchanged() {
        let mut model = GraphModel::new("test");
        let a = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let before = model.clone();
        let patch = NodePatch {
            label: Some("renamed".to_string()),
            layer_id: Some("no-such-layer".to_string()),
            ..Default::default()
        };
        assert!(model.update_node(&a.id, patch).is_err());
        assert_eq!(model, before);
    }

    #[test]
    fn reparenting_keeps_links_consistent() {
        let mut model = GraphModel::new("test");
        let epic = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let other = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let story = model
            .add_child_node(&epic.id, NodeKind::Feature(FeatureKind::Story), Point::ORIGIN)
            .unwrap();
        assert_eq!(model.node(&epic.id).unwrap().children, vec![story.id.clone()]);

        model
            .update_node(&story.id, NodePatch::parent(Some(other.id.clone())))
            .unwrap();
        assert!(model.node(&epic.id).unwrap().children.is_empty());
        assert_eq!(model.node(&other.id).unwrap().children, vec![story.id.clone()]);
        assert_eq!(
            model.node(&story.id).unwrap().parent_id.as_deref(),
            Some(other.id.as_str())
        );

        model.update_node(&story.id, NodePatch::parent(None)).unwrap();
        assert!(model.node(&other.id).unwrap().children.is_empty());
        assert_eq!(model.node(&story.id).unwrap().parent_id, None);
    }

    #[test]
    fn reparenting_under_descendant_is_rejected() {
        let mut model = GraphModel::new("test");
        let epic = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let story = model
            .add_child_node(&epic.id, NodeKind::Feature(FeatureKind::Story), Point::ORIGIN)
            .unwrap();
        let err = model
            .update_node(&epic.id, NodePatch::parent(Some(story.id.clone())))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
        let err = model
            .update_node(&epic.id, NodePatch::parent(Some(epic.id.clone())))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation(_)));
    }

    #[test]
    fn delete_node_cascades_edges_children_and_parent_link() {
        let mut model = GraphModel::new("test");
        let epic = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let feature = model
            .add_child_node(&epic.id, NodeKind::Feature(FeatureKind::Feature), Point::ORIGIN)
            .unwrap();
        let story = model
            .add_child_node(&feature.id, NodeKind::Feature(FeatureKind::Story), Point::ORIGIN)
            .unwrap();
        let task = model.add_node(NodeKind::Feature(FeatureKind::Task), Point::ORIGIN);
        model.add_edge(&task.id, &story.id, feature_edge()).unwrap();
        model.add_edge(&feature.id, &task.id, feature_edge()).unwrap();
        let kept = model.add_edge(&epic.id, &task.id, feature_edge()).unwrap();

        let removed = model.delete_node(&feature.id).unwrap();
        assert_eq!(removed, vec![feature.id.clone(), story.id.clone()]);
        assert!(model.node(&story.id).is_none());
        assert!(model.node(&epic.id).unwrap().children.is_empty());
        let remaining: Vec<&str> = model.edges().map(|e| e.id.as_str()).collect();
        assert_eq!(remaining, vec![kept.id.as_str()]);
        for layer in model.layers() {
            assert!(!layer.nodes.contains(&feature.id));
            assert!(!layer.nodes.contains(&story.id));
        }
    }

    #[test]
    fn add_edge_requires_existing_endpoints_but_allows_self_loops() {
        let mut model = GraphModel::new("test");
        let a = model.add_node(NodeKind::Feature(FeatureKind::Task), Point::ORIGIN);
        assert!(matches!(
            model.add_edge(&a.id, "ghost", feature_edge()),
            Err(GraphError::NotFound { .. })
        ));
        let looped = model.add_edge(&a.id, &a.id, feature_edge()).unwrap();
        assert!(looped.is_self_loop());
        assert_eq!(model.edge_count(), 1);
    }

    #[test]
    fn non_finite_geometry_is_rejected_without_change() {
        let mut model = GraphModel::new("test");
        let node = model.add_node(NodeKind::Flow(FlowKind::Process), Point::new(5.0, 5.0));
        let before = model.clone();

        for position in [Point::new(f32::NAN, 1.0), Point::new(1.0, f32::INFINITY)] {
            assert!(matches!(
                model.update_node(&node.id, NodePatch::position(position)),
                Err(GraphError::Validation(_))
            ));
        }
        let bad_size = NodePatch {
            size: Some(Size::new(f32::NEG_INFINITY, 10.0)),
            ..Default::default()
        };
        assert!(matches!(
            model.update_node(&node.id, bad_size),
            Err(GraphError::Validation(_))
        ));
        let bad_style = NodePatch {
            style: Some(Some(NodeStyle {
                font_size: Some(f32::NAN),
                ..Default::default()
            })),
            ..Default::default()
        };
        assert!(matches!(
            model.update_node(&node.id, bad_style),
            Err(GraphError::Validation(_))
        ));
        assert_eq!(model, before);

        let json = crate::snapshot::export_snapshot(&model).to_json().unwrap();
        assert_eq!(crate::snapshot::import_snapshot(&json).unwrap(), model);
    }

    #[test]
    fn layers_stack_and_clamp_opacity() {
        let mut model = GraphModel::new("test");
        let top = model.add_layer("Overlay");
        assert_eq!(top.z_index, 1);
        model
            .update_layer(
                &top.id,
                LayerPatch {
                    opacity: Some(3.5),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(model.layer(&top.id).unwrap().opacity, 1.0);
        assert!(model.update_layer("nope", LayerPatch::default()).is_err());
    }

    #[test]
    fn moving_node_between_layers_updates_membership() {
        let mut model = GraphModel::new("test");
        let base = model.active_layer().to_string();
        let overlay = model.add_layer("Overlay");
        let node = model.add_node(NodeKind::Flow(FlowKind::Process), Point::ORIGIN);
        model
            .update_node(
                &node.id,
                NodePatch {
                    layer_id: Some(overlay.id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(model.layer(&base).unwrap().nodes.is_empty());
        assert_eq!(model.layer(&overlay.id).unwrap().nodes, vec![node.id.clone()]);
    }

    #[test]
    fn node_at_prefers_top_layer_and_skips_hidden() {
        let mut model = GraphModel::new("test");
        let below = model.add_node(NodeKind::Flow(FlowKind::Process), Point::ORIGIN);
        let overlay = model.add_layer("Overlay");
        model.set_active_layer(&overlay.id).unwrap();
        let above = model.add_node(NodeKind::Flow(FlowKind::Process), Point::ORIGIN);

        let hit = model.node_at(Point::new(5.0, 5.0)).unwrap();
        assert_eq!(hit.id, above.id);

        model
            .update_layer(
                &overlay.id,
                LayerPatch {
                    visible: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        let hit = model.node_at(Point::new(5.0, 5.0)).unwrap();
        assert_eq!(hit.id, below.id);
        assert!(model.node_at(Point::new(-50.0, -50.0)).is_none());
    }

    #[test]
    fn properties_merge_and_null_removes() {
        let mut model = GraphModel::new("test");
        let node = model.add_node(NodeKind::Flow(FlowKind::Input), Point::ORIGIN);
        let mut first = BTreeMap::new();
        first.insert("owner".to_string(), serde_json::json!("ops"));
        first.insert("retries".to_string(), serde_json::json!(3));
        model
            .update_node(
                &node.id,
                NodePatch {
                    properties: Some(first),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut second = BTreeMap::new();
        second.insert("owner".to_string(), serde_json::Value::Null);
        model
            .update_node(
                &node.id,
                NodePatch {
                    properties: Some(second),
                    ..Default::default()
                },
            )
            .unwrap();
        let props = &model.node(&node.id).unwrap().properties;
        assert_eq!(props.len(), 1);
        assert_eq!(props["retries"], serde_json::json!(3));
    }

    #[test]
    fn from_parts_rejects_inconsistent_hierarchy() {
        let source = {
            let mut model = GraphModel::new("test");
            let epic = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
            model
                .add_child_node(&epic.id, NodeKind::Feature(FeatureKind::Story), Point::ORIGIN)
                .unwrap();
            model
        };
        let mut nodes: Vec<Node> = source.nodes().cloned().collect();
        nodes[0].children.clear();
        let result = GraphModel::from_parts(
            source.metadata().clone(),
            nodes,
            Vec::new(),
            source.layers().cloned().collect(),
        );
        assert!(matches!(result, Err(GraphError::Validation(_))));
    }

    #[test]
    fn ids_skip_over_imported_names() {
        let source = {
            let mut model = GraphModel::new("test");
            model.add_node(NodeKind::Flow(FlowKind::Start), Point::ORIGIN);
            model
        };
        let mut model = GraphModel::from_parts(
            source.metadata().clone(),
            source.nodes().cloned().collect(),
            Vec::new(),
            source.layers().cloned().collect(),
        )
        .unwrap();
        let fresh = model.add_node(NodeKind::Flow(FlowKind::End), Point::ORIGIN);
        assert_eq!(fresh.id, "node-2");
        assert_eq!(model.node_count(), 2);
    }
}
