//! Hierarchical auto-layout and edge routing.
//!
//! The layout is a pure function of the node hierarchy: roots sit on level
//! zero, each child one level below its parent, and nodes of a level are
//! spread left to right in the order a depth-first walk first reaches them.

pub mod routing;
pub mod types;

use std::collections::HashSet;

use indexmap::IndexMap;
use log::debug;

use crate::config::LayoutConfig;
use crate::geometry::Point;
use crate::ir::Node;

pub use routing::{route, route_edge, route_with};
pub use types::{PathDescriptor, PathSegment, Positions, RouteStyle};

/// Computes a position for every node. Running it twice over the same
/// nodes yields identical positions.
pub fn auto_layout<'a>(
    nodes: impl IntoIterator<Item = &'a Node>,
    config: &LayoutConfig,
) -> Positions {
    let levels = assign_levels(nodes);
    let mut positions = Positions::new();
    for (level, bucket) in levels.iter().enumerate() {
        for (index, id) in bucket.iter().enumerate() {
            positions.insert(
                id.to_string(),
                Point::new(
                    config.base_x + index as f32 * config.column_width,
                    config.base_y + level as f32 * config.level_height,
                ),
            );
        }
    }
    debug!(nodes = positions.len(), levels = levels.len(); "Auto layout computed");
    positions
}

/// Buckets node ids by hierarchy depth, each bucket in discovery order.
fn assign_levels<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Vec<Vec<&'a str>> {
    let by_id: IndexMap<&'a str, &'a Node> =
        nodes.into_iter().map(|n| (n.id.as_str(), n)).collect();
    let is_root = |node: &Node| {
        node.parent_id
            .as_deref()
            .is_none_or(|parent| !by_id.contains_key(parent))
    };

    let mut levels: Vec<Vec<&'a str>> = Vec::new();
    let mut visited: HashSet<&'a str> = HashSet::new();
    let mut walk = |root: &'a str, levels: &mut Vec<Vec<&'a str>>| {
        let mut stack: Vec<(&'a str, usize)> = vec![(root, 0)];
        while let Some((id, level)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(id);
            if let Some(node) = by_id.get(id) {
                for child in node.children.iter().rev() {
                    if let Some((child_id, _)) = by_id.get_key_value(child.as_str()) {
                        stack.push((*child_id, level + 1));
                    }
                }
            }
        }
    };

    for (id, node) in &by_id {
        if is_root(node) {
            walk(*id, &mut levels);
        }
    }
    // Nodes only reachable through a broken parent chain start their own tree.
    for id in by_id.keys() {
        walk(*id, &mut levels);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FeatureKind, NodeKind};
    use crate::model::GraphModel;
    use proptest::prelude::*;

    fn feature_tree() -> GraphModel {
        let mut model = GraphModel::new("layout");
        let kind = NodeKind::Feature(FeatureKind::Task);
        let epic = model.add_node(NodeKind::Feature(FeatureKind::Epic), Point::ORIGIN);
        let f1 = model.add_child_node(&epic.id, kind, Point::ORIGIN).unwrap();
        let f2 = model.add_child_node(&epic.id, kind, Point::ORIGIN).unwrap();
        model.add_child_node(&f1.id, kind, Point::ORIGIN).unwrap();
        model.add_child_node(&f2.id, kind, Point::ORIGIN).unwrap();
        model.add_node(NodeKind::Feature(FeatureKind::Bug), Point::ORIGIN);
        model
    }

    #[test]
    fn levels_follow_hierarchy_and_discovery_order() {
        let model = feature_tree();
        let config = LayoutConfig::default();
        let positions = auto_layout(model.nodes(), &config);
        let ids: Vec<&str> = model.nodes().map(|n| n.id.as_str()).collect();
        // node-1 epic, node-2/3 features, node-4 under node-2, node-5 under node-3, node-6 bug
        assert_eq!(positions[ids[0]], Point::new(50.0, 50.0));
        assert_eq!(positions[ids[5]], Point::new(250.0, 50.0));
        assert_eq!(positions[ids[1]], Point::new(50.0, 200.0));
        assert_eq!(positions[ids[2]], Point::new(250.0, 200.0));
        assert_eq!(positions[ids[3]], Point::new(50.0, 350.0));
        assert_eq!(positions[ids[4]], Point::new(250.0, 350.0));
    }

    #[test]
    fn layout_is_idempotent() {
        let mut model = feature_tree();
        let config = LayoutConfig::default();
        let first = auto_layout(model.nodes(), &config);
        for (id, position) in &first {
            model
                .update_node(id, crate::ir::NodePatch::position(*position))
                .unwrap();
        }
        let second = auto_layout(model.nodes(), &config);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_graph_has_no_positions() {
        let nodes: Vec<Node> = Vec::new();
        assert!(auto_layout(&nodes, &LayoutConfig::default()).is_empty());
    }

    proptest! {
        #[test]
        fn every_node_placed_once(
            parents in prop::collection::vec(prop::option::of(0usize..64), 1..40)
        ) {
            let mut model = GraphModel::new("prop");
            let mut ids: Vec<String> = Vec::new();
            for (index, parent) in parents.iter().enumerate() {
                let kind = NodeKind::Feature(FeatureKind::Story);
                let node = match parent.map(|p| p % index.max(1)) {
                    Some(p) if index > 0 => {
                        model.add_child_node(&ids[p], kind, Point::ORIGIN).unwrap()
                    }
                    _ => model.add_node(kind, Point::ORIGIN),
                };
                ids.push(node.id);
            }
            let config = LayoutConfig::default();
            let first = auto_layout(model.nodes(), &config);
            let second = auto_layout(model.nodes(), &config);
            prop_assert_eq!(first.len(), ids.len());
            prop_assert_eq!(&first, &second);
            let mut seen = std::collections::HashSet::new();
            for p in first.values() {
                prop_assert!(seen.insert((p.x.to_bits(), p.y.to_bits())));
            }
        }
    }
}
