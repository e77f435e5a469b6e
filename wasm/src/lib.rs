use diagram_canvas::config::LayoutConfig;
use diagram_canvas::ir::NodePatch;
use diagram_canvas::layout::{RouteStyle, auto_layout, route};
use diagram_canvas::{GraphModel, analyze, export_snapshot, import_snapshot};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LayoutOptions {
    base_x: Option<f32>,
    base_y: Option<f32>,
    level_height: Option<f32>,
    column_width: Option<f32>,
}

fn build_layout_config(options: LayoutOptions) -> LayoutConfig {
    let mut config = LayoutConfig::default();
    if let Some(v) = options.base_x {
        config.base_x = v;
    }
    if let Some(v) = options.base_y {
        config.base_y = v;
    }
    if let Some(v) = options.level_height {
        config.level_height = v;
    }
    if let Some(v) = options.column_width {
        config.column_width = v;
    }
    config
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteOptions {
    style: Option<RouteStyle>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoutedEdge {
    edge_id: String,
    d: String,
    arrow_angle: f32,
    label_x: f32,
    label_y: f32,
}

fn to_js(error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_options<T>(raw: Option<String>) -> Result<T, JsValue>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match raw {
        Some(raw) => serde_json::from_str(&raw).map_err(to_js),
        None => Ok(T::default()),
    }
}

fn load(snapshot_json: &str) -> Result<GraphModel, JsValue> {
    import_snapshot(snapshot_json).map_err(to_js)
}

/// Returns the analyzer's issues as a JSON array.
#[wasm_bindgen]
pub fn analyze_snapshot(snapshot_json: &str) -> Result<String, JsValue> {
    let model = load(snapshot_json)?;
    let issues = analyze(model.nodes(), model.edges());
    serde_json::to_string(&issues).map_err(to_js)
}

/// Returns the snapshot with every node moved to its auto-layout position.
#[wasm_bindgen]
pub fn layout_snapshot(
    snapshot_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let config = build_layout_config(parse_options(options_json)?);
    let mut model = load(snapshot_json)?;
    let positions = auto_layout(model.nodes(), &config);
    for (id, position) in positions {
        model
            .update_node(&id, NodePatch::position(position))
            .map_err(to_js)?;
    }
    export_snapshot(&model).to_json().map_err(to_js)
}

/// Returns SVG path data plus arrow and label placement for every edge
/// whose endpoints exist.
#[wasm_bindgen]
pub fn route_snapshot(
    snapshot_json: &str,
    options_json: Option<String>,
) -> Result<String, JsValue> {
    let options: RouteOptions = parse_options(options_json)?;
    let model = load(snapshot_json)?;
    let routed = routed_edges(&model, options.style);
    serde_json::to_string(&routed).map_err(to_js)
}

fn routed_edges(model: &GraphModel, style_override: Option<RouteStyle>) -> Vec<RoutedEdge> {
    let defaults = diagram_canvas::config::RoutingConfig::default();
    model
        .edges()
        .filter_map(|edge| {
            let source = model.node(&edge.source_node_id)?;
            let target = model.node(&edge.target_node_id)?;
            let style = style_override
                .or_else(|| edge.style.as_ref().and_then(|s| s.route))
                .unwrap_or(defaults.default_style);
            let path = route(source, target, style);
            let label = path.midpoint();
            Some(RoutedEdge {
                edge_id: edge.id.clone(),
                d: path.to_svg_path_data(),
                arrow_angle: path.arrow_angle,
                label_x: label.x,
                label_y: label.y,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use diagram_canvas::geometry::Point;
    use diagram_canvas::ir::{ArchitectureKind, NodeKind};
    use diagram_canvas::layout::RouteStyle;
    use diagram_canvas::{GraphModel, export_snapshot};

    use crate::{LayoutOptions, build_layout_config, routed_edges};

    #[test]
    fn routes_every_connected_edge() {
        let mut model = GraphModel::new("wasm");
        let kind = NodeKind::Architecture(ArchitectureKind::Api);
        let a = model.add_node(kind, Point::new(0.0, 0.0));
        let b = model.add_node(kind, Point::new(400.0, 0.0));
        model.add_edge(&a.id, &b.id, kind.default_edge_kind()).unwrap();

        let routed = routed_edges(&model, Some(RouteStyle::Straight));
        assert_eq!(routed.len(), 1);
        assert!(routed[0].d.starts_with("M "));
        assert!(routed[0].arrow_angle.abs() < 1e-6);

        let json = export_snapshot(&model).to_json().unwrap();
        assert!(crate::analyze_snapshot(&json).unwrap().starts_with('['));
    }

    #[test]
    fn layout_options_override_defaults() {
        let config = build_layout_config(LayoutOptions {
            column_width: Some(320.0),
            ..Default::default()
        });
        assert_eq!(config.column_width, 320.0);
        assert_eq!(config.level_height, 150.0);
    }
}
