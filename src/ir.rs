use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Size};
use crate::layout::RouteStyle;

pub type NodeId = String;
pub type EdgeId = String;
pub type LayerId = String;

/// Which editor a node or edge vocabulary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagramTool {
    Architecture,
    FeatureMap,
    Flow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArchitectureKind {
    // infrastructure
    Server,
    Database,
    LoadBalancer,
    Cache,
    Queue,
    Storage,
    Cdn,
    Firewall,
    // application
    Service,
    Api,
    Frontend,
    Function,
    Container,
    ExternalSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    Epic,
    Feature,
    Story,
    Task,
    Bug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowKind {
    Start,
    End,
    Process,
    Decision,
    Input,
    Output,
    Connector,
}

/// Node vocabulary of all three tools. Member names are unique across tools,
/// so a snapshot stores the bare name (`"database"`, `"epic"`, `"decision"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeKind {
    Architecture(ArchitectureKind),
    Feature(FeatureKind),
    Flow(FlowKind),
}

impl NodeKind {
    pub fn tool(self) -> DiagramTool {
        match self {
            NodeKind::Architecture(_) => DiagramTool::Architecture,
            NodeKind::Feature(_) => DiagramTool::FeatureMap,
            NodeKind::Flow(_) => DiagramTool::Flow,
        }
    }

    pub fn is_flow_start(self) -> bool {
        matches!(self, NodeKind::Flow(FlowKind::Start))
    }

    pub fn default_size(self) -> Size {
        match self {
            NodeKind::Architecture(ArchitectureKind::Database)
            | NodeKind::Architecture(ArchitectureKind::Storage) => Size::new(100.0, 100.0),
            NodeKind::Architecture(ArchitectureKind::LoadBalancer)
            | NodeKind::Architecture(ArchitectureKind::Firewall) => Size::new(140.0, 60.0),
            NodeKind::Architecture(_) => Size::new(120.0, 80.0),
            NodeKind::Feature(FeatureKind::Epic) => Size::new(200.0, 80.0),
            NodeKind::Feature(FeatureKind::Feature) => Size::new(180.0, 70.0),
            NodeKind::Feature(_) => Size::new(160.0, 60.0),
            NodeKind::Flow(FlowKind::Start) | NodeKind::Flow(FlowKind::End) => {
                Size::new(100.0, 50.0)
            }
            NodeKind::Flow(FlowKind::Decision) => Size::new(120.0, 120.0),
            NodeKind::Flow(FlowKind::Connector) => Size::new(30.0, 30.0),
            NodeKind::Flow(_) => Size::new(140.0, 60.0),
        }
    }

    pub fn default_label(self) -> &'static str {
        match self {
            NodeKind::Architecture(kind) => match kind {
                ArchitectureKind::Server => "Server",
                ArchitectureKind::Database => "Database",
                ArchitectureKind::LoadBalancer => "Load Balancer",
                ArchitectureKind::Cache => "Cache",
                ArchitectureKind::Queue => "Queue",
                ArchitectureKind::Storage => "Storage",
                ArchitectureKind::Cdn => "CDN",
                ArchitectureKind::Firewall => "Firewall",
                ArchitectureKind::Service => "Service",
                ArchitectureKind::Api => "API",
                ArchitectureKind::Frontend => "Frontend",
                ArchitectureKind::Function => "Function",
                ArchitectureKind::Container => "Container",
                ArchitectureKind::ExternalSystem => "External System",
            },
            NodeKind::Feature(kind) => match kind {
                FeatureKind::Epic => "New Epic",
                FeatureKind::Feature => "New Feature",
                FeatureKind::Story => "New Story",
                FeatureKind::Task => "New Task",
                FeatureKind::Bug => "New Bug",
            },
            NodeKind::Flow(kind) => match kind {
                FlowKind::Start => "Start",
                FlowKind::End => "End",
                FlowKind::Process => "Process",
                FlowKind::Decision => "Decision",
                FlowKind::Input => "Input",
                FlowKind::Output => "Output",
                FlowKind::Connector => "",
            },
        }
    }

    /// Kind given to an edge drawn out of a node of this kind.
    pub fn default_edge_kind(self) -> EdgeKind {
        match self {
            NodeKind::Architecture(_) => EdgeKind::Architecture(ArchitectureEdgeKind::Sync),
            NodeKind::Feature(_) => EdgeKind::Feature(FeatureEdgeKind::Dependency),
            NodeKind::Flow(_) => EdgeKind::Flow(FlowEdgeKind::Default),
        }
    }

    pub fn default_status(self) -> Option<NodeStatus> {
        match self {
            NodeKind::Feature(_) => Some(NodeStatus::NotStarted),
            _ => None,
        }
    }
}

/// Progress of a feature-map item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
    NotStarted,
    InProgress,
    Review,
    Done,
}

impl NodeStatus {
    pub fn is_complete(self) -> bool {
        self == NodeStatus::Done
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureEdgeKind {
    Dependency,
    ParentChild,
    Related,
    Blocks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArchitectureEdgeKind {
    Sync,
    Async,
    Request,
    Response,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowEdgeKind {
    Default,
    Yes,
    No,
    Conditional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeKind {
    Feature(FeatureEdgeKind),
    Architecture(ArchitectureEdgeKind),
    Flow(FlowEdgeKind),
}

impl EdgeKind {
    /// Edges that make up the dependency subgraph searched for cycles.
    pub fn is_dependency(self) -> bool {
        matches!(
            self,
            EdgeKind::Feature(FeatureEdgeKind::Dependency)
                | EdgeKind::Feature(FeatureEdgeKind::Blocks)
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<f32>,
}

impl NodeStyle {
    /// False when a numeric field would not survive JSON export.
    pub fn is_finite(&self) -> bool {
        [self.stroke_width, self.font_size, self.corner_radius]
            .into_iter()
            .flatten()
            .all(f32::is_finite)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteStyle>,
}

impl EdgeStyle {
    pub fn is_finite(&self) -> bool {
        self.stroke_width.is_none_or(f32::is_finite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub position: Point,
    pub size: Size,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<NodeStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    pub layer_id: LayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    /// Branch condition of a flow decision node; interpreted by a
    /// [`crate::simulation::ConditionEvaluator`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Node {
    pub fn new(id: NodeId, kind: NodeKind, position: Point, layer_id: LayerId) -> Self {
        Self {
            id,
            kind,
            position,
            size: kind.default_size(),
            label: kind.default_label().to_string(),
            description: None,
            properties: BTreeMap::new(),
            style: None,
            parent_id: None,
            children: Vec::new(),
            layer_id,
            status: kind.default_status(),
            condition: None,
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    pub kind: EdgeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<EdgeStyle>,
}

impl Edge {
    pub fn is_self_loop(&self) -> bool {
        self.source_node_id == self.target_node_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub opacity: f32,
    #[serde(default)]
    pub nodes: Vec<NodeId>,
    pub z_index: i32,
}

impl Layer {
    pub fn new(id: LayerId, name: impl Into<String>, z_index: i32) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            locked: false,
            opacity: 1.0,
            nodes: Vec::new(),
            z_index,
        }
    }
}

/// Partial node update; `None` leaves a field untouched.
///
/// Nested options distinguish "leave alone" (`None`) from "clear"
/// (`Some(None)`). Property entries are merged key by key and a
/// `serde_json::Value::Null` entry removes the key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub kind: Option<NodeKind>,
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub label: Option<String>,
    pub description: Option<Option<String>>,
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
    pub style: Option<Option<NodeStyle>>,
    pub parent_id: Option<Option<NodeId>>,
    pub layer_id: Option<LayerId>,
    pub status: Option<Option<NodeStatus>>,
    pub condition: Option<Option<String>>,
}

impl NodePatch {
    pub fn position(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    pub fn parent(parent_id: Option<NodeId>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Default::default()
        }
    }

    pub fn status(status: NodeStatus) -> Self {
        Self {
            status: Some(Some(status)),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EdgePatch {
    pub source_node_id: Option<NodeId>,
    pub target_node_id: Option<NodeId>,
    pub kind: Option<EdgeKind>,
    pub label: Option<Option<String>>,
    pub style: Option<Option<EdgeStyle>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    /// Clamped into `[0, 1]`.
    pub opacity: Option<f32>,
    pub z_index: Option<i32>,
}
