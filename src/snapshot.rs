//! Whole-graph JSON snapshots.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ImportError;
use crate::ir::{Edge, Layer, Node};
use crate::model::{GraphMetadata, GraphModel};

/// Version written into exported snapshots.
pub const SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub nodes: Vec<Node>,
    #[serde(alias = "connections")]
    pub edges: Vec<Edge>,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_version", alias = "schemaVersion")]
    pub version: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_name() -> String {
    "Untitled".to_string()
}

fn default_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            created_at: Utc::now(),
        }
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Builds the model this snapshot describes.
    pub fn into_model(self) -> Result<GraphModel, ImportError> {
        let metadata = GraphMetadata {
            name: self.metadata.name,
            created_at: self.metadata.created_at,
        };
        GraphModel::from_parts(metadata, self.nodes, self.edges, self.layers)
            .map_err(|err| ImportError::Inconsistent(err.to_string()))
    }
}

pub fn export_snapshot(model: &GraphModel) -> Snapshot {
    let metadata = model.metadata();
    Snapshot {
        nodes: model.nodes().cloned().collect(),
        edges: model.edges().cloned().collect(),
        layers: model.layers().cloned().collect(),
        metadata: SnapshotMetadata {
            name: metadata.name.clone(),
            version: default_version(),
            created_at: metadata.created_at,
        },
    }
}

/// Parses a snapshot document into a fresh model. Nothing is returned
/// unless the whole document is valid.
pub fn import_snapshot(json: &str) -> Result<GraphModel, ImportError> {
    let value: Value = serde_json::from_str(json)?;
    let object = value.as_object().ok_or(ImportError::NotObject)?;

    require_array(object.get("nodes"), "nodes")?;
    require_array(object.get("edges").or_else(|| object.get("connections")), "edges")?;
    require_array(object.get("layers"), "layers")?;

    let snapshot: Snapshot = serde_json::from_value(value)?;
    let model = snapshot.into_model()?;
    info!(
        name = model.metadata().name.as_str(),
        nodes = model.node_count(),
        edges = model.edge_count();
        "Snapshot imported"
    );
    Ok(model)
}

fn require_array(value: Option<&Value>, field: &'static str) -> Result<(), ImportError> {
    match value {
        None => Err(ImportError::MissingField(field)),
        Some(Value::Array(_)) => Ok(()),
        Some(_) => Err(ImportError::NotArray(field)),
    }
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<GraphModel> {
    let contents = std::fs::read_to_string(path)?;
    Ok(import_snapshot(&contents)?)
}

pub fn write_snapshot(path: &Path, model: &GraphModel) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &export_snapshot(model))?;
    info!(path:? = path, nodes = model.node_count(); "Snapshot written");
    Ok(())
}
