//! Error types raised by graph mutations, gestures, simulation control and
//! snapshot import.
//!
//! Structural findings such as dangling edges or cycles are not errors: they
//! are reported as [`crate::analysis::Issue`] values by the analyzer.

use thiserror::Error;

/// The kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Node,
    Edge,
    Layer,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Node => "node",
            Entity::Edge => "edge",
            Entity::Layer => "layer",
        };
        f.write_str(name)
    }
}

/// Error raised by an operation that left the model unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not valid in the current gesture or simulation state.
    #[error("State error: {0}")]
    State(String),
}

impl GraphError {
    pub fn node_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: Entity::Node,
            id: id.into(),
        }
    }

    pub fn edge_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: Entity::Edge,
            id: id.into(),
        }
    }

    pub fn layer_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: Entity::Layer,
            id: id.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }
}

/// Error raised by snapshot import before any replacement takes place.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Malformed snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot must be a JSON object")]
    NotObject,

    #[error("Snapshot is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Snapshot field `{0}` must be an array")]
    NotArray(&'static str),

    /// The arrays parsed but describe a graph that violates a structural invariant.
    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Either failure a [`crate::workspace::Workspace`] operation can raise.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Import(#[from] ImportError),
}
