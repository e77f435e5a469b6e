pub mod analysis;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod ir;
pub mod layout;
pub mod model;
pub mod simulation;
pub mod snapshot;
pub mod viewport;
pub mod workspace;

pub use analysis::{Issue, IssueKind, Severity, analyze};
#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, load_config};
pub use error::{Error, GraphError, ImportError};
pub use model::GraphModel;
pub use snapshot::{Snapshot, export_snapshot, import_snapshot};
pub use workspace::Workspace;
