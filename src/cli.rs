use crate::analysis::{Severity, analyze};
use crate::config::load_config;
use crate::ir::NodePatch;
use crate::layout::{auto_layout, route_edge};
use crate::model::GraphModel;
use crate::simulation::{SimulationEngine, StepOutcome};
use crate::snapshot::{import_snapshot, write_snapshot};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dgc", version, about = "Inspect and transform diagram snapshots")]
pub struct Args {
    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report cycles, orphans, blocked items and broken references
    Analyze {
        /// Snapshot file or '-' for stdin
        input: PathBuf,

        /// Print issues as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply the hierarchical auto-layout and write the snapshot back out
    Layout {
        /// Snapshot file or '-' for stdin
        input: PathBuf,

        /// Output file. Defaults to stdout.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Run a flow from its start node and print the execution path
    Simulate {
        /// Snapshot file or '-' for stdin
        input: PathBuf,

        /// Stop after this many steps (flows may loop)
        #[arg(long = "max-steps", default_value_t = 1000)]
        max_steps: u64,
    },
    /// Print SVG path data for every edge
    Route {
        /// Snapshot file or '-' for stdin
        input: PathBuf,
    },
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Analyze { input, json } => {
            let model = read_model(&input)?;
            let issues = analyze(model.nodes(), model.edges());
            let mut out = io::stdout().lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &issues)?;
                writeln!(out)?;
            } else {
                for issue in &issues {
                    let severity = match issue.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                    };
                    writeln!(out, "{severity}: {}", issue.message)?;
                }
            }
            if issues.iter().any(|issue| issue.is_error()) {
                return Err(anyhow::anyhow!("{} issue(s) found", issues.len()));
            }
        }
        Command::Layout { input, output } => {
            let mut model = read_model(&input)?;
            let positions = auto_layout(model.nodes(), &config.layout);
            for (id, position) in positions {
                model.update_node(&id, NodePatch::position(position))?;
            }
            match output {
                Some(path) => write_snapshot(&path, &model)?,
                None => {
                    let json = crate::snapshot::export_snapshot(&model).to_json()?;
                    println!("{json}");
                }
            }
        }
        Command::Simulate { input, max_steps } => {
            let model = read_model(&input)?;
            let mut engine = SimulationEngine::new();
            engine.start(&model)?;
            let mut steps = 0;
            while engine.session().is_running() && steps < max_steps {
                if engine.step(&model)? == StepOutcome::Finished {
                    break;
                }
                steps += 1;
            }
            let labels: Vec<&str> = engine
                .session()
                .path
                .iter()
                .map(|id| model.node(id).map_or(id.as_str(), |node| node.label.as_str()))
                .collect();
            println!("{}", labels.join(" -> "));
        }
        Command::Route { input } => {
            let model = read_model(&input)?;
            let mut out = io::stdout().lock();
            for edge in model.edges() {
                match route_edge(&model, edge, &config.routing) {
                    Some(path) => writeln!(out, "{}\t{}", edge.id, path.to_svg_path_data())?,
                    None => log::warn!(edge_id:% = edge.id; "Edge has a missing endpoint, skipped"),
                }
            }
        }
    }

    Ok(())
}

fn read_model(path: &Path) -> Result<GraphModel> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Ok(import_snapshot(&contents)?)
}
