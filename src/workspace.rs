//! One open editor: the graph plus the viewport, gesture and simulation
//! state that go with it.
//!
//! Whole-graph reads and replacements (analysis, layout, import, export)
//! need a quiescent model and are refused while a gesture is in progress
//! or the simulation is running.

use std::time::{Duration, Instant};

use log::info;

use crate::analysis::{self, Issue};
use crate::config::Config;
use crate::error::{Error, GraphError};
use crate::geometry::{Point, Size};
use crate::interaction::{InteractionController, Key, PointerEvent};
use crate::ir::{Edge, EdgeKind, EdgePatch, Layer, LayerPatch, Node, NodeId, NodeKind, NodePatch};
use crate::layout::{self, PathDescriptor, Positions};
use crate::model::GraphModel;
use crate::simulation::{
    SimulationEngine, SimulationSession, SimulationState, StepOutcome, VariableValue,
};
use crate::snapshot::{self, Snapshot};
use crate::viewport::ViewportController;

#[derive(Debug)]
pub struct Workspace {
    config: Config,
    model: GraphModel,
    viewport: ViewportController,
    interaction: InteractionController,
    simulation: SimulationEngine,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Workspace {
    pub fn new(config: Config) -> Self {
        Self::with_model(GraphModel::default(), config)
    }

    pub fn with_model(model: GraphModel, config: Config) -> Self {
        let mut simulation = SimulationEngine::new();
        simulation.enable_auto_step(Some(Duration::from_millis(
            config.simulation.auto_step_interval_ms,
        )));
        Self {
            viewport: ViewportController::new(config.viewport.clone()),
            interaction: InteractionController::new(config.interaction.clone()),
            simulation,
            model,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn interaction(&self) -> &InteractionController {
        &self.interaction
    }

    fn ensure_quiescent(&self, operation: &str) -> Result<(), GraphError> {
        if !self.interaction.is_idle() {
            return Err(GraphError::state(format!(
                "cannot {operation} while a gesture is in progress"
            )));
        }
        if self.simulation.state() == SimulationState::Running {
            return Err(GraphError::state(format!(
                "cannot {operation} while the simulation is running"
            )));
        }
        Ok(())
    }

    // ── Read API ────────────────────────────────────────────────────────

    pub fn list_nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.model.nodes()
    }

    pub fn list_edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.model.edges()
    }

    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.model.node(id)
    }

    // ── Graph mutations ─────────────────────────────────────────────────

    pub fn add_node(&mut self, kind: NodeKind, position: Point) -> Node {
        self.model.add_node(kind, position)
    }

    pub fn add_child_node(
        &mut self,
        parent_id: &str,
        kind: NodeKind,
        position: Point,
    ) -> Result<Node, GraphError> {
        self.model.add_child_node(parent_id, kind, position)
    }

    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> Result<(), GraphError> {
        self.model.update_node(id, patch)
    }

    /// Refused while the simulation runs, so the current node always exists.
    pub fn delete_node(&mut self, id: &str) -> Result<Vec<NodeId>, GraphError> {
        if self.simulation.state() == SimulationState::Running {
            return Err(GraphError::state(
                "cannot delete nodes while the simulation is running",
            ));
        }
        let removed = self.model.delete_node(id)?;
        if self
            .interaction
            .selection()
            .is_some_and(|selected| removed.iter().any(|id| id == selected))
        {
            self.interaction.select(None);
        }
        Ok(removed)
    }

    pub fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        kind: EdgeKind,
    ) -> Result<Edge, GraphError> {
        self.model.add_edge(source_id, target_id, kind)
    }

    pub fn update_edge(&mut self, id: &str, patch: EdgePatch) -> Result<(), GraphError> {
        self.model.update_edge(id, patch)
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<Edge, GraphError> {
        self.model.delete_edge(id)
    }

    pub fn add_layer(&mut self, name: impl Into<String>) -> Layer {
        self.model.add_layer(name)
    }

    pub fn update_layer(&mut self, id: &str, patch: LayerPatch) -> Result<(), GraphError> {
        self.model.update_layer(id, patch)
    }

    pub fn set_active_layer(&mut self, id: &str) -> Result<(), GraphError> {
        self.model.set_active_layer(id)
    }

    // ── Gestures ────────────────────────────────────────────────────────

    pub fn pointer_down(&mut self, event: PointerEvent) -> bool {
        self.interaction
            .pointer_down(&self.model, &self.viewport, event)
    }

    pub fn pointer_move(&mut self, event: PointerEvent) -> Result<(), GraphError> {
        self.interaction
            .pointer_move(&mut self.model, &mut self.viewport, event)
    }

    pub fn pointer_up(&mut self, event: PointerEvent) -> Result<Option<Edge>, GraphError> {
        self.interaction
            .pointer_up(&mut self.model, &self.viewport, event)
    }

    pub fn complete_connection(&mut self, target_id: &str) -> Result<Option<Edge>, GraphError> {
        self.interaction
            .complete_connection(&mut self.model, target_id)
    }

    pub fn cancel_gesture(&mut self) -> bool {
        self.interaction.cancel()
    }

    pub fn wheel(&mut self, position: Point, delta_y: f32) {
        self.interaction.wheel(&mut self.viewport, position, delta_y);
    }

    pub fn key(&mut self, key: Key) -> Result<Vec<NodeId>, GraphError> {
        if matches!(key, Key::Delete | Key::Backspace)
            && self.simulation.state() == SimulationState::Running
        {
            return Err(GraphError::state(
                "cannot delete nodes while the simulation is running",
            ));
        }
        self.interaction
            .key(&mut self.model, &mut self.viewport, key)
    }

    // ── Viewport ────────────────────────────────────────────────────────

    pub fn zoom_to(&mut self, level: f32) {
        self.viewport.zoom_to(level);
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    pub fn pan(&mut self, delta: Point) {
        self.viewport.pan(delta);
    }

    /// Fits every node into `canvas`; an empty graph resets the view.
    pub fn fit_to_content(&mut self, canvas: Size) {
        match self.model.content_bounds() {
            Some(bounds) => self.viewport.fit_to_content(bounds, canvas),
            None => self.viewport.reset(),
        }
    }

    // ── Derived results ─────────────────────────────────────────────────

    pub fn analyze(&self) -> Result<Vec<Issue>, GraphError> {
        self.ensure_quiescent("analyze")?;
        Ok(analysis::analyze(self.model.nodes(), self.model.edges()))
    }

    /// Computes hierarchical positions and moves every node onto them.
    pub fn auto_layout(&mut self) -> Result<Positions, GraphError> {
        self.ensure_quiescent("lay out")?;
        let positions = layout::auto_layout(self.model.nodes(), &self.config.layout);
        for (id, position) in &positions {
            self.model.update_node(id, NodePatch::position(*position))?;
        }
        info!(nodes = positions.len(); "Auto layout applied");
        Ok(positions)
    }

    pub fn route_edge(&self, edge_id: &str) -> Result<Option<PathDescriptor>, GraphError> {
        let edge = self
            .model
            .edge(edge_id)
            .ok_or_else(|| GraphError::edge_not_found(edge_id))?;
        Ok(layout::route_edge(&self.model, edge, &self.config.routing))
    }

    /// Paths for every edge whose endpoints both exist.
    pub fn routes(&self) -> Vec<(String, PathDescriptor)> {
        self.model
            .edges()
            .filter_map(|edge| {
                layout::route_edge(&self.model, edge, &self.config.routing)
                    .map(|path| (edge.id.clone(), path))
            })
            .collect()
    }

    // ── Simulation ──────────────────────────────────────────────────────

    pub fn simulation(&self) -> &SimulationSession {
        self.simulation.session()
    }

    pub fn start_simulation(&mut self) -> Result<(), GraphError> {
        self.simulation.start(&self.model)
    }

    pub fn step_simulation(&mut self) -> Result<StepOutcome, GraphError> {
        self.simulation.step(&self.model)
    }

    pub fn pause_simulation(&mut self) -> Result<(), GraphError> {
        self.simulation.pause()
    }

    pub fn resume_simulation(&mut self) -> Result<(), GraphError> {
        self.simulation.resume()
    }

    pub fn stop_simulation(&mut self) {
        self.simulation.stop();
    }

    pub fn tick(&mut self, now: Instant) -> Result<Option<StepOutcome>, GraphError> {
        self.simulation.tick(&self.model, now)
    }

    pub fn next_simulation_step(&self) -> Option<Instant> {
        self.simulation.next_due()
    }

    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: VariableValue,
    ) -> Result<(), GraphError> {
        self.simulation.set_variable(name, value)
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<Option<VariableValue>, GraphError> {
        self.simulation.remove_variable(name)
    }

    pub fn toggle_breakpoint(&mut self, node_id: &str) -> Result<bool, GraphError> {
        if self.model.node(node_id).is_none() {
            return Err(GraphError::node_not_found(node_id));
        }
        Ok(self.simulation.toggle_breakpoint(node_id))
    }

    // ── Snapshots ───────────────────────────────────────────────────────

    pub fn export_snapshot(&self) -> Result<Snapshot, GraphError> {
        self.ensure_quiescent("export")?;
        Ok(snapshot::export_snapshot(&self.model))
    }

    /// Replaces the graph with the one in `json`. On error the current
    /// graph and editor state are untouched.
    pub fn import_snapshot(&mut self, json: &str) -> Result<(), Error> {
        self.ensure_quiescent("import")?;
        let model = snapshot::import_snapshot(json)?;
        self.replace_model(model);
        Ok(())
    }

    /// Swaps in a new graph and tears down all state tied to the old one.
    pub fn replace_model(&mut self, model: GraphModel) {
        self.model = model;
        self.viewport.reset();
        self.interaction.reset();
        self.simulation.stop();
        self.simulation.clear_breakpoints();
        info!(name = self.model.metadata().name.as_str(); "Graph replaced");
    }
}
