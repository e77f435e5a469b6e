//! Step-by-step execution of a flow graph.
//!
//! The engine only reads the model: it walks outgoing edges from the
//! current node and records where it has been. Branch choice at a node
//! with several outgoing edges is delegated to a [`ConditionEvaluator`].

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::ir::{Edge, Node, NodeId};
use crate::model::GraphModel;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SimulationState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// A typed simulation variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum VariableValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Object(serde_json::Map<String, serde_json::Value>),
}

pub type Variables = BTreeMap<String, VariableValue>;

/// Read-only view of a simulation run handed to the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSession {
    pub state: SimulationState,
    pub current_node_id: Option<NodeId>,
    pub step: u64,
    pub variables: Variables,
    /// Visited node ids in visit order; revisits appear again.
    pub path: Vec<NodeId>,
    pub breakpoints: BTreeSet<NodeId>,
}

impl SimulationSession {
    pub fn is_running(&self) -> bool {
        self.state == SimulationState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == SimulationState::Paused
    }
}

/// Chooses which outgoing edge a step follows.
///
/// `outgoing` holds the edges leaving `node` in creation order and is never
/// empty. Returning `None` ends the run at `node`.
pub trait ConditionEvaluator {
    fn choose<'e>(
        &self,
        node: &Node,
        outgoing: &[&'e Edge],
        variables: &Variables,
    ) -> Option<&'e Edge>;
}

/// Always follows the first outgoing edge, ignoring `Node::condition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstEdgeWins;

impl ConditionEvaluator for FirstEdgeWins {
    fn choose<'e>(
        &self,
        _node: &Node,
        outgoing: &[&'e Edge],
        _variables: &Variables,
    ) -> Option<&'e Edge> {
        outgoing.first().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Moved to `node_id`; `state` is the state after the move.
    Moved {
        node_id: NodeId,
        state: SimulationState,
    },
    /// The current node has no way forward; the run is over.
    Finished,
}

#[derive(Debug, Clone, Copy)]
struct AutoStep {
    interval: Duration,
    next_due: Option<Instant>,
}

pub struct SimulationEngine {
    session: SimulationSession,
    evaluator: Box<dyn ConditionEvaluator>,
    auto_step: Option<AutoStep>,
}

impl std::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("session", &self.session)
            .field("auto_step", &self.auto_step)
            .finish_non_exhaustive()
    }
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationEngine {
    pub fn new() -> Self {
        Self::with_evaluator(Box::new(FirstEdgeWins))
    }

    pub fn with_evaluator(evaluator: Box<dyn ConditionEvaluator>) -> Self {
        Self {
            session: SimulationSession::default(),
            evaluator,
            auto_step: None,
        }
    }

    pub fn session(&self) -> &SimulationSession {
        &self.session
    }

    pub fn state(&self) -> SimulationState {
        self.session.state
    }

    /// Begins a run at the graph's single flow start node.
    pub fn start(&mut self, model: &GraphModel) -> Result<(), GraphError> {
        if self.session.state != SimulationState::Stopped {
            return Err(GraphError::state("simulation is already started"));
        }
        let starts: Vec<&Node> = model.nodes().filter(|n| n.kind.is_flow_start()).collect();
        let start = match starts.as_slice() {
            [start] => *start,
            [] => return Err(GraphError::state("flow has no start node")),
            many => {
                return Err(GraphError::state(format!(
                    "flow has {} start nodes; exactly one is required",
                    many.len()
                )));
            }
        };

        let breakpoints = std::mem::take(&mut self.session.breakpoints);
        self.session = SimulationSession {
            state: SimulationState::Running,
            current_node_id: Some(start.id.clone()),
            step: 0,
            variables: Variables::new(),
            path: vec![start.id.clone()],
            breakpoints,
        };
        if let Some(auto) = self.auto_step.as_mut() {
            auto.next_due = None;
        }
        info!(start_node:% = start.id; "Simulation started");
        Ok(())
    }

    /// Advances one edge from the current node.
    ///
    /// Arriving at a node without outgoing edges ends the run; arriving at a
    /// breakpoint pauses it.
    pub fn step(&mut self, model: &GraphModel) -> Result<StepOutcome, GraphError> {
        if self.session.state == SimulationState::Stopped {
            return Err(GraphError::state("simulation is not running"));
        }
        let Some(current_id) = self.session.current_node_id.clone() else {
            return Err(GraphError::state("simulation has no current node"));
        };
        let Some(current) = model.node(&current_id) else {
            self.finish();
            return Err(GraphError::node_not_found(current_id));
        };

        let outgoing = live_outgoing(model, &current_id);
        let chosen = if outgoing.is_empty() {
            None
        } else {
            self.evaluator
                .choose(current, &outgoing, &self.session.variables)
        };
        let Some(edge) = chosen else {
            self.finish();
            return Ok(StepOutcome::Finished);
        };

        let next_id = edge.target_node_id.clone();
        self.session.current_node_id = Some(next_id.clone());
        self.session.path.push(next_id.clone());
        self.session.step += 1;
        trace!(node_id:% = next_id, step = self.session.step; "Simulation step");

        if live_outgoing(model, &next_id).is_empty() {
            self.finish();
        } else if self.session.breakpoints.contains(&next_id) {
            self.session.state = SimulationState::Paused;
            self.cancel_pending();
            debug!(node_id:% = next_id; "Breakpoint hit");
        }
        Ok(StepOutcome::Moved {
            node_id: next_id,
            state: self.session.state,
        })
    }

    pub fn pause(&mut self) -> Result<(), GraphError> {
        if self.session.state != SimulationState::Running {
            return Err(GraphError::state("only a running simulation can pause"));
        }
        self.session.state = SimulationState::Paused;
        self.cancel_pending();
        debug!(step = self.session.step; "Simulation paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), GraphError> {
        if self.session.state != SimulationState::Paused {
            return Err(GraphError::state("only a paused simulation can resume"));
        }
        self.session.state = SimulationState::Running;
        debug!(step = self.session.step; "Simulation resumed");
        Ok(())
    }

    /// Clears the run from any state. Breakpoints are kept.
    pub fn stop(&mut self) {
        let breakpoints = std::mem::take(&mut self.session.breakpoints);
        self.session = SimulationSession {
            breakpoints,
            ..SimulationSession::default()
        };
        self.cancel_pending();
        info!("Simulation stopped");
    }

    /// Ends the run in place, keeping its path for inspection.
    fn finish(&mut self) {
        self.session.state = SimulationState::Stopped;
        self.cancel_pending();
        info!(steps = self.session.step; "Simulation finished");
    }

    pub fn set_variable(
        &mut self,
        name: impl Into<String>,
        value: VariableValue,
    ) -> Result<(), GraphError> {
        if self.session.state == SimulationState::Stopped {
            return Err(GraphError::state("variables need a started simulation"));
        }
        self.session.variables.insert(name.into(), value);
        Ok(())
    }

    pub fn remove_variable(&mut self, name: &str) -> Result<Option<VariableValue>, GraphError> {
        if self.session.state == SimulationState::Stopped {
            return Err(GraphError::state("variables need a started simulation"));
        }
        Ok(self.session.variables.remove(name))
    }

    pub fn add_breakpoint(&mut self, node_id: impl Into<NodeId>) {
        self.session.breakpoints.insert(node_id.into());
    }

    pub fn remove_breakpoint(&mut self, node_id: &str) -> bool {
        self.session.breakpoints.remove(node_id)
    }

    /// Returns whether `node_id` is a breakpoint afterwards.
    pub fn toggle_breakpoint(&mut self, node_id: &str) -> bool {
        if self.session.breakpoints.remove(node_id) {
            false
        } else {
            self.session.breakpoints.insert(node_id.to_string());
            true
        }
    }

    pub fn clear_breakpoints(&mut self) {
        self.session.breakpoints.clear();
    }

    // ── Auto-step ───────────────────────────────────────────────────────

    /// Steps automatically every `interval` once the host calls [`Self::tick`];
    /// `None` turns auto-stepping off.
    pub fn enable_auto_step(&mut self, interval: Option<Duration>) {
        self.auto_step = interval.map(|interval| AutoStep {
            interval,
            next_due: None,
        });
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.auto_step.and_then(|auto| auto.next_due)
    }

    /// Drives the auto-step schedule. The first tick of a running session
    /// schedules a step one interval later; a later tick at or past the
    /// due time performs it.
    pub fn tick(
        &mut self,
        model: &GraphModel,
        now: Instant,
    ) -> Result<Option<StepOutcome>, GraphError> {
        let Some(auto) = self.auto_step else {
            return Ok(None);
        };
        if self.session.state != SimulationState::Running {
            self.cancel_pending();
            return Ok(None);
        }
        match auto.next_due {
            Some(due) if now >= due => {
                let outcome = self.step(model)?;
                if self.session.state == SimulationState::Running {
                    self.schedule(now + auto.interval);
                }
                Ok(Some(outcome))
            }
            Some(_) => Ok(None),
            None => {
                self.schedule(now + auto.interval);
                Ok(None)
            }
        }
    }

    fn schedule(&mut self, due: Instant) {
        if let Some(auto) = self.auto_step.as_mut() {
            auto.next_due = Some(due);
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(auto) = self.auto_step.as_mut() {
            auto.next_due = None;
        }
    }
}

fn live_outgoing<'a>(model: &'a GraphModel, node_id: &'a str) -> Vec<&'a Edge> {
    model
        .outgoing_edges(node_id)
        .filter(|edge| model.node(&edge.target_node_id).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::ir::{EdgeKind, FlowEdgeKind, FlowKind, NodeKind};

    fn flow(kinds: &[FlowKind]) -> (GraphModel, Vec<NodeId>) {
        let mut model = GraphModel::new("flow");
        let ids: Vec<NodeId> = kinds
            .iter()
            .map(|kind| model.add_node(NodeKind::Flow(*kind), Point::ORIGIN).id)
            .collect();
        (model, ids)
    }

    fn connect(model: &mut GraphModel, from: &str, to: &str) {
        model
            .add_edge(from, to, EdgeKind::Flow(FlowEdgeKind::Default))
            .unwrap();
    }

    fn linear() -> (GraphModel, Vec<NodeId>) {
        let (mut model, ids) = flow(&[FlowKind::Start, FlowKind::Process, FlowKind::End]);
        connect(&mut model, &ids[0], &ids[1]);
        connect(&mut model, &ids[1], &ids[2]);
        (model, ids)
    }

    #[test]
    fn linear_flow_runs_to_completion() {
        let (model, ids) = linear();
        let mut engine = SimulationEngine::new();
        engine.start(&model).unwrap();
        engine.step(&model).unwrap();
        engine.step(&model).unwrap();
        assert_eq!(engine.state(), SimulationState::Stopped);
        assert_eq!(engine.session().path, ids);
        assert_eq!(engine.session().step, 2);
    }

    #[test]
    fn start_requires_exactly_one_start_node() {
        let (model, _) = flow(&[FlowKind::Process]);
        let mut engine = SimulationEngine::new();
        assert!(matches!(engine.start(&model), Err(GraphError::State(_))));
        assert_eq!(engine.state(), SimulationState::Stopped);

        let (model, _) = flow(&[FlowKind::Start, FlowKind::Start]);
        assert!(matches!(engine.start(&model), Err(GraphError::State(_))));
    }

    #[test]
    fn step_while_stopped_is_a_state_error() {
        let (model, _) = linear();
        let mut engine = SimulationEngine::new();
        assert!(matches!(engine.step(&model), Err(GraphError::State(_))));
    }

    #[test]
    fn first_edge_in_creation_order_wins() {
        let (mut model, ids) = flow(&[
            FlowKind::Start,
            FlowKind::Decision,
            FlowKind::End,
            FlowKind::End,
        ]);
        connect(&mut model, &ids[0], &ids[1]);
        connect(&mut model, &ids[1], &ids[3]);
        connect(&mut model, &ids[1], &ids[2]);
        let mut engine = SimulationEngine::new();
        engine.start(&model).unwrap();
        engine.step(&model).unwrap();
        let outcome = engine.step(&model).unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Moved {
                node_id: ids[3].clone(),
                state: SimulationState::Stopped
            }
        );
    }

    struct LastEdge;

    impl ConditionEvaluator for LastEdge {
        fn choose<'e>(&self, _: &Node, outgoing: &[&'e Edge], _: &Variables) -> Option<&'e Edge> {
            outgoing.last().copied()
        }
    }

    #[test]
    fn custom_evaluator_picks_the_branch() {
        let (mut model, ids) = flow(&[FlowKind::Start, FlowKind::End, FlowKind::End]);
        connect(&mut model, &ids[0], &ids[1]);
        connect(&mut model, &ids[0], &ids[2]);
        let mut engine = SimulationEngine::with_evaluator(Box::new(LastEdge));
        engine.start(&model).unwrap();
        engine.step(&model).unwrap();
        assert_eq!(engine.session().current_node_id.as_deref(), Some(ids[2].as_str()));
    }

    #[test]
    fn breakpoint_pauses_and_resume_continues() {
        let (mut model, ids) = flow(&[
            FlowKind::Start,
            FlowKind::Process,
            FlowKind::Process,
            FlowKind::End,
        ]);
        connect(&mut model, &ids[0], &ids[1]);
        connect(&mut model, &ids[1], &ids[2]);
        connect(&mut model, &ids[2], &ids[3]);
        let mut engine = SimulationEngine::new();
        engine.add_breakpoint(ids[1].clone());
        engine.start(&model).unwrap();
        engine.step(&model).unwrap();
        assert_eq!(engine.state(), SimulationState::Paused);

        // stepping while paused stays paused
        engine.step(&model).unwrap();
        assert_eq!(engine.state(), SimulationState::Paused);
        engine.resume().unwrap();
        assert_eq!(engine.state(), SimulationState::Running);
        engine.step(&model).unwrap();
        assert_eq!(engine.state(), SimulationState::Stopped);
        assert_eq!(engine.session().path, ids);
    }

    #[test]
    fn pause_and_resume_keep_position() {
        let (model, ids) = linear();
        let mut engine = SimulationEngine::new();
        engine.start(&model).unwrap();
        engine.pause().unwrap();
        assert!(engine.session().is_paused());
        assert!(matches!(engine.pause(), Err(GraphError::State(_))));
        engine.resume().unwrap();
        assert!(engine.session().is_running());
        assert_eq!(engine.session().path, vec![ids[0].clone()]);
        assert!(matches!(engine.resume(), Err(GraphError::State(_))));
    }

    #[test]
    fn stop_resets_session_but_keeps_breakpoints() {
        let (model, ids) = linear();
        let mut engine = SimulationEngine::new();
        engine.add_breakpoint(ids[2].clone());
        engine.start(&model).unwrap();
        engine
            .set_variable("retries", VariableValue::Number(3.0))
            .unwrap();
        engine.step(&model).unwrap();
        engine.stop();
        let session = engine.session();
        assert_eq!(session.state, SimulationState::Stopped);
        assert!(session.current_node_id.is_none());
        assert!(session.path.is_empty());
        assert!(session.variables.is_empty());
        assert_eq!(session.step, 0);
        assert!(session.breakpoints.contains(&ids[2]));
    }

    #[test]
    fn variables_need_a_started_session() {
        let (model, _) = linear();
        let mut engine = SimulationEngine::new();
        assert!(engine
            .set_variable("flag", VariableValue::Boolean(true))
            .is_err());
        engine.start(&model).unwrap();
        engine
            .set_variable("flag", VariableValue::Boolean(true))
            .unwrap();
        assert_eq!(
            engine.remove_variable("flag").unwrap(),
            Some(VariableValue::Boolean(true))
        );
        assert_eq!(engine.remove_variable("flag").unwrap(), None);
    }

    #[test]
    fn variable_values_serialize_with_type_tag() {
        let json = serde_json::to_string(&VariableValue::Number(2.5)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":2.5}"#);
    }

    #[test]
    fn deleted_current_node_ends_the_run() {
        let (mut model, ids) = linear();
        let mut engine = SimulationEngine::new();
        engine.start(&model).unwrap();
        model.delete_node(&ids[0]).unwrap();
        assert!(matches!(
            engine.step(&model),
            Err(GraphError::NotFound { .. })
        ));
        assert_eq!(engine.state(), SimulationState::Stopped);
    }

    #[test]
    fn auto_step_follows_the_schedule() {
        let (model, ids) = linear();
        let mut engine = SimulationEngine::new();
        let interval = Duration::from_millis(500);
        engine.enable_auto_step(Some(interval));
        engine.start(&model).unwrap();

        let t0 = Instant::now();
        assert_eq!(engine.tick(&model, t0).unwrap(), None);
        assert_eq!(engine.next_due(), Some(t0 + interval));
        assert_eq!(engine.tick(&model, t0 + Duration::from_millis(100)).unwrap(), None);

        let outcome = engine.tick(&model, t0 + interval).unwrap();
        assert!(matches!(outcome, Some(StepOutcome::Moved { .. })));
        assert_eq!(engine.next_due(), Some(t0 + interval * 2));

        engine.pause().unwrap();
        assert_eq!(engine.next_due(), None);
        assert_eq!(engine.tick(&model, t0 + interval * 3).unwrap(), None);
        assert_eq!(engine.session().path.len(), 2);
        assert_eq!(engine.session().path[1], ids[1]);
    }

    #[test]
    fn stop_cancels_pending_auto_step() {
        let (model, _) = linear();
        let mut engine = SimulationEngine::new();
        engine.enable_auto_step(Some(Duration::from_millis(10)));
        engine.start(&model).unwrap();
        let t0 = Instant::now();
        engine.tick(&model, t0).unwrap();
        assert!(engine.next_due().is_some());
        engine.stop();
        assert_eq!(engine.next_due(), None);
        assert_eq!(engine.tick(&model, t0 + Duration::from_secs(1)).unwrap(), None);
        assert!(engine.session().path.is_empty());
    }
}
