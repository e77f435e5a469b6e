//! Pointer and keyboard gesture state machine.
//!
//! One gesture is active at a time. Pointer positions arrive in screen
//! space and are converted through the viewport before they touch the
//! model. Drag and pan apply incrementally on every move, so releasing
//! the pointer only has to commit a pending connection.

use log::{debug, trace};

use crate::config::InteractionConfig;
use crate::error::GraphError;
use crate::geometry::Point;
use crate::ir::{Edge, NodeId, NodePatch};
use crate::model::GraphModel;
use crate::viewport::ViewportController;

#[derive(Debug, Clone, PartialEq)]
pub enum GestureState {
    Idle,
    DraggingNode {
        node_id: NodeId,
        /// Pointer position relative to the node origin, in world space.
        grab_offset: Point,
    },
    PanningCanvas {
        /// Last pointer position, in screen space.
        last_pointer: Point,
    },
    ConnectingEdge {
        source_id: NodeId,
        /// Free end of the rubber band, in world space.
        rubber_band: Point,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };

    /// Ctrl on most platforms, Cmd on macOS.
    fn starts_connection(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Screen-space position.
    pub position: Point,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(position: Point) -> Self {
        Self {
            position,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_modifiers(position: Point, modifiers: Modifiers) -> Self {
        Self {
            position,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Delete,
    Backspace,
    Char(char),
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    state: GestureState,
    selection: Option<NodeId>,
    config: InteractionConfig,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(InteractionConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            state: GestureState::Idle,
            selection: None,
            config,
        }
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == GestureState::Idle
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn select(&mut self, node_id: Option<NodeId>) {
        self.selection = node_id;
    }

    /// Source node and free end of the connection being drawn.
    pub fn rubber_band(&self) -> Option<(&str, Point)> {
        match &self.state {
            GestureState::ConnectingEdge {
                source_id,
                rubber_band,
            } => Some((source_id.as_str(), *rubber_band)),
            _ => None,
        }
    }

    /// Starts a gesture. Ignored unless idle; returns whether a gesture began.
    pub fn pointer_down(
        &mut self,
        model: &GraphModel,
        viewport: &ViewportController,
        event: PointerEvent,
    ) -> bool {
        if !self.is_idle() {
            trace!(state:? = self.state; "Pointer down ignored mid-gesture");
            return false;
        }
        let world = viewport.screen_to_world(event.position);
        let next = match model.node_at(world) {
            Some(node) => {
                self.selection = Some(node.id.clone());
                if event.modifiers.starts_connection() {
                    GestureState::ConnectingEdge {
                        source_id: node.id.clone(),
                        rubber_band: world,
                    }
                } else if model.is_node_locked(&node.id) {
                    GestureState::Idle
                } else {
                    GestureState::DraggingNode {
                        node_id: node.id.clone(),
                        grab_offset: world - node.position,
                    }
                }
            }
            None => {
                self.selection = None;
                GestureState::PanningCanvas {
                    last_pointer: event.position,
                }
            }
        };
        self.state = next;
        debug!(state:? = self.state; "Gesture started");
        !self.is_idle()
    }

    pub fn pointer_move(
        &mut self,
        model: &mut GraphModel,
        viewport: &mut ViewportController,
        event: PointerEvent,
    ) -> Result<(), GraphError> {
        match &mut self.state {
            GestureState::Idle => Ok(()),
            GestureState::DraggingNode {
                node_id,
                grab_offset,
            } => {
                let world = viewport.screen_to_world(event.position);
                model.update_node(node_id, NodePatch::position(world - *grab_offset))
            }
            GestureState::PanningCanvas { last_pointer } => {
                viewport.pan(event.position - *last_pointer);
                *last_pointer = event.position;
                Ok(())
            }
            GestureState::ConnectingEdge { rubber_band, .. } => {
                *rubber_band = viewport.screen_to_world(event.position);
                Ok(())
            }
        }
    }

    /// Ends the active gesture. Returns the edge created when a connection
    /// is released over a node other than its source.
    pub fn pointer_up(
        &mut self,
        model: &mut GraphModel,
        viewport: &ViewportController,
        event: PointerEvent,
    ) -> Result<Option<Edge>, GraphError> {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        let GestureState::ConnectingEdge { source_id, .. } = state else {
            if state != GestureState::Idle {
                debug!("Gesture ended");
            }
            return Ok(None);
        };
        let world = viewport.screen_to_world(event.position);
        let target_id = model.node_at(world).map(|node| node.id.clone());
        match target_id {
            Some(target_id) => connect(model, &source_id, &target_id),
            None => {
                debug!(source:% = source_id; "Connection abandoned");
                Ok(None)
            }
        }
    }

    /// Completes the pending connection onto `target_id` without a pointer
    /// position, e.g. from a node picker.
    pub fn complete_connection(
        &mut self,
        model: &mut GraphModel,
        target_id: &str,
    ) -> Result<Option<Edge>, GraphError> {
        let GestureState::ConnectingEdge { source_id, .. } = &self.state else {
            return Err(GraphError::state("no connection is being drawn"));
        };
        if model.node(target_id).is_none() {
            return Err(GraphError::node_not_found(target_id));
        }
        let source_id = source_id.clone();
        self.state = GestureState::Idle;
        connect(model, &source_id, target_id)
    }

    /// Abandons the active gesture; returns whether one was active.
    pub fn cancel(&mut self) -> bool {
        let was_active = !self.is_idle();
        self.state = GestureState::Idle;
        was_active
    }

    /// Wheel zoom around the pointer. Negative `delta_y` (wheel up) zooms in.
    pub fn wheel(&self, viewport: &mut ViewportController, position: Point, delta_y: f32) {
        if delta_y == 0.0 || delta_y.is_nan() {
            return;
        }
        let step = self.config.wheel_zoom_step * -delta_y.signum();
        viewport.zoom_at(viewport.zoom() + step, position);
    }

    /// Keyboard shortcuts. Returns the ids of nodes removed by a delete.
    pub fn key(
        &mut self,
        model: &mut GraphModel,
        viewport: &mut ViewportController,
        key: Key,
    ) -> Result<Vec<NodeId>, GraphError> {
        match key {
            Key::Escape => {
                self.cancel();
            }
            Key::Delete | Key::Backspace => {
                if self.is_idle()
                    && let Some(selected) = self.selection.take()
                {
                    return model.delete_node(&selected);
                }
            }
            Key::Char('+') | Key::Char('=') => viewport.zoom_in(),
            Key::Char('-') => viewport.zoom_out(),
            Key::Char('0') => viewport.zoom_to(100.0),
            Key::Char(_) => {}
        }
        Ok(Vec::new())
    }

    /// Drops gesture and selection, e.g. after the graph was replaced.
    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
        self.selection = None;
    }
}

fn connect(
    model: &mut GraphModel,
    source_id: &str,
    target_id: &str,
) -> Result<Option<Edge>, GraphError> {
    if source_id == target_id {
        debug!(source:% = source_id; "Connection onto its own source ignored");
        return Ok(None);
    }
    let kind = model
        .node(source_id)
        .map(|node| node.kind.default_edge_kind())
        .ok_or_else(|| GraphError::node_not_found(source_id))?;
    model.add_edge(source_id, target_id, kind).map(Some)
}
