//! Collaborators the editor core talks to: the document and the canvas.
//!
//! The core never mutates stored state directly. It builds [`Command`]
//! payloads and hands them to a [`Document`], which owns commit and undo.

use crate::geometry::Axis;
use crate::tree::{NodeId, NodeTree, PropertyHandle, PropertyName, PropertyValue, SelectedNodes};
use kurbo::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors a document may report when applying a command.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Property '{}' not found on node {node}", .property.as_str())]
    PropertyNotFound { node: NodeId, property: PropertyName },
    #[error("Value type does not match property '{}'", .0.as_str())]
    TypeMismatch(PropertyName),
}

/// Result type for command execution.
pub type CommandResult = Result<(), CommandError>;

/// A new value for one property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: PropertyHandle,
    pub value: PropertyValue,
}

impl PropertyChange {
    pub fn new(property: PropertyHandle, value: PropertyValue) -> Self {
        Self { property, value }
    }

    pub fn vec2(property: PropertyHandle, value: Vec2) -> Self {
        Self::new(property, PropertyValue::Vec2(value))
    }

    pub fn float(property: PropertyHandle, value: f64) -> Self {
        Self::new(property, PropertyValue::Float(value))
    }
}

/// Command payloads produced by the transform engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Independent property edits applied as one step.
    ChangeProperties(Vec<PropertyChange>),
    /// Size and position of one node changed by a resize.
    Resize { size: PropertyChange, position: PropertyChange },
    /// Pivot and position of one node changed by a pivot move.
    ChangePivot { pivot: PropertyChange, position: PropertyChange },
}

impl Command {
    /// Every property edit carried by the command.
    pub fn changes(&self) -> Vec<PropertyChange> {
        match self {
            Command::ChangeProperties(changes) => changes.clone(),
            Command::Resize { size, position } => vec![*size, *position],
            Command::ChangePivot { pivot, position } => vec![*pivot, *position],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Command::ChangeProperties(_) => "change properties",
            Command::Resize { .. } => "resize",
            Command::ChangePivot { .. } => "change pivot",
        }
    }
}

/// The document layer: tree access, selection state, guides and command execution.
pub trait Document {
    fn tree(&self) -> &dyn NodeTree;

    fn selection(&self) -> SelectedNodes;

    fn set_selection(&mut self, selection: SelectedNodes);

    /// User guides of a root control on one axis, in root control coordinates.
    fn axis_guides(&self, root: NodeId, axis: Axis) -> Vec<f64>;

    fn begin_batch(&mut self, label: &str);

    fn end_batch(&mut self);

    fn exec(&mut self, command: Command) -> CommandResult;

    /// Whether the document may refresh every property and style at once.
    /// Disabled for the duration of a transform gesture.
    fn set_can_update_all(&mut self, _can_update: bool) {}

    /// Selected nodes that still resolve to controls.
    fn selected_controls(&self) -> Vec<NodeId> {
        let tree = self.tree();
        self.selection().iter().filter(|&id| tree.is_control(id)).collect()
    }
}

/// The virtual canvas hosting the displayed root controls.
pub trait CanvasAdapter {
    /// Current zoom of the canvas.
    fn scale(&self) -> f64;

    /// Move the scene by a screen-space delta.
    fn move_scene(&mut self, delta: Vec2, clamp: bool);

    /// Re-center the scene if it drifted out of view.
    fn try_centralize_scene(&mut self);

    /// Resize the background frame that hosts a root control.
    fn set_root_frame_size(&mut self, size: Vec2);

    /// Shift the anchor that counter-balances a root control's pivot.
    fn shift_counterpoise(&mut self, delta: Vec2);
}
