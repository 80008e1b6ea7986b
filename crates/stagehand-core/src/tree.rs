//! Read-only view over the externally owned scene graph.
//!
//! The editor never owns nodes. It keeps [`NodeId`]s across events and
//! re-resolves them through a [`NodeTree`] every time, so a node deleted
//! mid-gesture simply stops resolving.

use crate::geometry::GeometricData;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a node in the scene graph.
pub type NodeId = Uuid;

/// Editable properties the transform engine writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyName {
    Size,
    Position,
    /// Rotation in degrees.
    Angle,
    /// Pivot as a share of size.
    Pivot,
}

impl PropertyName {
    pub fn as_str(self) -> &'static str {
        match self {
            PropertyName::Size => "size",
            PropertyName::Position => "position",
            PropertyName::Angle => "angle",
            PropertyName::Pivot => "pivot",
        }
    }
}

/// A write target for commands. Carries no value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyHandle {
    pub node: NodeId,
    pub name: PropertyName,
}

/// Value stored in or written to a property.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Vec2(Vec2),
    Float(f64),
}

impl PropertyValue {
    pub fn as_vec2(&self) -> Option<Vec2> {
        match self {
            PropertyValue::Vec2(v) => Some(*v),
            PropertyValue::Float(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Vec2(_) => None,
        }
    }
}

/// The current selection: an insertion-ordered set of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedNodes {
    nodes: Vec<NodeId>,
}

impl SelectedNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Insert a node. Returns false if it was already selected.
    pub fn insert(&mut self, id: NodeId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.nodes.push(id);
        true
    }

    /// Remove a node. Returns false if it was not selected.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|&n| n != id);
        before != self.nodes.len()
    }

    pub fn retain(&mut self, f: impl FnMut(&NodeId) -> bool) {
        self.nodes.retain(f);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Most recently inserted node.
    pub fn last(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}

impl FromIterator<NodeId> for SelectedNodes {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut selection = SelectedNodes::new();
        for id in iter {
            selection.insert(id);
        }
        selection
    }
}

/// Read-only access to the scene graph.
pub trait NodeTree {
    /// Whether the id still resolves to a live node.
    fn contains(&self, id: NodeId) -> bool;

    fn parent(&self, id: NodeId) -> Option<NodeId>;

    /// Children in z-order (back to front).
    fn children(&self, id: NodeId) -> Vec<NodeId>;

    /// Whether the node is backed by a visual control. Containers holding
    /// root controls are nodes but not controls.
    fn is_control(&self, id: NodeId) -> bool;

    /// Visible and not hidden by the editor.
    fn is_visible(&self, id: NodeId) -> bool;

    /// World-space frame.
    fn geometric_data(&self, id: NodeId) -> Option<GeometricData>;

    /// Frame relative to the parent.
    fn local_geometric_data(&self, id: NodeId) -> Option<GeometricData>;

    fn find_property(&self, id: NodeId, name: PropertyName) -> Option<PropertyHandle>;

    fn property_value(&self, handle: &PropertyHandle) -> Option<PropertyValue>;

    /// Root controls currently shown on the canvas, in display order.
    fn displayed_root_controls(&self) -> Vec<NodeId>;

    fn is_point_inside(&self, id: NodeId, point: Point) -> bool {
        self.geometric_data(id).is_some_and(|gd| gd.contains(point))
    }

    fn vec2_value(&self, handle: &PropertyHandle) -> Option<Vec2> {
        self.property_value(handle).and_then(|v| v.as_vec2())
    }

    fn float_value(&self, handle: &PropertyHandle) -> Option<f64> {
        self.property_value(handle).and_then(|v| v.as_f64())
    }

    /// A control whose parent is a non-control container.
    fn is_root_control(&self, id: NodeId) -> bool {
        self.is_control(id) && self.parent(id).is_some_and(|p| !self.is_control(p))
    }

    /// Strict ancestors that are controls, nearest first.
    fn control_ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut ancestors = Vec::new();
        let mut current = self.parent(id);
        while let Some(node) = current {
            if !self.is_control(node) {
                break;
            }
            ancestors.push(node);
            current = self.parent(node);
        }
        ancestors
    }
}
