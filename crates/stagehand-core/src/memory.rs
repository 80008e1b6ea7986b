//! In-memory collaborators for hosts without a document layer, and for tests.

use crate::document::{CanvasAdapter, Command, CommandError, CommandResult, Document, PropertyChange};
use crate::geometry::{Axis, GeometricData};
use crate::tree::{NodeId, NodeTree, PropertyHandle, PropertyName, PropertyValue, SelectedNodes};
use kurbo::Vec2;
use std::collections::HashMap;
use uuid::Uuid;

/// A node stored by [`SceneTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub is_control: bool,
    pub visible: bool,
    pub position: Vec2,
    pub size: Vec2,
    pub scale: Vec2,
    /// Rotation in degrees.
    pub angle: f64,
    /// Pivot as a share of size.
    pub pivot: Vec2,
}

impl SceneNode {
    /// A visible control with unit scale, no rotation and a top-left pivot.
    pub fn control(name: impl Into<String>, position: Vec2, size: Vec2) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: Vec::new(),
            is_control: true,
            visible: true,
            position,
            size,
            scale: Vec2::new(1.0, 1.0),
            angle: 0.0,
            pivot: Vec2::ZERO,
        }
    }

    /// A non-control node that hosts root controls.
    pub fn container(name: impl Into<String>) -> Self {
        Self {
            is_control: false,
            ..Self::control(name, Vec2::ZERO, Vec2::ZERO)
        }
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_angle(mut self, degrees: f64) -> Self {
        self.angle = degrees;
        self
    }

    pub fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    fn local_geometric_data(&self) -> GeometricData {
        GeometricData::local(self.position, self.size, self.scale, self.angle.to_radians(), self.pivot)
    }

    fn value(&self, name: PropertyName) -> PropertyValue {
        match name {
            PropertyName::Size => PropertyValue::Vec2(self.size),
            PropertyName::Position => PropertyValue::Vec2(self.position),
            PropertyName::Angle => PropertyValue::Float(self.angle),
            PropertyName::Pivot => PropertyValue::Vec2(self.pivot),
        }
    }
}

/// Scene graph stored in a hash map.
#[derive(Debug, Clone, Default)]
pub struct SceneTree {
    nodes: HashMap<NodeId, SceneNode>,
    displayed: Vec<NodeId>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a top-level node.
    pub fn add_root(&mut self, node: SceneNode) -> NodeId {
        let id = Uuid::new_v4();
        self.nodes.insert(id, SceneNode { parent: None, ..node });
        id
    }

    /// Insert a node as the front-most child of `parent`.
    pub fn add_child(&mut self, parent: NodeId, node: SceneNode) -> Option<NodeId> {
        let id = Uuid::new_v4();
        self.nodes.get_mut(&parent)?.children.push(id);
        self.nodes.insert(id, SceneNode { parent: Some(parent), children: Vec::new(), ..node });
        Some(id)
    }

    /// Host a root control in a fresh container and display it.
    pub fn add_displayed_root(&mut self, node: SceneNode) -> NodeId {
        let container = self.add_root(SceneNode::container("container"));
        let id = Uuid::new_v4();
        if let Some(parent) = self.nodes.get_mut(&container) {
            parent.children.push(id);
        }
        self.nodes.insert(id, SceneNode { parent: Some(container), children: Vec::new(), ..node });
        self.displayed.push(id);
        id
    }

    /// Remove a node and its subtree.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(node) = self.nodes.remove(&id) else {
            return false;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }
        self.displayed.retain(|&d| d != id);
        for child in node.children {
            self.remove(child);
        }
        true
    }

    pub fn set_displayed(&mut self, roots: Vec<NodeId>) {
        self.displayed = roots;
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(&id)
    }

    fn validate(&self, change: &PropertyChange) -> CommandResult {
        let handle = change.property;
        let node = self.nodes.get(&handle.node).ok_or(CommandError::NodeNotFound(handle.node))?;
        if !node.is_control {
            return Err(CommandError::PropertyNotFound { node: handle.node, property: handle.name });
        }
        let matches = match handle.name {
            PropertyName::Angle => change.value.as_f64().is_some(),
            _ => change.value.as_vec2().is_some(),
        };
        if !matches {
            return Err(CommandError::TypeMismatch(handle.name));
        }
        Ok(())
    }

    fn apply(&mut self, change: &PropertyChange) {
        let Some(node) = self.nodes.get_mut(&change.property.node) else {
            return;
        };
        match (change.property.name, change.value) {
            (PropertyName::Size, PropertyValue::Vec2(v)) => node.size = v,
            (PropertyName::Position, PropertyValue::Vec2(v)) => node.position = v,
            (PropertyName::Pivot, PropertyValue::Vec2(v)) => node.pivot = v,
            (PropertyName::Angle, PropertyValue::Float(f)) => node.angle = f,
            _ => {}
        }
    }
}

impl NodeTree for SceneTree {
    fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id)?.parent
    }

    fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes.get(&id).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn is_control(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.is_control)
    }

    fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.visible)
    }

    fn geometric_data(&self, id: NodeId) -> Option<GeometricData> {
        let node = self.nodes.get(&id)?;
        let local = node.local_geometric_data();
        match node.parent {
            Some(parent) => Some(local.in_parent(&self.geometric_data(parent)?)),
            None => Some(local),
        }
    }

    fn local_geometric_data(&self, id: NodeId) -> Option<GeometricData> {
        self.nodes.get(&id).map(SceneNode::local_geometric_data)
    }

    fn find_property(&self, id: NodeId, name: PropertyName) -> Option<PropertyHandle> {
        self.nodes
            .get(&id)
            .filter(|n| n.is_control)
            .map(|_| PropertyHandle { node: id, name })
    }

    fn property_value(&self, handle: &PropertyHandle) -> Option<PropertyValue> {
        self.nodes
            .get(&handle.node)
            .filter(|n| n.is_control)
            .map(|n| n.value(handle.name))
    }

    fn displayed_root_controls(&self) -> Vec<NodeId> {
        self.displayed.iter().copied().filter(|id| self.nodes.contains_key(id)).collect()
    }
}

/// A [`Document`] over a [`SceneTree`] that applies commands immediately and
/// records what it was asked to do.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    pub tree: SceneTree,
    selection: SelectedNodes,
    guides: HashMap<(NodeId, Axis), Vec<f64>>,
    /// Every command applied, in order.
    pub executed: Vec<Command>,
    /// Labels of closed batches.
    pub batches: Vec<String>,
    open_batch: Option<String>,
    pub can_update_all: bool,
}

impl MemoryDocument {
    pub fn new(tree: SceneTree) -> Self {
        Self { tree, can_update_all: true, ..Default::default() }
    }

    pub fn set_guides(&mut self, root: NodeId, axis: Axis, values: Vec<f64>) {
        self.guides.insert((root, axis), values);
    }

    /// Label of the batch currently open, if any.
    pub fn open_batch(&self) -> Option<&str> {
        self.open_batch.as_deref()
    }
}

impl Document for MemoryDocument {
    fn tree(&self) -> &dyn NodeTree {
        &self.tree
    }

    fn selection(&self) -> SelectedNodes {
        self.selection.clone()
    }

    fn set_selection(&mut self, selection: SelectedNodes) {
        self.selection = selection;
    }

    fn axis_guides(&self, root: NodeId, axis: Axis) -> Vec<f64> {
        self.guides.get(&(root, axis)).cloned().unwrap_or_default()
    }

    fn begin_batch(&mut self, label: &str) {
        if let Some(previous) = self.open_batch.replace(label.to_string()) {
            log::warn!("Batch '{}' replaced by '{}' before it was closed", previous, label);
        }
    }

    fn end_batch(&mut self) {
        if let Some(label) = self.open_batch.take() {
            self.batches.push(label);
        }
    }

    fn exec(&mut self, command: Command) -> CommandResult {
        let changes = command.changes();
        for change in &changes {
            self.tree.validate(change)?;
        }
        for change in &changes {
            self.tree.apply(change);
        }
        self.executed.push(command);
        Ok(())
    }

    fn set_can_update_all(&mut self, can_update: bool) {
        self.can_update_all = can_update;
    }
}

/// A [`CanvasAdapter`] that records scene movements.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryCanvas {
    pub scale: f64,
    pub scene_offset: Vec2,
    pub root_frame_size: Option<Vec2>,
    pub counterpoise: Vec2,
    pub centralize_requests: usize,
}

impl MemoryCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scale(scale: f64) -> Self {
        Self { scale, ..Self::default() }
    }
}

impl Default for MemoryCanvas {
    fn default() -> Self {
        Self {
            scale: 1.0,
            scene_offset: Vec2::ZERO,
            root_frame_size: None,
            counterpoise: Vec2::ZERO,
            centralize_requests: 0,
        }
    }
}

impl CanvasAdapter for MemoryCanvas {
    fn scale(&self) -> f64 {
        self.scale
    }

    fn move_scene(&mut self, delta: Vec2, _clamp: bool) {
        self.scene_offset += delta;
    }

    fn try_centralize_scene(&mut self) {
        self.centralize_requests += 1;
    }

    fn set_root_frame_size(&mut self, size: Vec2) {
        self.root_frame_size = Some(size);
    }

    fn shift_counterpoise(&mut self, delta: Vec2) {
        self.counterpoise += delta;
    }
}
