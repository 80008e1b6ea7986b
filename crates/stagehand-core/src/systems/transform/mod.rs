//! Move, resize, rotate and pivot gestures with magnet snapping.
//!
//! Every positional edit is floored to whole units and the cut-off fraction
//! is banked in a remainder that is fed back into the next event, so slow
//! drags still add up.

mod resize;

use super::{DragState, EditorEvent, EditorSystem, SystemContext, SystemOrder};
use crate::document::{Command, Document, PropertyChange};
use crate::geometry::{component, component_mut, div, mul, quantize, quantize_vec, rotate, Axis, GeometricData, TRANSFORM_EPSILON};
use crate::hud::{HudArea, HudAreaInfo};
use crate::input::{InputDevice, InputEvent, InputSource, Key, Phase};
use crate::magnet::{
    create_magnet_lines, extract_matched_lines, guide_in_parent, nearest_line, pivot_lines, MagnetKind, MagnetLineInfo,
    MagnetTargets, GUIDE_SHARES, ROOT_GUIDE_SHARES,
};
use crate::settings::EditorSettings;
use crate::tree::{NodeId, NodeTree, PropertyHandle, PropertyName};
use kurbo::{Point, Vec2};
use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_4, PI};

/// Pointer positions closer than this to the pivot do not rotate.
const ROTATE_DEAD_ZONE: f64 = 15.0;

/// Property handles of the control that owns the active handle.
#[derive(Debug, Clone, Copy)]
struct ActiveProperties {
    size: PropertyHandle,
    position: PropertyHandle,
    angle: PropertyHandle,
    pivot: PropertyHandle,
}

/// A selected control taking part in a move.
#[derive(Debug, Clone, Copy)]
struct MoveInfo {
    node: NodeId,
    position: PropertyHandle,
    parent_gd: GeometricData,
}

/// The transform engine.
#[derive(Debug, Default)]
pub struct TransformSystem {
    active_area: HudArea,
    active_node: Option<NodeId>,
    parent_gd: GeometricData,
    control_gd: GeometricData,
    properties: Option<ActiveProperties>,

    selected: Vec<NodeId>,
    move_infos: Vec<MoveInfo>,
    neighbours: Vec<NodeId>,

    /// Remainder of the active gesture.
    extra_delta: Vec2,
    /// Remainders of the controls that follow the active one.
    extra_delta_per_node: HashMap<NodeId, Vec2>,
    previous_mouse_pos: Point,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Controls that move together in the current gesture.
    pub fn nodes_to_move(&self) -> Vec<NodeId> {
        self.move_infos.iter().map(|info| info.node).collect()
    }

    /// Siblings of the active control that take part in snapping.
    pub fn neighbours(&self) -> &[NodeId] {
        &self.neighbours
    }

    fn is_shift_pressed(cx: &SystemContext) -> bool {
        cx.state.modifiers.shift ^ cx.settings.transform.shift_inverted
    }

    fn can_magnet(cx: &SystemContext) -> bool {
        let settings = &cx.settings.transform;
        settings.can_magnet && cx.canvas.scale() <= settings.max_scale_to_magnet
    }

    /// Resolve frames and property handles of the active control.
    fn resolve_active(&mut self, tree: &dyn NodeTree) {
        self.properties = None;
        let Some(node) = self.active_node else {
            return;
        };
        let parent_gd = tree.parent(node).and_then(|parent| tree.geometric_data(parent));
        let (Some(parent_gd), Some(control_gd)) = (parent_gd, tree.geometric_data(node)) else {
            return;
        };
        if !parent_gd.has_valid_scale() || !control_gd.has_valid_scale() {
            log::debug!("Ignoring {} with a degenerate scale", node);
            return;
        }
        self.parent_gd = parent_gd;
        self.control_gd = control_gd;
        let find = |name| tree.find_property(node, name);
        self.properties = match (
            find(PropertyName::Size),
            find(PropertyName::Position),
            find(PropertyName::Angle),
            find(PropertyName::Pivot),
        ) {
            (Some(size), Some(position), Some(angle), Some(pivot)) => Some(ActiveProperties { size, position, angle, pivot }),
            _ => None,
        };
    }

    /// Snapshot the selection into the move list and find the neighbours.
    fn prepare_drag(&mut self, document: &dyn Document) {
        let tree = document.tree();
        self.selected = document.selected_controls();

        let candidates: Vec<NodeId> = self
            .selected
            .iter()
            .copied()
            .filter(|&id| tree.parent(id).is_some_and(|parent| tree.is_control(parent)))
            .collect();

        self.move_infos = candidates
            .iter()
            .copied()
            .filter(|&id| !tree.control_ancestors(id).iter().any(|a| candidates.contains(a)))
            .filter_map(|node| {
                Some(MoveInfo {
                    node,
                    position: tree.find_property(node, PropertyName::Position)?,
                    parent_gd: tree.geometric_data(tree.parent(node)?)?,
                })
            })
            .collect();

        self.update_neighbours(tree);
    }

    fn update_neighbours(&mut self, tree: &dyn NodeTree) {
        self.neighbours.clear();
        let Some(active) = self.active_node else {
            return;
        };
        let Some(parent) = tree.parent(active).filter(|&p| tree.is_control(p)) else {
            return;
        };
        let ignored: Vec<NodeId> = self.selected.iter().copied().filter(|&id| tree.parent(id) == Some(parent)).collect();
        self.neighbours = tree.children(parent).into_iter().filter(|child| !ignored.contains(child)).collect();
    }

    /// Snap targets for the active control, expressed in `parent_gd`.
    fn magnet_targets(&self, document: &dyn Document, settings: &EditorSettings, parent_gd: &GeometricData, kind: MagnetKind) -> MagnetTargets {
        let tree = document.tree();
        let Some(active) = self.active_node else {
            return MagnetTargets::default();
        };

        let parent_is_control = tree.parent(active).is_some_and(|p| tree.is_control(p));
        let neighbours = self
            .neighbours
            .iter()
            .filter_map(|&n| tree.local_geometric_data(n))
            .map(|gd| gd.aabb())
            .collect();

        let mut guides = [Vec::new(), Vec::new()];
        let roots = tree.displayed_root_controls();
        if let ([root], true) = (roots.as_slice(), settings.guides_enabled && parent_gd.angle == 0.0) {
            if let Some(root_gd) = tree.geometric_data(*root) {
                for (slot, axis) in guides.iter_mut().zip(Axis::ALL) {
                    *slot = document
                        .axis_guides(*root, axis)
                        .into_iter()
                        .filter_map(|value| guide_in_parent(value, &root_gd, parent_gd, axis))
                        .collect();
                }
            }
        }

        let guide_shares = if tree.is_root_control(active) { ROOT_GUIDE_SHARES.to_vec() } else { GUIDE_SHARES.to_vec() };
        let children = match kind {
            MagnetKind::Resize => tree
                .children(active)
                .into_iter()
                .filter_map(|c| tree.local_geometric_data(c))
                .map(|gd| gd.aabb())
                .collect(),
            MagnetKind::Move => Vec::new(),
        };

        MagnetTargets {
            parent_size: parent_is_control.then_some(parent_gd.size),
            neighbours,
            guides,
            guide_shares,
            children,
        }
    }

    /// Execute a command and announce every property it touched.
    fn exec(cx: &mut SystemContext, command: Command) {
        let changes = command.changes();
        let label = command.label();
        match cx.document.exec(command) {
            Ok(()) => {
                for change in changes {
                    cx.events.emit(EditorEvent::PropertyChanged {
                        node: change.property.node,
                        property: change.property.name,
                    });
                }
            }
            Err(err) => log::warn!("Failed to {}: {}", label, err),
        }
    }

    fn process_key(&mut self, key: &Key, cx: &mut SystemContext) {
        self.prepare_drag(&*cx.document);
        if self.selected.is_empty() {
            return;
        }
        let settings = &cx.settings.transform;
        let step = if Self::is_shift_pressed(cx) { settings.keyboard_step_extended } else { settings.keyboard_step };
        let delta = match key {
            Key::Left => Vec2::new(-step.x, 0.0),
            Key::Right => Vec2::new(step.x, 0.0),
            Key::Up => Vec2::new(0.0, -step.y),
            Key::Down => Vec2::new(0.0, step.y),
            _ => Vec2::ZERO,
        };
        if delta != Vec2::ZERO {
            self.move_all_selected_controls_by_keyboard(delta, cx);
        }
    }

    fn process_drag(&mut self, point: Point, cx: &mut SystemContext) {
        let delta = cx.state.mouse_delta;
        match self.active_area {
            HudArea::Frame => {
                let can_adjust = Self::can_magnet(cx);
                self.move_all_selected_controls_by_mouse(delta, can_adjust, cx);
            }
            HudArea::Pivot => self.move_pivot(delta, cx),
            HudArea::Rotate => self.rotate_control(point, cx),
            HudArea::None => {}
            _ => {
                let with_pivot = cx.state.modifiers.alt;
                let rateably = cx.state.modifiers.ctrl;
                self.resize_control(delta, with_pivot, rateably, cx);
            }
        }
    }

    /// Move by a screen-space axis-aligned step, without snapping.
    fn move_all_selected_controls_by_keyboard(&mut self, delta: Vec2, cx: &mut SystemContext) {
        let tree = cx.document.tree();
        let changes: Vec<PropertyChange> = self
            .move_infos
            .iter()
            .filter_map(|info| {
                let original = tree.vec2_value(&info.position)?;
                Some(PropertyChange::vec2(info.position, original + rotate_vector_for_move(delta, info.parent_gd.angle)))
            })
            .collect();
        if !changes.is_empty() {
            Self::exec(cx, Command::ChangeProperties(changes));
        }
    }

    /// Move the selection by a screen-space pointer delta.
    ///
    /// When snapping is allowed the control under the active handle is
    /// adjusted first and the others follow by the delta it actually took.
    fn move_all_selected_controls_by_mouse(&mut self, mouse_delta: Vec2, can_adjust: bool, cx: &mut SystemContext) {
        let mut mouse_delta = mouse_delta;
        let mut changes = Vec::new();
        let mut adjusted_node = None;

        if can_adjust {
            let tree = cx.document.tree();
            let Some(active) = self.active_node else {
                return;
            };
            let mut hierarchy = vec![active];
            hierarchy.extend(tree.control_ancestors(active));
            // the hud can lag a frame behind the selection
            let Some(info) = self.move_infos.iter().find(|info| hierarchy.contains(&info.node)).copied() else {
                return;
            };
            let Some(original) = tree.vec2_value(&info.position) else {
                return;
            };

            let delta = info.parent_gd.delta_to_local(mouse_delta) + self.extra_delta;
            self.extra_delta = Vec2::ZERO;
            let (delta, magnets) = self.adjust_move_to_nearest_border(delta, &info, cx);
            cx.events.emit(EditorEvent::MagnetLinesChanged(magnets));

            let final_position = quantize_vec(original + delta, &mut self.extra_delta);
            changes.push(PropertyChange::vec2(info.position, final_position));

            // followers move by what the adjusted control really moved
            mouse_delta = info.parent_gd.delta_to_screen(final_position - original);
            adjusted_node = Some(info.node);
        }

        let tree = cx.document.tree();
        for info in &self.move_infos {
            if adjusted_node == Some(info.node) {
                continue;
            }
            let Some(original) = tree.vec2_value(&info.position) else {
                continue;
            };
            let extra = self.extra_delta_per_node.entry(info.node).or_default();
            let delta = info.parent_gd.delta_to_local(mouse_delta) + *extra;
            *extra = Vec2::ZERO;
            let final_position = quantize_vec(original + delta, extra);
            changes.push(PropertyChange::vec2(info.position, final_position));
        }

        if !changes.is_empty() {
            Self::exec(cx, Command::ChangeProperties(changes));
        }
    }

    /// Snap a local move delta to the nearest magnet line on each axis.
    ///
    /// The part of the delta swallowed by a snap goes into the remainder.
    fn adjust_move_to_nearest_border(&mut self, mut delta: Vec2, info: &MoveInfo, cx: &SystemContext) -> (Vec2, Vec<MagnetLineInfo>) {
        let Some(local) = cx.document.tree().local_geometric_data(info.node) else {
            return (delta, Vec::new());
        };
        let control_box = local.aabb() + delta;
        let targets = self.magnet_targets(&*cx.document, cx.settings, &info.parent_gd, MagnetKind::Move);
        let range = cx.settings.transform.move_magnet_range;

        let mut lines_per_axis = [Vec::new(), Vec::new()];
        for (lines, axis) in lines_per_axis.iter_mut().zip(Axis::ALL) {
            *lines = create_magnet_lines(control_box, &targets, axis, MagnetKind::Move);
            let Some(nearest) = nearest_line(lines) else {
                continue;
            };
            let range = component(range, axis);
            let within = nearest.control_position >= nearest.target_position - range
                && nearest.control_position <= nearest.target_position + range;
            if within {
                let old = component(delta, axis);
                *component_mut(&mut delta, axis) -= nearest.interval;
                *component_mut(&mut self.extra_delta, axis) = old - component(delta, axis);
            }
        }

        let mut magnets = Vec::new();
        for (lines, axis) in lines_per_axis.iter_mut().zip(Axis::ALL) {
            for line in lines.iter_mut() {
                line.interval -= component(self.extra_delta, axis);
                line.control_box = line.control_box - self.extra_delta;
            }
            magnets.extend(extract_matched_lines(lines, &info.parent_gd));
        }
        (delta, magnets)
    }

    /// Move the pivot and shift the position so the control stays put.
    fn move_pivot(&mut self, delta: Vec2, cx: &mut SystemContext) {
        let Some(props) = self.properties else {
            return;
        };
        let Some((pivot, delta)) = self.adjust_pivot_to_nearest_area(delta, cx) else {
            return;
        };
        let Some(original_position) = cx.document.tree().vec2_value(&props.position) else {
            return;
        };
        let final_position = original_position + self.parent_gd.delta_to_local(delta);
        Self::exec(
            cx,
            Command::ChangePivot {
                pivot: PropertyChange::vec2(props.pivot, pivot),
                position: PropertyChange::vec2(props.position, final_position),
            },
        );
    }

    /// New pivot for a screen-space delta, snapped to the pivot grid while
    /// shift is held. Returns the pivot and the screen delta it corresponds to.
    fn adjust_pivot_to_nearest_area(&mut self, delta: Vec2, cx: &mut SystemContext) -> Option<(Vec2, Vec2)> {
        let props = self.properties?;
        let rect = self.control_gd.unrotated_rect();
        let control_size = Vec2::new(rect.width(), rect.height());
        if control_size.x <= 0.0 || control_size.y <= 0.0 {
            return None;
        }
        let original_pivot = cx.document.tree().vec2_value(&props.pivot)?;
        let angle = self.control_gd.angle;

        let rotated = rotate(delta, -angle);
        let mut delta_pivot = div(rotated, control_size);
        let settings = &cx.settings.transform;
        let range = div(settings.pivot_magnet_range, control_size);
        let share = settings.share_of_size_to_magnet_pivot;
        let mut final_pivot = original_pivot + delta_pivot + self.extra_delta;
        let mut delta = delta;
        let mut magnets = Vec::new();

        let target = if Self::is_shift_pressed(cx) && share.x > 0.0 && share.y > 0.0 {
            nearest_pivot_target(final_pivot, share, range)
        } else {
            None
        };

        match target {
            Some(target) => {
                magnets = pivot_lines(target, &self.control_gd);
                self.extra_delta = final_pivot - target;
                delta = rotate(mul(target - original_pivot, control_size), angle);
                final_pivot = target;
            }
            None if self.extra_delta != Vec2::ZERO => {
                delta_pivot += self.extra_delta;
                self.extra_delta = Vec2::ZERO;
                delta = rotate(mul(delta_pivot, control_size), angle);
            }
            None => {}
        }
        cx.events.emit(EditorEvent::MagnetLinesChanged(magnets));
        Some((final_pivot, delta))
    }

    /// Rotate around the pivot by the angle the pointer swept since the
    /// previous sample.
    fn rotate_control(&mut self, pos: Point, cx: &mut SystemContext) {
        let Some(props) = self.properties else {
            return;
        };
        let gd = &self.control_gd;
        let rotate_point = gd.unrotated_rect().origin().to_vec2() + mul(gd.pivot_point, gd.scale);
        let l1 = self.previous_mouse_pos.to_vec2() - rotate_point;
        let l2 = pos.to_vec2() - rotate_point;
        if l2.hypot() < ROTATE_DEAD_ZONE {
            return;
        }

        let swept = (l1.x * l2.y - l2.x * l1.y).atan2(l1.x * l2.x + l1.y * l2.y).to_degrees();
        let delta_angle = swept + self.extra_delta.x;
        self.extra_delta = Vec2::ZERO;
        let Some(original) = cx.document.tree().float_value(&props.angle) else {
            return;
        };
        let final_angle = self.adjust_rotate_to_fixed_angle(delta_angle, original, cx);
        Self::exec(cx, Command::ChangeProperties(vec![PropertyChange::float(props.angle, final_angle)]));
        self.previous_mouse_pos = pos;
    }

    /// Snap to multiples of the angle segment while shift is held, never
    /// jumping back past the angle the drag started from.
    fn adjust_rotate_to_fixed_angle(&mut self, delta_angle: f64, original: f64, cx: &SystemContext) -> f64 {
        let final_angle = original + delta_angle;
        if !Self::is_shift_pressed(cx) {
            return quantize(final_angle, &mut self.extra_delta.x);
        }

        let step = i32::try_from(cx.settings.transform.angle_segment).unwrap_or(i32::MAX).max(1);
        let truncated = final_angle as i32;
        let mut nearest = (final_angle - f64::from(truncated % step)) as i32;
        if (final_angle >= 0.0) ^ (delta_angle > 0.0) {
            nearest += if final_angle >= 0.0 { step } else { -step };
        }
        let nearest = f64::from(nearest);

        let backwards = (delta_angle >= 0.0 && nearest <= original + TRANSFORM_EPSILON)
            || (delta_angle < 0.0 && nearest >= original - TRANSFORM_EPSILON);
        if backwards {
            self.extra_delta.x = delta_angle;
            return original;
        }
        self.extra_delta.x = final_angle - nearest;
        nearest
    }

    /// Fold the angle into (-360, 360).
    fn clamp_angle(&mut self, cx: &mut SystemContext) {
        let Some(props) = self.properties else {
            return;
        };
        let Some(mut angle) = cx.document.tree().float_value(&props.angle) else {
            return;
        };
        if angle.abs() > 360.0 {
            angle += if angle > 0.0 { TRANSFORM_EPSILON } else { -TRANSFORM_EPSILON };
            angle = f64::from((angle as i32) % 360);
        }
        Self::exec(cx, Command::ChangeProperties(vec![PropertyChange::float(props.angle, angle)]));
    }
}

impl EditorSystem for TransformSystem {
    fn order(&self) -> SystemOrder {
        SystemOrder::Transform
    }

    fn require_new_state(&mut self, event: &InputEvent, _source: InputSource, cx: &mut SystemContext) -> DragState {
        if cx.state.drag_state == DragState::Transform {
            let released = event.is_mouse() && event.phase == Phase::Ended && event.is_left_button();
            return if released { DragState::NoDrag } else { DragState::Transform };
        }
        if !cx.state.hud_area.is_none() && event.phase == Phase::Drag && event.is_left_button() {
            // rotation measures from here
            self.previous_mouse_pos = event.point;
            return DragState::Transform;
        }
        DragState::NoDrag
    }

    fn can_process_input(&self, event: &InputEvent, _source: InputSource, cx: &SystemContext) -> bool {
        cx.state.drag_state == DragState::Transform || event.device == InputDevice::Keyboard
    }

    fn process_input(&mut self, event: &InputEvent, _source: InputSource, cx: &mut SystemContext) {
        match event.phase {
            Phase::KeyDown | Phase::KeyDownRepeat => {
                if let Some(key) = &event.key {
                    self.process_key(key, cx);
                }
            }
            Phase::Drag if event.is_left_button() => self.process_drag(event.point, cx),
            _ => {}
        }
    }

    fn on_drag_state_changed(&mut self, current: DragState, previous: DragState, cx: &mut SystemContext) {
        if current == DragState::Transform {
            self.extra_delta = Vec2::ZERO;
            self.extra_delta_per_node.clear();
            self.resolve_active(cx.document.tree());
            self.prepare_drag(&*cx.document);
            log::debug!("Transform started with {} controls", self.move_infos.len());
            cx.document.begin_batch("transformations");
        } else if previous == DragState::Transform {
            if self.active_area == HudArea::Rotate {
                self.clamp_angle(cx);
            }
            cx.document.end_batch();
            cx.canvas.try_centralize_scene();
            cx.events.emit(EditorEvent::MagnetLinesChanged(Vec::new()));
            log::debug!("Transform finished");
        }
    }

    fn on_active_area_changed(&mut self, info: &HudAreaInfo, cx: &mut SystemContext) {
        self.active_area = info.area();
        self.active_node = info.owner();
        self.resolve_active(cx.document.tree());
    }

    fn invalidate(&mut self) {
        self.active_area = HudArea::None;
        self.active_node = None;
        self.properties = None;
        self.selected.clear();
        self.move_infos.clear();
        self.neighbours.clear();
        self.extra_delta_per_node.clear();
    }
}

/// Closest pivot grid intersection within `range` of `pivot`. The first
/// intersection found wins ties.
fn nearest_pivot_target(pivot: Vec2, share: Vec2, range: Vec2) -> Option<Vec2> {
    let steps = |share: f64| ((1.0 + TRANSFORM_EPSILON) / share).floor() as u32;
    let mut best: Option<(Vec2, f64)> = None;
    for ix in 0..=steps(share.x) {
        let x = f64::from(ix) * share.x;
        for iy in 0..=steps(share.y) {
            let y = f64::from(iy) * share.y;
            let distance = Vec2::new(pivot.x - x, pivot.y - y);
            if distance.x.abs() > range.x || distance.y.abs() > range.y {
                continue;
            }
            let squared = distance.hypot2();
            if best.is_none_or(|(_, d)| squared < d) {
                best = Some((Vec2::new(x, y), squared));
            }
        }
    }
    best.map(|(target, _)| target)
}

/// Map an axis-aligned step into a frame rotated by `angle` radians, by quadrant.
fn rotate_vector_for_move(delta: Vec2, angle: f64) -> Vec2 {
    let positive_cos = FRAC_PI_4.cos();
    let negative_cos = (PI + FRAC_PI_4).cos();
    let cos = angle.cos();
    if cos > positive_cos {
        delta
    } else if cos < negative_cos {
        -delta
    } else if angle.sin() > 0.0 {
        Vec2::new(delta.y, -delta.x)
    } else {
        Vec2::new(-delta.y, delta.x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;
    use crate::memory::{MemoryCanvas, MemoryDocument, SceneNode, SceneTree};
    use crate::systems::{EventBus, InteractionState};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Harness {
        doc: MemoryDocument,
        canvas: MemoryCanvas,
        settings: EditorSettings,
        state: InteractionState,
        events: EventBus,
        log: Rc<RefCell<Vec<EditorEvent>>>,
        system: TransformSystem,
    }

    impl Harness {
        fn new(tree: SceneTree) -> Self {
            let log = Rc::new(RefCell::new(Vec::new()));
            let mut events = EventBus::new();
            let sink = log.clone();
            events.subscribe(move |e| sink.borrow_mut().push(e.clone()));
            Self {
                doc: MemoryDocument::new(tree),
                canvas: MemoryCanvas::new(),
                settings: EditorSettings::default(),
                state: InteractionState::default(),
                events,
                log,
                system: TransformSystem::new(),
            }
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut TransformSystem, &mut SystemContext) -> R) -> R {
            let mut cx = SystemContext {
                state: &self.state,
                document: &mut self.doc,
                canvas: &mut self.canvas,
                settings: &self.settings,
                events: &mut self.events,
            };
            f(&mut self.system, &mut cx)
        }

        fn select(&mut self, nodes: &[NodeId]) {
            self.doc.set_selection(nodes.iter().copied().collect());
        }

        fn activate(&mut self, node: NodeId, area: HudArea) {
            let info = HudAreaInfo::new(node, area);
            self.state.hud_area = info;
            self.with(|s, cx| s.on_active_area_changed(&info, cx));
        }

        /// Start a transform gesture with the pointer at `point`.
        fn begin_at(&mut self, point: Point) {
            self.state.last_mouse_pos = point;
            let event = InputEvent::drag(point);
            let requested = self.with(|s, cx| s.require_new_state(&event, InputSource::User, cx));
            assert_eq!(requested, DragState::Transform);
            self.state.previous_drag_state = self.state.drag_state;
            self.state.drag_state = DragState::Transform;
            self.with(|s, cx| s.on_drag_state_changed(DragState::Transform, DragState::NoDrag, cx));
        }

        fn drag_by(&mut self, delta: Vec2) {
            self.state.mouse_delta = delta;
            self.state.last_mouse_pos += delta;
            let event = InputEvent::drag(self.state.last_mouse_pos).with_modifiers(self.state.modifiers);
            self.with(|s, cx| s.process_input(&event, InputSource::User, cx));
        }

        fn drag_to(&mut self, point: Point) {
            self.drag_by(point - self.state.last_mouse_pos);
        }

        fn end(&mut self) {
            self.state.previous_drag_state = DragState::Transform;
            self.state.drag_state = DragState::NoDrag;
            self.with(|s, cx| s.on_drag_state_changed(DragState::NoDrag, DragState::Transform, cx));
        }

        fn press_key(&mut self, key: Key) {
            let event = InputEvent::key_down(key).with_modifiers(self.state.modifiers);
            self.with(|s, cx| {
                assert!(s.can_process_input(&event, InputSource::User, cx));
                s.process_input(&event, InputSource::User, cx)
            });
        }

        fn node(&self, id: NodeId) -> &SceneNode {
            self.doc.tree.node(id).unwrap()
        }

        fn last_magnets(&self) -> Option<Vec<MagnetLineInfo>> {
            self.log.borrow().iter().rev().find_map(|e| match e {
                EditorEvent::MagnetLinesChanged(lines) => Some(lines.clone()),
                _ => None,
            })
        }
    }

    fn root_scene() -> (SceneTree, NodeId) {
        let mut tree = SceneTree::new();
        let root = tree.add_displayed_root(SceneNode::control("root", Vec2::ZERO, Vec2::new(1000.0, 1000.0)));
        (tree, root)
    }

    fn square(name: &str, x: f64, y: f64, side: f64) -> SceneNode {
        SceneNode::control(name, Vec2::new(x, y), Vec2::new(side, side))
    }

    #[test]
    fn test_drag_state_requests() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);
        let drag = InputEvent::drag(Point::new(110.0, 110.0));

        assert_eq!(h.with(|s, cx| s.require_new_state(&drag, InputSource::User, cx)), DragState::NoDrag);

        h.activate(node, HudArea::Frame);
        assert_eq!(h.with(|s, cx| s.require_new_state(&drag, InputSource::User, cx)), DragState::Transform);

        h.state.drag_state = DragState::Transform;
        let hover = InputEvent::hover(Point::new(1.0, 1.0));
        let release = InputEvent::mouse_up(Point::new(1.0, 1.0));
        assert_eq!(h.with(|s, cx| s.require_new_state(&hover, InputSource::User, cx)), DragState::Transform);
        assert_eq!(h.with(|s, cx| s.require_new_state(&release, InputSource::User, cx)), DragState::NoDrag);
    }

    #[test]
    fn test_move_snaps_to_neighbour_edge() {
        let (mut tree, root) = root_scene();
        let moved = tree.add_child(root, square("moved", 100.0, 100.0, 20.0)).unwrap();
        let follower = tree.add_child(root, square("follower", 500.0, 500.0, 20.0)).unwrap();
        tree.add_child(root, square("neighbour", 200.0, 300.0, 50.0)).unwrap();
        let mut h = Harness::new(tree);

        h.select(&[moved, follower]);
        h.activate(moved, HudArea::Frame);
        h.begin_at(Point::new(110.0, 110.0));
        assert_eq!(h.system.neighbours().len(), 1);

        // left edge lands 3 units short of the neighbour's left edge
        h.drag_by(Vec2::new(97.0, 0.0));
        assert_eq!(h.node(moved).position, Vec2::new(200.0, 100.0));
        assert_eq!(h.node(follower).position, Vec2::new(600.0, 500.0));
        assert_eq!(h.system.extra_delta, Vec2::new(-3.0, 0.0));

        let magnets = h.last_magnets().unwrap();
        assert_eq!(magnets.len(), 1);
        assert_eq!(magnets[0].axis, Axis::X);
        assert_eq!(magnets[0].rect.x0, 200.0);
    }

    #[test]
    fn test_move_snaps_to_guide() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);
        h.doc.set_guides(root, Axis::X, vec![300.0]);

        h.select(&[node]);
        h.activate(node, HudArea::Frame);
        h.begin_at(Point::new(110.0, 110.0));
        h.drag_by(Vec2::new(177.0, 0.0));

        // right edge on the guide
        assert_eq!(h.node(node).position, Vec2::new(280.0, 100.0));
    }

    #[test]
    fn test_move_remainder_is_conserved() {
        let (mut tree, root) = root_scene();
        let scaled = tree
            .add_child(root, square("scaled", 0.0, 0.0, 300.0).with_scale(Vec2::new(3.0, 3.0)))
            .unwrap();
        let node = tree.add_child(scaled, square("node", 10.0, 10.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);
        h.settings.transform.can_magnet = false;

        h.select(&[node]);
        h.activate(node, HudArea::Frame);
        h.begin_at(Point::new(40.0, 40.0));
        let mut raw = Vec2::ZERO;
        for delta in std::iter::repeat_n(Vec2::new(1.0, 0.0), 10).chain(std::iter::repeat_n(Vec2::new(2.0, 1.0), 5)) {
            h.drag_by(delta);
            raw += delta / 3.0;
        }

        let committed = h.node(node).position - Vec2::new(10.0, 10.0);
        assert_eq!(committed, Vec2::new(6.0, 1.0));
        let remainder = h.system.extra_delta_per_node[&node];
        assert!((committed + remainder - raw).hypot() < 1e-9);
    }

    #[test]
    fn test_nested_selection_moves_once() {
        let (mut tree, root) = root_scene();
        let outer = tree.add_child(root, square("outer", 100.0, 100.0, 200.0)).unwrap();
        let inner = tree.add_child(outer, square("inner", 10.0, 10.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);

        h.select(&[outer, inner]);
        h.activate(outer, HudArea::Frame);
        h.begin_at(Point::new(150.0, 150.0));
        assert_eq!(h.system.nodes_to_move(), vec![outer]);
        assert!(h.system.neighbours().is_empty());
        assert_eq!(h.doc.open_batch(), Some("transformations"));
    }

    #[test]
    fn test_keyboard_nudge() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);
        h.select(&[node]);

        h.press_key(Key::Right);
        assert_eq!(h.node(node).position, Vec2::new(101.0, 100.0));

        h.state.modifiers = Modifiers::shift();
        h.press_key(Key::Up);
        assert_eq!(h.node(node).position, Vec2::new(101.0, 90.0));

        h.press_key(Key::Escape);
        assert_eq!(h.doc.executed.len(), 2);
    }

    #[test]
    fn test_keyboard_step_follows_parent_rotation() {
        let right = Vec2::new(1.0, 0.0);
        assert_eq!(rotate_vector_for_move(right, 0.0), right);
        assert_eq!(rotate_vector_for_move(right, PI), Vec2::new(-1.0, -0.0));
        assert_eq!(rotate_vector_for_move(right, FRAC_PI_4 * 2.0), Vec2::new(0.0, -1.0));
        assert_eq!(rotate_vector_for_move(right, -FRAC_PI_4 * 2.0), Vec2::new(-0.0, 1.0));
    }

    #[test]
    fn test_resize_snaps_moving_edge() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 100.0)).unwrap();
        tree.add_child(root, square("neighbour", 200.0, 400.0, 50.0)).unwrap();
        let mut h = Harness::new(tree);

        h.select(&[node]);
        h.activate(node, HudArea::BottomRight);
        h.begin_at(Point::new(200.0, 200.0));
        h.drag_by(Vec2::new(47.0, 0.0));

        assert_eq!(h.node(node).size, Vec2::new(150.0, 100.0));
        assert_eq!(h.node(node).position, Vec2::new(100.0, 100.0));
        let magnets = h.last_magnets().unwrap();
        assert_eq!(magnets.len(), 1);
        assert_eq!(magnets[0].axis, Axis::X);
    }

    #[test]
    fn test_resize_stops_at_minimum_size() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 100.0)).unwrap();
        // right edge at 112, close enough to snap before the clamp kicks in
        tree.add_child(root, square("neighbour", 62.0, 400.0, 50.0)).unwrap();
        let mut h = Harness::new(tree);

        h.select(&[node]);
        h.activate(node, HudArea::BottomRight);
        h.begin_at(Point::new(200.0, 200.0));
        h.drag_to(Point::new(110.0, 110.0));

        assert_eq!(h.node(node).size, Vec2::new(16.0, 16.0));
        assert_eq!(h.node(node).position, Vec2::new(100.0, 100.0));
        assert_eq!(h.last_magnets(), Some(Vec::new()));
        assert!(matches!(h.doc.executed.last(), Some(Command::Resize { .. })));
    }

    #[test]
    fn test_resize_around_pivot() {
        let (mut tree, root) = root_scene();
        let node = SceneNode::control("node", Vec2::new(300.0, 300.0), Vec2::new(100.0, 100.0)).with_pivot(Vec2::new(0.5, 0.5));
        let node = tree.add_child(root, node).unwrap();
        let mut h = Harness::new(tree);
        h.settings.transform.can_magnet = false;

        h.select(&[node]);
        h.activate(node, HudArea::CenterRight);
        h.begin_at(Point::new(350.0, 300.0));
        h.state.modifiers = Modifiers::alt();
        h.drag_by(Vec2::new(10.0, 0.0));

        // both sides grow around the pivot
        assert_eq!(h.node(node).size, Vec2::new(120.0, 100.0));
        assert_eq!(h.node(node).position, Vec2::new(300.0, 300.0));
    }

    #[test]
    fn test_resize_keeps_aspect_ratio() {
        let (mut tree, root) = root_scene();
        let node = SceneNode::control("node", Vec2::new(300.0, 300.0), Vec2::new(200.0, 100.0)).with_pivot(Vec2::new(0.5, 0.5));
        let node = tree.add_child(root, node).unwrap();
        let mut h = Harness::new(tree);
        h.settings.transform.can_magnet = false;

        h.select(&[node]);
        h.activate(node, HudArea::BottomRight);
        h.begin_at(Point::new(400.0, 350.0));
        h.state.modifiers = Modifiers::ctrl();
        h.drag_by(Vec2::new(20.0, 4.0));

        // height follows width, the pivot shifts by its share of each side
        assert_eq!(h.node(node).size, Vec2::new(220.0, 110.0));
        assert_eq!(h.node(node).position, Vec2::new(310.0, 305.0));
    }

    #[test]
    fn test_root_resize_moves_scene() {
        let (tree, root) = root_scene();
        let mut h = Harness::new(tree);

        h.select(&[root]);
        h.activate(root, HudArea::TopLeft);
        h.begin_at(Point::new(0.0, 0.0));
        h.drag_by(Vec2::new(-10.0, -10.0));

        assert_eq!(h.node(root).size, Vec2::new(1010.0, 1010.0));
        assert_eq!(h.node(root).position, Vec2::ZERO);
        assert_eq!(h.canvas.scene_offset, Vec2::new(-10.0, -10.0));
        assert_eq!(h.canvas.root_frame_size, Some(Vec2::new(1010.0, 1010.0)));
        assert_eq!(h.canvas.counterpoise, Vec2::ZERO);
    }

    #[test]
    fn test_pivot_moves_freely_without_shift() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 100.0)).unwrap();
        let mut h = Harness::new(tree);

        h.select(&[node]);
        h.activate(node, HudArea::Pivot);
        h.begin_at(Point::new(100.0, 100.0));
        h.drag_by(Vec2::new(48.0, 47.0));

        let pivot = h.node(node).pivot;
        assert!((pivot - Vec2::new(0.48, 0.47)).hypot() < 1e-9);
        assert_eq!(h.node(node).position, Vec2::new(148.0, 147.0));
        assert_eq!(h.last_magnets(), Some(Vec::new()));
    }

    #[test]
    fn test_pivot_snaps_to_grid_with_shift() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 100.0)).unwrap();
        let mut h = Harness::new(tree);
        h.settings.transform.share_of_size_to_magnet_pivot = Vec2::new(0.5, 0.5);
        h.state.modifiers = Modifiers::shift();

        h.select(&[node]);
        h.activate(node, HudArea::Pivot);
        h.begin_at(Point::new(100.0, 100.0));
        h.drag_by(Vec2::new(48.0, 47.0));

        assert_eq!(h.node(node).pivot, Vec2::new(0.5, 0.5));
        assert_eq!(h.node(node).position, Vec2::new(150.0, 150.0));
        assert_eq!(h.last_magnets().map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_nearest_pivot_target() {
        let share = Vec2::new(0.25, 0.25);
        let range = Vec2::new(0.1, 0.1);
        assert_eq!(nearest_pivot_target(Vec2::new(0.74, 0.02), share, range), Some(Vec2::new(0.75, 0.0)));
        assert_eq!(nearest_pivot_target(Vec2::new(0.625, 0.625), share, range), None);
    }

    #[test]
    fn test_rotate_by_pointer() {
        let (mut tree, root) = root_scene();
        let node = tree
            .add_child(root, square("node", 200.0, 200.0, 100.0).with_pivot(Vec2::new(0.5, 0.5)))
            .unwrap();
        let mut h = Harness::new(tree);

        h.select(&[node]);
        h.activate(node, HudArea::Rotate);
        h.begin_at(Point::new(300.0, 200.0));
        h.drag_to(Point::new(200.0, 300.0));
        assert_eq!(h.node(node).angle, 90.0);

        // inside the dead zone nothing happens
        let executed = h.doc.executed.len();
        h.drag_to(Point::new(205.0, 205.0));
        assert_eq!(h.doc.executed.len(), executed);

        h.end();
        assert_eq!(h.node(node).angle, 90.0);
        assert_eq!(h.doc.batches, vec!["transformations".to_string()]);
        assert_eq!(h.canvas.centralize_requests, 1);
    }

    #[test]
    fn test_fixed_angle_does_not_snap_back() {
        let (tree, _) = root_scene();
        let mut h = Harness::new(tree);
        h.state.modifiers = Modifiers::shift();

        let step = |h: &mut Harness, delta: f64, original: f64| {
            h.with(|s, cx| {
                let delta = delta + s.extra_delta.x;
                s.extra_delta = Vec2::ZERO;
                s.adjust_rotate_to_fixed_angle(delta, original, cx)
            })
        };

        assert_eq!(step(&mut h, 3.0, 30.0), 30.0);
        assert_eq!(h.system.extra_delta.x, 3.0);
        assert_eq!(step(&mut h, -4.0, 30.0), 30.0);

        h.system.extra_delta = Vec2::ZERO;
        assert_eq!(step(&mut h, 8.0, 30.0), 30.0);
        assert_eq!(step(&mut h, 8.0, 30.0), 45.0);
        assert_eq!(h.system.extra_delta.x, 1.0);
    }

    #[test]
    fn test_angle_is_clamped_when_rotation_ends() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 200.0, 200.0, 100.0).with_angle(725.0)).unwrap();
        let other = tree.add_child(root, square("other", 500.0, 500.0, 100.0).with_angle(-725.0)).unwrap();
        let mut h = Harness::new(tree);

        for (id, expected) in [(node, 5.0), (other, -5.0)] {
            h.select(&[id]);
            h.activate(id, HudArea::Rotate);
            h.begin_at(Point::new(0.0, 0.0));
            h.end();
            assert_eq!(h.node(id).angle, expected);
        }
    }

    #[test]
    fn test_invalidate_drops_gesture_state() {
        let (mut tree, root) = root_scene();
        let node = tree.add_child(root, square("node", 100.0, 100.0, 20.0)).unwrap();
        let mut h = Harness::new(tree);
        h.select(&[node]);
        h.activate(node, HudArea::Frame);
        h.begin_at(Point::new(110.0, 110.0));
        assert_eq!(h.system.nodes_to_move(), vec![node]);

        h.system.invalidate();
        assert!(h.system.nodes_to_move().is_empty());
        assert_eq!(h.system.active_node, None);
    }
}
