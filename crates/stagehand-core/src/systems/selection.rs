//! Hit-testing and selection.
//!
//! A click usually lands on a stack of nested controls. The queries here
//! decide which one of them the user meant, using the current selection and
//! the active handle as context.

use super::{DisplayState, DragState, EditorSystem, SystemContext, SystemOrder};
use crate::geometry::{component, Axis};
use crate::hud::{HudArea, HudAreaInfo};
use crate::input::{InputEvent, InputSource, Phase};
use crate::settings::SelectionSettings;
use crate::tree::{NodeId, NodeTree, SelectedNodes};
use kurbo::{Point, Vec2};
use std::collections::HashSet;

/// Size ratio above which a nested control counts as "much smaller".
const SIZE_PROPORTION: f64 = 3.0;
/// Minimum size difference accompanying the ratio.
const RELATIVE_SIZE_DIFFERENCE: f64 = 30.0;
/// Size difference that is enough on its own.
const ABSOLUTE_SIZE_DIFFERENCE: f64 = 200.0;

/// Pre-order walk over the displayed root controls.
///
/// A node is emitted when `predicate` holds; its children are visited unless
/// `stop` holds. Both are evaluated for every visited node.
pub fn collect_control_nodes(
    tree: &dyn NodeTree,
    predicate: impl Fn(NodeId) -> bool,
    stop: impl Fn(NodeId) -> bool,
) -> Vec<NodeId> {
    fn visit(
        tree: &dyn NodeTree,
        node: NodeId,
        predicate: &dyn Fn(NodeId) -> bool,
        stop: &dyn Fn(NodeId) -> bool,
        out: &mut Vec<NodeId>,
    ) {
        if predicate(node) {
            out.push(node);
        }
        if !stop(node) {
            for child in tree.children(node) {
                visit(tree, child, predicate, stop, out);
            }
        }
    }

    let mut nodes = Vec::new();
    for root in tree.displayed_root_controls() {
        visit(tree, root, &predicate, &stop, &mut nodes);
    }
    nodes
}

/// Hit-testing queries over one snapshot of the tree.
pub struct SelectionQuery<'a> {
    pub tree: &'a dyn NodeTree,
    pub hud_area: &'a HudAreaInfo,
    pub settings: &'a SelectionSettings,
}

impl<'a> SelectionQuery<'a> {
    pub fn new(tree: &'a dyn NodeTree, hud_area: &'a HudAreaInfo, settings: &'a SelectionSettings) -> Self {
        Self { tree, hud_area, settings }
    }

    /// Visible controls containing `point`, in traversal order. Hidden
    /// subtrees are never entered.
    pub fn nodes_for_selection(&self, point: Point) -> Vec<NodeId> {
        let tree = self.tree;
        collect_control_nodes(
            tree,
            |node| tree.is_visible(node) && tree.is_point_inside(node, point),
            |node| !tree.is_visible(node),
        )
    }

    /// The control under `point` the user most likely meant, given the
    /// current selection. `go_deeper` is set for double clicks.
    pub fn common_node_under_point(&self, point: Point, go_deeper: bool, selection: &SelectedNodes) -> Option<NodeId> {
        if !go_deeper && !self.hud_area.is_none() {
            return self.hud_area.owner();
        }

        let tree = self.tree;
        let nodes = self.nodes_for_selection(point);
        let mut selection = selection.clone();
        selection.retain(|&id| tree.contains(id) && tree.is_control(id));

        match nodes.as_slice() {
            [] => return None,
            [single] => return Some(*single),
            _ => {}
        }

        if selection.is_empty() {
            return self.find_small_node_under_node(&nodes).or_else(|| {
                // a root control or one of its direct children
                nodes.iter().rev().copied().find(|&node| {
                    tree.is_root_control(node)
                        || tree
                            .parent(node)
                            .and_then(|parent| tree.parent(parent))
                            .is_some_and(|grandparent| !tree.is_control(grandparent))
                })
            });
        }

        let selected_ancestors: HashSet<NodeId> = selection.iter().flat_map(|id| tree.control_ancestors(id)).collect();
        for &node in nodes.iter().rev() {
            if selection.contains(node) {
                return Some(node);
            }
            let parent = tree.parent(node);
            if let Some(parent) = parent.filter(|&p| selection.contains(p)) {
                return Some(if go_deeper { node } else { parent });
            }
            if parent.is_some_and(|p| selected_ancestors.contains(&p)) {
                return Some(node);
            }
        }
        self.find_small_node_under_node(&nodes)
    }

    /// A control much smaller than the one it is nested in, walking from the
    /// topmost candidate down.
    pub fn find_small_node_under_node(&self, nodes: &[NodeId]) -> Option<NodeId> {
        if !self.settings.can_find_common_for_selection {
            return None;
        }
        let tree = self.tree;
        let &top = nodes.last()?;
        let parent = tree.parent(top).filter(|&p| tree.is_control(p))?;

        // siblings of the topmost node plus its own control chain
        let mut hierarchy: HashSet<NodeId> = tree.children(parent).into_iter().collect();
        hierarchy.insert(top);
        hierarchy.extend(tree.control_ancestors(top));

        let mut sizes: Vec<(NodeId, Vec2)> = Vec::new();
        for &node in nodes.iter().rev() {
            let Some(size) = self.absolute_size(node) else {
                continue;
            };
            if let Some(&(previous, previous_size)) = sizes.last() {
                if !hierarchy.contains(&previous) {
                    break;
                }
                let much_larger = Axis::ALL.into_iter().any(|axis| {
                    let current = component(size, axis);
                    let smaller = component(previous_size, axis);
                    let difference = current - smaller;
                    (current / smaller > SIZE_PROPORTION && difference > RELATIVE_SIZE_DIFFERENCE)
                        || difference > ABSOLUTE_SIZE_DIFFERENCE
                });
                if much_larger {
                    return Some(previous);
                }
            }
            if size.x > 0.0 && size.y > 0.0 {
                sizes.push((node, size));
            }
        }
        None
    }

    /// The topmost control under `point`, unless a handle other than the
    /// move frame is active, in which case its owner wins.
    pub fn nearest_node_under_point(&self, point: Point) -> Option<NodeId> {
        match self.hud_area.area() {
            HudArea::None | HudArea::Frame => self.nodes_for_selection(point).last().copied(),
            _ => self.hud_area.owner(),
        }
    }

    fn absolute_size(&self, node: NodeId) -> Option<Vec2> {
        let rect = self.tree.geometric_data(node)?.unrotated_rect();
        Some(Vec2::new(rect.width(), rect.height()))
    }
}

/// Resolve a click: the nearest control while ctrl is held, otherwise the
/// common one.
pub fn control_node_at_point(cx: &SystemContext, point: Point, go_deeper: bool) -> Option<NodeId> {
    let query = SelectionQuery::new(cx.document.tree(), &cx.state.hud_area, &cx.settings.selection);
    if cx.state.modifiers.ctrl {
        query.nearest_node_under_point(point)
    } else {
        query.common_node_under_point(point, go_deeper, &cx.document.selection())
    }
}

/// Selects the control under a left click.
#[derive(Debug, Default)]
pub struct SelectionSystem;

impl SelectionSystem {
    pub fn new() -> Self {
        Self
    }

    /// Select `node`. Shift extends the selection, or removes the node from
    /// a multi-selection it already belongs to. In edit mode clicking a
    /// selected node keeps the rest of the selection.
    pub fn select_node(cx: &mut SystemContext, node: NodeId) {
        let shift = cx.state.modifiers.shift;
        let current = cx.document.selection();
        let keep = shift || (cx.state.display_state == DisplayState::Edit && current.contains(node));
        let mut selection = if keep { current.clone() } else { SelectedNodes::new() };

        if shift && current.len() > 1 && current.contains(node) {
            selection.remove(node);
        } else {
            selection.insert(node);
        }
        cx.set_selection(selection);
    }

    pub fn clear_selection(cx: &mut SystemContext) {
        cx.set_selection(SelectedNodes::new());
    }

    /// Select every direct child of the displayed root controls.
    pub fn select_all_controls(cx: &mut SystemContext) {
        let tree = cx.document.tree();
        let selection: SelectedNodes = tree
            .displayed_root_controls()
            .into_iter()
            .flat_map(|root| tree.children(root))
            .collect();
        if !selection.is_empty() {
            cx.set_selection(selection);
        }
    }

    pub fn focus_next_child(cx: &mut SystemContext) {
        Self::focus_to_child(cx, true);
    }

    pub fn focus_previous_child(cx: &mut SystemContext) {
        Self::focus_to_child(cx, false);
    }

    /// Move the selection to the neighbouring control in traversal order,
    /// wrapping around at either end.
    fn focus_to_child(cx: &mut SystemContext, next: bool) {
        let all = collect_control_nodes(cx.document.tree(), |_| true, |_| false);
        let (Some(&first), Some(&last)) = (all.first(), all.last()) else {
            return;
        };
        let start = cx.document.selection().last();
        let index = start.and_then(|id| all.iter().position(|&n| n == id));
        let target = match (index, next) {
            (None, true) => first,
            (None, false) => last,
            (Some(i), true) => all.get(i + 1).copied().unwrap_or(first),
            (Some(0), false) => last,
            (Some(i), false) => all[i - 1],
        };
        cx.set_selection(SelectedNodes::from_iter([target]));
    }
}

impl EditorSystem for SelectionSystem {
    fn order(&self) -> SystemOrder {
        SystemOrder::Selection
    }

    fn can_process_input(&self, event: &InputEvent, _source: InputSource, cx: &SystemContext) -> bool {
        matches!(cx.state.display_state, DisplayState::Edit | DisplayState::Preview)
            && cx.state.drag_state == DragState::NoDrag
            && event.is_mouse()
            && event.is_left_button()
            && event.phase == Phase::Began
    }

    fn process_input(&mut self, event: &InputEvent, _source: InputSource, cx: &mut SystemContext) {
        if let Some(node) = control_node_at_point(cx, event.point, event.tap_count > 1) {
            log::trace!("Selecting {} at {:?}", node, event.point);
            Self::select_node(cx, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::input::Modifiers;
    use crate::memory::{MemoryCanvas, MemoryDocument, SceneNode, SceneTree};
    use crate::settings::EditorSettings;
    use crate::systems::{EditorEvent, EventBus, InteractionState};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Nested {
        doc: MemoryDocument,
        root: NodeId,
        a: NodeId,
        b: NodeId,
        c: NodeId,
    }

    /// root ⊃ A ⊃ B ⊃ C, all under (25, 25).
    fn nested() -> Nested {
        let mut tree = SceneTree::new();
        let root = tree.add_displayed_root(SceneNode::control("root", Vec2::ZERO, Vec2::new(1000.0, 1000.0)));
        let a = tree.add_child(root, SceneNode::control("a", Vec2::ZERO, Vec2::new(500.0, 500.0))).unwrap();
        let b = tree.add_child(a, SceneNode::control("b", Vec2::new(10.0, 10.0), Vec2::new(300.0, 300.0))).unwrap();
        let c = tree.add_child(b, SceneNode::control("c", Vec2::new(10.0, 10.0), Vec2::new(20.0, 20.0))).unwrap();
        Nested { doc: MemoryDocument::new(tree), root, a, b, c }
    }

    fn settings(small_nodes: bool) -> SelectionSettings {
        SelectionSettings { can_find_common_for_selection: small_nodes }
    }

    #[test]
    fn test_traversal_is_preorder_and_prunes() {
        let mut tree = SceneTree::new();
        let root = tree.add_displayed_root(SceneNode::control("root", Vec2::ZERO, Vec2::new(100.0, 100.0)));
        let hidden = tree.add_child(root, SceneNode::control("hidden", Vec2::ZERO, Vec2::new(50.0, 50.0)).hidden()).unwrap();
        let inner = tree.add_child(hidden, SceneNode::control("inner", Vec2::ZERO, Vec2::new(10.0, 10.0))).unwrap();
        let shown = tree.add_child(root, SceneNode::control("shown", Vec2::ZERO, Vec2::new(50.0, 50.0))).unwrap();

        let all = collect_control_nodes(&tree, |_| true, |_| false);
        assert_eq!(all, vec![root, hidden, inner, shown]);

        let pruned = collect_control_nodes(&tree, |_| true, |n| !tree.is_visible(n));
        assert_eq!(pruned, vec![root, hidden, shown]);

        let hud = HudAreaInfo::none();
        let s = settings(true);
        let query = SelectionQuery::new(&tree, &hud, &s);
        assert_eq!(query.nodes_for_selection(Point::new(5.0, 5.0)), vec![root, shown]);
    }

    #[test]
    fn test_small_node_wins_over_container() {
        let n = nested();
        let hud = HudAreaInfo::none();
        let s = settings(true);
        let query = SelectionQuery::new(&n.doc.tree, &hud, &s);
        assert_eq!(query.nodes_for_selection(Point::new(25.0, 25.0)), vec![n.root, n.a, n.b, n.c]);
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), false, &SelectedNodes::new()), Some(n.c));
    }

    #[test]
    fn test_without_heuristic_picks_child_of_root() {
        let n = nested();
        let hud = HudAreaInfo::none();
        let s = settings(false);
        let query = SelectionQuery::new(&n.doc.tree, &hud, &s);
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), false, &SelectedNodes::new()), Some(n.a));
    }

    #[test]
    fn test_without_heuristic_falls_back_to_root() {
        // C overhangs its tiny parent A, so A itself is not under the point
        let mut tree = SceneTree::new();
        let root = tree.add_displayed_root(SceneNode::control("root", Vec2::ZERO, Vec2::new(1000.0, 1000.0)));
        let a = tree.add_child(root, SceneNode::control("a", Vec2::new(600.0, 600.0), Vec2::new(10.0, 10.0))).unwrap();
        let c = tree.add_child(a, SceneNode::control("c", Vec2::new(-580.0, -580.0), Vec2::new(50.0, 50.0))).unwrap();

        let hud = HudAreaInfo::none();
        let s = settings(false);
        let query = SelectionQuery::new(&tree, &hud, &s);
        let point = Point::new(30.0, 30.0);
        assert_eq!(query.nodes_for_selection(point), vec![root, c]);
        assert_eq!(query.common_node_under_point(point, false, &SelectedNodes::new()), Some(root));
    }

    #[test]
    fn test_selected_node_is_kept() {
        let n = nested();
        let hud = HudAreaInfo::none();
        let s = settings(true);
        let query = SelectionQuery::new(&n.doc.tree, &hud, &s);
        let selection = SelectedNodes::from_iter([n.b]);
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), false, &selection), Some(n.b));
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), true, &selection), Some(n.c));
    }

    #[test]
    fn test_sibling_of_selection_path() {
        let n = nested();
        let hud = HudAreaInfo::none();
        let s = settings(false);
        let query = SelectionQuery::new(&n.doc.tree, &hud, &s);
        // A is an ancestor of the selected C, so B (child of A) is reachable
        let selection = SelectedNodes::from_iter([n.c]);
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), false, &selection), Some(n.c));
        assert_eq!(query.common_node_under_point(Point::new(300.0, 300.0), false, &selection), Some(n.b));
    }

    #[test]
    fn test_active_handle_takes_priority() {
        let n = nested();
        let hud = HudAreaInfo::new(n.a, HudArea::BottomRight);
        let s = settings(true);
        let query = SelectionQuery::new(&n.doc.tree, &hud, &s);
        assert_eq!(query.common_node_under_point(Point::new(25.0, 25.0), false, &SelectedNodes::new()), Some(n.a));
        assert_eq!(query.nearest_node_under_point(Point::new(25.0, 25.0)), Some(n.a));

        let frame = HudAreaInfo::new(n.a, HudArea::Frame);
        let query = SelectionQuery::new(&n.doc.tree, &frame, &s);
        assert_eq!(query.nearest_node_under_point(Point::new(25.0, 25.0)), Some(n.c));
        assert_eq!(query.nearest_node_under_point(Point::new(2000.0, 25.0)), None);
    }

    fn with_context<R>(doc: &mut MemoryDocument, state: &InteractionState, f: impl FnOnce(&mut SystemContext) -> R) -> (R, Vec<EditorEvent>) {
        let settings = EditorSettings::default();
        let mut canvas = MemoryCanvas::new();
        let mut events = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        events.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        let mut cx = SystemContext { state, document: doc, canvas: &mut canvas, settings: &settings, events: &mut events };
        let result = f(&mut cx);
        let seen = seen.borrow().clone();
        (result, seen)
    }

    #[test]
    fn test_select_node_modifiers() {
        let mut n = nested();
        let mut state = InteractionState { display_state: DisplayState::Edit, ..Default::default() };

        with_context(&mut n.doc, &state, |cx| SelectionSystem::select_node(cx, n.a));
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.a]));

        state.modifiers = Modifiers::shift();
        with_context(&mut n.doc, &state, |cx| SelectionSystem::select_node(cx, n.b));
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.a, n.b]));

        // plain click on a member keeps the multi-selection in edit mode
        state.modifiers = Modifiers::NONE;
        with_context(&mut n.doc, &state, |cx| SelectionSystem::select_node(cx, n.b));
        assert_eq!(n.doc.selection().len(), 2);

        state.modifiers = Modifiers::shift();
        let (_, events) = with_context(&mut n.doc, &state, |cx| SelectionSystem::select_node(cx, n.a));
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.b]));
        assert_eq!(events, vec![EditorEvent::SelectionChanged(SelectedNodes::from_iter([n.b]))]);

        state.modifiers = Modifiers::NONE;
        state.display_state = DisplayState::Preview;
        with_context(&mut n.doc, &state, |cx| SelectionSystem::select_node(cx, n.c));
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.c]));
    }

    #[test]
    fn test_focus_cycles_with_wrap() {
        let mut n = nested();
        let state = InteractionState::default();

        with_context(&mut n.doc, &state, SelectionSystem::focus_next_child);
        assert_eq!(n.doc.selection().last(), Some(n.root));
        with_context(&mut n.doc, &state, SelectionSystem::focus_previous_child);
        assert_eq!(n.doc.selection().last(), Some(n.c));
        with_context(&mut n.doc, &state, SelectionSystem::focus_next_child);
        assert_eq!(n.doc.selection().last(), Some(n.root));
        with_context(&mut n.doc, &state, SelectionSystem::focus_next_child);
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.a]));
    }

    #[test]
    fn test_select_all_and_clear() {
        let mut n = nested();
        let state = InteractionState::default();
        with_context(&mut n.doc, &state, SelectionSystem::select_all_controls);
        assert_eq!(n.doc.selection(), SelectedNodes::from_iter([n.a]));
        with_context(&mut n.doc, &state, SelectionSystem::clear_selection);
        assert!(n.doc.selection().is_empty());
    }

    #[test]
    fn test_input_gate() {
        let n = nested();
        let system = SelectionSystem::new();
        let mut doc = n.doc;
        let mut state = InteractionState::default();
        let press = InputEvent::mouse_down(Point::new(25.0, 25.0));
        let (accepted, _) = with_context(&mut doc, &state, |cx| system.can_process_input(&press, InputSource::User, cx));
        assert!(accepted);

        let (accepted, _) = with_context(&mut doc, &state, |cx| system.can_process_input(&InputEvent::drag(Point::ZERO), InputSource::User, cx));
        assert!(!accepted);

        state.drag_state = DragState::Transform;
        let (accepted, _) = with_context(&mut doc, &state, |cx| system.can_process_input(&press, InputSource::User, cx));
        assert!(!accepted);

        state.drag_state = DragState::NoDrag;
        state.display_state = DisplayState::Emulation;
        let (accepted, _) = with_context(&mut doc, &state, |cx| system.can_process_input(&press, InputSource::User, cx));
        assert!(!accepted);
    }
}
