//! The systems manager: owns the editor systems and the interaction state,
//! routes input to them and tracks drag and display state.

use super::{
    selection, DisplayState, DragState, EditorContext, EditorEvent, EditorSystem, EventBus, InteractionState,
    SelectionSystem, SystemContext, SystemOrder, TransformSystem,
};
use crate::hud::HudAreaInfo;
use crate::input::{fold_tap_count, InputEvent, InputSource};
use crate::tree::NodeId;
use kurbo::{Point, Vec2};
use std::collections::BTreeMap;
use std::ops::Bound;

/// Context for one system hook, borrowing the manager's state and events.
fn system_context<'a>(
    state: &'a InteractionState,
    events: &'a mut EventBus,
    env: &'a mut EditorContext<'_>,
) -> SystemContext<'a> {
    SystemContext {
        state,
        document: &mut *env.document,
        canvas: &mut *env.canvas,
        settings: env.settings,
        events,
    }
}

/// Owns the registered systems and dispatches to them in order.
#[derive(Default)]
pub struct EditorSystemsManager {
    systems: BTreeMap<SystemOrder, Box<dyn EditorSystem>>,
    /// Overlay controls, back to front.
    overlays: Vec<String>,
    overlay_owners: BTreeMap<SystemOrder, Vec<String>>,
    state: InteractionState,
    events: EventBus,
}

impl EditorSystemsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the selection and transform systems registered.
    pub fn with_default_systems() -> Self {
        let mut manager = Self::new();
        manager.register_system(Box::new(SelectionSystem::new()));
        manager.register_system(Box::new(TransformSystem::new()));
        manager
    }

    /// Register a system under its order, replacing any system of the same
    /// order. Its overlay controls go right below those of the next higher
    /// ranked owner.
    pub fn register_system(&mut self, system: Box<dyn EditorSystem>) {
        let order = system.order();
        if self.systems.contains_key(&order) {
            log::warn!("Replacing the {:?} system", order);
            self.unregister_system(order);
        }

        let controls = system.canvas_controls();
        if !controls.is_empty() {
            let index = self
                .overlay_owners
                .range((Bound::Excluded(order), Bound::Unbounded))
                .find_map(|(_, names)| names.first())
                .and_then(|first| self.overlays.iter().position(|name| name == first))
                .unwrap_or(self.overlays.len());
            self.overlays.splice(index..index, controls.iter().cloned());
            self.overlay_owners.insert(order, controls);
        }

        log::debug!("Registered the {:?} system", order);
        self.systems.insert(order, system);
    }

    /// Remove a system together with its overlay controls.
    pub fn unregister_system(&mut self, order: SystemOrder) -> Option<Box<dyn EditorSystem>> {
        if let Some(names) = self.overlay_owners.remove(&order) {
            self.overlays.retain(|name| !names.contains(name));
        }
        self.systems.remove(&order)
    }

    pub fn has_system(&self, order: SystemOrder) -> bool {
        self.systems.contains_key(&order)
    }

    /// Overlay controls in render order, back to front.
    pub fn overlay_stack(&self) -> &[String] {
        &self.overlays
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorEvent) + 'static) {
        self.events.subscribe(listener);
    }

    pub fn state(&self) -> &InteractionState {
        &self.state
    }

    pub fn drag_state(&self) -> DragState {
        self.state.drag_state
    }

    pub fn display_state(&self) -> DisplayState {
        self.state.display_state
    }

    pub fn active_hud_area(&self) -> HudAreaInfo {
        self.state.hud_area
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.state.mouse_delta
    }

    /// Route one input event.
    ///
    /// Every system votes for a drag state and the strongest vote wins. The
    /// event then goes to every system that accepts it, the highest order
    /// first.
    pub fn on_input(&mut self, event: &InputEvent, source: InputSource, env: &mut EditorContext<'_>) {
        let mut event = event.clone();
        self.state.modifiers = event.modifiers;
        if event.is_mouse() {
            self.state.mouse_delta = event.point - self.state.last_mouse_pos;
            self.state.last_mouse_pos = event.point;
        }
        if source == InputSource::Canvas {
            // the canvas moved, the pointer did not
            self.state.last_mouse_pos -= self.state.mouse_delta;
        }
        if event.is_mouse() && event.tap_count > 0 {
            event.tap_count = fold_tap_count(event.tap_count);
        }
        log::trace!("Input {:?} {:?} at {:?}", event.device, event.phase, event.point);

        let requested = {
            let mut cx = system_context(&self.state, &mut self.events, env);
            self.systems
                .values_mut()
                .map(|system| system.require_new_state(&event, source, &mut cx))
                .max()
                .unwrap_or_default()
        };
        self.set_drag_state(requested, env);

        let mut cx = system_context(&self.state, &mut self.events, env);
        for system in self.systems.values_mut().rev() {
            if system.can_process_input(&event, source, &cx) {
                system.process_input(&event, source, &mut cx);
            }
        }
    }

    pub fn set_drag_state(&mut self, new_state: DragState, env: &mut EditorContext<'_>) {
        let previous = self.state.drag_state;
        if previous == new_state {
            return;
        }
        self.state.previous_drag_state = previous;
        self.state.drag_state = new_state;
        log::debug!("Drag state {:?} -> {:?}", previous, new_state);

        if new_state == DragState::Transform || previous == DragState::Transform {
            env.document.set_can_update_all(previous == DragState::Transform);
        }
        self.events.emit(EditorEvent::DragStateChanged { current: new_state, previous });

        let mut cx = system_context(&self.state, &mut self.events, env);
        for system in self.systems.values_mut() {
            system.on_drag_state_changed(new_state, previous, &mut cx);
        }
    }

    pub fn set_display_state(&mut self, new_state: DisplayState, env: &mut EditorContext<'_>) {
        let previous = self.state.display_state;
        if previous == new_state {
            return;
        }
        self.state.previous_display_state = previous;
        self.state.display_state = new_state;
        log::debug!("Display state {:?} -> {:?}", previous, new_state);
        self.events.emit(EditorEvent::DisplayStateChanged { current: new_state, previous });

        let mut cx = system_context(&self.state, &mut self.events, env);
        for system in self.systems.values_mut() {
            system.on_display_state_changed(new_state, previous, &mut cx);
        }
    }

    /// Enter emulation, or go back to the state it interrupted.
    pub fn set_emulation_mode(&mut self, emulation: bool, env: &mut EditorContext<'_>) {
        if emulation {
            self.set_display_state(DisplayState::Emulation, env);
        } else if self.state.display_state == DisplayState::Emulation {
            self.set_display_state(self.state.previous_display_state, env);
        }
    }

    /// Edit with exactly one root control on the canvas, preview otherwise.
    /// Emulation only remembers the result for later.
    fn update_display_state(&mut self, env: &mut EditorContext<'_>) {
        let roots = env.document.tree().displayed_root_controls().len();
        let state = if roots == 1 { DisplayState::Edit } else { DisplayState::Preview };
        if self.state.display_state == DisplayState::Emulation {
            self.state.previous_display_state = state;
        } else {
            self.set_display_state(state, env);
        }
    }

    /// Per-frame tick.
    pub fn on_update(&mut self, env: &mut EditorContext<'_>) {
        self.update_display_state(env);
        let mut cx = system_context(&self.state, &mut self.events, env);
        for system in self.systems.values_mut() {
            system.on_update(&mut cx);
        }
    }

    pub fn set_active_hud_area(&mut self, info: HudAreaInfo, env: &mut EditorContext<'_>) {
        log::debug!("Active area {:?} on {:?}", info.area(), info.owner());
        self.state.hud_area = info;
        self.events.emit(EditorEvent::ActiveAreaChanged(info));

        let mut cx = system_context(&self.state, &mut self.events, env);
        for system in self.systems.values_mut() {
            system.on_active_area_changed(&info, &mut cx);
        }
    }

    /// Drop every reference to nodes the gesture was working on.
    pub fn invalidate(&mut self, env: &mut EditorContext<'_>) {
        self.set_active_hud_area(HudAreaInfo::none(), env);
        self.reset(env);
    }

    /// Like [`invalidate`](Self::invalidate), but the active handle is kept
    /// unless it belongs to `node`.
    pub fn invalidate_node(&mut self, node: NodeId, env: &mut EditorContext<'_>) {
        if self.state.hud_area.owner() == Some(node) {
            self.set_active_hud_area(HudAreaInfo::none(), env);
        }
        self.reset(env);
    }

    fn reset(&mut self, env: &mut EditorContext<'_>) {
        self.events.emit(EditorEvent::MagnetLinesChanged(Vec::new()));
        self.set_drag_state(DragState::NoDrag, env);
        for system in self.systems.values_mut() {
            system.invalidate();
        }
    }

    /// The control a click at `point` refers to.
    pub fn control_node_at_point(&mut self, point: Point, go_deeper: bool, env: &mut EditorContext<'_>) -> Option<NodeId> {
        let cx = system_context(&self.state, &mut self.events, env);
        selection::control_node_at_point(&cx, point, go_deeper)
    }

    pub fn select_node(&mut self, node: NodeId, env: &mut EditorContext<'_>) {
        SelectionSystem::select_node(&mut system_context(&self.state, &mut self.events, env), node);
    }

    pub fn clear_selection(&mut self, env: &mut EditorContext<'_>) {
        SelectionSystem::clear_selection(&mut system_context(&self.state, &mut self.events, env));
    }

    pub fn select_all_controls(&mut self, env: &mut EditorContext<'_>) {
        SelectionSystem::select_all_controls(&mut system_context(&self.state, &mut self.events, env));
    }

    pub fn focus_next_child(&mut self, env: &mut EditorContext<'_>) {
        SelectionSystem::focus_next_child(&mut system_context(&self.state, &mut self.events, env));
    }

    pub fn focus_previous_child(&mut self, env: &mut EditorContext<'_>) {
        SelectionSystem::focus_previous_child(&mut system_context(&self.state, &mut self.events, env));
    }
}

impl std::fmt::Debug for EditorSystemsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSystemsManager")
            .field("systems", &self.systems.keys().collect::<Vec<_>>())
            .field("overlays", &self.overlays)
            .field("state", &self.state)
            .finish()
    }
}
