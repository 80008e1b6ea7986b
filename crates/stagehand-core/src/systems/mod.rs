//! Cooperating editor systems and the shared interaction state they read.

pub mod manager;
pub mod selection;
pub mod transform;

use crate::document::{CanvasAdapter, Document};
use crate::hud::HudAreaInfo;
use crate::input::{InputEvent, InputSource, Modifiers};
use crate::magnet::MagnetLineInfo;
use crate::settings::EditorSettings;
use crate::tree::{NodeId, PropertyName, SelectedNodes};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

pub use manager::EditorSystemsManager;
pub use selection::SelectionSystem;
pub use transform::TransformSystem;

/// Coarse interaction mode. Ordered so the strongest request wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DragState {
    #[default]
    NoDrag,
    AddingControl,
    DragScreen,
    Transform,
}

/// How the canvas is being shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayState {
    /// Several root controls side by side.
    #[default]
    Preview,
    /// A single root control open for editing.
    Edit,
    /// Controls react to input as they would at runtime.
    Emulation,
}

/// Rank of a system. Decides dispatch order and where its overlay controls
/// sit in the render stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SystemOrder {
    Selection,
    Hud,
    Transform,
    Cursor,
    Guides,
}

/// Interaction state owned by the manager and shared read-only with systems.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionState {
    pub drag_state: DragState,
    pub previous_drag_state: DragState,
    pub display_state: DisplayState,
    pub previous_display_state: DisplayState,
    pub hud_area: HudAreaInfo,
    /// Screen-space pointer movement since the previous mouse event.
    pub mouse_delta: Vec2,
    pub last_mouse_pos: Point,
    /// Modifiers of the event being processed.
    pub modifiers: Modifiers,
}

/// Notifications published by the editor core.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    ActiveAreaChanged(HudAreaInfo),
    MagnetLinesChanged(Vec<MagnetLineInfo>),
    DragStateChanged { current: DragState, previous: DragState },
    DisplayStateChanged { current: DisplayState, previous: DisplayState },
    PropertyChanged { node: NodeId, property: PropertyName },
    SelectionChanged(SelectedNodes),
}

type Listener = Box<dyn FnMut(&EditorEvent)>;

/// Synchronous listeners, called in registration order.
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&EditorEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, event: EditorEvent) {
        for listener in &mut self.listeners {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listeners.len()).finish()
    }
}

/// External collaborators handed to the manager for the duration of a call.
pub struct EditorContext<'a> {
    pub document: &'a mut dyn Document,
    pub canvas: &'a mut dyn CanvasAdapter,
    pub settings: &'a EditorSettings,
}

impl<'a> EditorContext<'a> {
    pub fn new(document: &'a mut dyn Document, canvas: &'a mut dyn CanvasAdapter, settings: &'a EditorSettings) -> Self {
        Self { document, canvas, settings }
    }
}

/// What a system sees while handling a hook.
pub struct SystemContext<'a> {
    pub state: &'a InteractionState,
    pub document: &'a mut dyn Document,
    pub canvas: &'a mut dyn CanvasAdapter,
    pub settings: &'a EditorSettings,
    pub events: &'a mut EventBus,
}

impl SystemContext<'_> {
    /// Publish a new selection to the document and to listeners.
    pub fn set_selection(&mut self, selection: SelectedNodes) {
        self.document.set_selection(selection.clone());
        self.events.emit(EditorEvent::SelectionChanged(selection));
    }
}

/// A pluggable editor subsystem. Every hook except [`EditorSystem::order`]
/// has a no-op default.
pub trait EditorSystem {
    fn order(&self) -> SystemOrder;

    /// Drag state this system wants after seeing `event`. The manager applies
    /// the maximum over all systems.
    fn require_new_state(&mut self, _event: &InputEvent, _source: InputSource, _cx: &mut SystemContext) -> DragState {
        DragState::NoDrag
    }

    fn can_process_input(&self, _event: &InputEvent, _source: InputSource, _cx: &SystemContext) -> bool {
        false
    }

    fn process_input(&mut self, _event: &InputEvent, _source: InputSource, _cx: &mut SystemContext) {}

    fn on_drag_state_changed(&mut self, _current: DragState, _previous: DragState, _cx: &mut SystemContext) {}

    fn on_display_state_changed(&mut self, _current: DisplayState, _previous: DisplayState, _cx: &mut SystemContext) {}

    fn on_active_area_changed(&mut self, _info: &HudAreaInfo, _cx: &mut SystemContext) {}

    /// Called once per render tick.
    fn on_update(&mut self, _cx: &mut SystemContext) {}

    /// Drop any per-gesture state; nodes it referenced may be gone.
    fn invalidate(&mut self) {}

    /// Names of the overlay controls this system draws on the canvas.
    fn canvas_controls(&self) -> Vec<String> {
        Vec::new()
    }
}
