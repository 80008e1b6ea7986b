//! Input events as seen by the editor systems.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, ctrl: false, alt: false, meta: false };

    pub fn shift() -> Self {
        Self { shift: true, ..Self::NONE }
    }

    pub fn ctrl() -> Self {
        Self { ctrl: true, ..Self::NONE }
    }

    pub fn alt() -> Self {
        Self { alt: true, ..Self::NONE }
    }
}

/// Device that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputDevice {
    Mouse,
    Keyboard,
}

/// Lifecycle phase of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Button pressed.
    Began,
    /// Pointer moved with a button held.
    Drag,
    /// Button released.
    Ended,
    /// Pointer moved with no button held.
    Moved,
    KeyDown,
    KeyDownRepeat,
    KeyUp,
    Wheel,
}

/// Keys the editor reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Left,
    Right,
    Up,
    Down,
    Escape,
    Character(String),
}

/// Where an event was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// Real user input.
    User,
    /// Synthetic pointer event produced because the canvas moved under the pointer.
    Canvas,
}

/// A single input event routed through the systems manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub device: InputDevice,
    pub phase: Phase,
    /// Pointer position in screen coordinates.
    pub point: Point,
    pub mouse_button: Option<MouseButton>,
    /// Number of consecutive clicks; the manager folds it to 1 or 2.
    pub tap_count: u32,
    pub key: Option<Key>,
    pub modifiers: Modifiers,
}

impl InputEvent {
    fn mouse(phase: Phase, point: Point, button: Option<MouseButton>) -> Self {
        Self {
            device: InputDevice::Mouse,
            phase,
            point,
            mouse_button: button,
            tap_count: 0,
            key: None,
            modifiers: Modifiers::NONE,
        }
    }

    /// Left button press.
    pub fn mouse_down(point: Point) -> Self {
        Self { tap_count: 1, ..Self::mouse(Phase::Began, point, Some(MouseButton::Left)) }
    }

    /// Left button drag.
    pub fn drag(point: Point) -> Self {
        Self::mouse(Phase::Drag, point, Some(MouseButton::Left))
    }

    /// Left button release.
    pub fn mouse_up(point: Point) -> Self {
        Self::mouse(Phase::Ended, point, Some(MouseButton::Left))
    }

    /// Hover without buttons.
    pub fn hover(point: Point) -> Self {
        Self::mouse(Phase::Moved, point, None)
    }

    /// Key press.
    pub fn key_down(key: Key) -> Self {
        Self {
            device: InputDevice::Keyboard,
            phase: Phase::KeyDown,
            point: Point::ZERO,
            mouse_button: None,
            tap_count: 0,
            key: Some(key),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_tap_count(mut self, tap_count: u32) -> Self {
        self.tap_count = tap_count;
        self
    }

    pub fn is_mouse(&self) -> bool {
        self.device == InputDevice::Mouse
    }

    pub fn is_left_button(&self) -> bool {
        self.mouse_button == Some(MouseButton::Left)
    }
}

/// Fold a click series into single/double clicks.
///
/// Only double clicks are detected from a series, so the third click counts as
/// a first click again, the fourth as a double click, and so on.
pub fn fold_tap_count(tap_count: u32) -> u32 {
    if tap_count == 0 {
        0
    } else if tap_count % 2 == 1 {
        1
    } else {
        2
    }
}
