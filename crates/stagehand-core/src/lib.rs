//! Stagehand Core Library
//!
//! Interaction core of a visual UI layout editor: routes pointer and keyboard
//! input to cooperating editor systems, resolves which control a click refers
//! to, and turns drags on a control's handles into move, resize, rotate and
//! pivot edits with magnet snapping.
//!
//! The core owns no scene data. It reads the scene through [`NodeTree`] and
//! submits edits as [`Command`]s to a [`Document`].

pub mod document;
pub mod geometry;
pub mod hud;
pub mod input;
pub mod magnet;
pub mod memory;
pub mod settings;
pub mod systems;
pub mod tree;

pub use document::{CanvasAdapter, Command, CommandError, CommandResult, Document, PropertyChange};
pub use geometry::{Axis, GeometricData};
pub use hud::{HudArea, HudAreaInfo};
pub use input::{InputEvent, InputSource, Key, Modifiers, MouseButton, Phase};
pub use magnet::{MagnetLine, MagnetLineInfo};
pub use memory::{MemoryCanvas, MemoryDocument, SceneNode, SceneTree};
pub use settings::{ConfigError, EditorSettings, SelectionSettings, TransformSettings};
pub use systems::{
    DisplayState, DragState, EditorContext, EditorEvent, EditorSystem, EditorSystemsManager, EventBus,
    InteractionState, SelectionSystem, SystemContext, SystemOrder, TransformSystem,
};
pub use tree::{NodeId, NodeTree, PropertyHandle, PropertyName, PropertyValue, SelectedNodes};
