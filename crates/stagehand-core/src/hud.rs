//! Interactive handle areas on the selected control.

use crate::tree::NodeId;
use kurbo::Vec2;
use serde::{Deserialize, Serialize};

/// The handle a gesture acts through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HudArea {
    #[default]
    None,
    // Resize corners and edges
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    /// Pivot point marker.
    Pivot,
    /// Rotation ring.
    Rotate,
    /// The control body; dragging it moves the selection.
    Frame,
}

impl HudArea {
    /// The eight resize areas.
    pub const RESIZE: [HudArea; 8] = [
        HudArea::TopLeft,
        HudArea::TopCenter,
        HudArea::TopRight,
        HudArea::CenterLeft,
        HudArea::CenterRight,
        HudArea::BottomLeft,
        HudArea::BottomCenter,
        HudArea::BottomRight,
    ];

    pub fn is_resize(self) -> bool {
        self.resize_directions().is_some()
    }

    /// Per-axis direction in which dragging this area grows the control.
    ///
    /// Components are -1 (the near edge moves), 0 (the axis is untouched) or
    /// +1 (the far edge moves).
    pub fn resize_directions(self) -> Option<Vec2> {
        let (x, y) = match self {
            HudArea::TopLeft => (-1.0, -1.0),
            HudArea::TopCenter => (0.0, -1.0),
            HudArea::TopRight => (1.0, -1.0),
            HudArea::CenterLeft => (-1.0, 0.0),
            HudArea::CenterRight => (1.0, 0.0),
            HudArea::BottomLeft => (-1.0, 1.0),
            HudArea::BottomCenter => (0.0, 1.0),
            HudArea::BottomRight => (1.0, 1.0),
            _ => return None,
        };
        Some(Vec2::new(x, y))
    }

    /// Whether resizing through this area moves the near edge on the given
    /// axis, which for a root control means moving the whole scene.
    pub fn moves_scene_on_x(self) -> bool {
        matches!(self, HudArea::BottomLeft | HudArea::CenterLeft | HudArea::TopLeft)
    }

    pub fn moves_scene_on_y(self) -> bool {
        matches!(self, HudArea::TopLeft | HudArea::TopCenter | HudArea::TopRight)
    }
}

/// The active handle and the control that owns it.
///
/// An owner is present exactly when the area is not [`HudArea::None`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudAreaInfo {
    owner: Option<NodeId>,
    area: HudArea,
}

impl HudAreaInfo {
    pub fn new(owner: NodeId, area: HudArea) -> Self {
        if area == HudArea::None {
            return Self::default();
        }
        Self { owner: Some(owner), area }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub fn area(&self) -> HudArea {
        self.area
    }

    pub fn is_none(&self) -> bool {
        self.area == HudArea::None
    }
}
