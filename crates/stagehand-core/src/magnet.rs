//! Magnet lines: alignment candidates between a transformed box and its
//! surroundings, and the indicators published for the ones that matched.
//!
//! All boxes live in the parent's local frame of the control being edited.

use crate::geometry::{component, rect_extent, rect_start, Axis, GeometricData, TRANSFORM_EPSILON};
use kurbo::{Rect, Vec2};
use serde::{Deserialize, Serialize};

/// (control share, target share) pairs against the parent box.
const PARENT_BORDERS: [(f64, f64); 5] = [(0.0, 0.0), (0.0, 0.5), (0.5, 0.5), (1.0, 0.5), (1.0, 1.0)];

/// (control share, target share) pairs against each neighbour box.
const NEIGHBOUR_BORDERS: [(f64, f64); 7] = [
    (0.0, 0.0),
    (0.0, 0.5),
    (0.5, 0.5),
    (1.0, 0.5),
    (1.0, 1.0),
    (0.0, 1.0),
    (1.0, 0.0),
];

/// (control share, target share) pairs against each child box.
const CHILD_BORDERS: [(f64, f64); 1] = [(1.0, 1.0)];

/// Control shares aligned to guides for a root control.
pub const ROOT_GUIDE_SHARES: [f64; 2] = [0.5, 1.0];

/// Control shares aligned to guides for nested controls.
pub const GUIDE_SHARES: [f64; 3] = [0.0, 0.5, 1.0];

/// Which gesture the candidates are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagnetKind {
    Move,
    Resize,
}

/// One alignment candidate on one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnetLine {
    /// Anchor on the control as a share of its extent.
    pub control_share: f64,
    pub control_position: f64,
    pub control_box: Rect,
    pub target_position: f64,
    /// Box the target position was taken from. Guides have none.
    pub target_box: Option<Rect>,
    pub axis: Axis,
    /// Signed distance from the control anchor to the target.
    pub interval: f64,
}

impl MagnetLine {
    /// Align `control_share` of the control box with `target_share` of a target box.
    pub fn to_box(control_share: f64, control_box: Rect, target_share: f64, target_box: Rect, axis: Axis) -> Self {
        let target_position = rect_start(target_box, axis) + rect_extent(target_box, axis) * target_share;
        Self {
            target_box: Some(target_box),
            ..Self::to_position(control_share, control_box, target_position, axis)
        }
    }

    /// Align `control_share` of the control box with a fixed coordinate.
    pub fn to_position(control_share: f64, control_box: Rect, target_position: f64, axis: Axis) -> Self {
        let control_position = rect_start(control_box, axis) + rect_extent(control_box, axis) * control_share;
        Self {
            control_share,
            control_position,
            control_box,
            target_position,
            target_box: None,
            axis,
            interval: control_position - target_position,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.interval.abs() < TRANSFORM_EPSILON
    }
}

/// Indicator for a matched magnet line, published to the HUD layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnetLineInfo {
    /// The box the control aligned with.
    pub target_rect: Rect,
    /// The indicator segment, one unit thick.
    pub rect: Rect,
    /// Frame the rects are expressed in.
    pub gd: GeometricData,
    /// Axis along which the control snapped. The segment runs across it.
    pub axis: Axis,
}

/// Everything a control may snap to, resolved in the parent's frame.
#[derive(Debug, Clone, Default)]
pub struct MagnetTargets {
    /// Size of the parent box. `None` when the parent is not a control.
    pub parent_size: Option<Vec2>,
    /// Axis-aligned boxes of the siblings that take part in snapping.
    pub neighbours: Vec<Rect>,
    /// Guide positions per axis (x first).
    pub guides: [Vec<f64>; 2],
    /// Control shares aligned with each guide.
    pub guide_shares: Vec<f64>,
    /// Children boxes in the control's own frame. Used for resize only.
    pub children: Vec<Rect>,
}

impl MagnetTargets {
    fn guides_on(&self, axis: Axis) -> &[f64] {
        match axis {
            Axis::X => &self.guides[0],
            Axis::Y => &self.guides[1],
        }
    }
}

/// Build every candidate line for `control_box` on one axis.
pub fn create_magnet_lines(control_box: Rect, targets: &MagnetTargets, axis: Axis, kind: MagnetKind) -> Vec<MagnetLine> {
    let mut lines = Vec::new();

    if let Some(parent_size) = targets.parent_size.filter(|size| component(*size, axis) > 0.0) {
        let parent_box = Rect::from_origin_size((0.0, 0.0), parent_size.to_size());
        for (control, target) in PARENT_BORDERS {
            lines.push(MagnetLine::to_box(control, control_box, target, parent_box, axis));
        }
    }

    for &neighbour in &targets.neighbours {
        for (control, target) in NEIGHBOUR_BORDERS {
            lines.push(MagnetLine::to_box(control, control_box, target, neighbour, axis));
        }
    }

    for &guide in targets.guides_on(axis) {
        for &share in &targets.guide_shares {
            lines.push(MagnetLine::to_position(share, control_box, guide, axis));
        }
    }

    if kind == MagnetKind::Resize {
        for &child in &targets.children {
            let child_box = child + control_box.origin().to_vec2();
            for (control, target) in CHILD_BORDERS {
                lines.push(MagnetLine::to_box(control, control_box, target, child_box, axis));
            }
        }
    }

    lines
}

/// The candidate with the smallest distance. Ties go to the earliest line.
pub fn nearest_line(lines: &[MagnetLine]) -> Option<&MagnetLine> {
    lines.iter().min_by(|a, b| a.interval.abs().total_cmp(&b.interval.abs()))
}

/// The candidate closest in terms of size change when the edge at
/// `transform_point` (a share of the control) stays in place.
pub fn nearest_line_for_resize(lines: &[MagnetLine], transform_point: Vec2) -> Option<&MagnetLine> {
    let rank = |line: &MagnetLine| {
        let share = line.control_share - component(transform_point, line.axis);
        if share == 0.0 { f64::MAX } else { (line.interval / share).abs() }
    };
    lines.iter().min_by(|a, b| rank(a).total_cmp(&rank(b)))
}

/// Indicators for every line that ended up aligned.
pub fn extract_matched_lines(lines: &[MagnetLine], gd: &GeometricData) -> Vec<MagnetLineInfo> {
    lines
        .iter()
        .filter(|line| line.is_matched())
        .map(|line| {
            let axis = line.axis;
            let cross = axis.opposite();
            let target_box = line.target_box.unwrap_or(line.control_box);

            let control_top = rect_start(line.control_box, cross);
            let control_bottom = control_top + rect_extent(line.control_box, cross);
            let target_top = rect_start(target_box, cross);
            let target_bottom = target_top + rect_extent(target_box, cross);

            let top = control_top.min(target_top);
            let length = control_bottom.max(target_bottom) - top;
            let rect = match axis {
                Axis::X => Rect::from_origin_size((line.target_position, top), (1.0, length)),
                Axis::Y => Rect::from_origin_size((top, line.target_position), (length, 1.0)),
            };
            log::trace!("Magnet matched on {:?} at {}", axis, line.target_position);
            MagnetLineInfo { target_rect: target_box, rect, gd: *gd, axis }
        })
        .collect()
}

/// Crosshair through a pivot placed at `pivot` (a share of size), in the
/// control's own frame.
pub fn pivot_lines(pivot: Vec2, control_gd: &GeometricData) -> Vec<MagnetLineInfo> {
    let size = control_gd.size;
    let offset = Vec2::new(size.x * pivot.x, size.y * pivot.y);
    let target_rect = Rect::from_origin_size((0.0, 0.0), size.to_size());
    let vertical = Rect::from_origin_size((offset.x, 0.0), (1.0, size.y));
    let horizontal = Rect::from_origin_size((0.0, offset.y), (size.x, 1.0));
    vec![
        MagnetLineInfo { target_rect, rect: vertical, gd: *control_gd, axis: Axis::X },
        MagnetLineInfo { target_rect, rect: horizontal, gd: *control_gd, axis: Axis::Y },
    ]
}

/// Convert a guide value from root control coordinates into the local frame
/// of `parent`. Returns `None` when the parent scale cannot be divided by.
pub fn guide_in_parent(value: f64, root: &GeometricData, parent: &GeometricData, axis: Axis) -> Option<f64> {
    let root_scale = component(root.scale, axis);
    let parent_scale = component(parent.scale, axis);
    if parent_scale == 0.0 {
        return None;
    }
    let root_origin = component(root.position, axis) - component(root.pivot_point, axis) * root_scale;
    let parent_origin = component(parent.position, axis) - component(parent.pivot_point, axis) * parent_scale;
    let global = value * root_scale + root_origin;
    Some((global - parent_origin) / parent_scale)
}
