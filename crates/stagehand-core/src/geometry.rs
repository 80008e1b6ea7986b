//! Geometry helpers shared by the hit-testing and transform code.
//!
//! Everything is expressed with `kurbo` primitives. A [`GeometricData`] is a
//! resolved frame of a node: where its pivot sits, how large it is, and how it
//! is scaled and rotated relative to some reference frame (the parent for
//! local data, the screen for world data).

use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing positional values produced by transforms.
pub const TRANSFORM_EPSILON: f64 = 0.0005;

/// One of the two coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Both axes in evaluation order.
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    /// The perpendicular axis.
    pub fn opposite(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

/// Read one component of a vector.
pub fn component(v: Vec2, axis: Axis) -> f64 {
    match axis {
        Axis::X => v.x,
        Axis::Y => v.y,
    }
}

/// Mutable access to one component of a vector.
pub fn component_mut(v: &mut Vec2, axis: Axis) -> &mut f64 {
    match axis {
        Axis::X => &mut v.x,
        Axis::Y => &mut v.y,
    }
}

/// Build a vector from per-axis values.
pub fn vec_from_axes(f: impl Fn(Axis) -> f64) -> Vec2 {
    Vec2::new(f(Axis::X), f(Axis::Y))
}

/// Component-wise product.
pub fn mul(a: Vec2, b: Vec2) -> Vec2 {
    Vec2::new(a.x * b.x, a.y * b.y)
}

/// Component-wise quotient. Components divided by zero become zero.
pub fn div(a: Vec2, b: Vec2) -> Vec2 {
    let safe = |n: f64, d: f64| if d == 0.0 { 0.0 } else { n / d };
    Vec2::new(safe(a.x, b.x), safe(a.y, b.y))
}

/// Rotate a vector counter-clockwise (in y-down screen space: clockwise) by `angle` radians.
pub fn rotate(v: Vec2, angle: f64) -> Vec2 {
    if angle == 0.0 {
        return v;
    }
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Start coordinate of a rect on an axis.
pub fn rect_start(rect: Rect, axis: Axis) -> f64 {
    match axis {
        Axis::X => rect.x0,
        Axis::Y => rect.y0,
    }
}

/// Extent of a rect on an axis.
pub fn rect_extent(rect: Rect, axis: Axis) -> f64 {
    match axis {
        Axis::X => rect.width(),
        Axis::Y => rect.height(),
    }
}

/// Quantize a value to the integer grid and bank the fractional part.
///
/// Returns the floored value; `remainder` accumulates what was cut off so
/// that repeated quantized edits do not drift.
pub fn quantize(value: f64, remainder: &mut f64) -> f64 {
    let clamped = value.floor();
    *remainder += value - clamped;
    clamped
}

/// Per-axis [`quantize`] with a small tolerance so values a hair below an
/// integer are not pushed down a whole unit.
pub fn quantize_vec(value: Vec2, remainder: &mut Vec2) -> Vec2 {
    let clamped = Vec2::new(
        (value.x + TRANSFORM_EPSILON).floor(),
        (value.y + TRANSFORM_EPSILON).floor(),
    );
    *remainder += value - clamped;
    clamped
}

/// Resolved frame of a node.
///
/// `position` is where the pivot lands in the reference frame, `pivot_point`
/// is the pivot in the node's own unscaled units (pivot share × size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometricData {
    pub position: Vec2,
    pub size: Vec2,
    pub scale: Vec2,
    /// Rotation in radians.
    pub angle: f64,
    pub pivot_point: Vec2,
}

impl Default for GeometricData {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            size: Vec2::ZERO,
            scale: Vec2::new(1.0, 1.0),
            angle: 0.0,
            pivot_point: Vec2::ZERO,
        }
    }
}

impl GeometricData {
    /// Frame of a node from its local properties. `pivot` is a share of `size`.
    pub fn local(position: Vec2, size: Vec2, scale: Vec2, angle: f64, pivot: Vec2) -> Self {
        Self {
            position,
            size,
            scale,
            angle,
            pivot_point: mul(pivot, size),
        }
    }

    /// Compose this local frame with the frame of its parent.
    pub fn in_parent(&self, parent: &GeometricData) -> GeometricData {
        let offset = mul(self.position - parent.pivot_point, parent.scale);
        GeometricData {
            position: parent.position + rotate(offset, parent.angle),
            size: self.size,
            scale: mul(self.scale, parent.scale),
            angle: self.angle + parent.angle,
            pivot_point: self.pivot_point,
        }
    }

    /// Box of the node ignoring rotation.
    pub fn unrotated_rect(&self) -> Rect {
        let origin = self.position - mul(self.pivot_point, self.scale);
        let size = mul(self.size, self.scale);
        Rect::new(origin.x, origin.y, origin.x + size.x, origin.y + size.y)
    }

    /// Axis-aligned bounding box of the rotated node.
    pub fn aabb(&self) -> Rect {
        let rect = self.unrotated_rect();
        if self.angle == 0.0 {
            return rect;
        }
        let corners = [
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x1, rect.y1),
            Point::new(rect.x0, rect.y1),
        ];
        let pivot = self.position.to_point();
        let mut bounds: Option<Rect> = None;
        for corner in corners {
            let rotated = pivot + rotate(corner - pivot, self.angle);
            bounds = Some(match bounds {
                Some(b) => b.union_pt(rotated),
                None => Rect::from_points(rotated, rotated),
            });
        }
        bounds.unwrap_or(rect)
    }

    /// Whether a point (in the reference frame) lies inside the rotated box.
    pub fn contains(&self, point: Point) -> bool {
        let local = rotate(point.to_vec2() - self.position, -self.angle);
        let scaled = div(local, self.scale) + self.pivot_point;
        scaled.x >= 0.0 && scaled.y >= 0.0 && scaled.x <= self.size.x && scaled.y <= self.size.y
    }

    /// Screen-space delta to this frame's local units: divide by scale, rotate back.
    pub fn delta_to_local(&self, delta: Vec2) -> Vec2 {
        rotate(div(delta, self.scale), -self.angle)
    }

    /// Local delta to screen space: rotate, then multiply by scale.
    pub fn delta_to_screen(&self, delta: Vec2) -> Vec2 {
        mul(rotate(delta, self.angle), self.scale)
    }

    /// Whether the scale is usable as a divisor.
    pub fn has_valid_scale(&self) -> bool {
        self.scale.x > 0.0 && self.scale.y > 0.0
    }
}
