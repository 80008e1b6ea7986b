//! Resizing through the eight edge and corner handles.

use super::TransformSystem;
use crate::document::{Command, PropertyChange};
use crate::geometry::{component, component_mut, div, mul, quantize_vec, rotate, vec_from_axes, Axis};
use crate::magnet::{create_magnet_lines, extract_matched_lines, nearest_line_for_resize, MagnetKind, MagnetLineInfo};
use crate::systems::{EditorEvent, SystemContext};
use kurbo::Vec2;

/// Controls never get smaller than this, in screen units at the current scale.
const MINIMUM_SIZE: f64 = 16.0;

impl TransformSystem {
    /// Resize the active control through one of the eight resize handles.
    ///
    /// `with_pivot` keeps the pivot in place and grows both sides around it,
    /// `rateably` keeps the aspect ratio.
    pub(super) fn resize_control(&mut self, delta: Vec2, with_pivot: bool, rateably: bool, cx: &mut SystemContext) {
        let (Some(active), Some(props)) = (self.active_node, self.properties) else {
            return;
        };
        let Some(directions) = self.active_area.resize_directions() else {
            return;
        };
        let tree = cx.document.tree();
        let (Some(local), Some(pivot), Some(original_size), Some(original_position)) = (
            tree.local_geometric_data(active),
            tree.vec2_value(&props.pivot),
            tree.vec2_value(&props.size),
            tree.vec2_value(&props.position),
        ) else {
            return;
        };
        let is_root = tree.is_root_control(active);
        if !self.control_gd.has_valid_scale() || !local.has_valid_scale() {
            return;
        }

        let mapped = self.control_gd.delta_to_local(delta);
        let mut delta_size = mapped;
        let mut delta_position = mapped;
        for axis in Axis::ALL {
            let direction = component(directions, axis);
            let share = component(pivot, axis);
            *component_mut(&mut delta_size, axis) *= direction;
            *component_mut(&mut delta_position, axis) *= if direction < 0.0 { 1.0 - share } else { share };
            if direction == 0.0 {
                *component_mut(&mut delta_position, axis) = 0.0;
            }
            if with_pivot {
                *component_mut(&mut delta_position, axis) = 0.0;
                let pivot_delta = if direction < 0.0 { share } else { 1.0 - share };
                if pivot_delta != 0.0 {
                    *component_mut(&mut delta_size, axis) /= pivot_delta;
                }
            }
        }

        if rateably && original_size.x > 0.0 && original_size.y > 0.0 {
            let proportion = original_size.x / original_size.y;
            let proportional = Vec2::new(delta_size.y * proportion, delta_size.x / proportion);
            // the axis that moved less follows the other one
            let axis = if delta_size.y.abs() > delta_size.x.abs() { Axis::X } else { Axis::Y };
            *component_mut(&mut delta_size, axis) = component(proportional, axis);
            if !with_pivot {
                let direction = component(directions, axis);
                let share = component(pivot, axis);
                let factor = if direction == 0.0 {
                    (0.5 - share) * -1.0
                } else {
                    (if direction < 0.0 { 1.0 - share } else { share }) * direction
                };
                *component_mut(&mut delta_position, axis) = component(proportional, axis) * factor;
            }
        }

        let transform_point = vec_from_axes(|axis| {
            let point = if with_pivot { component(pivot, axis) } else { 0.0 };
            if component(directions, axis) < 0.0 { 1.0 - point } else { point }
        });

        let original_delta_size = delta_size;
        delta_size += self.extra_delta;
        self.extra_delta = Vec2::ZERO;

        let adjusted = self.adjust_resize_to_border_and_minimum(delta_size, transform_point, directions, cx);
        let adjusted = quantize_vec(adjusted, &mut self.extra_delta);
        for axis in Axis::ALL {
            let original = component(original_delta_size, axis);
            if original != 0.0 {
                *component_mut(&mut delta_position, axis) *= component(adjusted, axis) / original;
            }
        }

        let delta_position = rotate(mul(delta_position, local.scale), local.angle);
        let final_size = original_size + adjusted;
        let mut final_position = original_position;
        if is_root {
            // a root control stays in place, the scene moves under it instead
            let mut scene_delta = div(rotate(delta_position, -local.angle), local.scale);
            scene_delta -= mul(adjusted, pivot);
            scene_delta = mul(scene_delta, mul(self.parent_gd.scale, local.scale));
            cx.canvas.move_scene(scene_delta, true);
            cx.canvas.set_root_frame_size(final_size);
            cx.canvas.shift_counterpoise(mul(adjusted, pivot));
        } else {
            final_position += delta_position;
        }

        Self::exec(
            cx,
            Command::Resize {
                size: PropertyChange::vec2(props.size, final_size),
                position: PropertyChange::vec2(props.position, final_position),
            },
        );
    }

    fn adjust_resize_to_border_and_minimum(
        &mut self,
        delta_size: Vec2,
        transform_point: Vec2,
        directions: Vec2,
        cx: &mut SystemContext,
    ) -> Vec2 {
        let mut magnets = Vec::new();
        let unrotated = self
            .active_node
            .and_then(|node| cx.document.tree().local_geometric_data(node))
            .is_some_and(|gd| gd.angle == 0.0);

        let to_border = if Self::can_magnet(cx) && unrotated {
            self.adjust_resize_to_border(delta_size, transform_point, directions, &mut magnets, cx)
        } else {
            delta_size
        };
        let adjusted = self.adjust_resize_to_minimum_size(to_border, cx);
        if adjusted != to_border {
            magnets.clear();
        }
        cx.events.emit(EditorEvent::MagnetLinesChanged(magnets));
        adjusted
    }

    /// Snap the moving edges to magnet lines. Axes whose near edge would
    /// drag the scene of a root control are left alone.
    fn adjust_resize_to_border(
        &mut self,
        mut delta_size: Vec2,
        transform_point: Vec2,
        directions: Vec2,
        magnets: &mut Vec<MagnetLineInfo>,
        cx: &SystemContext,
    ) -> Vec2 {
        let Some(active) = self.active_node else {
            return delta_size;
        };
        let tree = cx.document.tree();
        let Some(mut gd) = tree.local_geometric_data(active) else {
            return delta_size;
        };
        let is_root = tree.is_root_control(active);

        gd.size += delta_size;
        let size_affect = rotate(mul(mul(delta_size, transform_point), gd.scale), gd.angle);
        let control_box = gd.aabb() - size_affect;

        let targets = self.magnet_targets(&*cx.document, cx.settings, &self.parent_gd, MagnetKind::Resize);
        let range = cx.settings.transform.resize_magnet_range;

        for axis in Axis::ALL {
            let direction = component(directions, axis);
            if direction == 0.0 {
                continue;
            }
            let moves_scene = match axis {
                Axis::X => self.active_area.moves_scene_on_x(),
                Axis::Y => self.active_area.moves_scene_on_y(),
            };
            if is_root && moves_scene {
                continue;
            }

            let mut lines = create_magnet_lines(control_box, &targets, axis, MagnetKind::Resize);
            let Some(nearest) = nearest_line_for_resize(&lines, transform_point).cloned() else {
                continue;
            };
            let share = (nearest.control_share - component(transform_point, axis)).abs();
            let range = component(range, axis) * share;
            let within = nearest.control_position >= nearest.target_position - range
                && nearest.control_position <= nearest.target_position + range;
            if within && share > 0.0 {
                let old = component(delta_size, axis);
                let interval = nearest.interval * direction * -1.0 / share;
                *component_mut(&mut delta_size, axis) += interval / component(gd.scale, axis);
                *component_mut(&mut self.extra_delta, axis) += old - component(delta_size, axis);
            }

            for line in &mut lines {
                let line_share = (line.control_share - component(transform_point, line.axis)).abs();
                line.interval -= component(self.extra_delta, line.axis)
                    * component(gd.scale, line.axis)
                    * line_share
                    * component(directions, line.axis);
            }
            magnets.extend(extract_matched_lines(&lines, &self.parent_gd));
        }
        delta_size
    }

    /// Stop shrinking at the minimum size and bank the overshoot.
    fn adjust_resize_to_minimum_size(&mut self, mut delta_size: Vec2, cx: &SystemContext) -> Vec2 {
        let Some(props) = self.properties else {
            return delta_size;
        };
        let Some(original_size) = cx.document.tree().vec2_value(&props.size) else {
            return delta_size;
        };
        let scaled_minimum = div(Vec2::new(MINIMUM_SIZE, MINIMUM_SIZE), self.control_gd.scale);
        let scaled_minimum = Vec2::new(scaled_minimum.x.max(1.0), scaled_minimum.y.max(1.0));
        let final_size = original_size + delta_size;

        for axis in Axis::ALL {
            let delta = component(delta_size, axis);
            if delta > 0.0 {
                continue;
            }
            let minimum = component(scaled_minimum, axis);
            let original = component(original_size, axis);
            if original > minimum {
                let size = component(final_size, axis);
                if size > minimum {
                    continue;
                }
                *component_mut(&mut self.extra_delta, axis) += size - minimum;
                *component_mut(&mut delta_size, axis) = minimum - original;
            } else {
                *component_mut(&mut self.extra_delta, axis) += delta;
                *component_mut(&mut delta_size, axis) = 0.0;
            }
        }
        delta_size
    }
}
