//! Editor preferences that tune snapping, stepping and hit-testing.

use kurbo::Vec2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for settings operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Finest pivot grid cell, as a share of the control size.
pub const MIN_PIVOT_SHARE: f64 = 0.01;

/// Settings of the transform engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Arrow-key step.
    pub keyboard_step: Vec2,
    /// Arrow-key step while the step modifier is held.
    pub keyboard_step_extended: Vec2,
    /// Distance (parent units) within which a moved box snaps to a magnet line.
    pub move_magnet_range: Vec2,
    /// Distance (parent units) within which a resized edge snaps.
    pub resize_magnet_range: Vec2,
    /// Distance (screen units) within which the pivot snaps to the pivot grid.
    pub pivot_magnet_range: Vec2,
    /// Pivot grid cell as a share of size, between `MIN_PIVOT_SHARE` and 1.
    pub share_of_size_to_magnet_pivot: Vec2,
    /// Rotation snap step in degrees.
    pub angle_segment: u32,
    /// Invert the meaning of shift for stepping and snapping.
    pub shift_inverted: bool,
    pub can_magnet: bool,
    /// Snapping is disabled above this canvas zoom.
    pub max_scale_to_magnet: f64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            keyboard_step: Vec2::new(1.0, 1.0),
            keyboard_step_extended: Vec2::new(10.0, 10.0),
            move_magnet_range: Vec2::new(7.0, 7.0),
            resize_magnet_range: Vec2::new(7.0, 7.0),
            pivot_magnet_range: Vec2::new(7.0, 7.0),
            share_of_size_to_magnet_pivot: Vec2::new(0.25, 0.25),
            angle_segment: 15,
            shift_inverted: false,
            can_magnet: true,
            max_scale_to_magnet: 8.0,
        }
    }
}

/// Settings of the selection engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSettings {
    /// Prefer a much smaller node nested under the cursor over its large container.
    pub can_find_common_for_selection: bool,
}

impl Default for SelectionSettings {
    fn default() -> Self {
        Self { can_find_common_for_selection: true }
    }
}

/// All editor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorSettings {
    pub transform: TransformSettings,
    pub selection: SelectionSettings,
    /// Whether user guides take part in snapping.
    pub guides_enabled: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            transform: TransformSettings::default(),
            selection: SelectionSettings::default(),
            guides_enabled: true,
        }
    }
}

impl EditorSettings {
    /// Parse settings from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let settings: EditorSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        let t = &self.transform;
        if t.angle_segment == 0 {
            return Err(invalid("transform.angle_segment", "must be at least 1 degree"));
        }
        if t.max_scale_to_magnet.is_nan() || t.max_scale_to_magnet <= 0.0 {
            return Err(invalid("transform.max_scale_to_magnet", "must be positive"));
        }
        let non_negative = [
            ("transform.move_magnet_range", t.move_magnet_range),
            ("transform.resize_magnet_range", t.resize_magnet_range),
            ("transform.pivot_magnet_range", t.pivot_magnet_range),
        ];
        for (field, value) in non_negative {
            if value.x < 0.0 || value.y < 0.0 {
                return Err(invalid(field, "components must not be negative"));
            }
        }
        let share = t.share_of_size_to_magnet_pivot;
        let in_range = |v: f64| (MIN_PIVOT_SHARE..=1.0).contains(&v);
        if !in_range(share.x) || !in_range(share.y) {
            return Err(invalid("transform.share_of_size_to_magnet_pivot", "components must be between 0.01 and 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    log::warn!("Rejecting settings: {} {}", field, reason);
    ConfigError::Invalid { field, reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = EditorSettings::default();
        assert_eq!(settings.transform.angle_segment, 15);
        assert_eq!(settings.transform.move_magnet_range, Vec2::new(7.0, 7.0));
        assert!(settings.selection.can_find_common_for_selection);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings = EditorSettings::from_json(r#"{ "transform": { "angle_segment": 45 }, "guides_enabled": false }"#).unwrap();
        assert_eq!(settings.transform.angle_segment, 45);
        assert_eq!(settings.transform.keyboard_step_extended, Vec2::new(10.0, 10.0));
        assert!(!settings.guides_enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EditorSettings::from_json(r#"{ "transform": { "angle_segment": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "transform.angle_segment", .. }));

        let err = EditorSettings::from_json(r#"{ "transform": { "move_magnet_range": { "x": -1.0, "y": 2.0 } } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "transform.move_magnet_range", .. }));

        assert!(matches!(EditorSettings::from_json("not json"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_pivot_share_must_be_a_usable_grid() {
        for share in ["0.0", "1e-9", "-0.25", "1.5"] {
            let json = format!(r#"{{ "transform": {{ "share_of_size_to_magnet_pivot": {{ "x": 0.25, "y": {share} }} }} }}"#);
            let err = EditorSettings::from_json(&json).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "transform.share_of_size_to_magnet_pivot", .. }));
        }
        let json = r#"{ "transform": { "share_of_size_to_magnet_pivot": { "x": 1.0, "y": 0.01 } } }"#;
        assert!(EditorSettings::from_json(json).is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut settings = EditorSettings::default();
        settings.transform.shift_inverted = true;
        write!(file, "{}", settings.to_json().unwrap()).unwrap();

        let loaded = EditorSettings::load(file.path()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = EditorSettings::load(dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
