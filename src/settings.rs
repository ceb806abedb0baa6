//! Trapping settings: the full parameter set, technology presets and
//! JSON-merge partial updates.
//!
//! Every field has a default; presets are deltas applied on top of
//! [`TrapSettings::default`]. Partial updates arrive as JSON fragments and
//! are deep-merged over the serialized current settings, so callers only
//! name the fields they change.

use serde_derive::{Deserialize, Serialize};

use crate::errors::TrapError;
use crate::offset::CornerStyle;
use crate::rules::TrapRule;
use crate::units::{Mm, Pt};

/// Normal trapping vs. reverse (white-knockout for metallic substrates)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapMode {
    #[default]
    Normal,
    Reverse,
}

/// Printing technology, drives the trap width multiplier
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technology {
    #[default]
    Flexo,
    Offset,
    Digital,
    Gravure,
    Screen,
    DryOffset,
}

impl Technology {
    /// Width multiplier applied to every resolved trap width
    pub fn width_factor(&self) -> f64 {
        match self {
            Technology::Flexo => 1.2,
            Technology::Offset => 1.0,
            Technology::Digital => 0.8,
            Technology::Gravure => 1.1,
            Technology::Screen => 1.5,
            Technology::DryOffset => 1.0,
        }
    }

    pub const ALL: [Technology; 6] = [
        Technology::Flexo,
        Technology::Offset,
        Technology::Digital,
        Technology::Gravure,
        Technology::Screen,
        Technology::DryOffset,
    ];
}

/// How color priorities are computed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectionMethod {
    NeutralDensity,
    #[default]
    UseLightness,
    Chroma,
    Custom,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageTrapDirection {
    #[default]
    Automatic,
    IntoImage,
    AwayFromImage,
}

/// Where a trap is cut off when it would bleed into a third color
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TruncationMode {
    #[default]
    OnCenter,
    OnEdge,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndCapStyle {
    #[default]
    Square,
    Round,
    ObjectDependent,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullbackMode {
    #[default]
    Automatic,
    Always,
    Never,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CenterlineBehavior {
    #[default]
    Automatic,
    Always,
    Never,
}

/// Whether small objects inherit the pair decision or are skipped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapDecisionMode {
    #[default]
    SameForSmall,
    PerObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ModeSettings {
    /// Master switch
    pub enabled: bool,
    pub mode: TrapMode,
    pub technology: Technology,
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: TrapMode::default(),
            technology: Technology::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DistanceSettings {
    pub default_width: Mm,
    /// Lower clamp for every resolved width
    pub min_width: Mm,
    /// Upper clamp for every resolved width
    pub max_width: Mm,
    pub into_black: Mm,
    pub into_spot: Mm,
    pub into_image: Mm,
    pub pullback_distance: Mm,
    /// Gate for rule activation, percent of total ink difference
    pub min_ink_difference_pct: f64,
}

impl Default for DistanceSettings {
    fn default() -> Self {
        Self {
            default_width: Mm(0.20),
            min_width: Mm(0.05),
            max_width: Mm(0.50),
            into_black: Mm(0.25),
            into_spot: Mm(0.20),
            into_image: Mm(0.15),
            pullback_distance: Mm(0.10),
            min_ink_difference_pct: 10.0,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DirectionSettings {
    pub direction_method: DirectionMethod,
    pub image_trap_direction: ImageTrapDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ColorSettings {
    pub trap_color_intensity_pct: f64,
    pub truncation_mode: TruncationMode,
    pub end_cap_style: EndCapStyle,
    pub corner_style: CornerStyle,
    pub miter_limit: f64,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            trap_color_intensity_pct: 100.0,
            truncation_mode: TruncationMode::default(),
            end_cap_style: EndCapStyle::default(),
            corner_style: CornerStyle::Miter,
            miter_limit: 4.0,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct PullbackSettings {
    pub pullback_mode: PullbackMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ProcessingSettings {
    pub centerline_behavior: CenterlineBehavior,
    pub trap_decision_mode: TrapDecisionMode,
    pub small_object_threshold: Mm,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            centerline_behavior: CenterlineBehavior::default(),
            trap_decision_mode: TrapDecisionMode::default(),
            small_object_threshold: Mm(1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct SpecialSettings {
    pub trap_black_to_all: bool,
    pub black_trap_width: Mm,
    pub trap_white_underprint: bool,
    pub white_spread: Mm,
    pub trap_metallics: bool,
    pub metallic_trap_width: Mm,
}

impl Default for SpecialSettings {
    fn default() -> Self {
        Self {
            trap_black_to_all: true,
            black_trap_width: Mm(0.25),
            trap_white_underprint: true,
            white_spread: Mm(0.30),
            trap_metallics: true,
            metallic_trap_width: Mm(0.20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TextSettings {
    pub trap_text: bool,
    pub min_text_size: Pt,
    /// Width reduction factor for text between the minimum size and 10 pt
    pub text_trap_reduction: f64,
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            trap_text: true,
            min_text_size: Pt(6.0),
            text_trap_reduction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct LineSettings {
    pub trap_thin_lines: bool,
    pub min_line_width: Mm,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            trap_thin_lines: false,
            min_line_width: Mm(0.25),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ImageSettings {
    pub trap_images: bool,
    pub image_edge_feather: Mm,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            trap_images: true,
            image_edge_feather: Mm(0.10),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct RuleSettings {
    /// Ordered list of user rules, highest priority first
    pub custom_rules: Vec<TrapRule>,
}

/// Complete, serializable trapping configuration
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct TrapSettings {
    pub mode: ModeSettings,
    pub distance: DistanceSettings,
    pub direction: DirectionSettings,
    pub color: ColorSettings,
    pub pullback: PullbackSettings,
    pub processing: ProcessingSettings,
    pub special: SpecialSettings,
    pub text: TextSettings,
    pub lines: LineSettings,
    pub images: ImageSettings,
    pub rules: RuleSettings,
}

impl TrapSettings {
    /// Technology preset: a delta applied on top of the defaults
    pub fn preset(technology: Technology) -> Self {
        let mut s = Self::default();
        s.mode.technology = technology;
        match technology {
            Technology::Flexo => {}
            Technology::Offset => {
                s.distance.default_width = Mm(0.15);
            }
            Technology::Digital => {
                s.distance.default_width = Mm(0.15);
            }
            Technology::Gravure => {
                s.distance.default_width = Mm(0.25);
            }
            Technology::Screen => {
                s.distance.default_width = Mm(0.25);
                s.distance.min_width = Mm(0.10);
            }
            Technology::DryOffset => {}
        }
        s
    }

    /// Deep-merges a partial JSON settings fragment over this configuration.
    ///
    /// Unknown keys are rejected; the current settings are returned unchanged
    /// in that case.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<TrapSettings, TrapError> {
        let mut base = serde_json::to_value(self)
            .map_err(|e| TrapError::InvalidSettings(e.to_string()))?;
        merge_json(&mut base, patch);
        serde_json::from_value(base).map_err(|e| TrapError::InvalidSettings(e.to_string()))
    }
}

fn merge_json(base: &mut serde_json::Value, patch: &serde_json::Value) {
    use serde_json::Value;
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                merge_json(
                    base_map.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn defaults_match_the_documented_table() {
        let s = TrapSettings::default();
        assert!(s.mode.enabled);
        assert_eq!(s.mode.technology, Technology::Flexo);
        assert_eq!(s.distance.default_width, Mm(0.20));
        assert_eq!(s.distance.min_width, Mm(0.05));
        assert_eq!(s.distance.max_width, Mm(0.50));
        assert_eq!(s.direction.direction_method, DirectionMethod::UseLightness);
        assert_eq!(s.color.miter_limit, 4.0);
        assert_eq!(s.special.white_spread, Mm(0.30));
        assert_eq!(s.special.black_trap_width, Mm(0.25));
        assert_eq!(s.text.min_text_size, Pt(6.0));
        assert!(!s.lines.trap_thin_lines);
        assert_eq!(s.images.image_edge_feather, Mm(0.10));
        assert!(s.rules.custom_rules.is_empty());
    }

    #[test]
    fn settings_roundtrip_through_serde() {
        let s = TrapSettings::preset(Technology::Screen);
        let json = serde_json::to_string(&s).unwrap();
        let back: TrapSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn partial_merge_changes_only_named_fields() {
        let base = TrapSettings::default();
        let merged = base
            .merged(&json!({
                "distance": { "default-width": 0.3 },
                "mode": { "technology": "screen" }
            }))
            .unwrap();
        assert_eq!(merged.distance.default_width, Mm(0.3));
        assert_eq!(merged.mode.technology, Technology::Screen);
        // untouched fields keep their values
        assert_eq!(merged.distance.min_width, base.distance.min_width);
        assert_eq!(merged.special, base.special);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let base = TrapSettings::default();
        assert!(base.merged(&json!({ "distance": { "not-a-field": 1 } })).is_err());
    }

    #[test]
    fn every_technology_has_a_width_factor() {
        for t in Technology::ALL {
            assert!(t.width_factor() > 0.0);
        }
        assert_eq!(Technology::Flexo.width_factor(), 1.2);
        assert_eq!(Technology::Screen.width_factor(), 1.5);
    }
}
