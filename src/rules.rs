//! The trap decision engine.
//!
//! For each adjacent region pair the engine resolves a direction, width and
//! style from color priorities, geometry risk, user-defined rules, object
//! tags and a catalogue of special cases (black, white underprint,
//! metallics, fluorescents, small text, hairlines).
//!
//! Direction semantics for an ordered pair `(A, B)`: `spread` means A moves
//! into B, `choke` means B moves into A. The moving region's contour is
//! offset outward and filled with the moving region's ink, so
//! `decide(A, B) == spread` and `decide(B, A) == choke` describe the same
//! physical trap.

use serde_derive::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::color::{ColorType, Ink};
use crate::document::{GraphicObject, ObjectId, ObjectKind};
use crate::region::{AdjacencyGraph, ColorRegion, RegionId, RegionSource, RiskFactors};
use crate::settings::{
    CenterlineBehavior, DirectionMethod, ImageTrapDirection, PullbackMode, TrapMode, TrapSettings,
    TruncationMode,
};
use crate::units::{Mm, Pt};
use crate::warnings::{Warning, WarningKind};
use crate::Document;

/// Priority difference below which neither color dominates
const CENTERLINE_DELTA: f64 = 0.1;
/// Priority difference above which the trap slides toward the dominant color
const SLIDING_DELTA: f64 = 0.5;
/// Regions smaller than this get a reduced trap width, mm²
const SMALL_OBJECT_AREA_MM2: f64 = 10.0;

/// Resolved trap direction for an ordered region pair
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapDirection {
    /// No trap is generated; the decision may still carry warnings
    #[default]
    None,
    /// The first region spreads into the second
    Spread,
    /// The second region moves into the first
    Choke,
    /// A trap centered on the shared edge
    Centerline,
}

impl TrapDirection {
    /// Swaps spread and choke; centerline and none are self-mirrored
    pub fn mirrored(self) -> Self {
        match self {
            TrapDirection::Spread => TrapDirection::Choke,
            TrapDirection::Choke => TrapDirection::Spread,
            other => other,
        }
    }
}

/// Corner handling and falloff family of a trap
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapStyle {
    #[default]
    Normal,
    Abutted,
    Feathered,
    Sliding,
    Keepaway,
}

/// Object-scoped trapping override
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagMode {
    #[default]
    Auto,
    Always,
    Never,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagDirection {
    #[default]
    Auto,
    Spread,
    Choke,
    Centerline,
}

/// Caller-attached trapping override for one object. Tags are attached
/// before a run and never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapTag {
    pub object: ObjectId,
    pub mode: TagMode,
    pub direction: TagDirection,
    pub width: Option<Mm>,
    /// Mirror fields used when the session runs in reverse (white-knockout) mode
    pub reverse_mode: Option<TagMode>,
    pub reverse_direction: Option<TagDirection>,
    pub priority_override: Option<f64>,
    pub pullback_override: Option<Mm>,
    /// Who or what attached the tag
    pub provenance: Option<String>,
}

impl TrapTag {
    pub fn new(object: &str) -> Self {
        Self {
            object: ObjectId::from(object),
            mode: TagMode::Auto,
            direction: TagDirection::Auto,
            width: None,
            reverse_mode: None,
            reverse_direction: None,
            priority_override: None,
            pullback_override: None,
            provenance: None,
        }
    }

    pub fn never(object: &str) -> Self {
        Self {
            mode: TagMode::Never,
            ..Self::new(object)
        }
    }

    fn effective_mode(&self, mode: TrapMode) -> TagMode {
        match mode {
            TrapMode::Normal => self.mode,
            TrapMode::Reverse => self.reverse_mode.unwrap_or(self.mode),
        }
    }

    fn effective_direction(&self, mode: TrapMode) -> TagDirection {
        match mode {
            TrapMode::Normal => self.direction,
            TrapMode::Reverse => self.reverse_direction.unwrap_or(self.direction),
        }
    }
}

/// Which side of the pair a rule condition applies to
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleTarget {
    Source,
    Target,
    Both,
    #[default]
    Either,
}

/// One typed predicate of a rule condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum RulePredicate {
    ColorType(ColorType),
    LuminanceDiffOver(f64),
    InkStrengthDiffOver(f64),
    ObjectKind(ObjectKind),
    ObjectAreaUnder(f64),
    LineWidthUnder(Mm),
    TextSizeUnder(Pt),
    HasTag,
    IsKnockout,
    IsOverprint,
    AdjacentToBlack,
    AdjacentToWhite,
    IsNegativeText,
    IsRichBlack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleCondition {
    pub predicate: RulePredicate,
    pub target: RuleTarget,
}

impl RuleCondition {
    pub fn new(predicate: RulePredicate, target: RuleTarget) -> Self {
        Self { predicate, target }
    }
}

/// What a matched rule does
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleActionKind {
    /// Trap with the generic direction algorithm but rule-controlled width
    #[default]
    Trap,
    NoTrap,
    Spread,
    Choke,
    Centerline,
    /// Flip the generic direction, for white-knockout work
    ReverseKnockout,
    /// Keepaway-style pullback of a rich black
    Pullback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "value")]
pub enum RuleDistance {
    /// Absolute width in mm
    Absolute(Mm),
    /// Percentage of the default trap width
    PercentOfDefault(f64),
}

/// Which ink a rule-produced trap is filled with
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrapColorPolicy {
    /// Follow the direction: the moving region's ink
    #[default]
    Automatic,
    Source,
    Target,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuleAction {
    pub kind: RuleActionKind,
    pub distance: Option<RuleDistance>,
    pub color: TrapColorPolicy,
    pub truncation: Option<TruncationMode>,
    pub feather: Option<Mm>,
}

/// User-defined condition → action rule. All conditions must match
/// (conjunction); rules are tried highest priority first and the first
/// match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapRule {
    pub id: String,
    pub priority: i32,
    pub conditions: Vec<RuleCondition>,
    pub action: RuleAction,
}

/// Resolved decision for an ordered region pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapDecision {
    pub source: RegionId,
    pub target: RegionId,
    pub direction: TrapDirection,
    pub width: Mm,
    pub style: TrapStyle,
    pub priority_source: f64,
    pub priority_target: f64,
    /// Id of the custom rule that produced this decision, if any
    pub rule: Option<String>,
    pub feather: Option<Mm>,
    pub color_policy: TrapColorPolicy,
    pub warnings: SmallVec<[Warning; 2]>,
}

/// Priority of a color under a direction method, plus the classification
/// bonus. Higher priority means the color dominates the edge and the other
/// side moves into it.
pub fn color_priority(ink: &Ink, method: DirectionMethod) -> f64 {
    let base = match method {
        DirectionMethod::NeutralDensity => ink.neutral_density,
        DirectionMethod::UseLightness => (100.0 - ink.luminance) / 100.0,
        DirectionMethod::Chroma => ink.chroma / 128.0,
        DirectionMethod::Custom => {
            0.5 * ink.neutral_density
                + 0.3 * (100.0 - ink.luminance) / 100.0
                + 0.2 * ink.chroma / 128.0
        }
    };
    base + classification_bonus(ink.color_type)
}

fn classification_bonus(color_type: ColorType) -> f64 {
    match color_type {
        ColorType::WhiteUnderprint => -1.0,
        ColorType::Metallic => 0.8,
        ColorType::Fluorescent => 0.3,
        ColorType::Varnish => -2.0,
        ColorType::Transparent => -2.0,
        ColorType::ProcessCmyk | ColorType::Spot => 0.0,
    }
}

/// Everything the decision engine reads for one run
pub struct DecisionContext<'a> {
    pub document: &'a Document,
    pub graph: &'a AdjacencyGraph,
    pub settings: &'a TrapSettings,
    pub tags: &'a [TrapTag],
}

struct Side<'a> {
    region: &'a ColorRegion,
    ink: &'a Ink,
    object: &'a GraphicObject,
    risk: &'a RiskFactors,
    tag: Option<&'a TrapTag>,
}

impl<'a> DecisionContext<'a> {
    fn side(&self, id: &RegionId) -> Option<Side<'a>> {
        let region = self.graph.region(id)?;
        let ink = self.document.ink(&region.color)?;
        let object = self.document.object(&region.object)?;
        let risk = self.graph.risk_for(&region.object)?;
        let tag = self.tags.iter().find(|t| t.object == region.object);
        Some(Side {
            region,
            ink,
            object,
            risk,
            tag,
        })
    }

    fn tag_of(&self, side: &Side<'a>) -> Option<&'a TrapTag> {
        side.tag
    }

    /// Resolves a decision for the ordered pair `(a, b)`.
    ///
    /// Returns `None` when the pair needs no decision at all (adjacency not
    /// flagged `trap_required`, or dropped by a `never` tag). A returned
    /// decision with direction `none` carries its warnings but produces no
    /// geometry downstream.
    pub fn decide(&self, a: &RegionId, b: &RegionId) -> Option<TrapDecision> {
        let rec = self.graph.adjacency(a, b)?;
        if !rec.trap_required {
            return None;
        }
        let src = self.side(a)?;
        let dst = self.side(b)?;

        let method = self.settings.direction.direction_method;
        let mut pri_a = color_priority(src.ink, method);
        let mut pri_b = color_priority(dst.ink, method);
        if let Some(tag) = self.tag_of(&src) {
            if let Some(p) = tag.priority_override {
                pri_a = p;
            }
        }
        if let Some(tag) = self.tag_of(&dst) {
            if let Some(p) = tag.priority_override {
                pri_b = p;
            }
        }

        let mut decision = self
            .custom_rule_decision(&src, &dst, pri_a, pri_b)
            .or_else(|| self.special_case_decision(&src, &dst, pri_a, pri_b))
            .unwrap_or_else(|| self.generic_decision(&src, &dst, pri_a, pri_b));

        decision.source = a.clone();
        decision.target = b.clone();
        decision.priority_source = pri_a;
        decision.priority_target = pri_b;

        if !self.apply_tags(&src, &dst, &mut decision) {
            return None;
        }

        decision.width = decision.width.clamp(
            self.settings.distance.min_width,
            self.settings.distance.max_width,
        );
        Some(decision)
    }

    fn blank_decision(&self) -> TrapDecision {
        TrapDecision {
            source: RegionId::from(""),
            target: RegionId::from(""),
            direction: TrapDirection::None,
            width: self.settings.distance.default_width,
            style: TrapStyle::Normal,
            priority_source: 0.0,
            priority_target: 0.0,
            rule: None,
            feather: None,
            color_policy: TrapColorPolicy::Automatic,
            warnings: SmallVec::new(),
        }
    }

    // -- custom rules ------------------------------------------------------

    fn custom_rule_decision(
        &self,
        src: &Side,
        dst: &Side,
        pri_a: f64,
        pri_b: f64,
    ) -> Option<TrapDecision> {
        let mut rules: Vec<&TrapRule> = self.settings.rules.custom_rules.iter().collect();
        rules.sort_by(|x, y| y.priority.cmp(&x.priority).then(x.id.cmp(&y.id)));

        let rule = rules
            .into_iter()
            .find(|r| r.conditions.iter().all(|c| self.condition_matches(c, src, dst)))?;

        let mut d = self.blank_decision();
        d.rule = Some(rule.id.clone());
        d.color_policy = rule.action.color;
        d.feather = rule.action.feather;
        d.width = match rule.action.distance {
            Some(RuleDistance::Absolute(mm)) => mm,
            Some(RuleDistance::PercentOfDefault(pct)) => {
                self.settings.distance.default_width * (pct / 100.0)
            }
            None => self.settings.distance.default_width,
        };
        d.direction = match rule.action.kind {
            RuleActionKind::NoTrap => TrapDirection::None,
            RuleActionKind::Spread => TrapDirection::Spread,
            RuleActionKind::Choke => TrapDirection::Choke,
            RuleActionKind::Centerline => TrapDirection::Centerline,
            RuleActionKind::Trap => self.generic_direction(src, dst, pri_a, pri_b),
            RuleActionKind::ReverseKnockout => {
                self.generic_direction(src, dst, pri_a, pri_b).mirrored()
            }
            RuleActionKind::Pullback => {
                d.width = self
                    .tag_of(src)
                    .and_then(|t| t.pullback_override)
                    .unwrap_or(self.settings.distance.pullback_distance);
                d.style = TrapStyle::Keepaway;
                // pull the trap toward the dominant side
                if pri_a >= pri_b {
                    TrapDirection::Choke
                } else {
                    TrapDirection::Spread
                }
            }
        };
        d.style = match d.direction {
            TrapDirection::Centerline => TrapStyle::Abutted,
            _ if d.style == TrapStyle::Keepaway => TrapStyle::Keepaway,
            _ => TrapStyle::Normal,
        };
        Some(d)
    }

    fn condition_matches(&self, cond: &RuleCondition, src: &Side, dst: &Side) -> bool {
        match cond.target {
            RuleTarget::Source => self.predicate_matches(&cond.predicate, src, dst),
            RuleTarget::Target => self.predicate_matches(&cond.predicate, dst, src),
            RuleTarget::Both => {
                self.predicate_matches(&cond.predicate, src, dst)
                    && self.predicate_matches(&cond.predicate, dst, src)
            }
            RuleTarget::Either => {
                self.predicate_matches(&cond.predicate, src, dst)
                    || self.predicate_matches(&cond.predicate, dst, src)
            }
        }
    }

    fn predicate_matches(&self, pred: &RulePredicate, side: &Side, other: &Side) -> bool {
        match pred {
            RulePredicate::ColorType(t) => side.ink.color_type == *t,
            RulePredicate::LuminanceDiffOver(x) => {
                (side.ink.luminance - other.ink.luminance).abs() > *x
            }
            RulePredicate::InkStrengthDiffOver(x) => {
                (side.ink.cmyk.total_ink_pct() - other.ink.cmyk.total_ink_pct()).abs() > *x
            }
            RulePredicate::ObjectKind(k) => side.object.kind == *k,
            RulePredicate::ObjectAreaUnder(a) => side.region.area_mm2 < *a,
            RulePredicate::LineWidthUnder(w) => side
                .object
                .stroke
                .as_ref()
                .map(|s| s.width < *w)
                .unwrap_or(false),
            RulePredicate::TextSizeUnder(pt) => side
                .object
                .text_size()
                .map(|s| s < *pt)
                .unwrap_or(false),
            RulePredicate::HasTag => side.tag.is_some(),
            RulePredicate::IsKnockout => side.object.knockout,
            RulePredicate::IsOverprint => side.object.overprint,
            RulePredicate::AdjacentToBlack => other.ink.is_black(),
            RulePredicate::AdjacentToWhite => {
                other.ink.color_type == ColorType::WhiteUnderprint
            }
            RulePredicate::IsNegativeText => {
                side.object.kind == ObjectKind::Text && side.object.knockout
            }
            RulePredicate::IsRichBlack => side.ink.is_rich_black(),
        }
    }

    // -- special cases -----------------------------------------------------

    fn special_case_decision(
        &self,
        src: &Side,
        dst: &Side,
        pri_a: f64,
        pri_b: f64,
    ) -> Option<TrapDecision> {
        let s = self.settings;

        // metallic × process
        if s.special.trap_metallics {
            let a_met = src.ink.color_type == ColorType::Metallic;
            let b_met = dst.ink.color_type == ColorType::Metallic;
            if a_met != b_met {
                let mut d = self.blank_decision();
                d.direction = if a_met {
                    TrapDirection::Choke
                } else {
                    TrapDirection::Spread
                };
                d.width = s.special.metallic_trap_width;
                d.style = TrapStyle::Normal;
                d.warnings.push(
                    Warning::info(
                        WarningKind::MetallicAdjacent,
                        format!(
                            "metallic ink '{}' trapped against '{}'",
                            if a_met { &src.ink.name } else { &dst.ink.name },
                            if a_met { &dst.ink.name } else { &src.ink.name },
                        ),
                    )
                    .for_region(&src.region.id),
                );
                return Some(d);
            }
        }

        // white underprint
        if s.special.trap_white_underprint {
            let a_white = src.ink.color_type == ColorType::WhiteUnderprint;
            let b_white = dst.ink.color_type == ColorType::WhiteUnderprint;
            if a_white || b_white {
                let mut d = self.blank_decision();
                d.direction = if a_white {
                    TrapDirection::Spread
                } else {
                    TrapDirection::Choke
                };
                d.width = s.special.white_spread;
                if d.width < Mm(0.2) {
                    d.warnings.push(
                        Warning::warning(
                            WarningKind::WhiteUnderprintIssue,
                            format!(
                                "white underprint spread of {:.2} mm is below the 0.2 mm guideline",
                                d.width.0
                            ),
                        )
                        .for_region(&src.region.id),
                    );
                }
                return Some(d);
            }
        }

        // fluorescent: standard direction, widened trap
        if src.ink.color_type == ColorType::Fluorescent
            || dst.ink.color_type == ColorType::Fluorescent
        {
            let mut d = self.generic_decision(src, dst, pri_a, pri_b);
            d.width = d.width * 1.2;
            d.warnings.push(Warning::info(
                WarningKind::ColorMismatch,
                "fluorescent ink trapped with widened band",
            ));
            return Some(d);
        }

        // small text is left untrapped
        for side in [src, dst] {
            if let Some(size) = side.object.text_size() {
                if size < s.text.min_text_size {
                    let mut d = self.blank_decision();
                    d.direction = TrapDirection::None;
                    d.warnings.push(
                        Warning::warning(
                            WarningKind::SmallText,
                            format!(
                                "text of {:.1} pt is below the {:.1} pt trapping minimum",
                                size.0, s.text.min_text_size.0
                            ),
                        )
                        .for_object(&side.object.id),
                    );
                    return Some(d);
                }
            }
        }

        // hairlines are left untrapped unless explicitly enabled
        if !s.lines.trap_thin_lines {
            for side in [src, dst] {
                if side.region.source == RegionSource::Stroke {
                    if let Some(stroke) = &side.object.stroke {
                        if stroke.width < s.lines.min_line_width {
                            let mut d = self.blank_decision();
                            d.direction = TrapDirection::None;
                            d.warnings.push(
                                Warning::warning(
                                    WarningKind::ThinLine,
                                    format!(
                                        "stroke of {:.2} mm is below the {:.2} mm trapping minimum",
                                        stroke.width.0, s.lines.min_line_width.0
                                    ),
                                )
                                .for_object(&side.object.id),
                            );
                            return Some(d);
                        }
                    }
                }
            }
        }

        // image edges get feathered traps
        let a_img = src.object.kind == ObjectKind::Image;
        let b_img = dst.object.kind == ObjectKind::Image;
        if a_img != b_img {
            let mut d = self.blank_decision();
            if !s.images.trap_images {
                d.direction = TrapDirection::None;
                return Some(d);
            }
            d.direction = match s.direction.image_trap_direction {
                ImageTrapDirection::Automatic => self.generic_direction(src, dst, pri_a, pri_b),
                // the vector side moves into the image
                ImageTrapDirection::IntoImage => {
                    if a_img {
                        TrapDirection::Choke
                    } else {
                        TrapDirection::Spread
                    }
                }
                ImageTrapDirection::AwayFromImage => {
                    if a_img {
                        TrapDirection::Spread
                    } else {
                        TrapDirection::Choke
                    }
                }
            };
            d.width = s.distance.into_image;
            d.style = TrapStyle::Feathered;
            d.feather = Some(s.images.image_edge_feather);
            return Some(d);
        }

        // automatic pullback of rich blacks
        if s.pullback.pullback_mode == PullbackMode::Always
            && (src.ink.is_rich_black() || dst.ink.is_rich_black())
        {
            let mut d = self.blank_decision();
            d.direction = if src.ink.is_rich_black() {
                TrapDirection::Choke
            } else {
                TrapDirection::Spread
            };
            d.width = self
                .tag_of(if src.ink.is_rich_black() { src } else { dst })
                .and_then(|t| t.pullback_override)
                .unwrap_or(s.distance.pullback_distance);
            d.style = TrapStyle::Keepaway;
            return Some(d);
        }

        None
    }

    // -- generic resolution ------------------------------------------------

    fn generic_decision(&self, src: &Side, dst: &Side, pri_a: f64, pri_b: f64) -> TrapDecision {
        let mut d = self.blank_decision();
        d.direction = self.generic_direction(src, dst, pri_a, pri_b);
        if d.direction == TrapDirection::None {
            return d;
        }
        if self.settings.mode.mode == TrapMode::Reverse {
            d.direction = d.direction.mirrored();
        }
        d.width = self.generic_width(src, dst);
        d.style = self.generic_style(src, dst, pri_a, pri_b, d.direction);
        d
    }

    fn generic_direction(&self, src: &Side, dst: &Side, pri_a: f64, pri_b: f64) -> TrapDirection {
        let s = self.settings;
        let (a, b) = (src.ink, dst.ink);

        if a.is_non_trapping() || b.is_non_trapping() {
            return TrapDirection::None;
        }
        if a.color_type == ColorType::WhiteUnderprint {
            return TrapDirection::Spread;
        }
        if b.color_type == ColorType::WhiteUnderprint {
            return TrapDirection::Choke;
        }
        if s.special.trap_black_to_all {
            if a.is_black() {
                return TrapDirection::Choke;
            }
            if b.is_black() {
                return TrapDirection::Spread;
            }
        }
        let a_met = a.color_type == ColorType::Metallic;
        let b_met = b.color_type == ColorType::Metallic;
        if a_met && !b_met {
            return TrapDirection::Choke;
        }
        if b_met && !a_met {
            return TrapDirection::Spread;
        }

        let delta = (pri_a - pri_b).abs();
        let centerline = match s.processing.centerline_behavior {
            CenterlineBehavior::Always => true,
            CenterlineBehavior::Never => false,
            CenterlineBehavior::Automatic => delta < CENTERLINE_DELTA,
        };
        if centerline {
            return TrapDirection::Centerline;
        }
        // the rule activation gate: too little ink difference, no trap
        let ink_diff = (a.cmyk.total_ink_pct() - b.cmyk.total_ink_pct()).abs();
        if ink_diff < s.distance.min_ink_difference_pct {
            return TrapDirection::None;
        }
        if pri_a > pri_b {
            TrapDirection::Choke
        } else {
            TrapDirection::Spread
        }
    }

    fn generic_width(&self, src: &Side, dst: &Side) -> Mm {
        let s = self.settings;

        let mut width = if src.ink.is_black() || dst.ink.is_black() {
            s.special.black_trap_width
        } else if src.ink.color_type == ColorType::Spot || dst.ink.color_type == ColorType::Spot {
            s.distance.into_spot
        } else {
            s.distance.default_width
        };

        width = width * s.mode.technology.width_factor();

        // geometry factors
        for side in [src, dst] {
            if let Some(size) = side.object.text_size() {
                if size < s.text.min_text_size {
                    width = width * 0.3;
                } else if size < Pt(10.0) {
                    width = width * (0.5 * s.text.text_trap_reduction);
                }
            }
        }
        if let Some(stroke) = thin_stroke(src).or_else(|| thin_stroke(dst)) {
            if stroke < s.lines.min_line_width {
                width = width * 0.5;
            }
        }
        if src.region.area_mm2.min(dst.region.area_mm2) < SMALL_OBJECT_AREA_MM2 {
            width = width * 0.7;
        }
        if src.risk.sharp_angles || dst.risk.sharp_angles {
            width = width * 0.8;
        }

        width
    }

    fn generic_style(
        &self,
        src: &Side,
        dst: &Side,
        pri_a: f64,
        pri_b: f64,
        direction: TrapDirection,
    ) -> TrapStyle {
        if direction == TrapDirection::Centerline {
            TrapStyle::Abutted
        } else if (pri_a - pri_b).abs() > SLIDING_DELTA {
            TrapStyle::Sliding
        } else if src.ink.is_black() || dst.ink.is_black() {
            TrapStyle::Keepaway
        } else {
            TrapStyle::Normal
        }
    }

    // -- tag overlay -------------------------------------------------------

    /// Applies trap tags on top of the resolved decision. Returns `false`
    /// when the decision must be dropped entirely.
    fn apply_tags(&self, src: &Side, dst: &Side, decision: &mut TrapDecision) -> bool {
        let mode = self.settings.mode.mode;

        for (side, is_source) in [(src, true), (dst, false)] {
            let tag = match side.tag {
                Some(t) => t,
                None => continue,
            };
            match tag.effective_mode(mode) {
                TagMode::Never => return false,
                TagMode::Auto => {}
                TagMode::Always => {
                    let dir = tag.effective_direction(mode);
                    let forced = match dir {
                        TagDirection::Auto => decision.direction,
                        TagDirection::Spread => TrapDirection::Spread,
                        TagDirection::Choke => TrapDirection::Choke,
                        TagDirection::Centerline => TrapDirection::Centerline,
                    };
                    // a tag on the target side forces the mirror direction
                    decision.direction = if is_source { forced } else { forced.mirrored() };
                    if decision.direction == TrapDirection::Centerline {
                        decision.style = TrapStyle::Abutted;
                    }
                }
            }
            if let Some(width) = tag.width {
                decision.width = width;
            }
        }
        true
    }
}

fn thin_stroke(side: &Side) -> Option<Mm> {
    if side.region.source == RegionSource::Stroke {
        side.object.stroke.as_ref().map(|s| s.width)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Cmyk, ColorSpace};
    use crate::document::Layer;
    use crate::geometry::BezierPath;
    use crate::region::{build_graph, AdjacencyOptions};
    use crate::session::RunContext;
    use crate::GraphicObject;

    fn ink(id: &str, name: &str, declared: Option<ColorType>, cmyk: Cmyk) -> Ink {
        Ink::new(id.into(), name, declared, ColorSpace::Cmyk, cmyk, 1.0)
    }

    fn pair_doc(ink_a: Ink, ink_b: Ink) -> Document {
        let ca = ink_a.id.0.clone();
        let cb = ink_b.id.0.clone();
        Document::new(
            vec![
                GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), &ca),
                GraphicObject::filled_path("b", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), &cb),
            ],
            vec![Layer::new("art", "Artwork")],
            vec![ink_a, ink_b],
        )
    }

    fn decide_pair(doc: &Document, settings: &TrapSettings, tags: &[TrapTag]) -> Option<TrapDecision> {
        let mut ctx = RunContext::unattended();
        let graph = build_graph(doc, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let ctx = DecisionContext {
            document: doc,
            graph: &graph,
            settings,
            tags,
        };
        ctx.decide(&"a/fill".into(), &"b/fill".into())
    }

    fn light() -> Ink {
        ink("Light", "Light", None, Cmyk::from_percent(20.0, 20.0, 20.0, 0.0))
    }

    fn dark() -> Ink {
        ink("Dark", "Dark", None, Cmyk::from_percent(0.0, 0.0, 0.0, 80.0))
    }

    #[test]
    fn light_spreads_into_dark() {
        let settings = TrapSettings::default();
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Spread);
        // 0.20 default x 1.2 flexo
        assert_eq!(d.width, Mm(0.24));
        assert!(matches!(d.style, TrapStyle::Normal | TrapStyle::Sliding));
    }

    #[test]
    fn direction_duality_on_swapped_pair() {
        let settings = TrapSettings::default();
        let forward = decide_pair(&pair_doc(light(), dark()), &settings, &[]).unwrap();
        let backward = decide_pair(&pair_doc(dark(), light()), &settings, &[]).unwrap();
        assert_eq!(forward.direction, backward.direction.mirrored());
        assert_eq!(forward.width, backward.width);
    }

    #[test]
    fn black_is_always_choked_into() {
        let settings = TrapSettings::default();
        let black = ink("K", "Black", None, Cmyk::from_percent(0.0, 0.0, 0.0, 100.0));
        let d = decide_pair(&pair_doc(black, light()), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Choke);
        // the large priority gap wins over the black keepaway style
        assert_eq!(d.style, TrapStyle::Sliding);
        // 0.25 black width x 1.2 flexo
        assert_eq!(d.width, Mm(0.3));
    }

    #[test]
    fn white_underprint_spreads() {
        let settings = TrapSettings::default();
        let white = ink("W", "Opaque White", Some(ColorType::WhiteUnderprint), Cmyk::default());
        let d = decide_pair(&pair_doc(white, light()), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Spread);
        assert_eq!(d.width, Mm(0.30));
        assert!(d.warnings.is_empty());
    }

    #[test]
    fn narrow_white_spread_raises_a_warning() {
        let mut settings = TrapSettings::default();
        settings.special.white_spread = Mm(0.15);
        let white = ink("W", "Opaque White", Some(ColorType::WhiteUnderprint), Cmyk::default());
        let d = decide_pair(&pair_doc(white, light()), &settings, &[]).unwrap();
        assert!(d
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::WhiteUnderprintIssue));
    }

    #[test]
    fn metallic_forces_choke_toward_itself() {
        let settings = TrapSettings::default();
        let silver = ink(
            "Silver",
            "PANTONE 877 Silver",
            Some(ColorType::Metallic),
            Cmyk::from_percent(0.0, 0.0, 0.0, 30.0),
        );
        let process = ink("P", "Process", None, Cmyk::from_percent(50.0, 50.0, 0.0, 0.0));
        let d = decide_pair(&pair_doc(silver, process), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Choke);
        assert_eq!(d.width, Mm(0.20));
        assert!(d
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::MetallicAdjacent && w.severity == crate::Severity::Info));
    }

    #[test]
    fn similar_neutrals_get_a_centerline() {
        let settings = TrapSettings::default();
        let a = ink("A", "A", None, Cmyk::from_percent(40.0, 40.0, 40.0, 0.0));
        let b = ink("B", "B", None, Cmyk::from_percent(42.0, 38.0, 40.0, 0.0));
        // similar neutrals are below the delta-e adjacency threshold, so
        // drive the rule engine directly over a hand-built requirement
        let doc = pair_doc(a, b);
        let mut ctx = RunContext::unattended();
        let mut graph = build_graph(&doc, &AdjacencyOptions::default(), &mut ctx).unwrap();
        for region in graph.regions.values_mut() {
            for adj in region.adjacencies.iter_mut() {
                adj.trap_required = true;
            }
        }
        let dctx = DecisionContext {
            document: &doc,
            graph: &graph,
            settings: &settings,
            tags: &[],
        };
        let d = dctx.decide(&"a/fill".into(), &"b/fill".into()).unwrap();
        assert_eq!(d.direction, TrapDirection::Centerline);
        assert_eq!(d.style, TrapStyle::Abutted);
    }

    #[test]
    fn small_text_is_not_trapped() {
        let settings = TrapSettings::default();
        let magenta = ink("M", "Magenta", None, Cmyk::from_percent(0.0, 100.0, 0.0, 0.0));
        let cyan = ink("C", "Cyan", None, Cmyk::from_percent(100.0, 0.0, 0.0, 0.0));
        let mut doc = pair_doc(magenta, cyan);
        // 1.5 mm cap height is roughly 4.3 pt
        doc.objects[0] = GraphicObject::text("a", "art", BezierPath::rect(0.0, 0.0, 10.0, 1.5), "M");
        let d = decide_pair(&doc, &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::None);
        assert!(d
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SmallText && w.severity == crate::Severity::Warning));
    }

    #[test]
    fn custom_rule_overrides_everything() {
        let mut settings = TrapSettings::default();
        settings.rules.custom_rules.push(TrapRule {
            id: "all-cmyk-centerline".to_string(),
            priority: 100,
            conditions: vec![RuleCondition::new(
                RulePredicate::ColorType(ColorType::ProcessCmyk),
                RuleTarget::Both,
            )],
            action: RuleAction {
                kind: RuleActionKind::Centerline,
                distance: Some(RuleDistance::Absolute(Mm(0.30))),
                ..Default::default()
            },
        });
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Centerline);
        assert_eq!(d.width, Mm(0.30));
        assert_eq!(d.rule.as_deref(), Some("all-cmyk-centerline"));
    }

    #[test]
    fn rule_priority_order_wins() {
        let mut settings = TrapSettings::default();
        let cond = || {
            vec![RuleCondition::new(
                RulePredicate::ColorType(ColorType::ProcessCmyk),
                RuleTarget::Both,
            )]
        };
        settings.rules.custom_rules.push(TrapRule {
            id: "low".to_string(),
            priority: 1,
            conditions: cond(),
            action: RuleAction {
                kind: RuleActionKind::NoTrap,
                ..Default::default()
            },
        });
        settings.rules.custom_rules.push(TrapRule {
            id: "high".to_string(),
            priority: 50,
            conditions: cond(),
            action: RuleAction {
                kind: RuleActionKind::Spread,
                ..Default::default()
            },
        });
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[]).unwrap();
        assert_eq!(d.rule.as_deref(), Some("high"));
        assert_eq!(d.direction, TrapDirection::Spread);
    }

    #[test]
    fn never_tag_drops_the_decision() {
        let settings = TrapSettings::default();
        let tags = vec![TrapTag::never("a")];
        assert!(decide_pair(&pair_doc(light(), dark()), &settings, &tags).is_none());
    }

    #[test]
    fn tag_width_override_applies() {
        let settings = TrapSettings::default();
        let mut tag = TrapTag::new("a");
        tag.mode = TagMode::Always;
        tag.width = Some(Mm(0.42));
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[tag]).unwrap();
        assert_eq!(d.width, Mm(0.42));
    }

    #[test]
    fn target_side_tag_mirrors_the_direction() {
        let settings = TrapSettings::default();
        let mut tag = TrapTag::new("b");
        tag.mode = TagMode::Always;
        tag.direction = TagDirection::Spread;
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[tag]).unwrap();
        assert_eq!(d.direction, TrapDirection::Choke);
    }

    #[test]
    fn width_is_always_clamped() {
        let mut settings = TrapSettings::default();
        settings.special.black_trap_width = Mm(3.0);
        let black = ink("K", "Black", None, Cmyk::from_percent(0.0, 0.0, 0.0, 100.0));
        let d = decide_pair(&pair_doc(black, light()), &settings, &[]).unwrap();
        assert_eq!(d.width, settings.distance.max_width);
    }

    #[test]
    fn reverse_mode_flips_generic_directions() {
        let mut settings = TrapSettings::default();
        settings.mode.mode = TrapMode::Reverse;
        settings.special.trap_black_to_all = false;
        let d = decide_pair(&pair_doc(light(), dark()), &settings, &[]).unwrap();
        assert_eq!(d.direction, TrapDirection::Choke);
    }

    #[test]
    fn priority_methods_rank_dark_over_light() {
        for method in [
            DirectionMethod::NeutralDensity,
            DirectionMethod::UseLightness,
            DirectionMethod::Custom,
        ] {
            assert!(
                color_priority(&dark(), method) > color_priority(&light(), method),
                "{method:?}"
            );
        }
    }

    #[test]
    fn classification_bonus_orders_special_inks() {
        let white = ink("W", "Opaque White", Some(ColorType::WhiteUnderprint), Cmyk::default());
        let silver = ink(
            "S",
            "Silver",
            Some(ColorType::Metallic),
            Cmyk::from_percent(0.0, 0.0, 0.0, 30.0),
        );
        let method = DirectionMethod::NeutralDensity;
        assert!(color_priority(&white, method) < 0.0);
        // the metallic bonus lifts a weak ink over a mid-strength process color
        assert!(color_priority(&silver, method) > color_priority(&light(), method));
    }
}
