//! Trap objects and the trap layer.
//!
//! Decisions are materialized into closed trap regions: the moving region's
//! contour and its offset are stitched into a multi-ring contour with
//! reversed winding on the inner ring, so a standard non-zero fill rule
//! fills exactly the annular band. Overlapping traps are merged into one
//! object per equivalence class.

use serde_derive::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::color::{ColorId, Cmyk};
use crate::geometry::{BezierPath, Bounds};
use crate::offset::{offset_path, OffsetOptions};
use crate::region::{AdjacencyGraph, ColorRegion, RegionId};
use crate::rules::{TrapColorPolicy, TrapDecision, TrapDirection, TrapStyle};
use crate::session::{RunContext, TrapPhase};
use crate::settings::TrapSettings;
use crate::units::Mm;
use crate::warnings::{Warning, WarningKind};
use crate::Document;

/// Number of bands in a soft (feathered) trap chain
const SOFT_TRAP_BANDS: usize = 5;

/// Monotonically increasing trap identifier, assigned in decision order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrapId(pub u64);

/// The rule to use when filling a trap contour
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindingOrder {
    EvenOdd,
    #[default]
    NonZero,
}

/// Closed fill area of one trap: one or more rings under a winding rule.
/// An annular band is the outer ring plus the reversed inner ring.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapContour {
    pub rings: Vec<BezierPath>,
    pub winding: WindingOrder,
}

impl TrapContour {
    /// Annular band between an inner and an outer ring
    pub fn band(outer: BezierPath, inner: BezierPath) -> Self {
        Self {
            rings: vec![outer, inner.reversed()],
            winding: WindingOrder::NonZero,
        }
    }

    /// Net filled area under the non-zero rule, in mm²
    pub fn area(&self) -> f64 {
        self.rings
            .iter()
            .map(|r| r.signed_area())
            .sum::<f64>()
            .abs()
    }

    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for ring in &self.rings {
            b = b.union(&ring.bounds());
        }
        b
    }

    pub fn anchor_count(&self) -> usize {
        self.rings.iter().map(|r| r.points.len()).sum()
    }
}

/// One materialized trap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapObject {
    pub id: TrapId,
    pub source: RegionId,
    pub target: RegionId,
    pub contour: TrapContour,
    pub width: Mm,
    pub style: TrapStyle,
    pub feather: Option<Mm>,
    /// Palette reference when the trap is filled with an ink verbatim;
    /// `None` for computed fills (centerline channel-max)
    pub color_id: Option<ColorId>,
    pub cmyk: Cmyk,
    /// `0..=1`, below 1.0 only for soft-trap bands
    pub opacity: f64,
    /// Always true; traps never knock out
    pub overprint: bool,
    pub decision: TrapDecision,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
}

/// Aggregate statistics of a generated layer
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapStats {
    pub spread_count: usize,
    pub choke_count: usize,
    pub centerline_count: usize,
    pub total_area_mm2: f64,
    /// Decisions whose width hit the configured clamp
    pub clamped_widths: usize,
}

/// The generated overlay layer: trap objects plus run metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrapLayer {
    pub traps: Vec<TrapObject>,
    pub stats: TrapStats,
    /// Snapshot of the settings the layer was generated with
    pub settings: TrapSettings,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub duration: std::time::Duration,
}

impl TrapLayer {
    pub fn is_empty(&self) -> bool {
        self.traps.is_empty()
    }

    pub fn trap(&self, id: TrapId) -> Option<&TrapObject> {
        self.traps.iter().find(|t| t.id == id)
    }

    /// Traps referencing the given region on either side
    pub fn traps_for_region<'a>(
        &'a self,
        region: &'a RegionId,
    ) -> impl Iterator<Item = &'a TrapObject> {
        self.traps
            .iter()
            .filter(move |t| &t.source == region || &t.target == region)
    }
}

/// Materializes decisions into a trap layer.
///
/// Decisions with direction `none` produce no geometry. Degenerate
/// geometry is skipped with a `complex-geometry` warning appended to
/// `warnings`. Returns `None` when the run is cancelled.
pub fn generate_layer(
    doc: &Document,
    graph: &AdjacencyGraph,
    decisions: &[TrapDecision],
    settings: &TrapSettings,
    warnings: &mut Vec<Warning>,
    ctx: &mut RunContext,
) -> Option<TrapLayer> {
    let started = std::time::Instant::now();
    let mut traps: Vec<TrapObject> = Vec::new();
    let mut next_id = 0u64;
    let mut stats = TrapStats::default();

    let total = decisions.len();
    for (i, decision) in decisions.iter().enumerate() {
        if !ctx.step(TrapPhase::Generate, i, total, &decision.source.0) {
            return None;
        }
        if decision.direction == TrapDirection::None {
            continue;
        }
        let (src, dst) = match (
            graph.region(&decision.source),
            graph.region(&decision.target),
        ) {
            (Some(s), Some(d)) => (s, d),
            _ => continue,
        };

        if decision.width == settings.distance.min_width
            || decision.width == settings.distance.max_width
        {
            stats.clamped_widths += 1;
        }

        let generated =
            materialize(doc, decision, src, dst, settings, &mut next_id, warnings);
        for trap in &generated {
            match trap.decision.direction {
                TrapDirection::Spread => stats.spread_count += 1,
                TrapDirection::Choke => stats.choke_count += 1,
                TrapDirection::Centerline => stats.centerline_count += 1,
                TrapDirection::None => {}
            }
        }
        traps.extend(generated);
    }

    let merged = merge_overlapping(traps);
    stats.total_area_mm2 = merged.iter().map(|t| t.contour.area()).sum();

    Some(TrapLayer {
        traps: merged,
        stats,
        settings: settings.clone(),
        generated_at: OffsetDateTime::now_utc(),
        duration: started.elapsed(),
    })
}

/// Builds the trap object(s) for one decision. Feathered decisions expand
/// into a soft-trap band chain.
fn materialize(
    doc: &Document,
    decision: &TrapDecision,
    src: &ColorRegion,
    dst: &ColorRegion,
    settings: &TrapSettings,
    next_id: &mut u64,
    warnings: &mut Vec<Warning>,
) -> Vec<TrapObject> {
    // the moving region: spread moves the source into the target, choke
    // moves the target into the source; centerline straddles the source edge
    let moving = match decision.direction {
        TrapDirection::Choke => dst,
        _ => src,
    };

    let (color_id, cmyk) = trap_fill(doc, decision, src, dst, settings);

    let offset_opts = |distance: Mm| {
        OffsetOptions::new(distance)
            .with_corner(settings.color.corner_style, settings.color.miter_limit)
    };

    if decision.style == TrapStyle::Feathered {
        return soft_trap_chain(
            decision, moving, color_id, cmyk, settings, next_id, warnings,
        );
    }

    let contour = match decision.direction {
        TrapDirection::Spread | TrapDirection::Choke => {
            let outer = match offset_path(&moving.contour, &offset_opts(decision.width)) {
                Some(p) => p,
                None => {
                    warnings.push(complex_geometry(decision));
                    return Vec::new();
                }
            };
            TrapContour::band(outer, moving.contour.clone())
        }
        TrapDirection::Centerline => {
            let half = decision.width / 2.0;
            let outer = offset_path(&moving.contour, &offset_opts(half));
            let inner = offset_path(&moving.contour, &offset_opts(-half));
            match (outer, inner) {
                (Some(o), Some(i)) => TrapContour::band(o, i),
                _ => {
                    warnings.push(complex_geometry(decision));
                    return Vec::new();
                }
            }
        }
        TrapDirection::None => return Vec::new(),
    };

    let id = TrapId(*next_id);
    *next_id += 1;
    vec![TrapObject {
        id,
        source: decision.source.clone(),
        target: decision.target.clone(),
        contour,
        width: decision.width,
        style: decision.style,
        feather: decision.feather,
        color_id,
        cmyk,
        opacity: 1.0,
        overprint: true,
        decision: decision.clone(),
        created: OffsetDateTime::now_utc(),
    }]
}

/// Soft trap for raster edges: a chain of bands with linearly decreasing
/// width and opacity, all overprinting with the same color.
fn soft_trap_chain(
    decision: &TrapDecision,
    moving: &ColorRegion,
    color_id: Option<ColorId>,
    cmyk: Cmyk,
    settings: &TrapSettings,
    next_id: &mut u64,
    warnings: &mut Vec<Warning>,
) -> Vec<TrapObject> {
    let mut out = Vec::with_capacity(SOFT_TRAP_BANDS);
    for band in 0..SOFT_TRAP_BANDS {
        let fraction = (SOFT_TRAP_BANDS - band) as f64 / SOFT_TRAP_BANDS as f64;
        let width = decision.width * fraction;
        if width.0 <= 0.0 {
            continue;
        }
        let opts = OffsetOptions::new(width)
            .with_corner(settings.color.corner_style, settings.color.miter_limit);
        let outer = match offset_path(&moving.contour, &opts) {
            Some(p) => p,
            None => {
                warnings.push(complex_geometry(decision));
                return out;
            }
        };
        let id = TrapId(*next_id);
        *next_id += 1;
        out.push(TrapObject {
            id,
            source: decision.source.clone(),
            target: decision.target.clone(),
            contour: TrapContour::band(outer, moving.contour.clone()),
            width,
            style: TrapStyle::Feathered,
            feather: decision.feather,
            color_id: color_id.clone(),
            cmyk,
            opacity: fraction,
            overprint: true,
            decision: decision.clone(),
            created: OffsetDateTime::now_utc(),
        });
    }
    out
}

/// The fill of a trap: the moving region's ink for spread/choke, the
/// channel-wise CMYK maximum for centerline (overprint simulation).
fn trap_fill(
    doc: &Document,
    decision: &TrapDecision,
    src: &ColorRegion,
    dst: &ColorRegion,
    settings: &TrapSettings,
) -> (Option<ColorId>, Cmyk) {
    let src_ink = doc.ink(&src.color);
    let dst_ink = doc.ink(&dst.color);

    let (id, cmyk) = match decision.color_policy {
        TrapColorPolicy::Source => (
            Some(src.color.clone()),
            src_ink.map(|i| i.cmyk).unwrap_or_default(),
        ),
        TrapColorPolicy::Target => (
            Some(dst.color.clone()),
            dst_ink.map(|i| i.cmyk).unwrap_or_default(),
        ),
        TrapColorPolicy::Automatic => match decision.direction {
            TrapDirection::Spread => (
                Some(src.color.clone()),
                src_ink.map(|i| i.cmyk).unwrap_or_default(),
            ),
            TrapDirection::Choke => (
                Some(dst.color.clone()),
                dst_ink.map(|i| i.cmyk).unwrap_or_default(),
            ),
            _ => {
                let a = src_ink.map(|i| i.cmyk).unwrap_or_default();
                let b = dst_ink.map(|i| i.cmyk).unwrap_or_default();
                (None, a.channel_max(&b))
            }
        },
    };

    let intensity = (settings.color.trap_color_intensity_pct / 100.0).clamp(0.0, 1.0);
    let cmyk = Cmyk::new(
        cmyk.c * intensity,
        cmyk.m * intensity,
        cmyk.y * intensity,
        cmyk.k * intensity,
    );
    (id, cmyk)
}

fn complex_geometry(decision: &TrapDecision) -> Warning {
    Warning::warning(
        WarningKind::ComplexGeometry,
        format!(
            "degenerate geometry while offsetting trap between '{}' and '{}'",
            decision.source.0, decision.target.0
        ),
    )
    .for_region(&decision.source)
}

/// Groups traps whose anchor AABBs intersect into equivalence classes and
/// produces one merged trap per class. The merged trap keeps the union of
/// rings, the widest member's width and the first member's color and
/// decision. Soft-trap bands are deliberately left unmerged.
fn merge_overlapping(traps: Vec<TrapObject>) -> Vec<TrapObject> {
    let n = traps.len();
    if n < 2 {
        return traps;
    }

    let bounds: Vec<Bounds> = traps.iter().map(|t| t.contour.bounds()).collect();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cur = i;
        while parent[cur] != root {
            let next = parent[cur];
            parent[cur] = root;
            cur = next;
        }
        root
    }

    for i in 0..n {
        if traps[i].style == TrapStyle::Feathered {
            continue;
        }
        for j in (i + 1)..n {
            if traps[j].style == TrapStyle::Feathered {
                continue;
            }
            if bounds[i].intersects(&bounds[j], 0.0) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = rj.min(ri);
                }
            }
        }
    }

    let mut classes: std::collections::BTreeMap<usize, Vec<TrapObject>> =
        std::collections::BTreeMap::new();
    for (i, trap) in traps.into_iter().enumerate() {
        let root = find(&mut parent, i);
        classes.entry(root).or_default().push(trap);
    }

    let mut out: Vec<TrapObject> = Vec::new();
    for (_, mut members) in classes {
        if members.len() == 1 {
            out.push(members.pop().unwrap());
            continue;
        }
        members.sort_by_key(|t| t.id);
        let mut merged = members[0].clone();
        for member in &members[1..] {
            merged.contour.rings.extend(member.contour.rings.iter().cloned());
            merged.width = merged.width.max(member.width);
        }
        out.push(merged);
    }
    out.sort_by_key(|t| t.id);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Cmyk, Ink};
    use crate::document::Layer;
    use crate::region::{build_graph, AdjacencyOptions};
    use crate::rules::DecisionContext;
    use crate::session::RunContext;
    use crate::GraphicObject;

    fn doc() -> Document {
        Document::new(
            vec![
                GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), "Light"),
                GraphicObject::filled_path("b", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), "Dark"),
            ],
            vec![Layer::new("art", "Artwork")],
            vec![
                Ink::process("Light", Cmyk::from_percent(20.0, 20.0, 20.0, 0.0)),
                Ink::process("Dark", Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)),
            ],
        )
    }

    fn layer_for(doc: &Document) -> (TrapLayer, Vec<Warning>) {
        let settings = TrapSettings::default();
        let mut ctx = RunContext::unattended();
        let graph = build_graph(doc, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let dctx = DecisionContext {
            document: doc,
            graph: &graph,
            settings: &settings,
            tags: &[],
        };
        let decisions: Vec<_> = graph
            .pairs()
            .iter()
            .filter_map(|(a, b)| dctx.decide(a, b))
            .collect();
        let mut warnings = Vec::new();
        let layer = generate_layer(doc, &graph, &decisions, &settings, &mut warnings, &mut ctx)
            .unwrap();
        (layer, warnings)
    }

    #[test]
    fn spread_trap_is_an_annular_band() {
        let (layer, warnings) = layer_for(&doc());
        assert!(warnings.is_empty());
        assert_eq!(layer.traps.len(), 1);
        let trap = &layer.traps[0];
        assert!(trap.overprint);
        assert_eq!(trap.contour.rings.len(), 2);
        assert_eq!(trap.contour.winding, WindingOrder::NonZero);
        // band area of a 10x10 square offset by 0.24 with miter corners
        let expected = 10.48f64.powi(2) - 100.0;
        assert!((trap.contour.area() - expected).abs() < 1e-6);
    }

    #[test]
    fn spread_trap_uses_the_source_ink() {
        let (layer, _) = layer_for(&doc());
        let trap = &layer.traps[0];
        assert_eq!(trap.source, "a/fill".into());
        assert_eq!(trap.color_id, Some("Light".into()));
        assert!((trap.cmyk.c - 0.2).abs() < 1e-9);
    }

    #[test]
    fn trap_ids_are_monotonic() {
        let mut d = doc();
        d.objects.push(GraphicObject::filled_path(
            "c",
            "art",
            BezierPath::rect(20.0, 0.0, 10.0, 10.0),
            "Light",
        ));
        let (layer, _) = layer_for(&d);
        let mut prev = None;
        for trap in &layer.traps {
            if let Some(p) = prev {
                assert!(trap.id > p);
            }
            prev = Some(trap.id);
        }
    }

    #[test]
    fn stats_count_directions_and_area() {
        let (layer, _) = layer_for(&doc());
        assert_eq!(layer.stats.spread_count, 1);
        assert_eq!(layer.stats.choke_count, 0);
        assert!(layer.stats.total_area_mm2 > 0.0);
        assert_eq!(layer.settings, TrapSettings::default());
    }

    #[test]
    fn centerline_band_straddles_the_edge() {
        use crate::rules::{TrapColorPolicy, TrapDecision, TrapStyle};
        use smallvec::SmallVec;

        let d = doc();
        let mut ctx = RunContext::unattended();
        let graph = build_graph(&d, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let decision = TrapDecision {
            source: "a/fill".into(),
            target: "b/fill".into(),
            direction: TrapDirection::Centerline,
            width: Mm(0.2),
            style: TrapStyle::Abutted,
            priority_source: 0.5,
            priority_target: 0.5,
            rule: None,
            feather: None,
            color_policy: TrapColorPolicy::Automatic,
            warnings: SmallVec::new(),
        };
        let mut warnings = Vec::new();
        let layer = generate_layer(
            &d,
            &graph,
            &[decision],
            &TrapSettings::default(),
            &mut warnings,
            &mut ctx,
        )
        .unwrap();
        let trap = &layer.traps[0];
        // channel-max fill carries no palette reference
        assert_eq!(trap.color_id, None);
        assert!((trap.cmyk.c - 0.2).abs() < 1e-9);
        assert!((trap.cmyk.k - 0.8).abs() < 1e-9);
        // band between the +w/2 and -w/2 offsets of a 10x10 square; the
        // inner ring loses a sliver to the inside-corner chords
        let expected = 10.2f64.powi(2) - 9.8f64.powi(2);
        assert!((trap.contour.area() - expected).abs() < 0.05);
    }

    #[test]
    fn overlapping_traps_merge_into_one_class() {
        // dark / light / dark in a row: the light middle region spreads to
        // both sides, so both bands wrap the same contour and overlap
        let d = Document::new(
            vec![
                GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), "Dark"),
                GraphicObject::filled_path("b", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), "Light"),
                GraphicObject::filled_path("c", "art", BezierPath::rect(20.0, 0.0, 10.0, 10.0), "Dark"),
            ],
            vec![Layer::new("art", "Artwork")],
            vec![
                Ink::process("Light", Cmyk::from_percent(20.0, 20.0, 20.0, 0.0)),
                Ink::process("Dark", Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)),
            ],
        );
        let (layer, _) = layer_for(&d);
        assert_eq!(layer.traps.len(), 1);
        assert!(layer.traps[0].contour.rings.len() >= 4);
    }

    #[test]
    fn none_decisions_produce_no_geometry() {
        use smallvec::SmallVec;

        let d = doc();
        let mut ctx = RunContext::unattended();
        let graph = build_graph(&d, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let decision = TrapDecision {
            source: "a/fill".into(),
            target: "b/fill".into(),
            direction: TrapDirection::None,
            width: Mm(0.2),
            style: TrapStyle::Normal,
            priority_source: 0.0,
            priority_target: 0.0,
            rule: None,
            feather: None,
            color_policy: TrapColorPolicy::Automatic,
            warnings: SmallVec::new(),
        };
        let mut warnings = Vec::new();
        let layer = generate_layer(
            &d,
            &graph,
            &[decision],
            &TrapSettings::default(),
            &mut warnings,
            &mut ctx,
        )
        .unwrap();
        assert!(layer.is_empty());
    }

    #[test]
    fn soft_trap_chain_decreases_width_and_opacity() {
        use crate::rules::{TrapColorPolicy, TrapDecision, TrapStyle};
        use smallvec::SmallVec;

        let d = doc();
        let mut ctx = RunContext::unattended();
        let graph = build_graph(&d, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let decision = TrapDecision {
            source: "a/fill".into(),
            target: "b/fill".into(),
            direction: TrapDirection::Spread,
            width: Mm(0.15),
            style: TrapStyle::Feathered,
            priority_source: 0.0,
            priority_target: 1.0,
            rule: None,
            feather: Some(Mm(0.1)),
            color_policy: TrapColorPolicy::Automatic,
            warnings: SmallVec::new(),
        };
        let mut warnings = Vec::new();
        let layer = generate_layer(
            &d,
            &graph,
            &[decision],
            &TrapSettings::default(),
            &mut warnings,
            &mut ctx,
        )
        .unwrap();
        assert_eq!(layer.traps.len(), SOFT_TRAP_BANDS);
        for pair in layer.traps.windows(2) {
            assert!(pair[1].width < pair[0].width);
            assert!(pair[1].opacity < pair[0].opacity);
        }
        assert!(layer.traps.iter().all(|t| t.overprint));
        assert!(layer
            .traps
            .iter()
            .all(|t| t.color_id == Some("Light".into())));
    }
}
