//! Color regions and the adjacency graph.
//!
//! Objects are segmented into per-ink regions (fill and stroke contribute
//! separately), annotated with geometry risk factors, and connected by
//! adjacency records describing the shared edge between region pairs.
//!
//! Regions are keyed by id in a `BTreeMap`, so every iteration over the
//! graph is in lexicographic id order. Region ids are derived
//! deterministically from the owning object id, which makes whole runs
//! reproducible.

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::color::{delta_e_76, ColorId, Ink};
use crate::document::{Document, GraphicObject, LineCapStyle, ObjectId, ObjectKind, Stroke};
use crate::geometry::{BezierPath, Bounds, PathPoint, Point};
use crate::offset::{offset_path, OffsetOptions};
use crate::session::{RunContext, TrapPhase};
use crate::units::Mm;

/// Text below this cap height is considered small (≈ 6 pt)
const SMALL_TEXT_HEIGHT_MM: f64 = 2.1;
/// Strokes below this width are considered thin lines
const THIN_LINE_WIDTH_MM: f64 = 0.25;
/// Strokes below this width contribute no region of their own
const MIN_STROKE_REGION_WIDTH_MM: f64 = 0.1;
/// Interior angles below this are flagged as sharp
const SHARP_ANGLE_DEG: f64 = 30.0;
/// Objects with more anchors than this are flagged as high detail
const HIGH_DETAIL_ANCHORS: usize = 100;

/// Stable identifier of a color region, derived from the owning object id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    fn fill(object: &ObjectId, path_index: usize) -> Self {
        if path_index == 0 {
            Self(format!("{}/fill", object.0))
        } else {
            Self(format!("{}/fill:{}", object.0, path_index))
        }
    }

    fn stroke(object: &ObjectId) -> Self {
        Self(format!("{}/stroke", object.0))
    }
}

impl From<&str> for RegionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Whether a region was contributed by a fill or a stroke attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegionSource {
    Fill,
    Stroke,
}

/// Geometry risk annotations for one object
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RiskFactors {
    pub small_text: bool,
    pub thin_line: bool,
    pub sharp_angles: bool,
    pub high_detail: bool,
    pub notes: Vec<String>,
}

/// How two adjacent regions touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactType {
    EdgeToEdge,
    Overlap,
    Gap,
    Knockout,
    Overprint,
}

/// Directed edge of the adjacency graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdjacencyRecord {
    pub to: RegionId,
    pub shared_edge: BezierPath,
    pub edge_length: Mm,
    pub contact: ContactType,
    pub trap_required: bool,
}

/// One colored area contributed to the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ColorRegion {
    pub id: RegionId,
    pub object: ObjectId,
    pub color: ColorId,
    pub source: RegionSource,
    pub contour: BezierPath,
    pub area_mm2: f64,
    pub adjacencies: SmallVec<[AdjacencyRecord; 4]>,
}

/// Region set plus adjacency records, iterated in lexicographic id order
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdjacencyGraph {
    pub regions: BTreeMap<RegionId, ColorRegion>,
    pub risk: BTreeMap<ObjectId, RiskFactors>,
}

impl AdjacencyGraph {
    pub fn region(&self, id: &RegionId) -> Option<&ColorRegion> {
        self.regions.get(id)
    }

    pub fn risk_for(&self, object: &ObjectId) -> Option<&RiskFactors> {
        self.risk.get(object)
    }

    /// Outgoing adjacency record from `a` to `b`
    pub fn adjacency(&self, a: &RegionId, b: &RegionId) -> Option<&AdjacencyRecord> {
        self.regions
            .get(a)
            .and_then(|r| r.adjacencies.iter().find(|rec| &rec.to == b))
    }

    /// Every unordered adjacent pair exactly once, lexicographically
    pub fn pairs(&self) -> Vec<(RegionId, RegionId)> {
        let mut out = Vec::new();
        for (id, region) in &self.regions {
            for rec in &region.adjacencies {
                if id < &rec.to {
                    out.push((id.clone(), rec.to.clone()));
                }
            }
        }
        out
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Tunable knobs of the adjacency detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AdjacencyOptions {
    /// Margin for the bounds pre-filter and anchor matching
    pub tolerance: Mm,
    /// Shared edges shorter than this classify as a gap contact
    pub gap_threshold: Mm,
    /// Color difference above which trapping is required
    pub min_delta_e: f64,
}

impl Default for AdjacencyOptions {
    fn default() -> Self {
        Self {
            tolerance: Mm(0.1),
            gap_threshold: Mm(0.2),
            min_delta_e: 10.0,
        }
    }
}

/// Builds the region set and adjacency graph for a document.
///
/// Returns `None` when the run is cancelled mid-way.
pub fn build_graph(
    doc: &Document,
    options: &AdjacencyOptions,
    ctx: &mut RunContext,
) -> Option<AdjacencyGraph> {
    let mut graph = AdjacencyGraph::default();

    // region extraction + risk annotation, one object per work unit
    let object_total = doc.objects.len();
    for (i, obj) in doc.objects.iter().enumerate() {
        if !ctx.step(TrapPhase::Analyze, i, object_total, &obj.id.0) {
            return None;
        }
        let printable = doc
            .layer(&obj.layer)
            .map(|l| l.printable)
            .unwrap_or(false);
        if !printable {
            continue;
        }
        let mut risk = annotate_risk(obj);
        for region in extract_regions(obj, &mut risk) {
            graph.regions.insert(region.id.clone(), region);
        }
        graph.risk.insert(obj.id.clone(), risk);
    }

    // adjacency detection over all region pairs after the bounds pre-filter
    let ids: Vec<RegionId> = graph.regions.keys().cloned().collect();
    let mut bounds: BTreeMap<&RegionId, Bounds> = BTreeMap::new();
    for id in &ids {
        bounds.insert(id, graph.regions[id].contour.bounds());
    }

    let n = ids.len();
    let pair_total = n.saturating_mul(n.saturating_sub(1)) / 2;
    let mut pair_done = 0usize;
    let mut records: Vec<(RegionId, AdjacencyRecord)> = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            if !ctx.step(
                TrapPhase::Analyze,
                object_total + pair_done,
                object_total + pair_total,
                &ids[i].0,
            ) {
                return None;
            }
            pair_done += 1;

            let (ia, ib) = (&ids[i], &ids[j]);
            if !bounds[ia].intersects(&bounds[ib], options.tolerance.0) {
                continue;
            }
            let a = &graph.regions[ia];
            let b = &graph.regions[ib];
            if let Some((rec_ab, rec_ba)) = detect_adjacency(doc, a, b, &bounds[ia], &bounds[ib], options)
            {
                records.push((ia.clone(), rec_ab));
                records.push((ib.clone(), rec_ba));
            }
        }
    }
    for (from, rec) in records {
        if let Some(region) = graph.regions.get_mut(&from) {
            region.adjacencies.push(rec);
        }
    }

    Some(graph)
}

fn annotate_risk(obj: &GraphicObject) -> RiskFactors {
    let mut risk = RiskFactors::default();

    if obj.kind == ObjectKind::Text {
        let height = obj.bounds().height();
        if height > 0.0 && height < SMALL_TEXT_HEIGHT_MM {
            risk.small_text = true;
            risk.notes.push(format!("text cap height {:.2} mm", height));
        }
    }
    if let Some(stroke) = &obj.stroke {
        if stroke.width.0 < THIN_LINE_WIDTH_MM {
            risk.thin_line = true;
        }
    }
    if obj
        .paths
        .iter()
        .any(|p| p.interior_angles().iter().any(|a| *a < SHARP_ANGLE_DEG))
    {
        risk.sharp_angles = true;
    }
    if obj.anchor_count() > HIGH_DETAIL_ANCHORS {
        risk.high_detail = true;
    }
    risk
}

fn extract_regions(obj: &GraphicObject, risk: &mut RiskFactors) -> Vec<ColorRegion> {
    let mut out = Vec::new();

    if let Some(fill) = &obj.fill {
        if fill.opacity > 0.0 {
            // text objects contribute a single region
            let fill_paths: &[BezierPath] = if obj.kind == ObjectKind::Text {
                &obj.paths[..obj.paths.len().min(1)]
            } else {
                &obj.paths
            };
            for (i, path) in fill_paths.iter().enumerate() {
                out.push(ColorRegion {
                    id: RegionId::fill(&obj.id, i),
                    object: obj.id.clone(),
                    color: fill.color.clone(),
                    source: RegionSource::Fill,
                    contour: path.clone(),
                    area_mm2: path.area(),
                    adjacencies: SmallVec::new(),
                });
            }
        }
    }

    if let Some(stroke) = &obj.stroke {
        if stroke.opacity > 0.0 && stroke.width.0 >= MIN_STROKE_REGION_WIDTH_MM {
            if let Some(base) = obj.paths.first() {
                let contour = match stroke_outline(base, stroke) {
                    Some(outline) => outline,
                    None => {
                        risk.notes.push("stroke outline fallback".to_string());
                        base.clone()
                    }
                };
                let mut area = contour.area();
                if let Some(dash) = &stroke.dash {
                    let coverage = dash.ink_coverage();
                    if coverage < 1.0 {
                        // a dashed stroke inks only part of its outline
                        area *= coverage;
                        risk.notes
                            .push(format!("dashed stroke, {:.0}% ink coverage", coverage * 100.0));
                    }
                }
                out.push(ColorRegion {
                    id: RegionId::stroke(&obj.id),
                    object: obj.id.clone(),
                    color: stroke.color.clone(),
                    source: RegionSource::Stroke,
                    contour,
                    area_mm2: area,
                    adjacencies: SmallVec::new(),
                });
            }
        }
    }

    out
}

/// Widens a stroked path into a closed outline by offsetting symmetrically
/// at ±width/2, honoring the stroke's join, miter limit and end caps.
/// Closed paths use the outer ring; open paths stitch the two offsets into
/// a capsule with the configured caps.
fn stroke_outline(base: &BezierPath, stroke: &Stroke) -> Option<BezierPath> {
    let half = stroke.width.0 / 2.0;
    let corner = stroke.join.corner_style();
    let outer = offset_path(
        base,
        &OffsetOptions::new(Mm(half)).with_corner(corner, stroke.miter_limit),
    )?;
    if base.closed {
        return Some(outer);
    }
    let inner = offset_path(
        base,
        &OffsetOptions::new(Mm(-half)).with_corner(corner, stroke.miter_limit),
    )?;
    let inner_rev = inner.reversed();

    let segments = base.segments();
    let end_tangent = segments.last().and_then(|s| s.end_tangent());
    let start_tangent = segments.first().and_then(|s| s.start_tangent());

    let mut points = outer.points.clone();
    if let (Some(from), Some(to)) = (outer.points.last(), inner_rev.points.first()) {
        for p in cap_points(from.anchor, to.anchor, end_tangent, half, stroke.cap) {
            points.push(PathPoint::corner(p));
        }
    }
    points.extend(inner_rev.points.iter().copied());
    if let (Some(from), Some(to)) = (inner_rev.points.last(), outer.points.first()) {
        for p in cap_points(
            from.anchor,
            to.anchor,
            start_tangent.map(|t| -t),
            half,
            stroke.cap,
        ) {
            points.push(PathPoint::corner(p));
        }
    }
    Some(BezierPath::new(points, true))
}

/// Extra outline points closing one end of an open stroke.
///
/// Butt caps need none; projecting caps push both outline corners past the
/// endpoint; the round cap is represented by its apex, which is as much
/// resolution as anchor-based adjacency detection consumes.
fn cap_points(
    from: Point,
    to: Point,
    tangent: Option<Point>,
    half: f64,
    cap: LineCapStyle,
) -> Vec<Point> {
    let t = match tangent {
        Some(t) => t,
        None => return Vec::new(),
    };
    match cap {
        LineCapStyle::Butt => Vec::new(),
        LineCapStyle::ProjectingSquare => vec![from + t * half, to + t * half],
        LineCapStyle::Round => vec![from.midpoint(to) + t * half],
    }
}

/// Finds the shared edge and classifies the contact between two regions.
/// Returns the record for both directions, or `None` if the regions are
/// not adjacent.
fn detect_adjacency(
    doc: &Document,
    a: &ColorRegion,
    b: &ColorRegion,
    bounds_a: &Bounds,
    bounds_b: &Bounds,
    options: &AdjacencyOptions,
) -> Option<(AdjacencyRecord, AdjacencyRecord)> {
    let tol = options.tolerance.0;

    let shared_a = shared_anchors(&a.contour, &b.contour, tol);
    if shared_a.len() < 2 {
        return None;
    }
    let shared_b = shared_anchors(&b.contour, &a.contour, tol);

    let edge_a = BezierPath::polyline(&shared_a);
    let edge_b = BezierPath::polyline(&shared_b);
    let len_a = Mm(edge_a.length());
    let len_b = Mm(edge_b.length());

    let contact_ab = classify_contact(
        doc, a, len_a, shared_b.len(), bounds_a, bounds_b, options,
    );
    let contact_ba = classify_contact(
        doc, b, len_b, shared_a.len(), bounds_b, bounds_a, options,
    );

    let required_ab = trap_required(doc, a, b, contact_ab, options);
    let required_ba = trap_required(doc, b, a, contact_ba, options);

    Some((
        AdjacencyRecord {
            to: b.id.clone(),
            shared_edge: edge_a,
            edge_length: len_a,
            contact: contact_ab,
            trap_required: required_ab,
        },
        AdjacencyRecord {
            to: a.id.clone(),
            shared_edge: edge_b,
            edge_length: len_b,
            contact: contact_ba,
            trap_required: required_ba,
        },
    ))
}

/// Anchors of `from` lying within `tol` of any anchor of `to`, in contour order
fn shared_anchors(from: &BezierPath, to: &BezierPath, tol: f64) -> Vec<Point> {
    let mut out = Vec::new();
    for p in &from.points {
        if to
            .points
            .iter()
            .any(|q| p.anchor.distance(q.anchor) <= tol)
        {
            out.push(p.anchor);
        }
    }
    out
}

fn classify_contact(
    doc: &Document,
    from: &ColorRegion,
    edge_length: Mm,
    other_shared: usize,
    bounds_from: &Bounds,
    bounds_to: &Bounds,
    options: &AdjacencyOptions,
) -> ContactType {
    if let Some(obj) = doc.object(&from.object) {
        if obj.overprint {
            return ContactType::Overprint;
        }
        if obj.knockout {
            return ContactType::Knockout;
        }
    }
    if edge_length.0 > 0.0 && other_shared >= 2 {
        return ContactType::EdgeToEdge;
    }
    if bounds_from.contains(bounds_to) || bounds_to.contains(bounds_from) {
        return ContactType::Overlap;
    }
    if edge_length < options.gap_threshold {
        return ContactType::Gap;
    }
    ContactType::EdgeToEdge
}

fn trap_required(
    doc: &Document,
    a: &ColorRegion,
    b: &ColorRegion,
    contact: ContactType,
    options: &AdjacencyOptions,
) -> bool {
    let (ink_a, ink_b) = match (doc.ink(&a.color), doc.ink(&b.color)) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    if ink_a.is_non_trapping() || ink_b.is_non_trapping() {
        return false;
    }
    if contact == ContactType::Overprint {
        return false;
    }
    if is_white(ink_a) || is_white(ink_b) {
        return true;
    }
    delta_e_76(ink_a.lab, ink_b.lab) > options.min_delta_e
}

fn is_white(ink: &Ink) -> bool {
    ink.color_type == crate::color::ColorType::WhiteUnderprint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Cmyk, ColorType};
    use crate::document::{Layer, Stroke};
    use crate::session::RunContext;

    fn inks() -> Vec<Ink> {
        vec![
            Ink::process("Light", Cmyk::from_percent(20.0, 20.0, 20.0, 0.0)),
            Ink::process("Dark", Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)),
            Ink::new(
                "White".into(),
                "Opaque White",
                Some(ColorType::WhiteUnderprint),
                crate::color::ColorSpace::SpotCmyk,
                Cmyk::default(),
                1.0,
            ),
            Ink::new(
                "Varnish".into(),
                "Gloss Varnish",
                None,
                crate::color::ColorSpace::SpotCmyk,
                Cmyk::from_percent(0.0, 0.0, 0.0, 5.0),
                1.0,
            ),
        ]
    }

    fn two_rects(color_a: &str, color_b: &str) -> Document {
        Document::new(
            vec![
                GraphicObject::filled_path("r1", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), color_a),
                GraphicObject::filled_path("r2", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), color_b),
            ],
            vec![Layer::new("art", "Artwork")],
            inks(),
        )
    }

    fn build(doc: &Document) -> AdjacencyGraph {
        let mut ctx = RunContext::unattended();
        build_graph(doc, &AdjacencyOptions::default(), &mut ctx).unwrap()
    }

    #[test]
    fn adjacent_rects_share_an_edge() {
        let graph = build(&two_rects("Light", "Dark"));
        assert_eq!(graph.region_count(), 2);
        let rec = graph
            .adjacency(&"r1/fill".into(), &"r2/fill".into())
            .expect("adjacency expected");
        assert_eq!(rec.contact, ContactType::EdgeToEdge);
        assert!(rec.trap_required);
        assert!((rec.edge_length.0 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn pairs_are_unique_and_ordered() {
        let graph = build(&two_rects("Light", "Dark"));
        let pairs = graph.pairs();
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].0 < pairs[0].1);
    }

    #[test]
    fn varnish_regions_never_require_traps() {
        let graph = build(&two_rects("Light", "Varnish"));
        let rec = graph
            .adjacency(&"r1/fill".into(), &"r2/fill".into())
            .expect("adjacency expected");
        assert!(!rec.trap_required);
    }

    #[test]
    fn white_underprint_always_requires_traps() {
        let graph = build(&two_rects("White", "Light"));
        let rec = graph
            .adjacency(&"r1/fill".into(), &"r2/fill".into())
            .expect("adjacency expected");
        assert!(rec.trap_required);
    }

    #[test]
    fn overprint_objects_classify_as_overprint_contact() {
        let mut doc = two_rects("Light", "Dark");
        doc.objects[0].overprint = true;
        let graph = build(&doc);
        let rec = graph
            .adjacency(&"r1/fill".into(), &"r2/fill".into())
            .unwrap();
        assert_eq!(rec.contact, ContactType::Overprint);
        assert!(!rec.trap_required);
        // the reverse direction is classified from the other object
        let rev = graph
            .adjacency(&"r2/fill".into(), &"r1/fill".into())
            .unwrap();
        assert_eq!(rev.contact, ContactType::EdgeToEdge);
    }

    #[test]
    fn distant_rects_are_not_adjacent() {
        let doc = Document::new(
            vec![
                GraphicObject::filled_path("r1", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), "Light"),
                GraphicObject::filled_path("r2", "art", BezierPath::rect(30.0, 0.0, 10.0, 10.0), "Dark"),
            ],
            vec![Layer::new("art", "Artwork")],
            inks(),
        );
        let graph = build(&doc);
        assert!(graph.pairs().is_empty());
    }

    #[test]
    fn non_printable_layers_contribute_nothing() {
        let mut doc = two_rects("Light", "Dark");
        doc.layers[0].printable = false;
        let graph = build(&doc);
        assert_eq!(graph.region_count(), 0);
    }

    #[test]
    fn stroke_contributes_a_separate_region() {
        let mut doc = two_rects("Light", "Dark");
        doc.objects[0].stroke = Some(Stroke::new("Dark".into(), Mm(0.5)));
        let graph = build(&doc);
        assert_eq!(graph.region_count(), 3);
        let stroke = graph.region(&"r1/stroke".into()).unwrap();
        assert_eq!(stroke.source, RegionSource::Stroke);
        // widened outline of a closed 10x10 rect at +0.25
        assert!(stroke.area_mm2 > 100.0);
    }

    #[test]
    fn hairline_stroke_is_skipped_but_flagged() {
        let mut doc = two_rects("Light", "Dark");
        doc.objects[0].stroke = Some(Stroke::new("Dark".into(), Mm(0.05)));
        let graph = build(&doc);
        assert_eq!(graph.region_count(), 2);
        assert!(graph.risk_for(&"r1".into()).unwrap().thin_line);
    }

    #[test]
    fn small_text_risk_annotation() {
        let mut doc = two_rects("Light", "Dark");
        doc.objects.push(GraphicObject::text(
            "t1",
            "art",
            BezierPath::rect(0.0, 20.0, 5.0, 1.5),
            "Dark",
        ));
        let graph = build(&doc);
        let risk = graph.risk_for(&"t1".into()).unwrap();
        assert!(risk.small_text);
    }

    #[test]
    fn open_stroke_widens_into_a_capsule() {
        let line = BezierPath::polyline(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let outline = stroke_outline(&line, &Stroke::new("Dark".into(), Mm(1.0))).unwrap();
        assert!(outline.closed);
        // butt-capped capsule of a straight stroke: 10 x 1
        assert!((outline.area() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn projecting_caps_extend_the_capsule() {
        let line = BezierPath::polyline(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        let mut stroke = Stroke::new("Dark".into(), Mm(1.0));
        stroke.cap = LineCapStyle::ProjectingSquare;
        let outline = stroke_outline(&line, &stroke).unwrap();
        // half the width past each endpoint: 11 x 1
        assert!((outline.area() - 11.0).abs() < 1e-6);

        stroke.cap = LineCapStyle::Round;
        let rounded = stroke_outline(&line, &stroke).unwrap();
        // the cap apex adds a triangle on each end
        assert!((rounded.area() - 10.5).abs() < 1e-6);
    }

    #[test]
    fn dashed_stroke_scales_region_area() {
        let mut doc = two_rects("Light", "Dark");
        let mut stroke = Stroke::new("Dark".into(), Mm(0.5));
        stroke.dash = Some(crate::document::LineDashPattern {
            offset: 0.0,
            pattern: smallvec::smallvec![1.0, 1.0],
        });
        doc.objects[0].stroke = Some(stroke);
        let graph = build(&doc);
        let solid_area = {
            let mut plain = two_rects("Light", "Dark");
            plain.objects[0].stroke = Some(Stroke::new("Dark".into(), Mm(0.5)));
            build(&plain).region(&"r1/stroke".into()).unwrap().area_mm2
        };
        let dashed_area = graph.region(&"r1/stroke".into()).unwrap().area_mm2;
        assert!((dashed_area - solid_area / 2.0).abs() < 1e-6);
        let risk = graph.risk_for(&"r1".into()).unwrap();
        assert!(risk.notes.iter().any(|n| n.contains("dashed stroke")));
    }
}
