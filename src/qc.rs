//! Quality control: invariant checks over the document, the adjacency
//! graph and the generated trap layer.
//!
//! The checker is deterministic and side-effect free; findings come back
//! as structured data grouped by severity and the caller decides how to
//! present them.

use serde_derive::{Deserialize, Serialize};

use crate::color::{ColorType, Ink};
use crate::document::{GraphicObject, ObjectId};
use crate::region::{AdjacencyGraph, RegionId};
use crate::settings::TrapSettings;
use crate::trap::TrapLayer;
use crate::units::{Mm, Pt};
use crate::warnings::{Severity, Warning, WarningKind};
use crate::Document;

/// Strokes below this width are hairlines
const HAIRLINE_WIDTH_MM: f64 = 0.1;
/// Text below this size is an error when trapped
const TEXT_ERROR_SIZE_PT: f64 = 4.0;
/// Luminance difference above which an untrapped edge is flagged
const HIGH_CONTRAST: f64 = 0.7;
/// Light inks set to overprint are suspicious above this luminance
const LIGHT_OVERPRINT_LUMINANCE: f64 = 70.0;
/// Dark knockouts without traps are reported below this luminance
const DARK_KNOCKOUT_LUMINANCE: f64 = 30.0;
/// Max-to-min trap width ratio considered consistent
const WIDTH_RATIO_LIMIT: f64 = 3.0;
/// Anchor count above which an object is reported as complex
const COMPLEX_ANCHOR_COUNT: usize = 500;

/// Structured result of a QC run
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QcReport {
    pub errors: Vec<Warning>,
    pub warnings: Vec<Warning>,
    pub infos: Vec<Warning>,
    pub passed: bool,
}

impl QcReport {
    fn push(&mut self, finding: Warning) {
        match finding.severity {
            Severity::Error => self.errors.push(finding),
            Severity::Warning => self.warnings.push(finding),
            Severity::Info => self.infos.push(finding),
        }
    }

    pub fn finding_count(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.infos.len()
    }

    pub fn findings(&self) -> impl Iterator<Item = &Warning> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .chain(self.infos.iter())
    }
}

/// Runs all checks and returns the structured report.
pub fn run_qc(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    settings: &TrapSettings,
) -> QcReport {
    let mut report = QcReport::default();

    check_small_text(doc, graph, layer, settings, &mut report);
    check_white_underprint(doc, graph, layer, settings, &mut report);
    check_high_contrast_edges(doc, graph, layer, &mut report);
    check_overprint_conflicts(doc, graph, layer, &mut report);
    check_thin_lines(doc, graph, layer, settings, &mut report);
    check_metallic_adjacency(doc, graph, layer, &mut report);
    check_width_consistency(layer, &mut report);
    check_complex_geometry(doc, graph, &mut report);

    report.passed = report.errors.is_empty();
    report
}

fn object_regions<'a>(
    graph: &'a AdjacencyGraph,
    object: &'a ObjectId,
) -> impl Iterator<Item = &'a RegionId> {
    graph
        .regions
        .iter()
        .filter(move |(_, r)| &r.object == object)
        .map(|(id, _)| id)
}

fn object_has_trap(graph: &AdjacencyGraph, layer: &TrapLayer, object: &ObjectId) -> bool {
    object_regions(graph, object).any(|region| layer.traps_for_region(region).next().is_some())
}

/// Any trap touching either side of the pair. Merged traps keep the first
/// member's references, so region identity is checked on both endpoints.
fn pair_has_trap(layer: &TrapLayer, a: &RegionId, b: &RegionId) -> bool {
    layer.traps.iter().any(|t| {
        &t.source == a || &t.target == a || &t.source == b || &t.target == b
    })
}

fn fill_ink<'a>(doc: &'a Document, obj: &GraphicObject) -> Option<&'a Ink> {
    obj.fill.as_ref().and_then(|f| doc.ink(&f.color))
}

fn uses_white(doc: &Document, obj: &GraphicObject) -> bool {
    let white = |ink: Option<&Ink>| {
        ink.map(|i| i.color_type == ColorType::WhiteUnderprint)
            .unwrap_or(false)
    };
    white(fill_ink(doc, obj))
        || white(
            obj.stroke
                .as_ref()
                .and_then(|s| doc.ink(&s.color)),
        )
}

// 1. trapped text below the minimum size
fn check_small_text(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    settings: &TrapSettings,
    report: &mut QcReport,
) {
    for obj in &doc.objects {
        let size = match obj.text_size() {
            Some(s) => s,
            None => continue,
        };
        if size >= settings.text.min_text_size {
            continue;
        }
        if !object_has_trap(graph, layer, &obj.id) {
            continue;
        }
        let severity = if size < Pt(TEXT_ERROR_SIZE_PT) {
            Severity::Error
        } else {
            Severity::Warning
        };
        report.push(
            Warning::new(
                WarningKind::SmallText,
                severity,
                format!(
                    "text '{}' at {:.1} pt carries traps below the {:.1} pt minimum",
                    obj.id.0, size.0, settings.text.min_text_size.0
                ),
            )
            .for_object(&obj.id),
        );
    }
}

// 2. white underprint spread sanity
fn check_white_underprint(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    settings: &TrapSettings,
    report: &mut QcReport,
) {
    let white_objects: Vec<&GraphicObject> = doc
        .objects
        .iter()
        .filter(|o| uses_white(doc, o))
        .collect();
    if white_objects.is_empty() {
        return;
    }

    let spread = settings.special.white_spread;
    if spread < Mm(0.10) {
        report.push(Warning::error(
            WarningKind::InsufficientSpread,
            format!("white underprint spread of {:.2} mm is far too narrow", spread.0),
        ));
    } else if spread < Mm(0.15) {
        report.push(Warning::warning(
            WarningKind::InsufficientSpread,
            format!("white underprint spread of {:.2} mm is narrow", spread.0),
        ));
    }

    if settings.special.trap_white_underprint {
        for obj in white_objects {
            if !object_has_trap(graph, layer, &obj.id) {
                report.push(
                    Warning::warning(
                        WarningKind::WhiteUnderprintIssue,
                        format!("white underprint object '{}' has no trap", obj.id.0),
                    )
                    .for_object(&obj.id),
                );
            }
        }
    }
}

// 3. high-contrast edges that required a trap but got none
fn check_high_contrast_edges(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    report: &mut QcReport,
) {
    for (a, b) in graph.pairs() {
        let rec = match graph.adjacency(&a, &b) {
            Some(r) => r,
            None => continue,
        };
        if !rec.trap_required {
            continue;
        }
        let (ra, rb) = match (graph.region(&a), graph.region(&b)) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let (ia, ib) = match (doc.ink(&ra.color), doc.ink(&rb.color)) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let contrast = (ia.luminance - ib.luminance).abs() / 100.0;
        if contrast > HIGH_CONTRAST && !pair_has_trap(layer, &a, &b) {
            report.push(
                Warning::warning(
                    WarningKind::ColorMismatch,
                    format!(
                        "high-contrast edge between '{}' and '{}' has no trap",
                        a.0, b.0
                    ),
                )
                .for_region(&a),
            );
        }
    }
}

// 4. overprint and knockout conflicts
fn check_overprint_conflicts(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    report: &mut QcReport,
) {
    for obj in &doc.objects {
        let ink = match fill_ink(doc, obj) {
            Some(i) => i,
            None => continue,
        };
        if obj.overprint && ink.luminance > LIGHT_OVERPRINT_LUMINANCE {
            report.push(
                Warning::warning(
                    WarningKind::OverprintConflict,
                    format!(
                        "light ink '{}' on object '{}' is set to overprint",
                        ink.name, obj.id.0
                    ),
                )
                .for_object(&obj.id)
                .for_color(&ink.id),
            );
        }
        if obj.knockout
            && ink.luminance < DARK_KNOCKOUT_LUMINANCE
            && !object_has_trap(graph, layer, &obj.id)
        {
            report.push(
                Warning::info(
                    WarningKind::OverprintConflict,
                    format!("dark knockout object '{}' is untrapped", obj.id.0),
                )
                .for_object(&obj.id),
            );
        }
    }
}

// 5. hairlines and thin strokes
fn check_thin_lines(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    settings: &TrapSettings,
    report: &mut QcReport,
) {
    for obj in &doc.objects {
        let stroke = match &obj.stroke {
            Some(s) => s,
            None => continue,
        };
        if stroke.width < Mm(HAIRLINE_WIDTH_MM) {
            if object_has_trap(graph, layer, &obj.id) {
                report.push(
                    Warning::warning(
                        WarningKind::ThinLine,
                        format!(
                            "hairline stroke of {:.2} mm on '{}' carries a trap",
                            stroke.width.0, obj.id.0
                        ),
                    )
                    .for_object(&obj.id),
                );
            }
        } else if stroke.width < settings.lines.min_line_width {
            report.push(
                Warning::info(
                    WarningKind::ThinLine,
                    format!(
                        "stroke of {:.2} mm on '{}' is below the {:.2} mm minimum",
                        stroke.width.0, obj.id.0, settings.lines.min_line_width.0
                    ),
                )
                .for_object(&obj.id),
            );
        }
    }
}

// 6. metallic inks against process colors
fn check_metallic_adjacency(
    doc: &Document,
    graph: &AdjacencyGraph,
    layer: &TrapLayer,
    report: &mut QcReport,
) {
    for (a, b) in graph.pairs() {
        let (ra, rb) = match (graph.region(&a), graph.region(&b)) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let (ia, ib) = match (doc.ink(&ra.color), doc.ink(&rb.color)) {
            (Some(x), Some(y)) => (x, y),
            _ => continue,
        };
        let a_met = ia.color_type == ColorType::Metallic;
        let b_met = ib.color_type == ColorType::Metallic;
        if a_met == b_met {
            continue;
        }
        let rec = match graph.adjacency(&a, &b) {
            Some(r) => r,
            None => continue,
        };
        if rec.trap_required && !pair_has_trap(layer, &a, &b) {
            report.push(
                Warning::warning(
                    WarningKind::MetallicAdjacent,
                    format!("metallic edge between '{}' and '{}' has no trap", a.0, b.0),
                )
                .for_region(&a),
            );
        } else {
            report.push(
                Warning::info(
                    WarningKind::MetallicAdjacent,
                    format!("metallic ink adjacent to process color at '{}'", a.0),
                )
                .for_region(&a),
            );
        }
    }
}

// 7. width spread across the generated layer
fn check_width_consistency(layer: &TrapLayer, report: &mut QcReport) {
    let widths: Vec<f64> = layer.traps.iter().map(|t| t.width.0).collect();
    if let (Some(min), Some(max)) = (
        widths.iter().cloned().reduce(f64::min),
        widths.iter().cloned().reduce(f64::max),
    ) {
        if min > 0.0 && max / min > WIDTH_RATIO_LIMIT {
            report.push(Warning::warning(
                WarningKind::InsufficientSpread,
                format!(
                    "trap widths vary from {:.2} mm to {:.2} mm across the layer",
                    min, max
                ),
            ));
        }
    }
    if layer.stats.clamped_widths > 0 {
        report.push(Warning::info(
            WarningKind::InsufficientSpread,
            format!(
                "{} trap width(s) were clamped to the configured range",
                layer.stats.clamped_widths
            ),
        ));
    }
}

// 8. geometry complexity
fn check_complex_geometry(doc: &Document, graph: &AdjacencyGraph, report: &mut QcReport) {
    for obj in &doc.objects {
        if obj.anchor_count() > COMPLEX_ANCHOR_COUNT {
            report.push(
                Warning::info(
                    WarningKind::ComplexGeometry,
                    format!(
                        "object '{}' has {} anchors",
                        obj.id.0,
                        obj.anchor_count()
                    ),
                )
                .for_object(&obj.id),
            );
        }
        if let Some(risk) = graph.risk_for(&obj.id) {
            if risk.sharp_angles {
                report.push(
                    Warning::info(
                        WarningKind::ComplexGeometry,
                        format!("object '{}' contains sharp corners", obj.id.0),
                    )
                    .for_object(&obj.id),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Cmyk;
    use crate::document::Layer;
    use crate::geometry::BezierPath;
    use crate::region::{build_graph, AdjacencyOptions};
    use crate::rules::DecisionContext;
    use crate::session::RunContext;
    use crate::trap::generate_layer;
    use crate::GraphicObject;

    fn run(doc: &Document, settings: &TrapSettings) -> (QcReport, TrapLayer, AdjacencyGraph) {
        let mut ctx = RunContext::unattended();
        let graph = build_graph(doc, &AdjacencyOptions::default(), &mut ctx).unwrap();
        let dctx = DecisionContext {
            document: doc,
            graph: &graph,
            settings,
            tags: &[],
        };
        let decisions: Vec<_> = graph
            .pairs()
            .iter()
            .filter_map(|(a, b)| dctx.decide(a, b))
            .collect();
        let mut warnings = Vec::new();
        let layer =
            generate_layer(doc, &graph, &decisions, settings, &mut warnings, &mut ctx).unwrap();
        let report = run_qc(doc, &graph, &layer, settings);
        (report, layer, graph)
    }

    fn base_doc() -> Document {
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

    #[test]
    fn clean_document_passes() {
        let (report, _, _) = run(&base_doc(), &TrapSettings::default());
        assert!(report.passed);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn narrow_white_spread_is_flagged() {
        let mut doc = base_doc();
        doc.inks.push(Ink::new(
            "White".into(),
            "Opaque White",
            Some(ColorType::WhiteUnderprint),
            crate::color::ColorSpace::SpotCmyk,
            Cmyk::default(),
            1.0,
        ));
        doc.objects.push(GraphicObject::filled_path(
            "w",
            "art",
            BezierPath::rect(40.0, 0.0, 10.0, 10.0),
            "White",
        ));
        let mut settings = TrapSettings::default();
        settings.special.white_spread = Mm(0.12);
        let (report, _, _) = run(&doc, &settings);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::InsufficientSpread));
        // the distant white object also has no trap
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::WhiteUnderprintIssue));

        settings.special.white_spread = Mm(0.05);
        let (report, _, _) = run(&doc, &settings);
        assert!(!report.passed);
        assert!(report
            .errors
            .iter()
            .any(|w| w.kind == WarningKind::InsufficientSpread));
    }

    #[test]
    fn untrapped_high_contrast_edge_is_flagged() {
        // paper-light against solid black, trapping disabled via an
        // always-matching no-trap rule
        let mut doc = base_doc();
        doc.inks.push(Ink::process("K", Cmyk::from_percent(0.0, 0.0, 0.0, 100.0)));
        doc.objects[1] =
            GraphicObject::filled_path("b", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), "K");
        let mut settings = TrapSettings::default();
        settings.rules.custom_rules.push(crate::rules::TrapRule {
            id: "off".to_string(),
            priority: 1000,
            conditions: vec![],
            action: crate::rules::RuleAction {
                kind: crate::rules::RuleActionKind::NoTrap,
                ..Default::default()
            },
        });
        let (report, layer, _) = run(&doc, &settings);
        assert!(layer.is_empty());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::ColorMismatch));
    }

    #[test]
    fn light_overprint_raises_a_warning() {
        let mut doc = base_doc();
        doc.objects[0].overprint = true;
        let (report, _, _) = run(&doc, &TrapSettings::default());
        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::OverprintConflict));
    }

    #[test]
    fn thin_stroke_is_reported_as_info() {
        let mut doc = base_doc();
        doc.objects[0].stroke = Some(crate::document::Stroke::new("Dark".into(), Mm(0.15)));
        let (report, _, _) = run(&doc, &TrapSettings::default());
        assert!(report
            .infos
            .iter()
            .any(|w| w.kind == WarningKind::ThinLine));
    }

    #[test]
    fn trapped_metallic_edge_is_informational() {
        let mut doc = base_doc();
        doc.inks.push(Ink::new(
            "Silver".into(),
            "PANTONE 877 Silver",
            Some(ColorType::Metallic),
            crate::color::ColorSpace::SpotCmyk,
            Cmyk::from_percent(0.0, 0.0, 0.0, 30.0),
            1.0,
        ));
        doc.objects[1] = GraphicObject::filled_path(
            "b",
            "art",
            BezierPath::rect(10.0, 0.0, 10.0, 10.0),
            "Silver",
        );
        let (report, layer, _) = run(&doc, &TrapSettings::default());
        assert!(!layer.is_empty());
        assert!(report
            .infos
            .iter()
            .any(|w| w.kind == WarningKind::MetallicAdjacent));
        assert!(report.passed);
    }

    #[test]
    fn sharp_corners_and_heavy_paths_are_informational() {
        let mut doc = base_doc();
        // a needle-thin triangle has a sharp tip
        doc.objects.push(GraphicObject::filled_path(
            "spike",
            "art",
            BezierPath::polygon(&[
                crate::geometry::Point::new(0.0, 20.0),
                crate::geometry::Point::new(12.0, 20.2),
                crate::geometry::Point::new(0.0, 20.4),
            ]),
            "Dark",
        ));
        let (report, _, _) = run(&doc, &TrapSettings::default());
        assert!(report
            .infos
            .iter()
            .any(|w| w.kind == WarningKind::ComplexGeometry));
    }

    #[test]
    fn width_clamp_count_is_reported() {
        let mut settings = TrapSettings::default();
        // force the resolved width over the clamp
        settings.distance.max_width = Mm(0.10);
        let (report, _, _) = run(&base_doc(), &settings);
        assert!(report
            .infos
            .iter()
            .any(|w| w.kind == WarningKind::InsufficientSpread));
    }
}
