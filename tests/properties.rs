//! Property-based tests over the core invariants.

use autotrap::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

fn pct(v: u8) -> f64 {
    (v % 101) as f64
}

fn process_ink(id: &str, c: u8, m: u8, y: u8, k: u8) -> Ink {
    Ink::new(
        ColorId::from(id),
        id,
        Some(ColorType::ProcessCmyk),
        ColorSpace::Cmyk,
        Cmyk::from_percent(pct(c), pct(m), pct(y), pct(k)),
        1.0,
    )
}

fn pair_doc(ink_a: Ink, ink_b: Ink) -> Document {
    let ca = ink_a.id.0.clone();
    let cb = ink_b.id.0.clone();
    Document::new(
        vec![
            GraphicObject::filled_path("r1", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), &ca),
            GraphicObject::filled_path("r2", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), &cb),
        ],
        vec![Layer::new("art", "Artwork")],
        vec![ink_a, ink_b],
    )
}

/// Row of adjacent rectangles, one distinct ink per object
fn row_doc(colors: &[(u8, u8, u8, u8)]) -> Document {
    let mut objects = Vec::new();
    let mut inks = Vec::new();
    for (i, (c, m, y, k)) in colors.iter().enumerate() {
        let ink_id = format!("I{i}");
        inks.push(process_ink(&ink_id, *c, *m, *y, *k));
        objects.push(GraphicObject::filled_path(
            &format!("obj{i}"),
            "art",
            BezierPath::rect(i as f64 * 10.0, 0.0, 10.0, 10.0),
            &ink_id,
        ));
    }
    Document::new(objects, vec![Layer::new("art", "Artwork")], inks)
}

/// Decision for the pair with `trap_required` forced on, so the rule
/// engine itself is exercised even for similar colors
fn decide_forced(doc: &Document, settings: &TrapSettings) -> Option<TrapDecision> {
    let mut ctx = RunContext::unattended();
    let mut graph = build_graph(doc, &AdjacencyOptions::default(), &mut ctx)?;
    for region in graph.regions.values_mut() {
        for adj in region.adjacencies.iter_mut() {
            adj.trap_required = true;
        }
    }
    let dctx = DecisionContext {
        document: doc,
        graph: &graph,
        settings,
        tags: &[],
    };
    dctx.decide(&RegionId::from("r1/fill"), &RegionId::from("r2/fill"))
}

// property 1: CMYK round trip stays within one 8-bit step per channel
#[quickcheck]
fn rgb_cmyk_roundtrip(r: u8, g: u8, b: u8) -> bool {
    let rgb = Rgb::new(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);
    let back = cmyk_to_rgb(rgb_to_cmyk(rgb));
    (back.r - rgb.r).abs() <= 1.0 / 255.0
        && (back.g - rgb.g).abs() <= 1.0 / 255.0
        && (back.b - rgb.b).abs() <= 1.0 / 255.0
}

// property 2: with C+M+Y fixed, more black means strictly more density
#[quickcheck]
fn neutral_density_monotonic_in_black(c: u8, m: u8, y: u8, k1: u8, k2: u8) -> TestResult {
    let (k1, k2) = (pct(k1), pct(k2));
    if k1 == k2 {
        return TestResult::discard();
    }
    let lo = Cmyk::from_percent(pct(c), pct(m), pct(y), k1.min(k2));
    let hi = Cmyk::from_percent(pct(c), pct(m), pct(y), k1.max(k2));
    TestResult::from_bool(neutral_density(hi) > neutral_density(lo))
}

// property 3: swapping the pair mirrors the direction
#[quickcheck]
#[allow(clippy::too_many_arguments)]
fn direction_duality(c1: u8, m1: u8, y1: u8, k1: u8, c2: u8, m2: u8, y2: u8, k2: u8) -> TestResult {
    let a = process_ink("A", c1, m1, y1, k1);
    let b = process_ink("B", c2, m2, y2, k2);
    // black is handled by its own special rule and exempt from duality
    if a.is_black() || b.is_black() {
        return TestResult::discard();
    }
    let settings = TrapSettings::default();
    let forward = decide_forced(&pair_doc(a.clone(), b.clone()), &settings);
    let backward = decide_forced(&pair_doc(b, a), &settings);
    match (forward, backward) {
        (Some(f), Some(r)) => TestResult::from_bool(f.direction == r.direction.mirrored()),
        (None, None) => TestResult::passed(),
        _ => TestResult::failed(),
    }
}

// property 4: every decision respects the width clamp
#[quickcheck]
#[allow(clippy::too_many_arguments)]
fn width_is_clamped(c1: u8, m1: u8, y1: u8, k1: u8, c2: u8, m2: u8, y2: u8, k2: u8) -> TestResult {
    let settings = TrapSettings::default();
    let doc = pair_doc(
        process_ink("A", c1, m1, y1, k1),
        process_ink("B", c2, m2, y2, k2),
    );
    match decide_forced(&doc, &settings) {
        Some(d) if d.direction != TrapDirection::None => TestResult::from_bool(
            d.width >= settings.distance.min_width && d.width <= settings.distance.max_width,
        ),
        _ => TestResult::discard(),
    }
}

// property 5: positive offsets grow a convex contour, negative ones shrink it
#[quickcheck]
fn offset_signs_on_rectangles(w: u8, h: u8, d: u8) -> TestResult {
    let w = (w % 50) as f64 + 1.0;
    let h = (h % 50) as f64 + 1.0;
    let d = ((d % 20) as f64 + 1.0) / 100.0;
    if d >= w.min(h) / 2.0 {
        return TestResult::discard();
    }
    let rect = BezierPath::rect(0.0, 0.0, w, h);
    let grown = offset_path(&rect, &OffsetOptions::new(Mm(d))).unwrap();
    let shrunk = offset_path(&rect, &OffsetOptions::new(Mm(-d))).unwrap();
    let same = offset_path(&rect, &OffsetOptions::new(Mm(0.0))).unwrap();
    TestResult::from_bool(
        grown.area() > rect.area() && shrunk.area() < rect.area() && same == rect,
    )
}

// property 6: identical inputs give identical runs
#[quickcheck]
fn runs_are_deterministic(colors: Vec<(u8, u8, u8, u8)>) -> TestResult {
    if colors.is_empty() || colors.len() > 5 {
        return TestResult::discard();
    }
    let doc = row_doc(&colors);
    let mut session = TrapSession::new(TrapSettings::default());
    let run1 = session.generate_traps(&doc).unwrap();
    let run2 = session.generate_traps(&doc).unwrap();

    if run1.layer.traps.len() != run2.layer.traps.len() || run1.warnings != run2.warnings {
        return TestResult::failed();
    }
    for (a, b) in run1.layer.traps.iter().zip(run2.layer.traps.iter()) {
        if a.id != b.id || a.contour != b.contour || a.cmyk != b.cmyk {
            return TestResult::failed();
        }
    }
    TestResult::passed()
}

// property 7: a never-tag removes every trap touching the object
#[quickcheck]
#[allow(clippy::too_many_arguments)]
fn never_tag_dominates(c1: u8, m1: u8, y1: u8, k1: u8, c2: u8, m2: u8, y2: u8, k2: u8) -> bool {
    let doc = pair_doc(
        process_ink("A", c1, m1, y1, k1),
        process_ink("B", c2, m2, y2, k2),
    );
    let mut session = TrapSession::new(TrapSettings::default());
    session.set_tags(vec![TrapTag::never("r1")]);
    let run = session.generate_traps(&doc).unwrap();
    run.layer.traps.iter().all(|t| {
        let src_obj = run.graph.region(&t.source).map(|r| r.object.clone());
        let dst_obj = run.graph.region(&t.target).map(|r| r.object.clone());
        src_obj != Some(ObjectId::from("r1")) && dst_obj != Some(ObjectId::from("r1"))
    })
}

// property 8: every region a trap or finding references exists
#[quickcheck]
fn qc_references_are_sound(colors: Vec<(u8, u8, u8, u8)>) -> TestResult {
    if colors.is_empty() || colors.len() > 5 {
        return TestResult::discard();
    }
    let doc = row_doc(&colors);
    let mut session = TrapSession::new(TrapSettings::default());
    let run = session.generate_traps(&doc).unwrap();
    let report = session.run_qc(&doc).unwrap();

    let traps_ok = run.layer.traps.iter().all(|t| {
        run.graph.region(&t.source).is_some() && run.graph.region(&t.target).is_some()
    });
    let findings_ok = report.findings().all(|f| {
        f.region
            .as_ref()
            .map(|r| run.graph.region(r).is_some())
            .unwrap_or(true)
    });
    TestResult::from_bool(traps_ok && findings_ok)
}
