//! Signed offsetting of Bézier contours.
//!
//! Given a path and a distance `d`, produces the approximate locus of points
//! at perpendicular distance `d`. Positive distances move a closed contour
//! outward regardless of its winding; for open paths the positive side is
//! the left of the travel direction. Corners are joined with miter, round or
//! bevel joints; cubic segments with curvature sign changes are split at the
//! cusp before offsetting.

use serde_derive::{Deserialize, Serialize};

use crate::geometry::{
    BezierPath, CubicBezier, PathPoint, PathSegment, Point, CURV_SIGN_CHANGE_TOL, POINT_EQ_TOL,
    TANGENT_EQ_TOL,
};
use crate::units::Mm;

/// Corner treatment for outside corners
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerStyle {
    #[default]
    Miter,
    Round,
    Bevel,
}

/// Arc-length parameterized width multiplier for variable-width offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "type", content = "data")]
pub enum WidthProfile {
    /// Linear ramp from `start` to `end` multiplier
    Linear { start: f64, end: f64 },
    /// Smoothstep ramp from `start` to `end` multiplier
    EaseInOut { start: f64, end: f64 },
    /// Piecewise-linear multipliers sampled uniformly over the arc length
    Multipliers(Vec<f64>),
}

impl WidthProfile {
    /// Multiplier at arc-length fraction `s` in `0..=1`
    pub fn sample(&self, s: f64) -> f64 {
        let s = s.clamp(0.0, 1.0);
        match self {
            WidthProfile::Linear { start, end } => start + (end - start) * s,
            WidthProfile::EaseInOut { start, end } => {
                let t = s * s * (3.0 - 2.0 * s);
                start + (end - start) * t
            }
            WidthProfile::Multipliers(m) => match m.len() {
                0 => 1.0,
                1 => m[0],
                n => {
                    let pos = s * (n - 1) as f64;
                    let i = (pos.floor() as usize).min(n - 2);
                    let frac = pos - i as f64;
                    m[i] + (m[i + 1] - m[i]) * frac
                }
            },
        }
    }
}

/// Parameters of one offset operation
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetOptions {
    /// Signed distance in mm, positive = outward
    pub distance: Mm,
    pub corner_style: CornerStyle,
    /// Bevel fallback triggers when the miter joint extends past `|d| * miter_limit`
    pub miter_limit: f64,
    /// Max chord-to-arc error for round corners, mm
    pub arc_tolerance: f64,
    /// Max error when approximating offsets of curved segments, mm
    pub curve_tolerance: f64,
    /// Sweep the result for self-intersecting micro-loops
    pub remove_loops: bool,
    pub width_profile: Option<WidthProfile>,
}

impl OffsetOptions {
    pub fn new(distance: Mm) -> Self {
        Self {
            distance,
            ..Default::default()
        }
    }

    pub fn with_corner(mut self, style: CornerStyle, miter_limit: f64) -> Self {
        self.corner_style = style;
        self.miter_limit = miter_limit;
        self
    }

    pub fn with_profile(mut self, profile: WidthProfile) -> Self {
        self.width_profile = Some(profile);
        self
    }
}

impl Default for OffsetOptions {
    fn default() -> Self {
        Self {
            distance: Mm(0.0),
            corner_style: CornerStyle::Miter,
            miter_limit: 4.0,
            arc_tolerance: 0.02,
            curve_tolerance: 0.02,
            remove_loops: true,
            width_profile: None,
        }
    }
}

/// Offsets `path` by the signed distance in `options`.
///
/// Returns `None` for degenerate input (non-finite control points, or no
/// segment survives the zero-length filter); the caller converts that into
/// a `complex-geometry` warning. A path with fewer than 2 points is
/// returned unchanged.
pub fn offset_path(path: &BezierPath, options: &OffsetOptions) -> Option<BezierPath> {
    if path.points.len() < 2 {
        return Some(path.clone());
    }
    if !path.is_finite() {
        return None;
    }
    let d = options.distance.0;
    if d.abs() < 1e-9 && options.width_profile.is_none() {
        return Some(path.clone());
    }

    let side = side_sign(path);

    // typed segments, zero-length ones are skipped
    let segments: Vec<PathSegment> = path
        .segments()
        .into_iter()
        .filter(|s| s.length() > POINT_EQ_TOL)
        .collect();
    if segments.is_empty() {
        return None;
    }

    // split cubics at curvature sign changes
    let mut flat: Vec<PathSegment> = Vec::new();
    for seg in segments {
        match seg {
            PathSegment::Line(..) => flat.push(seg),
            PathSegment::Cubic(c) => split_at_cusps(c, 0, &mut flat),
        }
    }

    // assign per-endpoint widths from the arc-length profile
    let total_len: f64 = flat.iter().map(|s| s.length()).sum();
    let mut work: Vec<(PathSegment, f64, f64)> = Vec::with_capacity(flat.len());
    let mut acc = 0.0;
    for seg in flat {
        let len = seg.length();
        let (w0, w1) = match &options.width_profile {
            None => (d, d),
            Some(p) => {
                let s0 = if total_len > 0.0 { acc / total_len } else { 0.0 };
                let s1 = if total_len > 0.0 { (acc + len) / total_len } else { 1.0 };
                (d * p.sample(s0), d * p.sample(s1))
            }
        };
        acc += len;
        subdivide_for_width(seg, w0, w1, options.curve_tolerance, 0, &mut work);
    }

    // offset every segment independently
    let mut offs: Vec<OffsetSeg> = Vec::with_capacity(work.len());
    for (seg, w0, w1) in work {
        match offset_segment(&seg, w0, w1, side, options.curve_tolerance) {
            Some(off) => offs.push(OffsetSeg {
                off,
                orig_end: seg.end(),
                end_tangent: seg.end_tangent(),
                start_tangent: seg.start_tangent(),
                w_end: w1,
            }),
            None => log::debug!("skipping degenerate segment during offset"),
        }
    }
    if offs.is_empty() {
        return None;
    }

    // connect successive segments with corner joints
    let mut out: Vec<PathSegment> = Vec::new();
    let n = offs.len();
    let joints = if path.closed { n } else { n - 1 };
    for i in 0..n {
        out.push(offs[i].off);
        if i < joints {
            let next = &offs[(i + 1) % n];
            join_corner(&offs[i], next, side, options, &mut out);
        }
    }

    let mut result = path_from_segments(&out, path.closed);
    if options.remove_loops {
        remove_micro_loops(&mut result, d.abs());
    }
    if result.points.len() < 2 {
        return None;
    }
    Some(result)
}

/// `+1` when the positive offset side is the left of travel, `-1` for the
/// right. Chosen so that positive distances enlarge closed contours.
fn side_sign(path: &BezierPath) -> f64 {
    if path.closed && path.signed_area() > 0.0 {
        -1.0
    } else {
        1.0
    }
}

struct OffsetSeg {
    off: PathSegment,
    orig_end: Point,
    end_tangent: Option<Point>,
    start_tangent: Option<Point>,
    w_end: f64,
}

/// Splits a cubic at every significant curvature sign change.
///
/// The crossing parameter is found by binary search between the two samples
/// bracketing the sign change. Recursion is bounded; residual non-smooth
/// segments are handled by the sampling fallback in `offset_segment`.
fn split_at_cusps(c: CubicBezier, depth: usize, out: &mut Vec<PathSegment>) {
    if depth >= 4 {
        out.push(PathSegment::Cubic(c));
        return;
    }
    match find_cusp(&c) {
        Some(t) => {
            let (left, right) = c.split(t);
            split_at_cusps(left, depth + 1, out);
            split_at_cusps(right, depth + 1, out);
        }
        None => out.push(PathSegment::Cubic(c)),
    }
}

/// First parameter where the curvature changes sign significantly, if any
fn find_cusp(c: &CubicBezier) -> Option<f64> {
    const SAMPLES: usize = 16;
    let mut prev_t = 1.0 / (SAMPLES as f64 + 1.0);
    let mut prev_k = c.curvature(prev_t);
    for i in 2..=SAMPLES {
        let t = i as f64 / (SAMPLES as f64 + 1.0);
        let k = c.curvature(t);
        if prev_k * k < 0.0 && (prev_k - k).abs() > CURV_SIGN_CHANGE_TOL {
            // binary search for the zero crossing
            let (mut lo, mut hi) = (prev_t, t);
            let (mut klo, _khi) = (prev_k, k);
            for _ in 0..24 {
                let mid = (lo + hi) / 2.0;
                let kmid = c.curvature(mid);
                if klo * kmid <= 0.0 {
                    hi = mid;
                } else {
                    lo = mid;
                    klo = kmid;
                }
            }
            let t_cusp = (lo + hi) / 2.0;
            if t_cusp > 1e-3 && t_cusp < 1.0 - 1e-3 {
                return Some(t_cusp);
            }
        }
        prev_t = t;
        prev_k = k;
    }
    None
}

fn has_cusp(c: &CubicBezier) -> bool {
    find_cusp(c).is_some()
}

fn subdivide_for_width(
    seg: PathSegment,
    w0: f64,
    w1: f64,
    tolerance: f64,
    depth: usize,
    out: &mut Vec<(PathSegment, f64, f64)>,
) {
    if (w1 - w0).abs() <= tolerance.max(1e-6) || depth >= 5 {
        out.push((seg, w0, w1));
        return;
    }
    let wm = (w0 + w1) / 2.0;
    let (left, right) = match seg {
        PathSegment::Line(a, b) => {
            let m = a.midpoint(b);
            (PathSegment::Line(a, m), PathSegment::Line(m, b))
        }
        PathSegment::Cubic(c) => {
            let (l, r) = c.split(0.5);
            (PathSegment::Cubic(l), PathSegment::Cubic(r))
        }
    };
    subdivide_for_width(left, w0, wm, tolerance, depth + 1, out);
    subdivide_for_width(right, wm, w1, tolerance, depth + 1, out);
}

/// Offsets a single segment. Returns `None` for degenerate tangents.
fn offset_segment(
    seg: &PathSegment,
    w0: f64,
    w1: f64,
    side: f64,
    curve_tolerance: f64,
) -> Option<PathSegment> {
    match seg {
        PathSegment::Line(a, b) => {
            let t = (*b - *a).normalize()?;
            let n = t.perpendicular() * side;
            Some(PathSegment::Line(*a + n * w0, *b + n * w1))
        }
        PathSegment::Cubic(c) => {
            if has_cusp(c) {
                // still non-smooth after splitting: sample and refit
                offset_cubic_sampled(c, w0, w1, side, curve_tolerance).map(PathSegment::Cubic)
            } else {
                offset_cubic_smooth(c, w0, w1, side).map(PathSegment::Cubic)
            }
        }
    }
}

/// Offsets the four control points along the normals at `{0, 1/3, 2/3, 1}`
/// and re-fits by preserving the endpoint tangent directions.
fn offset_cubic_smooth(c: &CubicBezier, w0: f64, w1: f64, side: f64) -> Option<CubicBezier> {
    let w_at = |t: f64| w0 + (w1 - w0) * t;
    let normal_at = |t: f64| c.tangent(t).map(|tan| tan.perpendicular() * side);

    let n0 = normal_at(0.0)?;
    let n1 = normal_at(1.0 / 3.0)?;
    let n2 = normal_at(2.0 / 3.0)?;
    let n3 = normal_at(1.0)?;

    let q0 = c.p0 + n0 * w_at(0.0);
    let q1 = c.p1 + n1 * w_at(1.0 / 3.0);
    let q2 = c.p2 + n2 * w_at(2.0 / 3.0);
    let q3 = c.p3 + n3 * w_at(1.0);

    // keep the endpoint tangent directions, take the handle lengths from
    // the offset control net
    let t0 = c.tangent(0.0)?;
    let t1 = c.tangent(1.0)?;
    let h1 = q0 + t0 * q0.distance(q1);
    let h2 = q3 - t1 * q3.distance(q2);

    Some(CubicBezier::new(q0, h1, h2, q3))
}

/// Fallback for residual non-smooth cubics: offset `N` samples along their
/// local normals and refit one cubic through the result.
fn offset_cubic_sampled(
    c: &CubicBezier,
    w0: f64,
    w1: f64,
    side: f64,
    curve_tolerance: f64,
) -> Option<CubicBezier> {
    let len = c.adaptive_arc_length(0.1);
    let n = if curve_tolerance > 0.0 {
        ((len / curve_tolerance).ceil() as usize).clamp(8, 64)
    } else {
        16
    };

    let mut first: Option<Point> = None;
    let mut last: Option<Point> = None;
    let mut sampled_len = 0.0;
    let mut prev: Option<Point> = None;
    for i in 0..=n {
        let t = i as f64 / n as f64;
        let tan = match c.tangent(t) {
            Some(tan) => tan,
            None => continue,
        };
        let w = w0 + (w1 - w0) * t;
        let p = c.position(t) + tan.perpendicular() * side * w;
        if first.is_none() {
            first = Some(p);
        }
        if let Some(pr) = prev {
            sampled_len += pr.distance(p);
        }
        prev = Some(p);
        last = Some(p);
    }

    let (q0, q3) = (first?, last?);
    let t0 = c.tangent(0.0).or_else(|| (q3 - q0).normalize())?;
    let t1 = c.tangent(1.0).or_else(|| (q3 - q0).normalize())?;
    let handle = sampled_len / 3.0;
    Some(CubicBezier::new(q0, q0 + t0 * handle, q3 - t1 * handle, q3))
}

/// Connects the end of one offset segment to the start of the next.
///
/// Inside corners close the gap with a straight segment; outside corners use
/// the configured corner style with the miter-limit bevel fallback.
fn join_corner(
    cur: &OffsetSeg,
    next: &OffsetSeg,
    side: f64,
    options: &OffsetOptions,
    out: &mut Vec<PathSegment>,
) {
    let e = cur.off.end();
    let s = next.off.start();
    if e.approx_eq(s) {
        return;
    }
    let (te, ts) = match (cur.end_tangent, next.start_tangent) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            out.push(PathSegment::Line(e, s));
            return;
        }
    };
    let w = cur.w_end;
    let cross = te.cross(ts);
    if cross.abs() < TANGENT_EQ_TOL {
        // collinear continuation
        out.push(PathSegment::Line(e, s));
        return;
    }

    let outside = cross * side * w < 0.0;
    if !outside {
        // the merger step absorbs the small overlap
        out.push(PathSegment::Line(e, s));
        return;
    }

    let vertex = cur.orig_end;
    match options.corner_style {
        CornerStyle::Bevel => out.push(PathSegment::Line(e, s)),
        CornerStyle::Miter => {
            // intersection of the two offset lines
            let a = (s - e).cross(ts) / cross;
            let miter = e + te * a;
            if a <= 0.0 || vertex.distance(miter) > w.abs() * options.miter_limit {
                out.push(PathSegment::Line(e, s));
            } else {
                out.push(PathSegment::Line(e, miter));
                out.push(PathSegment::Line(miter, s));
            }
        }
        CornerStyle::Round => round_corner(vertex, e, s, w.abs(), options.arc_tolerance, out),
    }
}

/// Approximates the circular arc of radius `r` around `vertex` from `e` to
/// `s` with one cubic, or two when the arc is too deep for the tolerance.
fn round_corner(vertex: Point, e: Point, s: Point, r: f64, arc_tolerance: f64, out: &mut Vec<PathSegment>) {
    let de = match (e - vertex).normalize() {
        Some(v) => v,
        None => {
            out.push(PathSegment::Line(e, s));
            return;
        }
    };
    let ds = match (s - vertex).normalize() {
        Some(v) => v,
        None => {
            out.push(PathSegment::Line(e, s));
            return;
        }
    };
    let angle = de.dot(ds).clamp(-1.0, 1.0).acos();
    if angle < TANGENT_EQ_TOL {
        out.push(PathSegment::Line(e, s));
        return;
    }
    let sweep = de.cross(ds).signum();

    // sagitta of the single-cubic approximation; split once when it
    // exceeds the arc tolerance
    let sagitta = r * (1.0 - (angle / 2.0).cos());
    let split = angle > std::f64::consts::FRAC_PI_2 && sagitta > arc_tolerance;
    if split {
        let half = rotate(de, sweep * angle / 2.0);
        let mid = vertex + half * r;
        push_arc_cubic(vertex, e, mid, r, angle / 2.0, sweep, out);
        push_arc_cubic(vertex, mid, s, r, angle / 2.0, sweep, out);
    } else {
        push_arc_cubic(vertex, e, s, r, angle, sweep, out);
    }
}

fn push_arc_cubic(
    center: Point,
    from: Point,
    to: Point,
    r: f64,
    angle: f64,
    sweep: f64,
    out: &mut Vec<PathSegment>,
) {
    // standard circular-arc cubic approximation
    let k = (4.0 / 3.0) * (angle / 4.0).tan() * r;
    let t_from = match (from - center).normalize() {
        Some(v) => v.perpendicular() * sweep,
        None => {
            out.push(PathSegment::Line(from, to));
            return;
        }
    };
    let t_to = match (to - center).normalize() {
        Some(v) => v.perpendicular() * sweep,
        None => {
            out.push(PathSegment::Line(from, to));
            return;
        }
    };
    out.push(PathSegment::Cubic(CubicBezier::new(
        from,
        from + t_from * k,
        to - t_to * k,
        to,
    )));
}

fn rotate(v: Point, angle: f64) -> Point {
    let (sin, cos) = angle.sin_cos();
    Point::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Converts a connected segment list back into an anchor/handle path
fn path_from_segments(segments: &[PathSegment], closed: bool) -> BezierPath {
    let mut points: Vec<PathPoint> = Vec::new();
    for seg in segments {
        let start = seg.start();
        let connected = points
            .last()
            .map(|p| p.anchor.approx_eq(start))
            .unwrap_or(false);
        if !connected {
            points.push(PathPoint::corner(start));
        }
        match seg {
            PathSegment::Line(_, b) => points.push(PathPoint::corner(*b)),
            PathSegment::Cubic(c) => {
                if let Some(last) = points.last_mut() {
                    last.handle_out = Some(c.p1);
                }
                points.push(PathPoint {
                    anchor: c.p3,
                    handle_in: Some(c.p2),
                    handle_out: None,
                });
            }
        }
    }
    if closed && points.len() > 1 {
        let last = *points.last().unwrap();
        if points[0].anchor.approx_eq(last.anchor) {
            points[0].handle_in = last.handle_in;
            points.pop();
        }
    }
    BezierPath::new(points, closed)
}

/// Conservative micro-loop removal: collapses windows of anchors that
/// re-enter a disc of diameter `d/2` around their entry point.
fn remove_micro_loops(path: &mut BezierPath, d_abs: f64) {
    let limit = d_abs / 2.0;
    if limit <= 0.0 || path.points.len() < 4 {
        return;
    }
    let pts = std::mem::take(&mut path.points);
    let mut out: Vec<PathPoint> = Vec::new();
    let mut i = 0;
    while i < pts.len() {
        let mut collapsed = false;
        let max_j = (i + 6).min(pts.len() - 1);
        let mut j = max_j;
        while j >= i + 2 {
            let entry = pts[i].anchor;
            if entry.distance(pts[j].anchor) <= limit
                && pts[i + 1..j].iter().all(|p| p.anchor.distance(entry) <= limit)
            {
                out.push(PathPoint {
                    anchor: entry.midpoint(pts[j].anchor),
                    handle_in: pts[i].handle_in,
                    handle_out: pts[j].handle_out,
                });
                i = j + 1;
                collapsed = true;
                break;
            }
            j -= 1;
        }
        if !collapsed {
            out.push(pts[i]);
            i += 1;
        }
    }
    path.points = out;
}
