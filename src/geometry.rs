//! Geometric primitives: points, cubic Bézier curves and anchor/handle paths.
//!
//! All coordinates are in millimeter, matching the coordinate system of the
//! input document. The y-axis orientation is whatever the caller supplies;
//! nothing in here assumes a direction.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use serde_derive::{Deserialize, Serialize};

/// Two anchors closer than this are considered the same point (mm)
pub const POINT_EQ_TOL: f64 = 1e-3;
/// Two unit tangents closer than this are considered parallel
pub const TANGENT_EQ_TOL: f64 = 1e-6;
/// Curvature sign changes smaller than this are ignored during cusp detection
pub const CURV_SIGN_CHANGE_TOL: f64 = 0.1;

/// 2D point / vector in millimeter
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn origin() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn midpoint(self, other: Self) -> Self {
        (self + other) / 2.0
    }

    pub fn lerp(self, other: Self, t: f64) -> Self {
        self + (other - self) * t
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// z-component of the 3D cross product, sign gives turn direction
    pub fn cross(self, other: Self) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector in the same direction, `None` for (near-)zero vectors
    pub fn normalize(self) -> Option<Self> {
        let len = self.length();
        if len < TANGENT_EQ_TOL {
            None
        } else {
            Some(self / len)
        }
    }

    /// Counter-clockwise perpendicular
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn approx_eq(self, other: Self) -> bool {
        self.distance(other) < POINT_EQ_TOL
    }
}

impl Add<Point> for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl AddAssign<Point> for Point {
    fn add_assign(&mut self, rhs: Point) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub<Point> for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Self::Output {
        Point {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Self::Output {
        Point {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Mul<Point> for f64 {
    type Output = Point;

    fn mul(self, rhs: Point) -> Self::Output {
        Point {
            x: self * rhs.x,
            y: self * rhs.y,
        }
    }
}

impl Div<f64> for Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Self::Output {
        Point {
            x: self.x / rhs,
            y: self.y / rhs,
        }
    }
}

/// Axis-aligned bounding box, accumulated over anchor points.
///
/// Handles are ignored on purpose: the box is only used as a conservative
/// pre-filter for adjacency detection and trap merging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn empty() -> Self {
        Self {
            min: Point::new(f64::INFINITY, f64::INFINITY),
            max: Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    pub fn add_point(&mut self, p: Point) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn width(&self) -> f64 {
        (self.max.x - self.min.x).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max.y - self.min.y).max(0.0)
    }

    /// Intersection test with a symmetric tolerance margin in mm
    pub fn intersects(&self, other: &Bounds, tolerance: f64) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.min.x - tolerance <= other.max.x
            && other.min.x - tolerance <= self.max.x
            && self.min.y - tolerance <= other.max.y
            && other.min.y - tolerance <= self.max.y
    }

    /// Does `self` strictly contain `other`?
    pub fn contains(&self, other: &Bounds) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        let mut b = *self;
        b.add_point(other.min);
        b.add_point(other.max);
        b
    }
}

/// Cubic Bézier curve with four control points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    pub p0: Point,
    pub p1: Point,
    pub p2: Point,
    pub p3: Point,
}

impl CubicBezier {
    pub fn new(p0: Point, p1: Point, p2: Point, p3: Point) -> Self {
        Self { p0, p1, p2, p3 }
    }

    /// Degenerate cubic equivalent to the straight segment p0 → p3
    pub fn from_line(p0: Point, p3: Point) -> Self {
        Self {
            p0,
            p1: p0.lerp(p3, 1.0 / 3.0),
            p2: p0.lerp(p3, 2.0 / 3.0),
            p3,
        }
    }

    /// Position on the curve at parameter `t`
    pub fn position(&self, t: f64) -> Point {
        let t2 = t * t;
        let t3 = t2 * t;

        let mt = 1.0 - t;
        let mt2 = mt * mt;
        let mt3 = mt2 * mt;

        self.p0 * mt3 + 3.0 * self.p1 * mt2 * t + 3.0 * self.p2 * mt * t2 + self.p3 * t3
    }

    /// First derivative B'(t)
    pub fn derivative(&self, t: f64) -> Point {
        let mt = 1.0 - t;
        (self.p1 - self.p0) * (3.0 * mt * mt)
            + (self.p2 - self.p1) * (6.0 * mt * t)
            + (self.p3 - self.p2) * (3.0 * t * t)
    }

    /// Second derivative B''(t)
    pub fn second_derivative(&self, t: f64) -> Point {
        let mt = 1.0 - t;
        (self.p2 - self.p1 * 2.0 + self.p0) * (6.0 * mt) + (self.p3 - self.p2 * 2.0 + self.p1) * (6.0 * t)
    }

    /// Signed curvature κ = (B'×B'') / |B'|³
    pub fn curvature(&self, t: f64) -> f64 {
        let d1 = self.derivative(t);
        let d2 = self.second_derivative(t);
        let len = d1.length();
        if len < TANGENT_EQ_TOL {
            return 0.0;
        }
        d1.cross(d2) / (len * len * len)
    }

    /// Unit tangent at `t`, falling back to the chord for degenerate handles
    pub fn tangent(&self, t: f64) -> Option<Point> {
        self.derivative(t)
            .normalize()
            .or_else(|| (self.p3 - self.p0).normalize())
    }

    /// De-Casteljau split at parameter `t` into two sub-curves
    pub fn split(&self, t: f64) -> (CubicBezier, CubicBezier) {
        let q0 = self.p0.lerp(self.p1, t);
        let q1 = self.p1.lerp(self.p2, t);
        let q2 = self.p2.lerp(self.p3, t);

        let r0 = q0.lerp(q1, t);
        let r1 = q1.lerp(q2, t);

        let s = r0.lerp(r1, t);

        (
            CubicBezier::new(self.p0, q0, r0, s),
            CubicBezier::new(s, r1, q2, self.p3),
        )
    }

    /// Polyline arc-length approximation with `samples` uniform steps.
    ///
    /// At least 10 samples are used; callers pass a larger count for long
    /// segments (the sampling is uniform in parameter, not arc length).
    pub fn arc_length(&self, samples: usize) -> f64 {
        let n = samples.max(10);
        let mut len = 0.0;
        let mut prev = self.p0;
        for i in 1..=n {
            let p = self.position(i as f64 / n as f64);
            len += prev.distance(p);
            prev = p;
        }
        len
    }

    /// Arc length with the sample count adapted to the segment size.
    ///
    /// `step` is the target spacing between samples in mm.
    pub fn adaptive_arc_length(&self, step: f64) -> f64 {
        let rough = self.p0.distance(self.p1) + self.p1.distance(self.p2) + self.p2.distance(self.p3);
        let n = if step > 0.0 {
            ((rough / step).ceil() as usize).clamp(10, 1000)
        } else {
            10
        };
        self.arc_length(n)
    }

    pub fn is_finite(&self) -> bool {
        self.p0.is_finite() && self.p1.is_finite() && self.p2.is_finite() && self.p3.is_finite()
    }
}

/// One point of a Bézier path: an anchor with optional cubic handles.
///
/// Handles are stored in absolute coordinates. A segment between two
/// successive points is a straight line when neither bounding handle is
/// present, a cubic curve otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathPoint {
    pub anchor: Point,
    pub handle_in: Option<Point>,
    pub handle_out: Option<Point>,
}

impl PathPoint {
    pub fn corner(anchor: Point) -> Self {
        Self {
            anchor,
            handle_in: None,
            handle_out: None,
        }
    }

    pub fn smooth(anchor: Point, handle_in: Point, handle_out: Point) -> Self {
        Self {
            anchor,
            handle_in: Some(handle_in),
            handle_out: Some(handle_out),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.anchor.is_finite()
            && self.handle_in.map_or(true, |h| h.is_finite())
            && self.handle_out.map_or(true, |h| h.is_finite())
    }
}

/// One typed segment of a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    Line(Point, Point),
    Cubic(CubicBezier),
}

impl PathSegment {
    pub fn start(&self) -> Point {
        match self {
            PathSegment::Line(a, _) => *a,
            PathSegment::Cubic(c) => c.p0,
        }
    }

    pub fn end(&self) -> Point {
        match self {
            PathSegment::Line(_, b) => *b,
            PathSegment::Cubic(c) => c.p3,
        }
    }

    pub fn length(&self) -> f64 {
        match self {
            PathSegment::Line(a, b) => a.distance(*b),
            PathSegment::Cubic(c) => c.adaptive_arc_length(0.1),
        }
    }

    /// Unit tangent at the start of the segment
    pub fn start_tangent(&self) -> Option<Point> {
        match self {
            PathSegment::Line(a, b) => (*b - *a).normalize(),
            PathSegment::Cubic(c) => c.tangent(0.0),
        }
    }

    /// Unit tangent at the end of the segment
    pub fn end_tangent(&self) -> Option<Point> {
        match self {
            PathSegment::Line(a, b) => (*b - *a).normalize(),
            PathSegment::Cubic(c) => c.tangent(1.0),
        }
    }
}

/// Ordered sequence of path points, open or closed.
///
/// A closed path's final segment connects last → first using the first
/// point's `handle_in` and the last point's `handle_out`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BezierPath {
    pub points: Vec<PathPoint>,
    pub closed: bool,
}

impl BezierPath {
    pub fn new(points: Vec<PathPoint>, closed: bool) -> Self {
        Self { points, closed }
    }

    /// Closed polygon through the given anchors, no handles
    pub fn polygon(anchors: &[Point]) -> Self {
        Self {
            points: anchors.iter().copied().map(PathPoint::corner).collect(),
            closed: true,
        }
    }

    /// Open polyline through the given anchors
    pub fn polyline(anchors: &[Point]) -> Self {
        Self {
            points: anchors.iter().copied().map(PathPoint::corner).collect(),
            closed: false,
        }
    }

    /// Axis-aligned rectangle (x, y) .. (x + w, y + h)
    pub fn rect(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self::polygon(&[
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ])
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of segments (including the closing segment for closed paths)
    pub fn segment_count(&self) -> usize {
        match (self.points.len(), self.closed) {
            (0, _) | (1, _) => 0,
            (n, true) => n,
            (n, false) => n - 1,
        }
    }

    /// Typed segments of the path in drawing order
    pub fn segments(&self) -> Vec<PathSegment> {
        let n = self.points.len();
        let mut out = Vec::with_capacity(self.segment_count());
        if n < 2 {
            return out;
        }
        let last = if self.closed { n } else { n - 1 };
        for i in 0..last {
            let a = &self.points[i];
            let b = &self.points[(i + 1) % n];
            out.push(segment_between(a, b));
        }
        out
    }

    /// Anchor-only shoelace area, signed by winding direction.
    ///
    /// Exact for line-only paths; for curved contours this is an
    /// approximation that under- or overestimates by the curve bulge.
    /// Adjacency heuristics and layer statistics only need that much.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            let a = self.points[i].anchor;
            let b = self.points[(i + 1) % n].anchor;
            sum += a.cross(b);
        }
        sum / 2.0
    }

    /// Absolute shoelace area in mm²
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Conservative anchor-only bounding box
    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for p in &self.points {
            b.add_point(p.anchor);
        }
        b
    }

    /// Total path length in mm (polyline approximation for curves)
    pub fn length(&self) -> f64 {
        self.segments().iter().map(|s| s.length()).sum()
    }

    /// Same geometry with inverted direction (in/out handles swapped)
    pub fn reversed(&self) -> BezierPath {
        BezierPath {
            points: self
                .points
                .iter()
                .rev()
                .map(|p| PathPoint {
                    anchor: p.anchor,
                    handle_in: p.handle_out,
                    handle_out: p.handle_in,
                })
                .collect(),
            closed: self.closed,
        }
    }

    pub fn translate(&self, delta: Point) -> BezierPath {
        BezierPath {
            points: self
                .points
                .iter()
                .map(|p| PathPoint {
                    anchor: p.anchor + delta,
                    handle_in: p.handle_in.map(|h| h + delta),
                    handle_out: p.handle_out.map(|h| h + delta),
                })
                .collect(),
            closed: self.closed,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.is_finite())
    }

    /// Interior angle at every anchor with two neighbors, in degrees
    pub fn interior_angles(&self) -> Vec<f64> {
        let n = self.points.len();
        if n < 3 {
            return Vec::new();
        }
        let range: Vec<usize> = if self.closed {
            (0..n).collect()
        } else {
            (1..n - 1).collect()
        };
        let mut out = Vec::with_capacity(range.len());
        for i in range {
            let prev = self.points[(i + n - 1) % n].anchor;
            let cur = self.points[i].anchor;
            let next = self.points[(i + 1) % n].anchor;
            let v1 = prev - cur;
            let v2 = next - cur;
            if let (Some(u1), Some(u2)) = (v1.normalize(), v2.normalize()) {
                out.push(u1.dot(u2).clamp(-1.0, 1.0).acos().to_degrees());
            }
        }
        out
    }
}

fn segment_between(a: &PathPoint, b: &PathPoint) -> PathSegment {
    match (a.handle_out, b.handle_in) {
        (None, None) => PathSegment::Line(a.anchor, b.anchor),
        (h_out, h_in) => PathSegment::Cubic(CubicBezier::new(
            a.anchor,
            h_out.unwrap_or(a.anchor),
            h_in.unwrap_or(b.anchor),
            b.anchor,
        )),
    }
}

#[test]
fn shoelace_area_of_rect() {
    let rect = BezierPath::rect(0.0, 0.0, 10.0, 10.0);
    assert!((rect.area() - 100.0).abs() < 1e-9);
}

#[test]
fn shoelace_sign_follows_winding() {
    let ccw = BezierPath::polygon(&[
        Point::new(0.0, 0.0),
        Point::new(4.0, 0.0),
        Point::new(4.0, 4.0),
        Point::new(0.0, 4.0),
    ]);
    assert!(ccw.signed_area() > 0.0);
    assert!(ccw.reversed().signed_area() < 0.0);
}

#[test]
fn cubic_split_preserves_endpoints() {
    let c = CubicBezier::new(
        Point::new(0.0, 0.0),
        Point::new(1.0, 2.0),
        Point::new(3.0, 2.0),
        Point::new(4.0, 0.0),
    );
    let (l, r) = c.split(0.3);
    assert!(l.p0.approx_eq(c.p0));
    assert!(r.p3.approx_eq(c.p3));
    assert!(l.p3.approx_eq(c.position(0.3)));
    assert!(l.p3.approx_eq(r.p0));
}

#[test]
fn cubic_arc_length_of_straight_segment() {
    let c = CubicBezier::from_line(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
    assert!((c.arc_length(32) - 5.0).abs() < 1e-6);
}

#[test]
fn curvature_sign_flips_on_s_curve() {
    let s = CubicBezier::new(
        Point::new(0.0, 0.0),
        Point::new(2.0, 2.0),
        Point::new(2.0, -2.0),
        Point::new(4.0, 0.0),
    );
    assert!(s.curvature(0.1) * s.curvature(0.9) < 0.0);
}

#[test]
fn closed_path_segment_count_wraps() {
    let tri = BezierPath::polygon(&[
        Point::new(0.0, 0.0),
        Point::new(1.0, 0.0),
        Point::new(0.0, 1.0),
    ]);
    assert_eq!(tri.segments().len(), 3);
    assert!(tri.segments()[2].end().approx_eq(Point::new(0.0, 0.0)));
}

#[test]
fn bounds_prefilter_with_tolerance() {
    let a = BezierPath::rect(0.0, 0.0, 10.0, 10.0).bounds();
    let b = BezierPath::rect(10.05, 0.0, 10.0, 10.0).bounds();
    assert!(a.intersects(&b, 0.1));
    assert!(!a.intersects(&b, 0.01));
}

#[test]
fn sharp_angle_detection() {
    // spike at (5, 0): roughly 11 degrees
    let spike = BezierPath::polyline(&[
        Point::new(0.0, 1.0),
        Point::new(5.0, 0.0),
        Point::new(0.0, -1.0),
    ]);
    let angles = spike.interior_angles();
    assert_eq!(angles.len(), 1);
    assert!(angles[0] < 30.0);
}
