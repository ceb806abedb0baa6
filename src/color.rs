//! Ink and color model: CMYK / RGB / LAB conversion, density metrics and
//! ink classification.
//!
//! CMYK channels are stored on `0..=1`; use [`Cmyk::from_percent`] when the
//! caller works with `0..=100` values. Conversions are total on finite
//! inputs; non-finite values fall back to neutral gray (`L=50, a=0, b=0`)
//! with a logged warning instead of aborting the run.

use serde_derive::{Deserialize, Serialize};

use crate::utils::generated_id;

/// D65 reference white
const WHITE_X: f64 = 0.95047;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.08883;

/// Stable identifier of an ink in the document palette
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorId(pub String);

impl ColorId {
    pub fn new() -> Self {
        Self(generated_id())
    }
}

impl Default for ColorId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ColorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Classification of an ink, either declared by the caller or derived
/// from the ink name and CMYK magnitude
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorType {
    #[default]
    ProcessCmyk,
    Spot,
    WhiteUnderprint,
    Metallic,
    Fluorescent,
    Varnish,
    Transparent,
}

/// Which representation of a color is canonical
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Cmyk,
    Rgb,
    Lab,
    /// Named spot color with a CMYK fallback representation
    SpotCmyk,
}

/// CMYK color, channels on `0..=1`
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cmyk {
    pub c: f64,
    pub m: f64,
    pub y: f64,
    pub k: f64,
}

impl Cmyk {
    pub fn new(c: f64, m: f64, y: f64, k: f64) -> Self {
        Self { c, m, y, k }
    }

    /// Converts `0..=100` channel values on ingress
    pub fn from_percent(c: f64, m: f64, y: f64, k: f64) -> Self {
        Self {
            c: c / 100.0,
            m: m / 100.0,
            y: y / 100.0,
            k: k / 100.0,
        }
    }

    /// Total ink coverage in percent (0..=400)
    pub fn total_ink_pct(&self) -> f64 {
        (self.c + self.m + self.y + self.k) * 100.0
    }

    /// Channel-wise maximum, the overprint simulation of two inks
    pub fn channel_max(&self, other: &Cmyk) -> Cmyk {
        Cmyk {
            c: self.c.max(other.c),
            m: self.m.max(other.m),
            y: self.y.max(other.y),
            k: self.k.max(other.k),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.c == 0.0 && self.m == 0.0 && self.y == 0.0 && self.k == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.c.is_finite() && self.m.is_finite() && self.y.is_finite() && self.k.is_finite()
    }
}

/// RGB color, channels on `0..=1`, sRGB gamma
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Rgb {
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }
}

/// CIELAB color, D65 white point
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    pub fn new(l: f64, a: f64, b: f64) -> Self {
        Self { l, a, b }
    }

    /// Sentinel for failed conversions
    pub fn neutral_gray() -> Self {
        Self {
            l: 50.0,
            a: 0.0,
            b: 0.0,
        }
    }

    pub fn chroma(&self) -> f64 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.l.is_finite() && self.a.is_finite() && self.b.is_finite()
    }
}

/// "Max channel" CMYK inversion: K = 1 - max(r, g, b)
pub fn rgb_to_cmyk(rgb: Rgb) -> Cmyk {
    if !rgb.is_finite() {
        log::warn!("rgb_to_cmyk: non-finite input, substituting black");
        return Cmyk::new(0.0, 0.0, 0.0, 1.0);
    }
    let k = 1.0 - rgb.r.max(rgb.g).max(rgb.b);
    if k >= 1.0 {
        // the color is black
        return Cmyk::new(0.0, 0.0, 0.0, 1.0);
    }
    Cmyk {
        c: (1.0 - rgb.r - k) / (1.0 - k),
        m: (1.0 - rgb.g - k) / (1.0 - k),
        y: (1.0 - rgb.b - k) / (1.0 - k),
        k,
    }
}

pub fn cmyk_to_rgb(cmyk: Cmyk) -> Rgb {
    if !cmyk.is_finite() {
        log::warn!("cmyk_to_rgb: non-finite input, substituting mid gray");
        return Rgb::new(0.5, 0.5, 0.5);
    }
    Rgb {
        r: (1.0 - cmyk.c) * (1.0 - cmyk.k),
        g: (1.0 - cmyk.m) * (1.0 - cmyk.k),
        b: (1.0 - cmyk.y) * (1.0 - cmyk.k),
    }
}

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA {
        t * t * t
    } else {
        3.0 * DELTA * DELTA * (t - 4.0 / 29.0)
    }
}

/// sRGB → XYZ(D65) → LAB
pub fn rgb_to_lab(rgb: Rgb) -> Lab {
    if !rgb.is_finite() {
        log::warn!("rgb_to_lab: non-finite input, substituting neutral gray");
        return Lab::neutral_gray();
    }
    let r = srgb_to_linear(rgb.r);
    let g = srgb_to_linear(rgb.g);
    let b = srgb_to_linear(rgb.b);

    let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
    let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
    let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

pub fn lab_to_rgb(lab: Lab) -> Rgb {
    if !lab.is_finite() {
        log::warn!("lab_to_rgb: non-finite input, substituting mid gray");
        return Rgb::new(0.5, 0.5, 0.5);
    }
    let fy = (lab.l + 16.0) / 116.0;
    let fx = fy + lab.a / 500.0;
    let fz = fy - lab.b / 200.0;

    let x = WHITE_X * lab_f_inv(fx);
    let y = WHITE_Y * lab_f_inv(fy);
    let z = WHITE_Z * lab_f_inv(fz);

    let r = 3.2404542 * x - 1.5371385 * y - 0.4985314 * z;
    let g = -0.9692660 * x + 1.8760108 * y + 0.0415560 * z;
    let b = 0.0556434 * x - 0.2040259 * y + 1.0572252 * z;

    Rgb {
        r: linear_to_srgb(r).clamp(0.0, 1.0),
        g: linear_to_srgb(g).clamp(0.0, 1.0),
        b: linear_to_srgb(b).clamp(0.0, 1.0),
    }
}

pub fn cmyk_to_lab(cmyk: Cmyk) -> Lab {
    rgb_to_lab(cmyk_to_rgb(cmyk))
}

pub fn lab_to_cmyk(lab: Lab) -> Cmyk {
    rgb_to_cmyk(lab_to_rgb(lab))
}

/// Weighted ink sum `(c + m + y + 1.5k) / 450`, scaled to `0..=4`.
/// Monotonic with total ink coverage.
pub fn optical_density(cmyk: Cmyk) -> f64 {
    let c = cmyk.c * 100.0;
    let m = cmyk.m * 100.0;
    let y = cmyk.y * 100.0;
    let k = cmyk.k * 100.0;
    (c + m + y + 1.5 * k) / (300.0 + 150.0) * 4.0
}

/// ANSI TR-001 neutral density: `0.0045c + 0.0065m + 0.0015y + 0.018k`
/// on `0..=100` channels. The canonical trap priority metric.
pub fn neutral_density(cmyk: Cmyk) -> f64 {
    let c = cmyk.c * 100.0;
    let m = cmyk.m * 100.0;
    let y = cmyk.y * 100.0;
    let k = cmyk.k * 100.0;
    0.0045 * c + 0.0065 * m + 0.0015 * y + 0.018 * k
}

/// Rich black: `c≥40, m≥30, y≥30, k≥90` (on percent channels)
pub fn is_rich_black(cmyk: Cmyk) -> bool {
    cmyk.c >= 0.40 && cmyk.m >= 0.30 && cmyk.y >= 0.30 && cmyk.k >= 0.90
}

/// Pure black: `k≥95` with under 10% in every chromatic channel
pub fn is_pure_black(cmyk: Cmyk) -> bool {
    cmyk.k >= 0.95 && cmyk.c < 0.10 && cmyk.m < 0.10 && cmyk.y < 0.10
}

pub fn is_black(cmyk: Cmyk) -> bool {
    is_rich_black(cmyk) || is_pure_black(cmyk)
}

/// CIE76 color difference
pub fn delta_e_76(a: Lab, b: Lab) -> f64 {
    let dl = a.l - b.l;
    let da = a.a - b.a;
    let db = a.b - b.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// CIE94 color difference, graphic-arts weights
pub fn delta_e_94(lab1: Lab, lab2: Lab) -> f64 {
    const K1: f64 = 0.045;
    const K2: f64 = 0.015;

    let dl = lab1.l - lab2.l;
    let c1 = lab1.chroma();
    let c2 = lab2.chroma();
    let dc = c1 - c2;
    let da = lab1.a - lab2.a;
    let db = lab1.b - lab2.b;
    let dh2 = (da * da + db * db - dc * dc).max(0.0);

    let sl = 1.0;
    let sc = 1.0 + K1 * c1;
    let sh = 1.0 + K2 * c1;

    ((dl / sl).powi(2) + (dc / sc).powi(2) + dh2 / (sh * sh)).sqrt()
}

/// CIEDE2000 color difference
pub fn delta_e_2000(lab1: Lab, lab2: Lab) -> f64 {
    let l1 = lab1.l;
    let l2 = lab2.l;

    let c1 = lab1.chroma();
    let c2 = lab2.chroma();
    let c_bar = (c1 + c2) / 2.0;

    let g = 0.5 * (1.0 - (c_bar.powi(7) / (c_bar.powi(7) + 25.0f64.powi(7))).sqrt());
    let a1p = (1.0 + g) * lab1.a;
    let a2p = (1.0 + g) * lab2.a;

    let c1p = (a1p * a1p + lab1.b * lab1.b).sqrt();
    let c2p = (a2p * a2p + lab2.b * lab2.b).sqrt();

    let h1p = hue_angle(lab1.b, a1p);
    let h2p = hue_angle(lab2.b, a2p);

    let dl = l2 - l1;
    let dc = c2p - c1p;

    let dhp = if c1p * c2p == 0.0 {
        0.0
    } else {
        let mut d = h2p - h1p;
        if d > 180.0 {
            d -= 360.0;
        } else if d < -180.0 {
            d += 360.0;
        }
        d
    };
    let dh = 2.0 * (c1p * c2p).sqrt() * (dhp.to_radians() / 2.0).sin();

    let l_bar = (l1 + l2) / 2.0;
    let cp_bar = (c1p + c2p) / 2.0;

    let hp_bar = if c1p * c2p == 0.0 {
        h1p + h2p
    } else {
        let sum = h1p + h2p;
        let diff = (h1p - h2p).abs();
        if diff <= 180.0 {
            sum / 2.0
        } else if sum < 360.0 {
            (sum + 360.0) / 2.0
        } else {
            (sum - 360.0) / 2.0
        }
    };

    let t = 1.0 - 0.17 * (hp_bar - 30.0).to_radians().cos()
        + 0.24 * (2.0 * hp_bar).to_radians().cos()
        + 0.32 * (3.0 * hp_bar + 6.0).to_radians().cos()
        - 0.20 * (4.0 * hp_bar - 63.0).to_radians().cos();

    let d_theta = 30.0 * (-((hp_bar - 275.0) / 25.0).powi(2)).exp();
    let rc = 2.0 * (cp_bar.powi(7) / (cp_bar.powi(7) + 25.0f64.powi(7))).sqrt();
    let rt = -rc * (2.0 * d_theta.to_radians()).sin();

    let sl = 1.0 + 0.015 * (l_bar - 50.0).powi(2) / (20.0 + (l_bar - 50.0).powi(2)).sqrt();
    let sc = 1.0 + 0.045 * cp_bar;
    let sh = 1.0 + 0.015 * cp_bar * t;

    ((dl / sl).powi(2) + (dc / sc).powi(2) + (dh / sh).powi(2) + rt * (dc / sc) * (dh / sh)).sqrt()
}

fn hue_angle(b: f64, ap: f64) -> f64 {
    if b == 0.0 && ap == 0.0 {
        return 0.0;
    }
    let mut h = b.atan2(ap).to_degrees();
    if h < 0.0 {
        h += 360.0;
    }
    h
}

/// Derives an ink classification from its name and CMYK magnitude.
/// A caller-declared type always wins over the heuristic.
pub fn classify(name: &str, cmyk: Cmyk, declared: Option<ColorType>) -> ColorType {
    if let Some(t) = declared {
        return t;
    }
    let lower = name.to_lowercase();
    if lower.contains("white") {
        return ColorType::WhiteUnderprint;
    }
    if lower.contains("silver") || lower.contains("gold") || lower.contains("metallic") {
        return ColorType::Metallic;
    }
    if lower.contains("fluor") || lower.contains("neon") {
        return ColorType::Fluorescent;
    }
    if lower.contains("varnish") || lower.contains("coating") {
        return ColorType::Varnish;
    }
    if cmyk.is_zero() {
        return ColorType::Transparent;
    }
    ColorType::ProcessCmyk
}

/// One entry of the document ink palette.
///
/// The derived metrics (`optical_density`, `neutral_density`, `luminance`,
/// `chroma`) are always consistent with the primary representation: the
/// constructors compute them and the `set_*` methods recompute them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Ink {
    pub id: ColorId,
    pub name: String,
    pub color_type: ColorType,
    pub space: ColorSpace,
    pub cmyk: Cmyk,
    pub lab: Lab,
    /// `0..=1`
    pub opacity: f64,
    pub optical_density: f64,
    pub neutral_density: f64,
    /// L* of the LAB representation
    pub luminance: f64,
    pub chroma: f64,
}

impl Ink {
    pub fn new(
        id: ColorId,
        name: &str,
        declared: Option<ColorType>,
        space: ColorSpace,
        cmyk: Cmyk,
        opacity: f64,
    ) -> Self {
        let color_type = classify(name, cmyk, declared);
        let mut ink = Self {
            id,
            name: name.to_string(),
            color_type,
            space,
            cmyk,
            lab: Lab::default(),
            opacity,
            optical_density: 0.0,
            neutral_density: 0.0,
            luminance: 0.0,
            chroma: 0.0,
        };
        ink.recompute_derived();
        ink
    }

    /// Process ink defined by its CMYK values
    pub fn process(id: &str, cmyk: Cmyk) -> Self {
        Self::new(
            ColorId::from(id),
            id,
            Some(ColorType::ProcessCmyk),
            ColorSpace::Cmyk,
            cmyk,
            1.0,
        )
    }

    /// Named spot ink with a CMYK fallback; classification derived from the name
    pub fn spot(id: &str, name: &str, cmyk: Cmyk) -> Self {
        Self::new(ColorId::from(id), name, None, ColorSpace::SpotCmyk, cmyk, 1.0)
    }

    pub fn set_cmyk(&mut self, cmyk: Cmyk) {
        self.cmyk = cmyk;
        self.recompute_derived();
    }

    pub fn set_lab(&mut self, lab: Lab) {
        self.lab = lab;
        self.cmyk = lab_to_cmyk(lab);
        self.space = ColorSpace::Lab;
        self.recompute_derived_from_lab();
    }

    fn recompute_derived(&mut self) {
        if !self.cmyk.is_finite() {
            log::warn!("ink {:?}: non-finite CMYK, derived metrics use neutral gray", self.id.0);
            self.lab = Lab::neutral_gray();
            self.cmyk = Cmyk::default();
        } else {
            self.lab = cmyk_to_lab(self.cmyk);
        }
        self.optical_density = optical_density(self.cmyk);
        self.neutral_density = neutral_density(self.cmyk);
        self.luminance = self.lab.l;
        self.chroma = self.lab.chroma();
    }

    fn recompute_derived_from_lab(&mut self) {
        self.optical_density = optical_density(self.cmyk);
        self.neutral_density = neutral_density(self.cmyk);
        self.luminance = self.lab.l;
        self.chroma = self.lab.chroma();
    }

    pub fn is_black(&self) -> bool {
        is_black(self.cmyk)
    }

    pub fn is_rich_black(&self) -> bool {
        is_rich_black(self.cmyk)
    }

    /// Inks that never take part in trapping
    pub fn is_non_trapping(&self) -> bool {
        matches!(self.color_type, ColorType::Varnish | ColorType::Transparent)
    }
}

#[test]
fn rgb_cmyk_roundtrip_within_one_255th() {
    let samples = [
        Rgb::new(0.0, 0.0, 0.0),
        Rgb::new(1.0, 1.0, 1.0),
        Rgb::new(0.25, 0.5, 0.75),
        Rgb::new(0.8, 0.1, 0.3),
    ];
    for rgb in samples {
        let back = cmyk_to_rgb(rgb_to_cmyk(rgb));
        assert!((back.r - rgb.r).abs() <= 1.0 / 255.0);
        assert!((back.g - rgb.g).abs() <= 1.0 / 255.0);
        assert!((back.b - rgb.b).abs() <= 1.0 / 255.0);
    }
}

#[test]
fn neutral_density_weights_black_heaviest() {
    let heavy_k = Cmyk::from_percent(0.0, 0.0, 0.0, 80.0);
    let heavy_cmy = Cmyk::from_percent(80.0, 80.0, 80.0, 0.0);
    assert!(neutral_density(heavy_k) > neutral_density(heavy_cmy));
}

#[test]
fn neutral_density_monotonic_in_k() {
    let a = Cmyk::from_percent(20.0, 20.0, 20.0, 40.0);
    let b = Cmyk::from_percent(20.0, 20.0, 20.0, 60.0);
    assert!(neutral_density(b) > neutral_density(a));
}

#[test]
fn black_detection() {
    assert!(is_pure_black(Cmyk::from_percent(0.0, 0.0, 0.0, 100.0)));
    assert!(is_rich_black(Cmyk::from_percent(60.0, 40.0, 40.0, 100.0)));
    assert!(!is_black(Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)));
    assert!(!is_black(Cmyk::from_percent(100.0, 0.0, 0.0, 0.0)));
}

#[test]
fn classify_from_spot_names() {
    let zero = Cmyk::default();
    let some = Cmyk::from_percent(10.0, 0.0, 0.0, 30.0);
    assert_eq!(classify("Opaque White", some, None), ColorType::WhiteUnderprint);
    assert_eq!(classify("PANTONE 877 Silver", some, None), ColorType::Metallic);
    assert_eq!(classify("Neon Pink", some, None), ColorType::Fluorescent);
    assert_eq!(classify("Gloss Varnish", some, None), ColorType::Varnish);
    assert_eq!(classify("Cutline", zero, None), ColorType::Transparent);
    assert_eq!(classify("Cyan", some, None), ColorType::ProcessCmyk);
    // declared type overrides the heuristic
    assert_eq!(
        classify("Opaque White", some, Some(ColorType::Spot)),
        ColorType::Spot
    );
}

#[test]
fn delta_e_zero_for_identical_colors() {
    let lab = Lab::new(50.0, 10.0, -20.0);
    assert_eq!(delta_e_76(lab, lab), 0.0);
    assert_eq!(delta_e_94(lab, lab), 0.0);
    assert!(delta_e_2000(lab, lab).abs() < 1e-9);
}

#[test]
fn delta_e_2000_known_pair() {
    // reference pair 1 from Sharma's CIEDE2000 test data
    let lab1 = Lab::new(50.0, 2.6772, -79.7751);
    let lab2 = Lab::new(50.0, 0.0, -82.7485);
    let de = delta_e_2000(lab1, lab2);
    assert!((de - 2.0425).abs() < 1e-3);
}

#[test]
fn ink_derives_metrics_on_construction() {
    let ink = Ink::process("K", Cmyk::from_percent(0.0, 0.0, 0.0, 100.0));
    assert!(ink.neutral_density >= 1.7);
    assert!(ink.luminance < 20.0);
    assert!(ink.is_black());
}

#[test]
fn ink_recomputes_on_change() {
    let mut ink = Ink::process("C", Cmyk::from_percent(100.0, 0.0, 0.0, 0.0));
    let nd_before = ink.neutral_density;
    ink.set_cmyk(Cmyk::from_percent(100.0, 0.0, 0.0, 50.0));
    assert!(ink.neutral_density > nd_before);
}

#[test]
fn non_finite_ink_falls_back_to_neutral_gray() {
    let ink = Ink::process("Broken", Cmyk::new(f64::NAN, 0.0, 0.0, 0.0));
    assert_eq!(ink.lab, Lab::neutral_gray());
    assert!(ink.neutral_density.is_finite());
}
