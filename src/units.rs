//! Length newtypes: millimeter for geometry, point for text sizes.
//!
//! Trap widths, offset distances and text thresholds all travel through the
//! same arithmetic, so both units share one macro-generated implementation.
//! Equality is quantized to a thousandth of a unit, the finest distinction
//! the engine ever acts on (compare `geometry::POINT_EQ_TOL`).

use std::cmp::Ordering;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use serde_derive::{Deserialize, Serialize};

/// One PostScript point in millimeter: 25.4 mm per inch, 72 points per inch
const MM_PER_PT: f64 = 25.4 / 72.0;

/// Lengths are compared on a 1/1000 grid of their unit
fn quantized(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}

/// Length in millimeter. All trap geometry is measured in `Mm`.
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mm(pub f64);

/// Text size in PostScript points.
#[derive(Debug, Default, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pt(pub f64);

macro_rules! length_unit {
    ($name:ident) => {
        impl $name {
            /// Magnitude of a signed offset distance
            pub fn abs(self) -> Self {
                Self(self.0.abs())
            }

            pub fn min(self, other: Self) -> Self {
                Self(self.0.min(other.0))
            }

            pub fn max(self, other: Self) -> Self {
                Self(self.0.max(other.0))
            }

            /// Restricts a resolved width to the configured range
            pub fn clamp(self, lo: Self, hi: Self) -> Self {
                Self(self.0.clamp(lo.0, hi.0))
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                // non-finite lengths never compare equal
                self.0.is_finite()
                    && other.0.is_finite()
                    && quantized(self.0) == quantized(other.0)
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
            }
        }

        impl Add for $name {
            type Output = Self;
            fn add(self, other: Self) -> Self {
                Self(self.0 + other.0)
            }
        }

        impl AddAssign for $name {
            fn add_assign(&mut self, other: Self) {
                self.0 += other.0;
            }
        }

        impl Sub for $name {
            type Output = Self;
            fn sub(self, other: Self) -> Self {
                Self(self.0 - other.0)
            }
        }

        impl SubAssign for $name {
            fn sub_assign(&mut self, other: Self) {
                self.0 -= other.0;
            }
        }

        impl Neg for $name {
            type Output = Self;
            fn neg(self) -> Self {
                Self(-self.0)
            }
        }

        impl Mul<f64> for $name {
            type Output = Self;
            fn mul(self, factor: f64) -> Self {
                Self(self.0 * factor)
            }
        }

        impl MulAssign<f64> for $name {
            fn mul_assign(&mut self, factor: f64) {
                self.0 *= factor;
            }
        }

        impl Div<f64> for $name {
            type Output = Self;
            fn div(self, divisor: f64) -> Self {
                Self(self.0 / divisor)
            }
        }

        impl DivAssign<f64> for $name {
            fn div_assign(&mut self, divisor: f64) {
                self.0 /= divisor;
            }
        }

        /// Ratio of two lengths, e.g. the max/min width spread of a layer
        impl Div for $name {
            type Output = f64;
            fn div(self, other: Self) -> f64 {
                self.0 / other.0
            }
        }
    };
}

length_unit!(Mm);
length_unit!(Pt);

impl Mm {
    pub fn into_pt(self) -> Pt {
        Pt(self.0 / MM_PER_PT)
    }
}

impl Pt {
    pub fn into_mm(self) -> Mm {
        Mm(self.0 * MM_PER_PT)
    }
}

impl From<Pt> for Mm {
    fn from(pt: Pt) -> Mm {
        pt.into_mm()
    }
}

impl From<Mm> for Pt {
    fn from(mm: Mm) -> Pt {
        mm.into_pt()
    }
}

#[test]
fn point_and_millimeter_agree_on_an_inch() {
    assert_eq!(Pt(72.0).into_mm(), Mm(25.4));
    assert_eq!(Mm(25.4).into_pt(), Pt(72.0));
}

#[test]
fn six_point_text_threshold_in_mm() {
    // the small-text cutoff the rule engine works with
    assert_eq!(Pt(6.0).into_mm(), Mm(2.117));
}

#[test]
fn equality_absorbs_float_noise() {
    assert_eq!(Mm(0.1 + 0.2), Mm(0.3));
    assert_ne!(Mm(0.3), Mm(0.301));
    assert_ne!(Mm(f64::NAN), Mm(f64::NAN));
}

#[test]
fn widths_order_and_clamp() {
    let widths = [Mm(0.24), Mm(0.05), Mm(0.5)];
    assert_eq!(widths.iter().copied().max().unwrap(), Mm(0.5));
    assert_eq!(widths.iter().copied().min().unwrap(), Mm(0.05));
    assert_eq!(Mm(0.7).clamp(Mm(0.05), Mm(0.5)), Mm(0.5));
    assert_eq!(Mm(0.01).clamp(Mm(0.05), Mm(0.5)), Mm(0.05));
}

#[test]
fn width_arithmetic() {
    // flexo widens the default 0.20 mm trap to 0.24 mm
    assert_eq!(Mm(0.20) * 1.2, Mm(0.24));
    assert_eq!(-Mm(0.25), Mm(-0.25));
    assert_eq!(Mm(0.4) / 2.0, Mm(0.2));
    let ratio = Mm(0.3) / Mm(0.1);
    assert!((ratio - 3.0).abs() < 1e-9);
}
