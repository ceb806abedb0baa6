//! Input data model: graphic objects, layers and the ink palette.
//!
//! A [`Document`] is immutable input to the trapping pipeline; the engine
//! never mutates it. Objects reference layers and palette entries by stable
//! ids; [`Document::validate`] checks those structural invariants before a
//! run and reports the first violation as a fatal error.

use serde_derive::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::color::{ColorId, Ink};
use crate::errors::DocumentError;
use crate::geometry::{BezierPath, Bounds};
use crate::offset::CornerStyle;
use crate::units::{Mm, Pt};
use crate::utils::generated_id;

macro_rules! impl_string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(generated_id())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

impl_string_id!(ObjectId);
impl_string_id!(LayerId);

/// What kind of artwork an object is
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObjectKind {
    #[default]
    Path,
    CompoundPath,
    Text,
    Image,
    Group,
    Mask,
}

/// How an open stroke ends. Decides the shape of the widened stroke
/// outline at the path endpoints when a stroke becomes a color region.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineCapStyle {
    /// Cut flush at the endpoint
    #[default]
    Butt,
    /// Semicircular end; the widened outline carries its apex point
    Round,
    /// Extends half the stroke width past the endpoint
    ProjectingSquare,
}

/// Corner treatment of a stroke. Picks the corner style the offset engine
/// uses while widening the stroke into its outline.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineJoinStyle {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl LineJoinStyle {
    /// The matching offset-engine corner style
    pub fn corner_style(self) -> CornerStyle {
        match self {
            LineJoinStyle::Miter => CornerStyle::Miter,
            LineJoinStyle::Round => CornerStyle::Round,
            LineJoinStyle::Bevel => CornerStyle::Bevel,
        }
    }
}

/// Dash lengths of a stroked line, in mm. A dashed stroke covers only part
/// of its outline with ink, which scales the area its color region reports.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LineDashPattern {
    /// Shift of the pattern start along the line
    pub offset: f64,
    /// Alternating painted and blank lengths
    pub pattern: SmallVec<[f64; 6]>,
}

impl LineDashPattern {
    /// Fraction of the stroke length that actually carries ink.
    /// An empty or degenerate pattern counts as solid.
    pub fn ink_coverage(&self) -> f64 {
        let total: f64 = self.pattern.iter().sum();
        if total <= 0.0 {
            return 1.0;
        }
        let painted: f64 = self.pattern.iter().step_by(2).sum();
        (painted / total).clamp(0.0, 1.0)
    }
}

/// Filled area of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Fill {
    pub color: ColorId,
    /// `0..=1`
    pub opacity: f64,
}

impl Fill {
    pub fn new(color: ColorId) -> Self {
        Self {
            color,
            opacity: 1.0,
        }
    }
}

/// Stroked outline of an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Stroke {
    pub color: ColorId,
    pub width: Mm,
    /// `0..=1`
    pub opacity: f64,
    pub cap: LineCapStyle,
    pub join: LineJoinStyle,
    pub miter_limit: f64,
    pub dash: Option<LineDashPattern>,
}

impl Stroke {
    pub fn new(color: ColorId, width: Mm) -> Self {
        Self {
            color,
            width,
            opacity: 1.0,
            cap: LineCapStyle::default(),
            join: LineJoinStyle::default(),
            miter_limit: 4.0,
            dash: None,
        }
    }
}

/// Immutable input object: artwork geometry plus paint attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GraphicObject {
    pub id: ObjectId,
    pub kind: ObjectKind,
    /// One or more geometric paths in page coordinates (mm)
    pub paths: Vec<BezierPath>,
    pub fill: Option<Fill>,
    pub stroke: Option<Stroke>,
    pub overprint: bool,
    pub knockout: bool,
    pub layer: LayerId,
    pub parent: Option<ObjectId>,
    pub children: Vec<ObjectId>,
    pub z_index: i64,
}

impl GraphicObject {
    pub fn new(id: ObjectId, kind: ObjectKind, layer: LayerId) -> Self {
        Self {
            id,
            kind,
            paths: Vec::new(),
            fill: None,
            stroke: None,
            overprint: false,
            knockout: false,
            layer,
            parent: None,
            children: Vec::new(),
            z_index: 0,
        }
    }

    /// Filled path object, the most common construction
    pub fn filled_path(id: &str, layer: &str, path: BezierPath, color: &str) -> Self {
        let mut obj = Self::new(ObjectId::from(id), ObjectKind::Path, LayerId::from(layer));
        obj.paths.push(path);
        obj.fill = Some(Fill::new(ColorId::from(color)));
        obj
    }

    /// Text object; the paths describe the rendered glyph outlines or the
    /// text bounding box at this level of abstraction
    pub fn text(id: &str, layer: &str, path: BezierPath, color: &str) -> Self {
        let mut obj = Self::filled_path(id, layer, path, color);
        obj.kind = ObjectKind::Text;
        obj
    }

    pub fn with_stroke(mut self, stroke: Stroke) -> Self {
        self.stroke = Some(stroke);
        self
    }

    pub fn with_overprint(mut self, overprint: bool) -> Self {
        self.overprint = overprint;
        self
    }

    pub fn with_knockout(mut self, knockout: bool) -> Self {
        self.knockout = knockout;
        self
    }

    /// Conservative anchor-only bounds over all paths
    pub fn bounds(&self) -> Bounds {
        let mut b = Bounds::empty();
        for path in &self.paths {
            b = b.union(&path.bounds());
        }
        b
    }

    /// Total anchor count over all paths
    pub fn anchor_count(&self) -> usize {
        self.paths.iter().map(|p| p.points.len()).sum()
    }

    /// Estimated text size from the bounding-box height.
    /// `None` for non-text objects.
    pub fn text_size(&self) -> Option<Pt> {
        if self.kind != ObjectKind::Text {
            return None;
        }
        let b = self.bounds();
        if b.is_empty() {
            return None;
        }
        Some(Mm(b.height()).into_pt())
    }
}

/// One artwork layer; objects on non-printable layers contribute nothing
/// to trapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub printable: bool,
}

impl Layer {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: LayerId::from(id),
            name: name.to_string(),
            printable: true,
        }
    }
}

/// The complete artwork input: objects, layers, ink palette
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Document {
    pub objects: Vec<GraphicObject>,
    pub layers: Vec<Layer>,
    pub inks: Vec<Ink>,
}

impl Document {
    pub fn new(objects: Vec<GraphicObject>, layers: Vec<Layer>, inks: Vec<Ink>) -> Self {
        Self {
            objects,
            layers,
            inks,
        }
    }

    pub fn ink(&self, id: &ColorId) -> Option<&Ink> {
        self.inks.iter().find(|i| &i.id == id)
    }

    pub fn object(&self, id: &ObjectId) -> Option<&GraphicObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    /// Checks the structural invariants the pipeline relies on.
    /// The first violation is returned as a fatal error.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.inks.is_empty() {
            return Err(DocumentError::EmptyPalette);
        }
        for obj in &self.objects {
            if self.layer(&obj.layer).is_none() {
                return Err(DocumentError::UnknownLayer {
                    object: obj.id.clone(),
                    layer: obj.layer.clone(),
                });
            }
            if let Some(fill) = &obj.fill {
                if self.ink(&fill.color).is_none() {
                    return Err(DocumentError::UnknownColor {
                        object: obj.id.clone(),
                        color: fill.color.clone(),
                    });
                }
            }
            if let Some(stroke) = &obj.stroke {
                if self.ink(&stroke.color).is_none() {
                    return Err(DocumentError::UnknownColor {
                        object: obj.id.clone(),
                        color: stroke.color.clone(),
                    });
                }
            }
            if let Some(parent) = &obj.parent {
                if self.object(parent).is_none() {
                    return Err(DocumentError::UnknownParent {
                        object: obj.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Cmyk;

    fn one_ink() -> Vec<Ink> {
        vec![Ink::process("C", Cmyk::from_percent(100.0, 0.0, 0.0, 0.0))]
    }

    #[test]
    fn validate_rejects_empty_palette() {
        let doc = Document::default();
        assert_eq!(doc.validate(), Err(DocumentError::EmptyPalette));
    }

    #[test]
    fn validate_rejects_unknown_layer() {
        let obj = GraphicObject::filled_path("a", "nope", BezierPath::rect(0.0, 0.0, 1.0, 1.0), "C");
        let doc = Document::new(vec![obj], vec![], one_ink());
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::UnknownLayer { .. })
        ));
    }

    #[test]
    fn validate_rejects_unknown_fill_color() {
        let obj =
            GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 1.0, 1.0), "Magenta");
        let doc = Document::new(vec![obj], vec![Layer::new("art", "Artwork")], one_ink());
        assert!(matches!(
            doc.validate(),
            Err(DocumentError::UnknownColor { .. })
        ));
    }

    #[test]
    fn validate_accepts_wellformed_document() {
        let obj = GraphicObject::filled_path("a", "art", BezierPath::rect(0.0, 0.0, 1.0, 1.0), "C");
        let doc = Document::new(vec![obj], vec![Layer::new("art", "Artwork")], one_ink());
        assert_eq!(doc.validate(), Ok(()));
    }

    #[test]
    fn text_size_estimate_follows_bounds_height() {
        // 2.1 mm is close to 6 pt
        let obj = GraphicObject::text("t", "art", BezierPath::rect(0.0, 0.0, 5.0, 2.1), "C");
        let size = obj.text_size().unwrap();
        assert!((size.0 - 5.95).abs() < 0.1);
    }

    #[test]
    fn dash_ink_coverage() {
        let solid = LineDashPattern::default();
        assert_eq!(solid.ink_coverage(), 1.0);
        let dashed = LineDashPattern {
            offset: 0.0,
            pattern: smallvec::smallvec![1.0, 1.0],
        };
        assert!((dashed.ink_coverage() - 0.5).abs() < 1e-9);
        let dotted = LineDashPattern {
            offset: 0.0,
            pattern: smallvec::smallvec![0.5, 1.5],
        };
        assert!((dotted.ink_coverage() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn join_maps_onto_offset_corners() {
        assert_eq!(LineJoinStyle::default().corner_style(), CornerStyle::Miter);
        assert_eq!(LineJoinStyle::Round.corner_style(), CornerStyle::Round);
        assert_eq!(LineJoinStyle::Bevel.corner_style(), CornerStyle::Bevel);
    }
}
