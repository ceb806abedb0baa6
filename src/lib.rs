//! # autotrap
//!
//! autotrap is a library for automatic prepress trapping: given a vector
//! artwork description (objects, colors, layers) it decides where
//! overlapping ink spreads ("traps") must be synthesized at the boundaries
//! between differently-colored regions to mask mechanical mis-registration
//! between printing plates, and emits those traps as an overlay layer.
//!
//! # Getting started
//!
//! ```rust
//! use autotrap::*;
//!
//! // two adjacent rectangles: a light gray next to a deep gray
//! let doc = Document::new(
//!     vec![
//!         GraphicObject::filled_path("left", "art", BezierPath::rect(0.0, 0.0, 10.0, 10.0), "Light"),
//!         GraphicObject::filled_path("right", "art", BezierPath::rect(10.0, 0.0, 10.0, 10.0), "Dark"),
//!     ],
//!     vec![Layer::new("art", "Artwork")],
//!     vec![
//!         Ink::process("Light", Cmyk::from_percent(20.0, 20.0, 20.0, 0.0)),
//!         Ink::process("Dark", Cmyk::from_percent(0.0, 0.0, 0.0, 80.0)),
//!     ],
//! );
//!
//! // run the pipeline with the flexo defaults
//! let mut session = TrapSession::new(TrapSettings::default());
//! let run = session.generate_traps(&doc).unwrap();
//!
//! // the lighter color spreads into the darker one
//! assert_eq!(run.layer.traps.len(), 1);
//! assert_eq!(run.layer.traps[0].decision.direction, TrapDirection::Spread);
//! assert!(run.layer.traps[0].overprint);
//!
//! // and the result can be inspected by the QC checks
//! let report = session.run_qc(&doc).unwrap();
//! assert!(report.passed);
//! ```
//!
//! All geometry is in millimeter; text sizes are in point. The engine
//! never mutates the input document, performs no I/O and produces
//! byte-identical results for identical inputs. Rendering the overlay and
//! writing PDF output are left to downstream consumers of [`TrapLayer`].

pub mod color;
pub mod document;
pub mod errors;
pub mod geometry;
pub mod offset;
pub mod qc;
pub mod region;
pub mod rules;
pub mod session;
pub mod settings;
pub mod trap;
pub mod units;
pub mod warnings;

mod utils;

pub use crate::color::{
    classify, cmyk_to_lab, cmyk_to_rgb, delta_e_2000, delta_e_76, delta_e_94, is_black,
    is_pure_black, is_rich_black, lab_to_cmyk, lab_to_rgb, neutral_density, optical_density,
    rgb_to_cmyk, rgb_to_lab, Cmyk, ColorId, ColorSpace, ColorType, Ink, Lab, Rgb,
};
pub use crate::document::{
    Document, Fill, GraphicObject, Layer, LayerId, LineCapStyle, LineDashPattern, LineJoinStyle,
    ObjectId, ObjectKind, Stroke,
};
pub use crate::errors::{DocumentError, TrapError};
pub use crate::geometry::{BezierPath, Bounds, CubicBezier, PathPoint, PathSegment, Point};
pub use crate::offset::{offset_path, CornerStyle, OffsetOptions, WidthProfile};
pub use crate::qc::{run_qc, QcReport};
pub use crate::region::{
    build_graph, AdjacencyGraph, AdjacencyOptions, AdjacencyRecord, ColorRegion, ContactType,
    RegionId, RegionSource, RiskFactors,
};
pub use crate::rules::{
    color_priority, DecisionContext, RuleAction, RuleActionKind, RuleCondition, RuleDistance,
    RulePredicate, RuleTarget, TagDirection, TagMode, TrapColorPolicy, TrapDecision,
    TrapDirection, TrapRule, TrapStyle, TrapTag,
};
pub use crate::session::{
    CancelToken, NullProgress, ProgressSink, ProgressUpdate, RunContext, TrapPhase, TrapRun,
    TrapSession,
};
pub use crate::settings::{
    CenterlineBehavior, DirectionMethod, EndCapStyle, ImageTrapDirection, PullbackMode,
    Technology, TrapDecisionMode, TrapMode, TrapSettings, TruncationMode,
};
pub use crate::trap::{
    generate_layer, TrapContour, TrapId, TrapLayer, TrapObject, TrapStats, WindingOrder,
};
pub use crate::units::{Mm, Pt};
pub use crate::warnings::{Severity, Warning, WarningKind};
