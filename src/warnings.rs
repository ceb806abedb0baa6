//! Structured findings shared by the analysis, rule and QC stages.

use serde_derive::{Deserialize, Serialize};

use crate::color::ColorId;
use crate::document::ObjectId;
use crate::region::RegionId;

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningKind {
    SmallText,
    ThinLine,
    InsufficientSpread,
    OverprintConflict,
    ColorMismatch,
    ComplexGeometry,
    MetallicAdjacent,
    WhiteUnderprintIssue,
}

/// How serious a finding is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One structured finding with optional object / region / ink references
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Warning {
    pub kind: WarningKind,
    pub severity: Severity,
    pub message: String,
    pub object: Option<ObjectId>,
    pub region: Option<RegionId>,
    pub color: Option<ColorId>,
}

impl Warning {
    pub fn new(kind: WarningKind, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            object: None,
            region: None,
            color: None,
        }
    }

    pub fn info(kind: WarningKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Info, message)
    }

    pub fn warning(kind: WarningKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Warning, message)
    }

    pub fn error(kind: WarningKind, message: impl Into<String>) -> Self {
        Self::new(kind, Severity::Error, message)
    }

    pub fn for_object(mut self, object: &ObjectId) -> Self {
        self.object = Some(object.clone());
        self
    }

    pub fn for_region(mut self, region: &RegionId) -> Self {
        self.region = Some(region.clone());
        self
    }

    pub fn for_color(mut self, color: &ColorId) -> Self {
        self.color = Some(color.clone());
        self
    }
}
