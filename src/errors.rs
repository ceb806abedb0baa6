//! Fatal, run-level errors.
//!
//! Only conditions that abort `generate_traps` live here. Degenerate
//! geometry, odd colors and QC findings are all recoverable and travel as
//! structured warnings instead, so plain enums with `Display` and a single
//! `From` conversion cover everything.

use std::error::Error as IError;
use std::fmt;

use crate::color::ColorId;
use crate::document::{LayerId, ObjectId};

/// Fatal, run-level error. Recoverable problems never surface here; they
/// become warnings on the run result instead.
#[derive(Debug, Clone, PartialEq)]
pub enum TrapError {
    /// The caller cancelled the run; partial results were discarded
    Cancelled,
    /// The input document violates a structural invariant
    Document(DocumentError),
    /// `run_qc` was called without a prior `generate_traps` result
    NoTrapLayer,
    /// A settings patch did not deserialize into the settings schema
    InvalidSettings(String),
}

/// Structural invariant violations of the input document
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// The ink palette is empty
    EmptyPalette,
    /// An object references a layer that does not exist
    UnknownLayer { object: ObjectId, layer: LayerId },
    /// A fill or stroke references an ink that is not in the palette
    UnknownColor { object: ObjectId, color: ColorId },
    /// An object references a parent that does not exist
    UnknownParent { object: ObjectId, parent: ObjectId },
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::DocumentError::*;
        match self {
            EmptyPalette => write!(f, "document ink palette is empty"),
            UnknownLayer { object, layer } => {
                write!(f, "object '{}' references unknown layer '{}'", object.0, layer.0)
            }
            UnknownColor { object, color } => {
                write!(f, "object '{}' references unknown ink '{}'", object.0, color.0)
            }
            UnknownParent { object, parent } => {
                write!(f, "object '{}' references unknown parent '{}'", object.0, parent.0)
            }
        }
    }
}

impl IError for DocumentError {}

impl fmt::Display for TrapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use self::TrapError::*;
        match self {
            Cancelled => write!(f, "trap generation was cancelled"),
            Document(e) => write!(f, "{e}"),
            NoTrapLayer => write!(f, "no trap layer has been generated yet"),
            InvalidSettings(msg) => write!(f, "invalid settings patch: {msg}"),
        }
    }
}

impl IError for TrapError {}

impl From<DocumentError> for TrapError {
    fn from(err: DocumentError) -> Self {
        TrapError::Document(err)
    }
}
