//! Error taxonomy for the back-coding pipeline.
//!
//! Three fatal families plus a non-fatal warning type. `InputError` covers
//! operator-supplied data (tables, word lists, thresholds, review picks),
//! `ConfigError` covers stored rule tables and use-case lookups, and
//! `StateError` (defined next to the session machine) covers operations
//! attempted in the wrong stage. `PipelineWarning` is for conditions the
//! batch steps recover from locally and surface to the operator instead of
//! aborting the run.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::session::StateError;

/// Validation failures on operator-supplied inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// A named column does not exist in the table.
    #[error("column '{column}' not found in the input table")]
    UnknownColumn { column: String },

    /// A derived column would overwrite an existing one.
    #[error("column '{column}' already exists in the table")]
    DuplicateColumn { column: String },

    /// A column of values does not line up with the table's row count.
    #[error("column '{column}' carries {got} values for a table of {expected} rows")]
    ColumnLength {
        column: String,
        expected: usize,
        got: usize,
    },

    /// The uploaded table has no header row.
    #[error("input table is empty")]
    EmptyTable,

    /// A vocabulary was set but contains no usable entries.
    #[error("vocabulary word list is empty")]
    EmptyWordList,

    /// Acceptance thresholds must sit strictly inside (0, 1).
    #[error("similarity threshold {value} is outside the open interval (0, 1)")]
    ThresholdOutOfRange { value: f64 },

    /// A review resolution referenced a row that was never flagged.
    #[error("row {row} of column '{column}' is not flagged for review")]
    UnknownReviewKey { column: String, row: usize },

    /// A review resolution picked a label outside the selectable set.
    #[error("label '{label}' is not in the vocabulary or the unknown sentinel")]
    LabelNotSelectable { label: String },
}

/// Failures in stored configuration: rule tables and the use-case registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Fallback identifiers are max+1 over the table, so an empty table has
    /// no fallback to offer.
    #[error("identifier table is empty; no fallback identifier can be derived")]
    EmptyIdentifierTable,

    /// Every identifier value must parse as an integer.
    #[error("identifier for '{label}' is not numeric: '{value}'")]
    NonNumericIdentifier { label: String, value: String },

    /// Alias rules form a loop of two or more entries.
    #[error("alias rule cycle detected starting from '{label}'")]
    AliasCycle { label: String },

    /// The requested use case is not in the registry.
    #[error("unknown use case '{name}'")]
    UnknownUseCase { name: String },
}

/// Top-level error for session operations.
#[derive(Error, Debug)]
pub enum BackcodeError {
    #[error("input error: {0}")]
    Input(#[from] InputError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

/// Non-fatal conditions surfaced to the operator after a batch step.
///
/// Warnings never stop a run: the offending column or entry is skipped and
/// every sibling keeps processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PipelineWarning {
    /// A tracked column was not found in the uploaded table.
    UnknownColumn { column: String },

    /// A derived column name collided with an existing column; the insertion
    /// was skipped.
    ColumnCollision { column: String },

    /// A word-list entry was blank after trimming and was dropped.
    BlankWordEntry { position: usize },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::UnknownColumn { column } => {
                write!(f, "tracked column '{column}' not found in the table; skipped")
            }
            PipelineWarning::ColumnCollision { column } => {
                write!(f, "column '{column}' already exists; derived column not inserted")
            }
            PipelineWarning::BlankWordEntry { position } => {
                write!(f, "word list entry {position} is blank; dropped")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
