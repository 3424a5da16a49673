//! Canonicalization of matched labels.
//!
//! Matched labels go through merge rules first, then rename rules, then the
//! identifier lookup. Each alias table is consulted exactly once, so chains
//! inside one table are not followed here. Labels the identifier table does
//! not know get the precomputed fallback code (one past the largest
//! configured identifier).

use serde::Serialize;

use crate::error::ConfigError;
use crate::matcher::{ClassifiedColumn, ClassifiedRow};
use crate::rules::{AliasTable, IdentifierTable};

/// Canonical label and identifier for one matched label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalAssignment {
    pub canonical_label: Option<String>,
    pub identifier: Option<String>,
}

/// Match verdict plus its canonical outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub original_value: Option<String>,
    pub matched_label: Option<String>,
    pub similarity: Option<f64>,
    pub needs_review: bool,
    pub canonical_label: Option<String>,
    pub identifier: Option<String>,
}

/// One tracked column after canonicalization, in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedColumn {
    pub column: String,
    pub rows: Vec<EnrichedRow>,
}

/// Applies merge, rename and identifier rules to matched labels.
///
/// Construction fails when the identifier table cannot produce a fallback
/// code, so per-row canonicalization never fails.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    merges: AliasTable,
    renames: AliasTable,
    identifiers: IdentifierTable,
    fallback: i64,
}

impl Canonicalizer {
    pub fn new(
        merges: AliasTable,
        renames: AliasTable,
        identifiers: IdentifierTable,
    ) -> Result<Self, ConfigError> {
        let fallback = identifiers.next_identifier()?;
        Ok(Self {
            merges,
            renames,
            identifiers,
            fallback,
        })
    }

    /// Identifier assigned to labels the table does not know.
    pub fn fallback_identifier(&self) -> i64 {
        self.fallback
    }

    /// Canonicalize one matched label. Unmatched rows stay unmatched: no
    /// canonical label, no identifier.
    pub fn canonicalize(&self, matched_label: Option<&str>) -> CanonicalAssignment {
        let Some(label) = matched_label else {
            return CanonicalAssignment {
                canonical_label: None,
                identifier: None,
            };
        };

        let merged = self.merges.resolve_once(label);
        let renamed = self.renames.resolve_once(&merged);
        let identifier = match self.identifiers.lookup(&renamed) {
            Some(id) => id.to_string(),
            None => self.fallback.to_string(),
        };

        CanonicalAssignment {
            canonical_label: Some(renamed),
            identifier: Some(identifier),
        }
    }

    pub fn enrich(&self, row: &ClassifiedRow) -> EnrichedRow {
        let assignment = self.canonicalize(row.matched_label.as_deref());
        EnrichedRow {
            original_value: row.original_value.clone(),
            matched_label: row.matched_label.clone(),
            similarity: row.similarity,
            needs_review: row.needs_review,
            canonical_label: assignment.canonical_label,
            identifier: assignment.identifier,
        }
    }

    pub fn enrich_column(&self, column: &ClassifiedColumn) -> EnrichedColumn {
        EnrichedColumn {
            column: column.column.clone(),
            rows: column.rows.iter().map(|row| self.enrich(row)).collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
