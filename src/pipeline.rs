//! Batch steps over whole tables.
//!
//! These functions tie the matcher, the canonicalizer and the table model
//! together: classify every tracked column, list unique raw values, and
//! splice the derived columns back into a copy of the uploaded table.
//! Per-column trouble (missing columns, name collisions) is reported as
//! warnings while the remaining columns keep going.

use std::collections::BTreeSet;

use tracing::warn;

use crate::canonical::{Canonicalizer, EnrichedColumn};
use crate::error::{InputError, PipelineWarning};
use crate::matcher::{ClassifiedColumn, FuzzyMatcher};
use crate::table::Table;

/// Name of the derived canonical-label column for a source column.
pub fn derived_label_column(column: &str) -> String {
    format!("{column}_best_match")
}

/// Name of the derived identifier column for a source column.
pub fn derived_identifier_column(column: &str) -> String {
    format!("{column}_identifier")
}

/// Classified columns plus the warnings the pass produced.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub columns: Vec<ClassifiedColumn>,
    pub warnings: Vec<PipelineWarning>,
}

impl MatchOutcome {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Total number of rows flagged for review across all columns.
    pub fn flagged_count(&self) -> usize {
        self.columns
            .iter()
            .map(|column| column.flagged_rows().len())
            .sum()
    }
}

/// Run the matcher over every tracked column present in the table.
///
/// Tracked columns missing from the table are skipped with a warning; the
/// others are classified in the order they were configured.
pub fn classify_columns(
    table: &Table,
    tracked: &[String],
    matcher: &FuzzyMatcher,
) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();
    for name in tracked {
        match table.column(name) {
            Ok(cells) => {
                let rows = matcher.classify_cells(&cells);
                outcome.columns.push(ClassifiedColumn {
                    column: name.clone(),
                    rows,
                });
            }
            Err(_) => {
                warn!(column = %name, "tracked column not found in the input table");
                outcome.warnings.push(PipelineWarning::UnknownColumn {
                    column: name.clone(),
                });
            }
        }
    }
    outcome
}

/// Distinct trimmed values across the tracked columns, sorted
/// lexicographically. Case differences are preserved, so "Telekom" and
/// "telekom" are two values.
pub fn unique_values(table: &Table, tracked: &[String]) -> (Vec<String>, Vec<PipelineWarning>) {
    let mut values = BTreeSet::new();
    let mut warnings = Vec::new();
    for name in tracked {
        match table.column(name) {
            Ok(cells) => {
                for cell in cells.into_iter().flatten() {
                    let trimmed = cell.trim();
                    if !trimmed.is_empty() {
                        values.insert(trimmed.to_string());
                    }
                }
            }
            Err(_) => warnings.push(PipelineWarning::UnknownColumn {
                column: name.clone(),
            }),
        }
    }
    (values.into_iter().collect(), warnings)
}

/// Canonicalize every classified column.
pub fn canonicalize_columns(
    columns: &[ClassifiedColumn],
    canonicalizer: &Canonicalizer,
) -> Vec<EnrichedColumn> {
    columns
        .iter()
        .map(|column| canonicalizer.enrich_column(column))
        .collect()
}

/// Splice derived columns into a copy of the uploaded table.
///
/// For each enriched column the canonical labels land immediately right of
/// the source column and the identifiers immediately right of that. A name
/// collision skips that one insertion with a warning; it never overwrites
/// the existing column.
pub fn assemble(table: &Table, enriched: &[EnrichedColumn]) -> (Table, Vec<PipelineWarning>) {
    let mut out = table.clone();
    let mut warnings = Vec::new();

    for column in enriched {
        let label_name = derived_label_column(&column.column);
        let id_name = derived_identifier_column(&column.column);
        let labels: Vec<Option<String>> = column
            .rows
            .iter()
            .map(|row| row.canonical_label.clone())
            .collect();
        let ids: Vec<Option<String>> = column
            .rows
            .iter()
            .map(|row| row.identifier.clone())
            .collect();

        let mut anchor = column.column.clone();
        match out.insert_column_after(&anchor, &label_name, labels) {
            Ok(()) => anchor = label_name,
            Err(InputError::DuplicateColumn { column }) => {
                warn!(column = %column, "derived column name already taken");
                warnings.push(PipelineWarning::ColumnCollision { column });
            }
            Err(InputError::UnknownColumn { column }) => {
                // The source column vanished between classification and
                // assembly; nothing to anchor either insertion to.
                warnings.push(PipelineWarning::UnknownColumn { column });
                continue;
            }
            Err(err) => {
                warn!(column = %column.column, %err, "derived label column skipped");
                continue;
            }
        }
        match out.insert_column_after(&anchor, &id_name, ids) {
            Ok(()) => {}
            Err(InputError::DuplicateColumn { column }) => {
                warn!(column = %column, "derived column name already taken");
                warnings.push(PipelineWarning::ColumnCollision { column });
            }
            Err(err) => {
                warn!(column = %column.column, %err, "derived identifier column skipped");
            }
        }
    }

    (out, warnings)
}

// ============================================================================
// Tests
// ============================================================================
