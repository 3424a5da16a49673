//! Fuzzy matcher for open-ended answers.
//!
//! Every non-empty cell is scored against each vocabulary entry with a
//! normalized Levenshtein ratio and assigned the best entry. Rows whose best
//! ratio does not clear the acceptance threshold are flagged for operator
//! review rather than dropped.

use rayon::prelude::*;
use serde::Serialize;

use crate::error::InputError;

/// Acceptance threshold used when a use case does not override it.
///
/// A match is accepted only when its ratio is strictly greater than the
/// threshold; a ratio exactly at the threshold still goes to review.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Case-insensitive normalized Levenshtein ratio in [0, 1].
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Match verdict for a single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedRow {
    /// Cell content as uploaded, untrimmed. `None` for a missing cell.
    pub original_value: Option<String>,
    /// Best vocabulary entry, verbatim. `None` for empty cells and for an
    /// empty vocabulary.
    pub matched_label: Option<String>,
    /// Ratio of the best entry. `None` only when the cell was empty.
    pub similarity: Option<f64>,
    /// True when the row needs an operator's decision.
    pub needs_review: bool,
}

impl ClassifiedRow {
    fn skipped(original_value: Option<String>) -> Self {
        Self {
            original_value,
            matched_label: None,
            similarity: None,
            needs_review: false,
        }
    }
}

/// One tracked column's worth of verdicts, in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedColumn {
    pub column: String,
    pub rows: Vec<ClassifiedRow>,
}

impl ClassifiedColumn {
    /// Row indices flagged for review, in ascending order.
    pub fn flagged_rows(&self) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.needs_review)
            .map(|(index, _)| index)
            .collect()
    }

    /// Row order with flagged rows first; within each group the original
    /// order is kept. Used for review-first presentation.
    pub fn review_first_order(&self) -> Vec<usize> {
        let mut order = self.flagged_rows();
        order.extend(
            self.rows
                .iter()
                .enumerate()
                .filter(|(_, row)| !row.needs_review)
                .map(|(index, _)| index),
        );
        order
    }
}

/// Scores cells against a fixed vocabulary.
///
/// The vocabulary keeps its configured order; ties on the ratio go to the
/// earlier entry, which makes runs reproducible.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    vocabulary: Vec<String>,
    lowered: Vec<String>,
    threshold: f64,
}

impl FuzzyMatcher {
    /// Build a matcher. The threshold must sit strictly inside (0, 1).
    pub fn new(vocabulary: Vec<String>, threshold: f64) -> Result<Self, InputError> {
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(InputError::ThresholdOutOfRange { value: threshold });
        }
        let lowered = vocabulary.iter().map(|word| word.to_lowercase()).collect();
        Ok(Self {
            vocabulary,
            lowered,
            threshold,
        })
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score one cell.
    ///
    /// Empty and whitespace-only cells pass through unmatched and unflagged.
    /// With an empty vocabulary every non-empty cell scores 0.0 and is
    /// flagged.
    pub fn classify(&self, raw: Option<&str>) -> ClassifiedRow {
        let original_value = raw.map(str::to_string);
        let trimmed = raw.map(str::trim).unwrap_or("");
        if trimmed.is_empty() {
            return ClassifiedRow::skipped(original_value);
        }

        let needle = trimmed.to_lowercase();
        let mut best: Option<(usize, f64)> = None;
        for (index, entry) in self.lowered.iter().enumerate() {
            let ratio = strsim::normalized_levenshtein(&needle, entry);
            let improves = match best {
                None => true,
                Some((_, best_ratio)) => ratio > best_ratio,
            };
            if improves {
                best = Some((index, ratio));
            }
        }

        match best {
            Some((index, similarity)) => ClassifiedRow {
                original_value,
                matched_label: Some(self.vocabulary[index].clone()),
                similarity: Some(similarity),
                needs_review: similarity <= self.threshold,
            },
            None => ClassifiedRow {
                original_value,
                matched_label: None,
                similarity: Some(0.0),
                needs_review: true,
            },
        }
    }

    /// Score a full column of cells in parallel, preserving row order.
    pub fn classify_cells(&self, cells: &[Option<&str>]) -> Vec<ClassifiedRow> {
        cells.par_iter().map(|cell| self.classify(*cell)).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
