//! Operator review queue for low-confidence matches.
//!
//! Every flagged row becomes a queue entry keyed by (column, row index).
//! The operator may pick any vocabulary entry or the `unknown` sentinel;
//! repeated picks for the same row simply replace the earlier one. Unresolved
//! entries keep their suggested label and stay flagged all the way through
//! export.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::matcher::ClassifiedColumn;

/// Sentinel label for answers the operator cannot map to any vocabulary
/// entry. Downstream it behaves like a regular label and picks up the
/// fallback identifier.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Queue key: tracked column name plus zero-based data row index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub column: String,
    pub row: usize,
}

impl RowKey {
    pub fn new(column: impl Into<String>, row: usize) -> Self {
        Self {
            column: column.into(),
            row,
        }
    }
}

/// One flagged row awaiting (or holding) an operator decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEntry {
    pub original_value: Option<String>,
    /// Best match the fuzzy pass suggested, if any.
    pub suggested: Option<String>,
    pub similarity: Option<f64>,
    /// The operator's pick, once made.
    pub resolution: Option<String>,
}

impl ReviewEntry {
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Label the row will carry forward: the resolution when present,
    /// otherwise the suggestion.
    pub fn effective_label(&self) -> Option<&str> {
        self.resolution.as_deref().or(self.suggested.as_deref())
    }
}

/// Flagged rows in deterministic (column, row) order.
#[derive(Debug, Clone, Default)]
pub struct ReviewQueue {
    entries: BTreeMap<RowKey, ReviewEntry>,
    vocabulary: Vec<String>,
}

impl ReviewQueue {
    /// Collect every flagged row from the classified columns.
    pub fn from_columns(columns: &[ClassifiedColumn], vocabulary: &[String]) -> Self {
        let mut entries = BTreeMap::new();
        for column in columns {
            for (index, row) in column.rows.iter().enumerate() {
                if row.needs_review {
                    entries.insert(
                        RowKey::new(column.column.clone(), index),
                        ReviewEntry {
                            original_value: row.original_value.clone(),
                            suggested: row.matched_label.clone(),
                            similarity: row.similarity,
                            resolution: None,
                        },
                    );
                }
            }
        }
        Self {
            entries,
            vocabulary: vocabulary.to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.entries.values().filter(|e| !e.is_resolved()).count()
    }

    pub fn resolved_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_resolved()).count()
    }

    pub fn get(&self, key: &RowKey) -> Option<&ReviewEntry> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &ReviewEntry)> {
        self.entries.iter()
    }

    pub fn pending(&self) -> impl Iterator<Item = (&RowKey, &ReviewEntry)> {
        self.entries.iter().filter(|(_, e)| !e.is_resolved())
    }

    /// Labels an operator may pick: the sentinel first, then the vocabulary
    /// in its configured order.
    pub fn selectable_labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.vocabulary.len() + 1);
        labels.push(UNKNOWN_LABEL.to_string());
        labels.extend(self.vocabulary.iter().cloned());
        labels
    }

    /// Record an operator decision for one flagged row.
    ///
    /// The label is matched case-insensitively against the selectable set
    /// and stored in its configured casing. Resolving the same row again
    /// replaces the earlier pick.
    pub fn resolve(&mut self, key: &RowKey, label: &str) -> Result<(), InputError> {
        let trimmed = label.trim();
        let resolved = if trimmed.eq_ignore_ascii_case(UNKNOWN_LABEL) {
            UNKNOWN_LABEL.to_string()
        } else {
            self.vocabulary
                .iter()
                .find(|entry| entry.to_lowercase() == trimmed.to_lowercase())
                .cloned()
                .ok_or_else(|| InputError::LabelNotSelectable {
                    label: label.to_string(),
                })?
        };

        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| InputError::UnknownReviewKey {
                column: key.column.clone(),
                row: key.row,
            })?;
        entry.resolution = Some(resolved);
        Ok(())
    }

    /// Write resolutions back into the classified columns. Resolved rows get
    /// the picked label and drop their review flag; unresolved rows keep the
    /// suggestion and stay flagged.
    pub fn apply(&self, columns: &mut [ClassifiedColumn]) {
        for (key, entry) in &self.entries {
            let Some(resolution) = entry.resolution.clone() else {
                continue;
            };
            let Some(column) = columns.iter_mut().find(|c| c.column == key.column) else {
                tracing::warn!(column = %key.column, "resolution targets a column that is no longer classified");
                continue;
            };
            match column.rows.get_mut(key.row) {
                Some(row) => {
                    row.matched_label = Some(resolution);
                    row.needs_review = false;
                }
                None => {
                    tracing::warn!(
                        column = %key.column,
                        row = key.row,
                        "resolution targets a row outside the classified range"
                    );
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::ClassifiedRow;

    fn classified() -> Vec<ClassifiedColumn> {
        vec![ClassifiedColumn {
            column: "provider".to_string(),
            rows: vec![
                ClassifiedRow {
                    original_value: Some("telekom".to_string()),
                    matched_label: Some("telekom".to_string()),
                    similarity: Some(1.0),
                    needs_review: false,
                },
                ClassifiedRow {
                    original_value: Some("telekom slovenije".to_string()),
                    matched_label: Some("telekom".to_string()),
                    similarity: Some(0.41),
                    needs_review: true,
                },
                ClassifiedRow {
                    original_value: Some("gibberish".to_string()),
                    matched_label: Some("a1".to_string()),
                    similarity: Some(0.1),
                    needs_review: true,
                },
            ],
        }]
    }

    fn vocabulary() -> Vec<String> {
        vec!["telekom".to_string(), "a1".to_string()]
    }

    #[test]
    fn test_queue_collects_only_flagged_rows() {
        let queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        assert_eq!(queue.len(), 2);
        assert!(queue.get(&RowKey::new("provider", 0)).is_none());
        let entry = queue.get(&RowKey::new("provider", 1)).unwrap();
        assert_eq!(entry.suggested.as_deref(), Some("telekom"));
        assert!(!entry.is_resolved());
    }

    #[test]
    fn test_selectable_labels_lead_with_the_sentinel() {
        let queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        assert_eq!(queue.selectable_labels(), vec!["unknown", "telekom", "a1"]);
    }

    #[test]
    fn test_resolve_records_the_pick() {
        let mut queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        queue.resolve(&RowKey::new("provider", 1), "telekom").unwrap();
        let entry = queue.get(&RowKey::new("provider", 1)).unwrap();
        assert_eq!(entry.resolution.as_deref(), Some("telekom"));
        assert_eq!(queue.pending_count(), 1);
        assert_eq!(queue.resolved_count(), 1);
    }

    #[test]
    fn test_resolve_again_replaces_the_earlier_pick() {
        let mut queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        let key = RowKey::new("provider", 2);
        queue.resolve(&key, "a1").unwrap();
        queue.resolve(&key, "unknown").unwrap();
        assert_eq!(queue.get(&key).unwrap().resolution.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_resolve_normalizes_label_casing_to_the_vocabulary() {
        let mut queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        let key = RowKey::new("provider", 1);
        queue.resolve(&key, "  TELEKOM ").unwrap();
        assert_eq!(queue.get(&key).unwrap().resolution.as_deref(), Some("telekom"));
    }

    #[test]
    fn test_resolve_rejects_labels_outside_the_selectable_set() {
        let mut queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        let err = queue
            .resolve(&RowKey::new("provider", 1), "t-2")
            .unwrap_err();
        assert!(matches!(err, InputError::LabelNotSelectable { .. }));
    }

    #[test]
    fn test_resolve_rejects_rows_that_were_never_flagged() {
        let mut queue = ReviewQueue::from_columns(&classified(), &vocabulary());
        let err = queue
            .resolve(&RowKey::new("provider", 0), "telekom")
            .unwrap_err();
        assert!(matches!(err, InputError::UnknownReviewKey { row: 0, .. }));
    }

    #[test]
    fn test_apply_updates_resolved_rows_and_keeps_the_rest() {
        let mut columns = classified();
        let mut queue = ReviewQueue::from_columns(&columns, &vocabulary());
        queue.resolve(&RowKey::new("provider", 2), "unknown").unwrap();
        queue.apply(&mut columns);

        let rows = &columns[0].rows;
        // Row 1 was left unresolved: suggestion kept, still flagged.
        assert_eq!(rows[1].matched_label.as_deref(), Some("telekom"));
        assert!(rows[1].needs_review);
        // Row 2 was resolved to the sentinel.
        assert_eq!(rows[2].matched_label.as_deref(), Some("unknown"));
        assert!(!rows[2].needs_review);
    }

    #[test]
    fn test_effective_label_prefers_the_resolution() {
        let entry = ReviewEntry {
            original_value: Some("x".to_string()),
            suggested: Some("telekom".to_string()),
            similarity: Some(0.3),
            resolution: Some("a1".to_string()),
        };
        assert_eq!(entry.effective_label(), Some("a1"));
    }
}
