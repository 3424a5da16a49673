//! Back-coding session lifecycle.
//!
//! A session walks one uploaded table through the pipeline in fixed stages:
//!
//! ```text
//! Configuring -> Loaded -> Matched ------------+-> Canonicalized -> Exported
//!                             \                |
//!                              -> UnderReview -+
//! ```
//!
//! Matching lands in `Matched` when nothing was flagged and in `UnderReview`
//! otherwise; review resolutions are only accepted in `UnderReview`.
//! Operations attempted in the wrong stage fail with a `StateError` and
//! leave the session exactly as it was. Every stage change is recorded with
//! a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::canonical::{Canonicalizer, EnrichedColumn};
use crate::error::{BackcodeError, InputError, PipelineWarning};
use crate::matcher::{ClassifiedColumn, FuzzyMatcher, DEFAULT_THRESHOLD};
use crate::pipeline;
use crate::review::{ReviewQueue, RowKey};
use crate::rules::{AliasTable, IdentifierTable};
use crate::store::{self, UseCase};
use crate::table::Table;

/// Stage of a back-coding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Collecting configuration; no table loaded yet.
    Configuring,
    /// Table loaded, matcher not run.
    Loaded,
    /// Matcher ran and flagged nothing.
    Matched,
    /// Matcher ran and at least one row awaits review.
    UnderReview,
    /// Rules applied; enriched columns ready.
    Canonicalized,
    /// Output table assembled.
    Exported,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Configuring => "configuring",
            SessionState::Loaded => "loaded",
            SessionState::Matched => "matched",
            SessionState::UnderReview => "under_review",
            SessionState::Canonicalized => "canonicalized",
            SessionState::Exported => "exported",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Exported)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An operation was attempted in a stage that does not allow it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot {action} while the session is {state}")]
pub struct StateError {
    pub action: &'static str,
    pub state: SessionState,
}

/// One recorded stage change.
#[derive(Debug, Clone, Serialize)]
pub struct StageTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
}

/// One table's trip through the back-coding pipeline.
///
/// Construction pulls vocabulary, tracked columns and rule tables from a
/// stored use case; all of them can be overridden before matching. Failed
/// operations never change stored results or the stage.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: Uuid,
    created_at: DateTime<Utc>,
    use_case: String,
    state: SessionState,
    threshold: f64,
    vocabulary: Vec<String>,
    tracked_columns: Vec<String>,
    merges: AliasTable,
    renames: AliasTable,
    identifiers: IdentifierTable,
    table: Option<Table>,
    classified: Vec<ClassifiedColumn>,
    review: ReviewQueue,
    enriched: Vec<EnrichedColumn>,
    output: Option<Table>,
    warnings: Vec<PipelineWarning>,
    history: Vec<StageTransition>,
}

impl Session {
    /// Start a session seeded from a stored use case.
    pub fn new(use_case_name: impl Into<String>, use_case: &UseCase) -> Self {
        let use_case = use_case.clone();
        let mut warnings = Vec::new();
        let (tracked_columns, mut column_warnings) = store::split_words(&use_case.columns);
        warnings.append(&mut column_warnings);
        let (vocabulary, mut word_warnings) = store::split_words(&use_case.recommended);
        warnings.append(&mut word_warnings);

        let session = Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            use_case: use_case_name.into(),
            state: SessionState::Configuring,
            threshold: DEFAULT_THRESHOLD,
            vocabulary,
            tracked_columns,
            merges: use_case.merge_rules(),
            renames: use_case.rename_rules(),
            identifiers: use_case.identifier_rules(),
            table: None,
            classified: Vec::new(),
            review: ReviewQueue::default(),
            enriched: Vec::new(),
            output: None,
            warnings,
            history: Vec::new(),
        };
        info!(
            session_id = %session.session_id,
            use_case = %session.use_case,
            "session started"
        );
        session
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn use_case(&self) -> &str {
        &self.use_case
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn tracked_columns(&self) -> &[String] {
        &self.tracked_columns
    }

    pub fn classified(&self) -> &[ClassifiedColumn] {
        &self.classified
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.review
    }

    pub fn enriched(&self) -> &[EnrichedColumn] {
        &self.enriched
    }

    pub fn output_table(&self) -> Option<&Table> {
        self.output.as_ref()
    }

    pub fn warnings(&self) -> &[PipelineWarning] {
        &self.warnings
    }

    pub fn history(&self) -> &[StageTransition] {
        &self.history
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Override the acceptance threshold. Allowed until the matcher runs.
    pub fn set_threshold(&mut self, threshold: f64) -> Result<(), BackcodeError> {
        self.expect_state(
            "set the threshold",
            &[SessionState::Configuring, SessionState::Loaded],
        )?;
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(InputError::ThresholdOutOfRange { value: threshold }.into());
        }
        self.threshold = threshold;
        Ok(())
    }

    /// Override the vocabulary. Entries are trimmed; blank entries are
    /// dropped with a warning. An entirely blank list is rejected.
    pub fn set_vocabulary(&mut self, words: Vec<String>) -> Result<(), BackcodeError> {
        self.expect_state(
            "set the vocabulary",
            &[SessionState::Configuring, SessionState::Loaded],
        )?;
        let mut cleaned = Vec::with_capacity(words.len());
        let mut warnings = Vec::new();
        for (index, word) in words.iter().enumerate() {
            let trimmed = word.trim();
            if trimmed.is_empty() {
                warnings.push(PipelineWarning::BlankWordEntry {
                    position: index + 1,
                });
            } else {
                cleaned.push(trimmed.to_string());
            }
        }
        if cleaned.is_empty() {
            return Err(InputError::EmptyWordList.into());
        }
        self.vocabulary = cleaned;
        self.warnings.extend(warnings);
        Ok(())
    }

    /// Override which columns the matcher walks. Allowed until the matcher
    /// runs.
    pub fn set_tracked_columns(&mut self, columns: Vec<String>) -> Result<(), BackcodeError> {
        self.expect_state(
            "set the tracked columns",
            &[SessionState::Configuring, SessionState::Loaded],
        )?;
        let mut cleaned = Vec::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let trimmed = column.trim();
            if trimmed.is_empty() {
                self.warnings.push(PipelineWarning::BlankWordEntry {
                    position: index + 1,
                });
            } else {
                cleaned.push(trimmed.to_string());
            }
        }
        self.tracked_columns = cleaned;
        Ok(())
    }

    /// Replace the merge rules. Allowed any time before canonicalization.
    pub fn set_merge_rules(&mut self, rules: AliasTable) -> Result<(), BackcodeError> {
        self.expect_state("set the merge rules", Self::PRE_CANONICAL)?;
        rules.validate()?;
        self.merges = rules;
        Ok(())
    }

    /// Replace the rename rules. Allowed any time before canonicalization.
    pub fn set_rename_rules(&mut self, rules: AliasTable) -> Result<(), BackcodeError> {
        self.expect_state("set the rename rules", Self::PRE_CANONICAL)?;
        rules.validate()?;
        self.renames = rules;
        Ok(())
    }

    /// Replace the identifier table. Allowed any time before
    /// canonicalization; an empty table only fails once canonicalization
    /// needs a fallback.
    pub fn set_identifier_rules(&mut self, rules: IdentifierTable) -> Result<(), BackcodeError> {
        self.expect_state("set the identifier rules", Self::PRE_CANONICAL)?;
        self.identifiers = rules;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pipeline stages
    // ------------------------------------------------------------------

    /// Load the uploaded table and move to `Loaded`.
    pub fn load_table(&mut self, table: Table) -> Result<(), BackcodeError> {
        self.expect_state("load a table", &[SessionState::Configuring])?;
        self.table = Some(table);
        self.transition(SessionState::Loaded);
        Ok(())
    }

    /// Distinct trimmed values across the tracked columns, for vocabulary
    /// curation. Available from `Loaded` onward.
    pub fn unique_values(&self) -> Result<(Vec<String>, Vec<PipelineWarning>), BackcodeError> {
        self.expect_state(
            "list unique values",
            &[
                SessionState::Loaded,
                SessionState::Matched,
                SessionState::UnderReview,
            ],
        )?;
        let table = self.table_ref("list unique values")?;
        Ok(pipeline::unique_values(table, &self.tracked_columns))
    }

    /// Run the fuzzy matcher over every tracked column.
    ///
    /// Moves to `UnderReview` when any row was flagged, `Matched` otherwise.
    pub fn run_matcher(&mut self) -> Result<&[ClassifiedColumn], BackcodeError> {
        self.expect_state("run the matcher", &[SessionState::Loaded])?;
        if self.vocabulary.is_empty() {
            return Err(InputError::EmptyWordList.into());
        }
        if self.tracked_columns.is_empty() {
            warn!(session_id = %self.session_id, "no tracked columns configured");
        }
        let matcher = FuzzyMatcher::new(self.vocabulary.clone(), self.threshold)?;
        let table = self.table_ref("run the matcher")?;
        let outcome = pipeline::classify_columns(table, &self.tracked_columns, &matcher);
        let review = ReviewQueue::from_columns(&outcome.columns, &self.vocabulary);

        let flagged = outcome.flagged_count();
        info!(
            session_id = %self.session_id,
            columns = outcome.columns.len(),
            flagged,
            "matcher pass finished"
        );

        self.classified = outcome.columns;
        self.warnings.extend(outcome.warnings);
        self.review = review;
        if self.review.is_empty() {
            self.transition(SessionState::Matched);
        } else {
            self.transition(SessionState::UnderReview);
        }
        Ok(&self.classified)
    }

    /// Record an operator decision for one flagged row.
    pub fn resolve(&mut self, key: &RowKey, label: &str) -> Result<(), BackcodeError> {
        self.expect_state("resolve a review entry", &[SessionState::UnderReview])?;
        self.review.resolve(key, label)?;
        Ok(())
    }

    /// Apply review resolutions and the rule tables, moving to
    /// `Canonicalized`.
    ///
    /// Unresolved review entries keep their suggested label. Configuration
    /// problems (rule cycles, an unusable identifier table) fail the whole
    /// step and leave the session where it was.
    pub fn canonicalize(&mut self) -> Result<&[EnrichedColumn], BackcodeError> {
        self.expect_state(
            "canonicalize",
            &[SessionState::Matched, SessionState::UnderReview],
        )?;
        self.merges.validate()?;
        self.renames.validate()?;
        let canonicalizer = Canonicalizer::new(
            self.merges.clone(),
            self.renames.clone(),
            self.identifiers.clone(),
        )?;

        let mut classified = self.classified.clone();
        self.review.apply(&mut classified);
        let enriched = pipeline::canonicalize_columns(&classified, &canonicalizer);

        info!(
            session_id = %self.session_id,
            columns = enriched.len(),
            fallback = canonicalizer.fallback_identifier(),
            "canonicalization finished"
        );

        self.classified = classified;
        self.enriched = enriched;
        self.transition(SessionState::Canonicalized);
        Ok(&self.enriched)
    }

    /// Splice the derived columns into a copy of the uploaded table and move
    /// to `Exported`.
    pub fn assemble(&mut self) -> Result<&Table, BackcodeError> {
        self.expect_state("assemble the output", &[SessionState::Canonicalized])?;
        let table = self.table_ref("assemble the output")?;
        let (output, warnings) = pipeline::assemble(table, &self.enriched);

        self.warnings.extend(warnings);
        self.transition(SessionState::Exported);
        Ok(self.output.insert(output))
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    const PRE_CANONICAL: &'static [SessionState] = &[
        SessionState::Configuring,
        SessionState::Loaded,
        SessionState::Matched,
        SessionState::UnderReview,
    ];

    fn expect_state(
        &self,
        action: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), StateError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(StateError {
                action,
                state: self.state,
            })
        }
    }

    fn table_ref(&self, action: &'static str) -> Result<&Table, StateError> {
        self.table.as_ref().ok_or(StateError {
            action,
            state: self.state,
        })
    }

    fn transition(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.state, to);
        info!(
            session_id = %self.session_id,
            from = %from,
            to = %to,
            "session stage changed"
        );
        self.history.push(StageTransition {
            from,
            to,
            at: Utc::now(),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cell(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    fn telco_use_case() -> UseCase {
        UseCase {
            mergers: HashMap::from([("mobitel".to_string(), "telekom".to_string())]),
            renamers: HashMap::new(),
            identifiers: HashMap::from([
                ("telekom".to_string(), "1".to_string()),
                ("a1".to_string(), "2".to_string()),
            ]),
            columns: "provider".to_string(),
            recommended: "telekom, a1".to_string(),
        }
    }

    fn provider_table(cells: &[&str]) -> Table {
        Table::from_rows(
            vec!["id".to_string(), "provider".to_string()],
            cells
                .iter()
                .enumerate()
                .map(|(index, value)| {
                    vec![
                        cell(&index.to_string()),
                        if value.is_empty() { None } else { cell(value) },
                    ]
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_session_seeds_from_the_use_case() {
        let session = Session::new("telco", &telco_use_case());
        assert_eq!(session.state(), SessionState::Configuring);
        assert_eq!(session.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(session.vocabulary(), &["telekom", "a1"]);
        assert_eq!(session.tracked_columns(), &["provider"]);
        assert!(session.warnings().is_empty());
    }

    #[test]
    fn test_clean_match_lands_in_matched() {
        let mut session = Session::new("telco", &telco_use_case());
        session.load_table(provider_table(&["telekom", "a1"])).unwrap();
        session.run_matcher().unwrap();
        assert_eq!(session.state(), SessionState::Matched);
        assert!(session.review_queue().is_empty());
    }

    #[test]
    fn test_flagged_match_lands_in_under_review() {
        let mut session = Session::new("telco", &telco_use_case());
        session
            .load_table(provider_table(&["telekom slovenije"]))
            .unwrap();
        session.run_matcher().unwrap();
        assert_eq!(session.state(), SessionState::UnderReview);
        assert_eq!(session.review_queue().len(), 1);
    }

    #[test]
    fn test_operations_out_of_stage_are_rejected() {
        let mut session = Session::new("telco", &telco_use_case());
        // Matcher before any table.
        let err = session.run_matcher().unwrap_err();
        assert!(matches!(err, BackcodeError::State(_)));
        // Resolving before matching.
        let err = session
            .resolve(&RowKey::new("provider", 0), "telekom")
            .unwrap_err();
        assert!(matches!(err, BackcodeError::State(_)));
        // Loading twice.
        session.load_table(provider_table(&["telekom"])).unwrap();
        let err = session.load_table(provider_table(&["a1"])).unwrap_err();
        assert!(matches!(err, BackcodeError::State(_)));
    }

    #[test]
    fn test_failed_guard_leaves_the_session_untouched() {
        let mut session = Session::new("telco", &telco_use_case());
        let before = session.state();
        let _ = session.assemble().unwrap_err();
        assert_eq!(session.state(), before);
        assert!(session.output_table().is_none());
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_threshold_validation() {
        let mut session = Session::new("telco", &telco_use_case());
        for bad in [0.0, 1.0, 2.0] {
            let err = session.set_threshold(bad).unwrap_err();
            assert!(matches!(err, BackcodeError::Input(_)));
        }
        session.set_threshold(0.85).unwrap();
        assert_eq!(session.threshold(), 0.85);
    }

    #[test]
    fn test_threshold_is_frozen_once_the_matcher_ran() {
        let mut session = Session::new("telco", &telco_use_case());
        session.load_table(provider_table(&["telekom"])).unwrap();
        session.run_matcher().unwrap();
        let err = session.set_threshold(0.9).unwrap_err();
        assert!(matches!(err, BackcodeError::State(_)));
    }

    #[test]
    fn test_blank_vocabulary_entries_warn_and_drop() {
        let mut session = Session::new("telco", &telco_use_case());
        session
            .set_vocabulary(vec![
                "telekom".to_string(),
                "  ".to_string(),
                "a1".to_string(),
            ])
            .unwrap();
        assert_eq!(session.vocabulary(), &["telekom", "a1"]);
        assert_eq!(
            session.warnings(),
            &[PipelineWarning::BlankWordEntry { position: 2 }]
        );
    }

    #[test]
    fn test_fully_blank_vocabulary_is_rejected() {
        let mut session = Session::new("telco", &telco_use_case());
        let err = session
            .set_vocabulary(vec!["".to_string(), " ".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            BackcodeError::Input(InputError::EmptyWordList)
        ));
    }

    #[test]
    fn test_full_run_reaches_exported() {
        let mut session = Session::new("telco", &telco_use_case());
        session
            .load_table(provider_table(&["telekom", "mobitel", ""]))
            .unwrap();
        session.run_matcher().unwrap();
        // "mobitel" shares letters with "telekom" but almost none in place,
        // so it lands in review.
        assert_eq!(session.state(), SessionState::UnderReview);
        session
            .resolve(&RowKey::new("provider", 1), "telekom")
            .unwrap();
        session.canonicalize().unwrap();
        assert_eq!(session.state(), SessionState::Canonicalized);
        let output = session.assemble().unwrap();
        assert_eq!(
            output.headers(),
            &["id", "provider", "provider_best_match", "provider_identifier"]
        );
        assert_eq!(session.state(), SessionState::Exported);
        assert!(session.state().is_terminal());

        let labels = session
            .output_table()
            .unwrap()
            .column("provider_best_match")
            .unwrap();
        assert_eq!(labels, vec![Some("telekom"), Some("telekom"), None]);
        let ids = session
            .output_table()
            .unwrap()
            .column("provider_identifier")
            .unwrap();
        assert_eq!(ids, vec![Some("1"), Some("1"), None]);
    }

    #[test]
    fn test_unresolved_entries_keep_their_suggestion() {
        let mut session = Session::new("telco", &telco_use_case());
        session
            .load_table(provider_table(&["telekom slovenije"]))
            .unwrap();
        session.run_matcher().unwrap();
        session.canonicalize().unwrap();
        let enriched = &session.enriched()[0].rows[0];
        assert_eq!(enriched.matched_label.as_deref(), Some("telekom"));
        assert!(enriched.needs_review);
        assert_eq!(enriched.identifier.as_deref(), Some("1"));
    }

    #[test]
    fn test_canonicalize_failure_is_all_or_nothing() {
        let mut session = Session::new("telco", &telco_use_case());
        session
            .set_identifier_rules(IdentifierTable::new())
            .unwrap();
        session.load_table(provider_table(&["telekom"])).unwrap();
        session.run_matcher().unwrap();
        let before = session.state();
        let err = session.canonicalize().unwrap_err();
        assert!(matches!(err, BackcodeError::Config(_)));
        assert_eq!(session.state(), before);
        assert!(session.enriched().is_empty());
    }

    #[test]
    fn test_cyclic_merge_rules_fail_canonicalization() {
        let mut session = Session::new("telco", &telco_use_case());
        let mut cyclic = AliasTable::new();
        cyclic.insert("a", "b");
        cyclic.insert("b", "a");
        let err = session.set_merge_rules(cyclic).unwrap_err();
        assert!(matches!(err, BackcodeError::Config(_)));
    }

    #[test]
    fn test_history_records_every_stage_change() {
        let mut session = Session::new("telco", &telco_use_case());
        session.load_table(provider_table(&["telekom"])).unwrap();
        session.run_matcher().unwrap();
        session.canonicalize().unwrap();
        session.assemble().unwrap();
        let states: Vec<(SessionState, SessionState)> = session
            .history()
            .iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(
            states,
            vec![
                (SessionState::Configuring, SessionState::Loaded),
                (SessionState::Loaded, SessionState::Matched),
                (SessionState::Matched, SessionState::Canonicalized),
                (SessionState::Canonicalized, SessionState::Exported),
            ]
        );
    }
}
