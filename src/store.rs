//! YAML-backed use-case registry.
//!
//! A use case bundles everything one survey domain needs: tracked columns,
//! recommended vocabulary, and the merge/rename/identifier tables. The
//! registry lives in a single YAML file:
//!
//! ```yaml
//! use_cases:
//!   telco:
//!     mergers:
//!       mobitel: telekom
//!     renamers:
//!       telekom: telekom slovenije
//!     identifiers:
//!       telekom slovenije: "1"
//!       a1: "2"
//!     columns: provider
//!     recommended: telekom, a1
//! ```
//!
//! `columns` and `recommended` are comma-separated lists, kept as strings so
//! the file stays easy to hand-edit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConfigError, PipelineWarning};
use crate::rules::{AliasTable, IdentifierTable};

/// Environment variable overriding the registry location.
pub const CONFIG_ENV_VAR: &str = "BACKCODE_CONFIG";

/// Registry location when no override is set.
pub const DEFAULT_CONFIG_PATH: &str = "config/use_cases.yaml";

/// Split a comma-separated list into trimmed entries.
///
/// Blank entries (including trailing commas) are dropped and reported with
/// their one-based position. A fully blank input yields no entries and no
/// warnings.
pub fn split_words(raw: &str) -> (Vec<String>, Vec<PipelineWarning>) {
    let mut words = Vec::new();
    let mut warnings = Vec::new();
    if raw.trim().is_empty() {
        return (words, warnings);
    }
    for (index, item) in raw.split(',').enumerate() {
        let trimmed = item.trim();
        if trimmed.is_empty() {
            warnings.push(PipelineWarning::BlankWordEntry {
                position: index + 1,
            });
        } else {
            words.push(trimmed.to_string());
        }
    }
    (words, warnings)
}

/// Stored configuration for one survey domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UseCase {
    /// Merge rules: variant label -> group label.
    pub mergers: HashMap<String, String>,
    /// Rename rules: working label -> published label.
    pub renamers: HashMap<String, String>,
    /// Identifier table: label -> numeric code (kept as strings).
    pub identifiers: HashMap<String, String>,
    /// Comma-separated tracked column names.
    pub columns: String,
    /// Comma-separated recommended vocabulary.
    pub recommended: String,
}

impl UseCase {
    /// Tracked columns, trimmed, blanks dropped.
    pub fn tracked_columns(&self) -> Vec<String> {
        split_words(&self.columns).0
    }

    /// Recommended vocabulary, trimmed, blanks dropped.
    pub fn recommended_words(&self) -> Vec<String> {
        split_words(&self.recommended).0
    }

    pub fn merge_rules(&self) -> AliasTable {
        AliasTable::from_pairs(self.mergers.clone())
    }

    pub fn rename_rules(&self) -> AliasTable {
        AliasTable::from_pairs(self.renamers.clone())
    }

    pub fn identifier_rules(&self) -> IdentifierTable {
        IdentifierTable::from_pairs(self.identifiers.clone())
    }
}

/// The whole registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UseCaseStore {
    use_cases: HashMap<String, UseCase>,
}

impl UseCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry path: the `BACKCODE_CONFIG` override when set, otherwise
    /// `config/use_cases.yaml`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read use-case store: {}", path.display()))?;
        let store: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse use-case store: {}", path.display()))?;
        info!(
            use_cases = store.use_cases.len(),
            path = %path.display(),
            "use-case store loaded"
        );
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store directory: {}", parent.display())
                })?;
            }
        }
        let content =
            serde_yaml::to_string(self).context("Failed to serialize use-case store")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write use-case store: {}", path.display()))?;
        info!(
            use_cases = self.use_cases.len(),
            path = %path.display(),
            "use-case store saved"
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> std::result::Result<&UseCase, ConfigError> {
        self.use_cases
            .get(name)
            .ok_or_else(|| ConfigError::UnknownUseCase {
                name: name.to_string(),
            })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.use_cases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn upsert(&mut self, name: impl Into<String>, use_case: UseCase) {
        self.use_cases.insert(name.into(), use_case);
    }

    pub fn remove(&mut self, name: &str) -> Option<UseCase> {
        self.use_cases.remove(name)
    }

    pub fn len(&self) -> usize {
        self.use_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.use_cases.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
