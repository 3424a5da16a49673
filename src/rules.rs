//! Rule tables used by canonicalization.
//!
//! Two kinds of stored mappings: alias tables (merge and rename rules, both
//! label-to-label) and the identifier table (label to numeric code). Keys are
//! matched case-insensitively; replacement values and identifier strings are
//! kept exactly as configured.

use std::collections::{HashMap, HashSet};

use crate::error::ConfigError;

/// Label-to-label lookup with case-insensitive keys.
///
/// `resolve_once` is the lookup canonicalization uses: a single hop, no
/// chain following. `resolve_transitive` follows chains to a fixed point and
/// is what `validate` leans on to reject cycles.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs. Keys are lowercased; when two keys
    /// collide after lowercasing the later pair wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::new();
        for (from, to) in pairs {
            table.insert(&from, &to);
        }
        table
    }

    pub fn insert(&mut self, from: &str, to: &str) {
        self.entries.insert(from.to_lowercase(), to.to_string());
    }

    pub fn remove(&mut self, from: &str) -> Option<String> {
        self.entries.remove(&from.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One lookup hop. Unknown labels come back unchanged.
    pub fn resolve_once(&self, label: &str) -> String {
        self.entries
            .get(&label.to_lowercase())
            .cloned()
            .unwrap_or_else(|| label.to_string())
    }

    /// Follow the rule chain to its fixed point.
    ///
    /// A key mapped to itself is a no-op and resolves immediately; loops of
    /// two or more labels are reported as a cycle.
    pub fn resolve_transitive(&self, label: &str) -> Result<String, ConfigError> {
        let mut current = label.to_string();
        let mut seen = HashSet::new();
        seen.insert(current.to_lowercase());

        loop {
            let Some(next) = self.entries.get(&current.to_lowercase()) else {
                return Ok(current);
            };
            if next.to_lowercase() == current.to_lowercase() {
                return Ok(next.clone());
            }
            if !seen.insert(next.to_lowercase()) {
                return Err(ConfigError::AliasCycle {
                    label: label.to_string(),
                });
            }
            current = next.clone();
        }
    }

    /// Reject tables whose rules loop. Self-mappings are allowed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for key in self.entries.keys() {
            self.resolve_transitive(key)?;
        }
        Ok(())
    }
}

/// Label-to-identifier lookup with case-insensitive keys.
#[derive(Debug, Clone, Default)]
pub struct IdentifierTable {
    entries: HashMap<String, String>,
}

impl IdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = Self::new();
        for (label, id) in pairs {
            table.insert(&label, &id);
        }
        table
    }

    pub fn insert(&mut self, label: &str, id: &str) {
        self.entries.insert(label.to_lowercase(), id.to_string());
    }

    pub fn remove(&mut self, label: &str) -> Option<String> {
        self.entries.remove(&label.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, label: &str) -> Option<&str> {
        self.entries.get(&label.to_lowercase()).map(String::as_str)
    }

    /// Fallback code for labels missing from the table: one past the largest
    /// configured identifier.
    ///
    /// Empty and non-numeric tables cannot produce a fallback and are
    /// configuration errors.
    pub fn next_identifier(&self) -> Result<i64, ConfigError> {
        if self.entries.is_empty() {
            return Err(ConfigError::EmptyIdentifierTable);
        }
        let mut max = i64::MIN;
        for (label, value) in &self.entries {
            let parsed: i64 =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::NonNumericIdentifier {
                        label: label.clone(),
                        value: value.clone(),
                    })?;
            max = max.max(parsed);
        }
        Ok(max + 1)
    }
}

// ============================================================================
// Tests
// ============================================================================
