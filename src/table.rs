//! In-memory delimited table.
//!
//! A `Table` is a header row plus data rows of optional cells. Missing and
//! empty cells are both `None`; everything else is kept verbatim, whitespace
//! included, so the exported file reproduces the upload except for the
//! derived columns spliced in next to their sources.

use serde::Serialize;

use crate::error::InputError;

/// Header row plus data rows; cells are `None` when the source cell was empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl Table {
    /// Create an empty table with the given headers.
    pub fn new(headers: Vec<String>) -> Result<Self, InputError> {
        if headers.is_empty() {
            return Err(InputError::EmptyTable);
        }
        Ok(Self {
            headers,
            rows: Vec::new(),
        })
    }

    /// Create a table from headers and data rows. Short rows are padded with
    /// empty cells; long rows are truncated to the header width.
    pub fn from_rows(
        headers: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self, InputError> {
        let mut table = Self::new(headers)?;
        let width = table.headers.len();
        for mut row in rows {
            row.resize(width, None);
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Option<String>]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Borrow one column as a vector of optional cell views.
    pub fn column(&self, name: &str) -> Result<Vec<Option<&str>>, InputError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| InputError::UnknownColumn {
                column: name.to_string(),
            })?;
        Ok(self
            .rows
            .iter()
            .map(|row| row[index].as_deref())
            .collect())
    }

    /// Insert a new column immediately to the right of `anchor`.
    ///
    /// Fails if the anchor is missing, the name is already taken, or the
    /// value count does not line up with the row count.
    pub fn insert_column_after(
        &mut self,
        anchor: &str,
        name: &str,
        values: Vec<Option<String>>,
    ) -> Result<(), InputError> {
        if self.has_column(name) {
            return Err(InputError::DuplicateColumn {
                column: name.to_string(),
            });
        }
        let anchor_index = self
            .column_index(anchor)
            .ok_or_else(|| InputError::UnknownColumn {
                column: anchor.to_string(),
            })?;
        if values.len() != self.rows.len() {
            return Err(InputError::ColumnLength {
                column: name.to_string(),
                expected: self.rows.len(),
                got: values.len(),
            });
        }

        let insert_at = anchor_index + 1;
        self.headers.insert(insert_at, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(insert_at, value);
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
