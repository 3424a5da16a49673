//! Delimited file I/O for tables.
//!
//! The delimiter is always explicit; nothing is sniffed from the file. Empty
//! cells become `None` on the way in and empty strings on the way out, so a
//! read/write round trip reproduces the file.

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::error::InputError;
use crate::table::Table;

/// Parse a CLI delimiter argument into its byte. Accepts a single-byte
/// character, or `tab` / `\t` for tab-separated files.
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "tab" | "\\t" => Ok(b'\t'),
        _ => {
            let bytes = raw.as_bytes();
            if bytes.len() == 1 {
                Ok(bytes[0])
            } else {
                bail!("Delimiter must be a single byte, got '{raw}'");
            }
        }
    }
}

/// Read a delimited table from any reader.
///
/// The first record is the header row; a file without one is rejected as an
/// empty table. Ragged data rows are padded (or truncated) to the header
/// width.
pub fn read_table_from<R: Read>(reader: R, delimiter: u8) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()
        .context("Failed to read the header row")?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(InputError::EmptyTable.into());
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.context("Failed to read a data row")?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(Table::from_rows(headers, rows)?)
}

/// Read a delimited table from a file.
pub fn read_table(path: impl AsRef<Path>, delimiter: u8) -> Result<Table> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open table: {}", path.display()))?;
    read_table_from(file, delimiter)
        .with_context(|| format!("Failed to read table: {}", path.display()))
}

/// Write a table to any writer.
pub fn write_table_to<W: Write>(table: &Table, writer: W, delimiter: u8) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer);
    csv_writer
        .write_record(table.headers())
        .context("Failed to write the header row")?;
    for row in table.rows() {
        csv_writer
            .write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
            .context("Failed to write a data row")?;
    }
    csv_writer.flush().context("Failed to flush the output")?;
    Ok(())
}

/// Write a table to a file.
pub fn write_table(table: &Table, path: impl AsRef<Path>, delimiter: u8) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    write_table_to(table, file, delimiter)
        .with_context(|| format!("Failed to write table: {}", path.display()))
}

// ============================================================================
// Tests
// ============================================================================
