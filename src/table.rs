//! CSV parsing for uploads.
//!
//! Turns raw bytes into a [`Table`]. The first record is the header; rows
//! whose cells are all blank are skipped, short rows are padded with empty
//! cells, and cells beyond the header width are an error. Header names and
//! cells are kept verbatim, including surrounding spaces.

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use sha2::{Digest, Sha256};

use crate::models::Table;

pub fn parse_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if columns.iter().all(|c| c.is_empty()) {
        bail!("CSV has no header row");
    }

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV record {}", index + 1))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if record.len() > columns.len() {
            bail!(
                "CSV record {} has {} fields but the header has {}",
                index + 1,
                record.len(),
                columns.len()
            );
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(columns.len(), String::new());
        rows.push(row);
    }

    Ok(Table { columns, rows })
}

/// Hex SHA-256 of the uploaded bytes, recorded in index metadata.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
