//! Core data models used throughout csv-rag.
//!
//! These types represent the tables, documents, and index metadata that flow
//! through the ingest and ask pipeline.

use serde::{Deserialize, Serialize};

/// A parsed, rectangular CSV: one header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Provenance of a document: the upload it came from and its row position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source: String,
    /// Zero-based row position at ingest time.
    #[serde(default)]
    pub row: Option<i64>,
}

/// One retrievable unit: the text rendering of a single CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Row id used for citations and deduplication; `-1` when unknown.
    pub fn row_id(&self) -> i64 {
        self.metadata.row.unwrap_or(-1)
    }
}

/// Descriptive record of the most recent ingest, written to `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Fresh for every ingest; returned with answers so stale citations can be detected.
    pub index_id: String,
    pub source_name: String,
    pub row_count: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dims: usize,
    pub created_utc: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha256: Option<String>,
}
