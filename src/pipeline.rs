//! Ingest and ask orchestration.
//!
//! [`Rag`] owns the configured providers and the single live index. The
//! index lives in an [`IndexSlot`]: readers take a cheap `Arc` snapshot and
//! release the lock immediately, and ingest swaps in a fully built and
//! persisted index with one write. A question in flight during an ingest
//! therefore completes against whichever index it started with.
//!
//! ```text
//! ingest: Table ─▶ rows_to_documents ─▶ VectorIndex::build ─▶ persist ─▶ swap
//! ask:    question ─▶ retrieve ─▶ build_prompt ─▶ Responder::respond
//! ```

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::index::VectorIndex;
use crate::models::{IndexMetadata, Table};
use crate::prompt::{build_prompt, PromptBudget};
use crate::respond::{Answer, Responder};
use crate::retrieve::{retrieve, RetrievalParams};
use crate::serialize::rows_to_documents;
use crate::table::{fingerprint, parse_csv};

/// Failures surfaced by the pipeline to its callers.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("CSV is empty")]
    EmptyTable,
    #[error("Index not built. Upload a CSV and /ingest first.")]
    NoIndex,
    #[error("Invalid CSV: {0:#}")]
    Csv(anyhow::Error),
    #[error("Embedding failed: {0:#}")]
    Embedding(anyhow::Error),
    #[error("Index storage failed: {0:#}")]
    Storage(anyhow::Error),
}

/// The one live index, swapped atomically on ingest.
#[derive(Default)]
pub struct IndexSlot {
    current: RwLock<Option<Arc<VectorIndex>>>,
}

impl IndexSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current index, if any.
    pub async fn current(&self) -> Option<Arc<VectorIndex>> {
        self.current.read().await.clone()
    }

    /// Replace the current index, returning the previous one.
    pub async fn replace(&self, index: Arc<VectorIndex>) -> Option<Arc<VectorIndex>> {
        self.current.write().await.replace(index)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub rows: usize,
    pub indexed: bool,
    pub index_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: String,
    /// Row ids of the retrieved documents, in rank order.
    pub sources: Vec<i64>,
    /// True when the answer is a diagnostic stand-in for a failed model call.
    pub degraded: bool,
    /// Identifies the ingest the cited rows belong to.
    pub index_id: String,
}

pub struct Rag {
    embedder: Arc<dyn Embedder>,
    responder: Responder,
    retrieval: RetrievalParams,
    budget: PromptBudget,
    batch_size: usize,
    index_dir: PathBuf,
    slot: IndexSlot,
    ingest_lock: Mutex<()>,
    config: Config,
}

impl Rag {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        responder: Responder,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            embedder,
            responder,
            retrieval: RetrievalParams::from_config(&config.retrieval)?,
            budget: PromptBudget::from(&config.prompt),
            batch_size: config.embedding.batch_size,
            index_dir: config.index.dir.clone(),
            slot: IndexSlot::new(),
            ingest_lock: Mutex::new(()),
            config,
        })
    }

    /// Build the embedder and responder named in `config`.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let responder = Responder::from_config(&config.llm)?;
        Self::new(config, embedder, responder)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Load a persisted index into the slot if one exists.
    ///
    /// A broken or incompatible index is logged and ignored; the service
    /// then starts without an index until the next ingest.
    pub async fn restore(&self) -> bool {
        match VectorIndex::load(&self.index_dir, &self.config.embedding) {
            Ok(Some(index)) => {
                tracing::info!(
                    dir = %self.index_dir.display(),
                    rows = index.len(),
                    source = %index.metadata.source_name,
                    "restored persisted index"
                );
                self.slot.replace(Arc::new(index)).await;
                true
            }
            Ok(None) => {
                tracing::info!(dir = %self.index_dir.display(), "no persisted index");
                false
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "ignoring persisted index");
                false
            }
        }
    }

    pub async fn has_index(&self) -> bool {
        self.slot.current().await.is_some()
    }

    pub async fn metadata(&self) -> Option<IndexMetadata> {
        self.slot.current().await.map(|i| i.metadata.clone())
    }

    /// Parse raw CSV bytes and ingest them.
    pub async fn ingest_csv(&self, bytes: &[u8], source: &str) -> Result<IngestReport, RagError> {
        let table = parse_csv(bytes).map_err(RagError::Csv)?;
        self.ingest(&table, source, Some(fingerprint(bytes))).await
    }

    /// Embed `table`, persist it, and make it the live index.
    ///
    /// On failure the previous index stays live and on disk.
    pub async fn ingest(
        &self,
        table: &Table,
        source: &str,
        source_sha256: Option<String>,
    ) -> Result<IngestReport, RagError> {
        if table.is_empty() {
            return Err(RagError::EmptyTable);
        }

        let _guard = self.ingest_lock.lock().await;
        let documents = rows_to_documents(table, source);
        tracing::info!(source, rows = documents.len(), "ingest started");

        let index = VectorIndex::build(
            self.embedder.as_ref(),
            documents,
            source,
            self.batch_size,
            source_sha256,
        )
        .await
        .map_err(RagError::Embedding)?;

        let dir = self.index_dir.clone();
        let index = Arc::new(index);
        let to_persist = index.clone();
        tokio::task::spawn_blocking(move || to_persist.persist(&dir))
            .await
            .map_err(|e| RagError::Storage(e.into()))?
            .map_err(RagError::Storage)?;

        let report = IngestReport {
            rows: index.len(),
            indexed: true,
            index_id: index.metadata.index_id.clone(),
        };
        self.slot.replace(index).await;
        tracing::info!(source, rows = report.rows, index_id = %report.index_id, "ingest complete");
        Ok(report)
    }

    /// Answer `question` from the live index.
    pub async fn ask(&self, question: &str) -> Result<AskResponse, RagError> {
        let index = self.slot.current().await.ok_or(RagError::NoIndex)?;

        let retrieved = retrieve(&index, self.embedder.as_ref(), question, &self.retrieval)
            .await
            .map_err(RagError::Embedding)?;
        let prompt = build_prompt(question, &retrieved.documents, &self.budget);
        let answer = self.responder.respond(&prompt).await;

        if let Answer::Degraded { kind, .. } = &answer {
            tracing::warn!(kind = %kind, "answered with degraded response");
        }

        Ok(AskResponse {
            degraded: answer.is_degraded(),
            answer: answer.text(),
            sources: retrieved.row_ids,
            index_id: index.metadata.index_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{doc, index_from};

    #[tokio::test]
    async fn test_slot_starts_empty_and_swaps() {
        let slot = IndexSlot::new();
        assert!(slot.current().await.is_none());

        let first = Arc::new(index_from(vec![doc(0, "a")], vec![vec![1.0]]));
        assert!(slot.replace(first.clone()).await.is_none());

        // A reader holding the old snapshot is unaffected by a later swap.
        let snapshot = slot.current().await.unwrap();
        let second = Arc::new(index_from(
            vec![doc(0, "b"), doc(1, "c")],
            vec![vec![1.0], vec![0.5]],
        ));
        let previous = slot.replace(second).await.unwrap();
        assert!(Arc::ptr_eq(&previous, &first));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(slot.current().await.unwrap().len(), 2);
    }
}
