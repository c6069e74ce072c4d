//! In-memory vector index with on-disk persistence.
//!
//! A [`VectorIndex`] holds every embedded row of the most recent ingest.
//! Search is brute-force cosine similarity, which is plenty for a single
//! uploaded CSV. Two rankings are offered:
//!
//! - [`VectorIndex::similarity_search`]: pure relevance.
//! - [`VectorIndex::mmr_search`]: Maximal Marginal Relevance over the
//!   `fetch_k` most similar rows:
//!
//! ```text
//! MMR(d) = λ × sim(q, d) − (1 − λ) × max_{s ∈ selected} sim(d, s)
//! ```
//!
//! # On-disk layout
//!
//! ```text
//! <index.dir>/
//!   index.json      documents + vectors + metadata
//!   metadata.json   metadata only (human-readable)
//! ```
//!
//! Both files are staged as `*.json.tmp` siblings and renamed into place,
//! `index.json` last, so a reader never sees a half-written index and a
//! failed write leaves the previous `index.json` in effect.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::EmbeddingConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Document, IndexMetadata};

pub const INDEX_FILE: &str = "index.json";
pub const METADATA_FILE: &str = "metadata.json";

/// A ranked search hit: position in the index plus its similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub position: usize,
    pub score: f32,
}

/// Embedded documents of one ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub metadata: IndexMetadata,
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Embed every document and assemble an index.
    ///
    /// Fails without producing an index if any batch fails or the provider
    /// returns the wrong number of vectors or inconsistent dimensions.
    pub async fn build(
        embedder: &dyn Embedder,
        documents: Vec<Document>,
        source_name: &str,
        batch_size: usize,
        source_sha256: Option<String>,
    ) -> Result<Self> {
        if documents.is_empty() {
            bail!("Cannot build an index from zero documents");
        }

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
        for batch in documents.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|d| d.content.clone()).collect();
            let embedded = embedder.embed(&texts).await.with_context(|| {
                format!(
                    "Embedding failed after {} of {} rows",
                    vectors.len(),
                    documents.len()
                )
            })?;
            if embedded.len() != texts.len() {
                bail!(
                    "Embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                );
            }
            vectors.extend(embedded);
            tracing::debug!(
                embedded = vectors.len(),
                total = documents.len(),
                "embedding batch done"
            );
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if dims == 0 {
            bail!("Embedding provider returned empty vectors");
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            bail!(
                "Inconsistent embedding dimensions: row {} has {} dims, expected {}",
                bad,
                vectors[bad].len(),
                dims
            );
        }

        let metadata = IndexMetadata {
            index_id: uuid::Uuid::new_v4().to_string(),
            source_name: source_name.to_string(),
            row_count: documents.len(),
            embedding_provider: embedder.provider_name().to_string(),
            embedding_model: embedder.model_name().to_string(),
            dims,
            created_utc: chrono::Utc::now().timestamp(),
            source_sha256,
        };

        Ok(Self {
            metadata,
            documents,
            vectors,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Rank all rows by cosine similarity and return the top `limit`.
    ///
    /// Ties keep index order.
    pub fn similarity_search(&self, query: &[f32], limit: usize) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| Hit {
                position,
                score: cosine_similarity(query, v),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(limit);
        hits
    }

    /// Relevance-diversity search.
    ///
    /// Draws the `fetch_k` most similar rows, then greedily picks up to
    /// `limit` of them by MMR score. `lambda = 1.0` reproduces similarity
    /// order; `lambda = 0.0` only penalizes redundancy.
    pub fn mmr_search(&self, query: &[f32], limit: usize, fetch_k: usize, lambda: f32) -> Vec<Hit> {
        let mut remaining = self.similarity_search(query, fetch_k.max(limit));
        let lambda = lambda.clamp(0.0, 1.0);
        let mut selected: Vec<Hit> = Vec::with_capacity(limit.min(remaining.len()));

        while selected.len() < limit && !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_mmr = f32::NEG_INFINITY;

            for (idx, candidate) in remaining.iter().enumerate() {
                let redundancy = selected
                    .iter()
                    .map(|s| {
                        cosine_similarity(
                            &self.vectors[candidate.position],
                            &self.vectors[s.position],
                        )
                    })
                    .fold(f32::NEG_INFINITY, f32::max);
                let redundancy = if selected.is_empty() { 0.0 } else { redundancy };
                let mmr = lambda * candidate.score - (1.0 - lambda) * redundancy;
                if mmr > best_mmr {
                    best_mmr = mmr;
                    best_idx = idx;
                }
            }

            selected.push(remaining.remove(best_idx));
        }

        selected
    }

    /// Write the index to `dir`, replacing any previous copy.
    ///
    /// Both files are staged before either is moved into place, and
    /// `index.json` is renamed last. If anything fails before that rename the
    /// previous `index.json` is untouched and the staged files are removed.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let index_path = dir.join(INDEX_FILE);
        let metadata_path = dir.join(METADATA_FILE);
        let index_tmp = staging_path(&index_path);
        let metadata_tmp = staging_path(&metadata_path);

        let result = self.stage_and_swap(&index_path, &index_tmp, &metadata_path, &metadata_tmp);
        if result.is_err() {
            let _ = std::fs::remove_file(&index_tmp);
            let _ = std::fs::remove_file(&metadata_tmp);
            return result;
        }

        tracing::info!(
            dir = %dir.display(),
            rows = self.len(),
            index_id = %self.metadata.index_id,
            "index persisted"
        );
        Ok(())
    }

    fn stage_and_swap(
        &self,
        index_path: &Path,
        index_tmp: &Path,
        metadata_path: &Path,
        metadata_tmp: &Path,
    ) -> Result<()> {
        let index_json = serde_json::to_vec(self)?;
        std::fs::write(index_tmp, &index_json)
            .with_context(|| format!("Failed to write {}", index_tmp.display()))?;

        let metadata_json = serde_json::to_vec_pretty(&self.metadata)?;
        std::fs::write(metadata_tmp, &metadata_json)
            .with_context(|| format!("Failed to write {}", metadata_tmp.display()))?;

        std::fs::rename(metadata_tmp, metadata_path)
            .with_context(|| format!("Failed to move {} into place", metadata_path.display()))?;
        std::fs::rename(index_tmp, index_path)
            .with_context(|| format!("Failed to move {} into place", index_path.display()))?;
        Ok(())
    }

    /// Load a persisted index.
    ///
    /// Returns `Ok(None)` when nothing has been persisted in `dir`. An index
    /// embedded with a different model than `embedding` is rejected, since
    /// queries embedded with the configured model would not be comparable.
    pub fn load(dir: &Path, embedding: &EmbeddingConfig) -> Result<Option<Self>> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;
        let index: VectorIndex = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt index file: {}", path.display()))?;

        if index.documents.len() != index.vectors.len() {
            bail!(
                "Corrupt index file: {} documents but {} vectors",
                index.documents.len(),
                index.vectors.len()
            );
        }
        if index.metadata.embedding_model != embedding.model
            || index.metadata.embedding_provider != embedding.provider
        {
            bail!(
                "Index at {} was built with {}/{} but {}/{} is configured; re-ingest the CSV",
                dir.display(),
                index.metadata.embedding_provider,
                index.metadata.embedding_model,
                embedding.provider,
                embedding.model
            );
        }

        Ok(Some(index))
    }

    /// Read the metadata of the persisted index without validating it.
    ///
    /// The metadata embedded in `index.json` is authoritative; `metadata.json`
    /// is a readable mirror and can disagree with it after an interrupted write.
    pub fn read_metadata(dir: &Path) -> Result<Option<IndexMetadata>> {
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read index file: {}", path.display()))?;
        let header: MetadataOnly = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt index file: {}", path.display()))?;
        Ok(Some(header.metadata))
    }
}

#[derive(Deserialize)]
struct MetadataOnly {
    metadata: IndexMetadata,
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("json.tmp")
}
