//! Question → rows.
//!
//! 1. Embed the question (skipped for blank questions, which retrieve nothing).
//! 2. Rank a `fetch_k` candidate pool with the configured [`RetrievalStrategy`].
//! 3. Keep the first occurrence of each row id, in rank order.
//! 4. Truncate each kept document to [`MAX_DOC_CHARS`] characters.
//! 5. Stop at `k` documents.

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::config::RetrievalConfig;
use crate::embedding::{embed_query, Embedder};
use crate::index::{Hit, VectorIndex};
use crate::models::Document;

/// Content cap applied to every retrieved document.
pub const MAX_DOC_CHARS: usize = 800;

/// How the candidate pool is ranked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetrievalStrategy {
    /// Maximal Marginal Relevance; `lambda = 1.0` is pure relevance.
    Mmr { fetch_k: usize, lambda: f32 },
    /// Cosine similarity only.
    Similarity { fetch_k: usize },
}

impl RetrievalStrategy {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        match config.mode.as_str() {
            "mmr" => Ok(Self::Mmr {
                fetch_k: config.fetch_k,
                lambda: config.mmr_lambda,
            }),
            "similarity" => Ok(Self::Similarity {
                fetch_k: config.fetch_k,
            }),
            other => bail!("Unknown retrieval mode: {}. Use mmr or similarity.", other),
        }
    }

    fn rank(&self, index: &VectorIndex, query: &[f32]) -> Vec<Hit> {
        match *self {
            Self::Mmr { fetch_k, lambda } => index.mmr_search(query, fetch_k, fetch_k, lambda),
            Self::Similarity { fetch_k } => index.similarity_search(query, fetch_k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Maximum number of documents returned.
    pub k: usize,
    pub strategy: RetrievalStrategy,
}

impl RetrievalParams {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        Ok(Self {
            k: config.k,
            strategy: RetrievalStrategy::from_config(config)?,
        })
    }
}

/// Retrieved documents and, in parallel, their row ids (`-1` if unknown).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    pub documents: Vec<Document>,
    pub row_ids: Vec<i64>,
}

/// Retrieve up to `params.k` distinct rows for `question`.
///
/// The caller must hold an index; asking without one is rejected before
/// this point.
pub async fn retrieve(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    question: &str,
    params: &RetrievalParams,
) -> Result<Retrieved> {
    if question.trim().is_empty() {
        return Ok(Retrieved::default());
    }

    let query_vec = embed_query(embedder, question).await?;
    let hits = params.strategy.rank(index, &query_vec);
    let retrieved = select(index, &hits, params.k);

    tracing::debug!(
        candidates = hits.len(),
        kept = retrieved.documents.len(),
        rows = ?retrieved.row_ids,
        "retrieved rows"
    );
    Ok(retrieved)
}

/// Dedup by row id, truncate, and bound a ranked candidate list.
pub fn select(index: &VectorIndex, hits: &[Hit], k: usize) -> Retrieved {
    let mut seen: HashSet<Option<i64>> = HashSet::new();
    let mut documents = Vec::with_capacity(k.min(hits.len()));

    for hit in hits {
        if documents.len() >= k {
            break;
        }
        let Some(doc) = index.document(hit.position) else {
            continue;
        };
        if !seen.insert(doc.metadata.row) {
            continue;
        }
        documents.push(Document {
            content: truncate_chars(&doc.content, MAX_DOC_CHARS),
            metadata: doc.metadata.clone(),
        });
    }

    let row_ids = documents.iter().map(Document::row_id).collect();
    Retrieved { documents, row_ids }
}

/// Prefix of `text` holding at most `max` characters.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::tests::{doc, index_from};
    use crate::models::DocumentMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds every text as a fixed vector and counts calls.
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn provider_name(&self) -> &str {
            "fixed"
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| self.vector.clone()).collect())
        }
    }

    fn fixed(vector: Vec<f32>) -> FixedEmbedder {
        FixedEmbedder {
            vector,
            calls: AtomicUsize::new(0),
        }
    }

    fn params(k: usize, strategy: RetrievalStrategy) -> RetrievalParams {
        RetrievalParams { k, strategy }
    }

    fn hits(positions: &[usize]) -> Vec<Hit> {
        positions
            .iter()
            .map(|&position| Hit {
                position,
                score: 1.0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_blank_question_returns_nothing_without_embedding() {
        let index = index_from(vec![doc(0, "a")], vec![vec![1.0, 0.0]]);
        let embedder = fixed(vec![1.0, 0.0]);
        for question in ["", "   ", "\n\t "] {
            let got = retrieve(
                &index,
                &embedder,
                question,
                &params(6, RetrievalStrategy::Similarity { fetch_k: 24 }),
            )
            .await
            .unwrap();
            assert!(got.documents.is_empty());
            assert!(got.row_ids.is_empty());
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_select_dedups_keeping_first() {
        let index = index_from(
            vec![doc(3, "first"), doc(3, "second"), doc(5, "other")],
            vec![vec![1.0], vec![1.0], vec![1.0]],
        );
        let got = select(&index, &hits(&[0, 1, 2]), 6);
        assert_eq!(got.row_ids, vec![3, 5]);
        assert_eq!(got.documents[0].content, "first");
    }

    #[test]
    fn test_select_bounds_to_k() {
        let docs: Vec<Document> = (0..10).map(|i| doc(i, "x")).collect();
        let vectors = vec![vec![1.0]; 10];
        let index = index_from(docs, vectors);
        let got = select(&index, &hits(&(0..10).collect::<Vec<_>>()), 4);
        assert_eq!(got.documents.len(), 4);
        assert_eq!(got.row_ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_select_truncates_long_content_to_cap() {
        let long = "é".repeat(MAX_DOC_CHARS + 50);
        let index = index_from(vec![doc(0, &long), doc(1, "short")], vec![vec![1.0], vec![1.0]]);
        let got = select(&index, &hits(&[0, 1]), 6);
        assert_eq!(got.documents[0].content.chars().count(), MAX_DOC_CHARS);
        assert!(long.starts_with(&got.documents[0].content));
        assert_eq!(got.documents[1].content, "short");
    }

    #[test]
    fn test_missing_row_maps_to_minus_one() {
        let orphan = Document {
            content: "x".to_string(),
            metadata: DocumentMetadata {
                source: "s".to_string(),
                row: None,
            },
        };
        let index = index_from(vec![orphan], vec![vec![1.0]]);
        let got = select(&index, &hits(&[0]), 6);
        assert_eq!(got.row_ids, vec![-1]);
    }

    #[tokio::test]
    async fn test_retrieve_results_are_distinct_and_bounded() {
        let docs: Vec<Document> = (0..30).map(|i| doc(i % 12, "row")).collect();
        let vectors: Vec<Vec<f32>> = (0..30)
            .map(|i| vec![1.0, i as f32 / 30.0, (i % 7) as f32 / 7.0])
            .collect();
        let index = index_from(docs, vectors);
        let embedder = fixed(vec![1.0, 0.2, 0.1]);

        for strategy in [
            RetrievalStrategy::Mmr {
                fetch_k: 24,
                lambda: 0.7,
            },
            RetrievalStrategy::Similarity { fetch_k: 24 },
        ] {
            let got = retrieve(&index, &embedder, "anything", &params(6, strategy))
                .await
                .unwrap();
            assert!(got.documents.len() <= 6);
            let unique: HashSet<i64> = got.row_ids.iter().copied().collect();
            assert_eq!(unique.len(), got.row_ids.len());
            assert_eq!(got.row_ids.len(), got.documents.len());
        }
    }

    #[test]
    fn test_strategy_from_config() {
        let mut config = RetrievalConfig::default();
        assert_eq!(
            RetrievalStrategy::from_config(&config).unwrap(),
            RetrievalStrategy::Mmr {
                fetch_k: 24,
                lambda: 0.7
            }
        );
        config.mode = "similarity".to_string();
        assert_eq!(
            RetrievalStrategy::from_config(&config).unwrap(),
            RetrievalStrategy::Similarity { fetch_k: 24 }
        );
        config.mode = "bm25".to_string();
        assert!(RetrievalStrategy::from_config(&config).is_err());
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 3), "hi");
        assert_eq!(truncate_chars("", 3), "");
    }
}
