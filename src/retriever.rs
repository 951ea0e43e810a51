//! Embedding-backed retrieval
//!
//! Owns the embed-then-index path on ingest and the embed-then-query path
//! at question time. Indexing reports a per-chunk outcome; querying
//! degrades to empty evidence when the index is unavailable or an
//! upstream call fails, so a pipeline run always completes.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chunking::Chunk;
use crate::embeddings::Embedder;
use crate::index::{EntryMetadata, IndexEntry, ScoreMetric, VectorIndex};

/// One retrieved chunk reference with a normalized score (higher is better)
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievalHit {
    pub chunk_id: String,
    #[serde(rename = "doc_id")]
    pub document_id: String,
    pub score: f32,
}

/// Per-chunk accounting for one indexing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Retrieval layer: an embedder plus an optional vector index
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Option<Arc<dyn VectorIndex>>,
    metric: ScoreMetric,
    embed_timeout: Duration,
    index_timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Option<Arc<dyn VectorIndex>>,
        metric: ScoreMetric,
        embed_timeout: Duration,
        index_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            metric,
            embed_timeout,
            index_timeout,
        }
    }

    /// Embed and upsert the chunks of one document.
    ///
    /// Embedding failures are counted per chunk; the surviving entries go
    /// to the index in a single upsert. Never returns an error: the
    /// outcome carries the failure count and the caller decides how loud
    /// to be about it.
    pub async fn index_document(&self, document_id: &str, chunks: &[Chunk]) -> IndexOutcome {
        let mut outcome = IndexOutcome {
            attempted: chunks.len(),
            ..Default::default()
        };

        let Some(index) = &self.index else {
            warn!(
                doc_id = document_id,
                chunks = chunks.len(),
                "No vector index configured, skipping indexing"
            );
            outcome.failed = chunks.len();
            return outcome;
        };

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedded =
                tokio::time::timeout(self.embed_timeout, self.embedder.embed(&chunk.text)).await;
            match embedded {
                Ok(Ok(vector)) => {
                    entries.push(IndexEntry {
                        key: format!("{}::{}", document_id, chunk.id),
                        vector,
                        metadata: EntryMetadata {
                            document_id: document_id.to_string(),
                            chunk_id: chunk.id.clone(),
                        },
                    });
                }
                Ok(Err(e)) => {
                    warn!(doc_id = document_id, chunk_id = %chunk.id, error = %e, "Embedding failed");
                    outcome.failed += 1;
                }
                Err(_) => {
                    warn!(
                        doc_id = document_id,
                        chunk_id = %chunk.id,
                        timeout_ms = self.embed_timeout.as_millis() as u64,
                        "Embedding timed out"
                    );
                    outcome.failed += 1;
                }
            }
        }

        if entries.is_empty() {
            return outcome;
        }

        match tokio::time::timeout(self.index_timeout, index.upsert(&entries)).await {
            Ok(Ok(())) => outcome.succeeded = entries.len(),
            Ok(Err(e)) => {
                warn!(doc_id = document_id, error = %e, "Index upsert failed");
                outcome.failed += entries.len();
            }
            Err(_) => {
                warn!(
                    doc_id = document_id,
                    timeout_ms = self.index_timeout.as_millis() as u64,
                    "Index upsert timed out"
                );
                outcome.failed += entries.len();
            }
        }

        outcome
    }

    /// Top-k chunk references for a question, best first.
    ///
    /// Scores are normalized to "higher is better" regardless of the
    /// index's native metric. Any upstream failure yields empty evidence.
    pub async fn query(&self, question: &str, k: usize) -> Vec<RetrievalHit> {
        let Some(index) = &self.index else {
            debug!("No vector index configured, returning empty evidence");
            return Vec::new();
        };

        let vector =
            match tokio::time::timeout(self.embed_timeout, self.embedder.embed(question)).await {
                Ok(Ok(v)) => v,
                Ok(Err(e)) => {
                    warn!(error = %e, "Question embedding failed, returning empty evidence");
                    return Vec::new();
                }
                Err(_) => {
                    warn!(
                        timeout_ms = self.embed_timeout.as_millis() as u64,
                        "Question embedding timed out, returning empty evidence"
                    );
                    return Vec::new();
                }
            };

        let matches = match tokio::time::timeout(self.index_timeout, index.query(&vector, k)).await
        {
            Ok(Ok(m)) => m,
            Ok(Err(e)) => {
                warn!(error = %e, "Index query failed, returning empty evidence");
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.index_timeout.as_millis() as u64,
                    "Index query timed out, returning empty evidence"
                );
                return Vec::new();
            }
        };

        let mut hits: Vec<RetrievalHit> = matches
            .into_iter()
            .map(|m| RetrievalHit {
                chunk_id: m.metadata.chunk_id,
                document_id: m.metadata.document_id,
                score: self.metric.normalize(m.score),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}
