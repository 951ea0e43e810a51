//! Vector index abstraction
//!
//! Stores embedding vectors with chunk metadata and answers approximate
//! top-k similarity queries. Implementations:
//! - Pinecone-style REST index
//! - In-memory cosine index for offline development and tests
//!
//! The index capability may be absent entirely; callers own the
//! degrade-to-empty policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

use crate::config::IndexConfig;
use crate::errors::{AppError, Result};

/// Metadata stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(rename = "doc_id")]
    pub document_id: String,
    pub chunk_id: String,
}

/// An entry to upsert: key is globally unique (document id + chunk id)
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub key: String,
    pub vector: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// A raw match from the index, score in the index's native semantics
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub metadata: EntryMetadata,
    pub score: f32,
}

/// Native score semantics of the configured index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMetric {
    /// Raw score is a similarity, higher is better
    CosineSimilarity,
    /// Raw score is a distance, lower is better
    L2Distance,
}

impl ScoreMetric {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "cosine_similarity" => Ok(ScoreMetric::CosineSimilarity),
            "l2_distance" => Ok(ScoreMetric::L2Distance),
            other => Err(AppError::Configuration {
                message: format!(
                    "unknown index metric '{}' (expected cosine_similarity or l2_distance)",
                    other
                ),
            }),
        }
    }

    /// Translate a native score into "higher is better".
    ///
    /// Distances map through 1/(1+d), a monotonically decreasing function
    /// bounded in (0, 1].
    pub fn normalize(self, raw: f32) -> f32 {
        match self {
            ScoreMetric::CosineSimilarity => raw,
            ScoreMetric::L2Distance => 1.0 / (1.0 + raw.max(0.0)),
        }
    }
}

/// Approximate nearest-neighbor capability
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite entries by key
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Top-k matches for a query vector, ranked by the index's native score
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>>;
}

/// Pinecone-style REST index client
pub struct PineconeIndex {
    client: reqwest::Client,
    host: String,
    api_key: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<VectorRecord<'a>>,
}

#[derive(Serialize)]
struct VectorRecord<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: &'a EntryMetadata,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    vector: &'a [f32],
    #[serde(rename = "topK")]
    top_k: usize,
    #[serde(rename = "includeMetadata")]
    include_metadata: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    #[serde(default)]
    score: f32,
    metadata: Option<EntryMetadata>,
}

impl PineconeIndex {
    pub fn new(host: String, api_key: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            host,
            api_key,
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Index {
                message: format!("request to {} failed: {}", path, e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Index {
                message: format!("API error {}: {}", status, text),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let request = UpsertRequest {
            vectors: entries
                .iter()
                .map(|e| VectorRecord {
                    id: &e.key,
                    values: &e.vector,
                    metadata: &e.metadata,
                })
                .collect(),
        };
        self.post("/vectors/upsert", &request).await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let request = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
        };
        let response = self.post("/query", &request).await?;

        let parsed: QueryResponse = response.json().await.map_err(|e| AppError::Index {
            message: format!("failed to parse query response: {}", e),
        })?;

        Ok(parsed
            .matches
            .into_iter()
            .filter_map(|m| {
                m.metadata.map(|metadata| IndexMatch {
                    metadata,
                    score: m.score,
                })
            })
            .collect())
    }
}

/// In-memory cosine-similarity index
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<HashMap<String, (Vec<f32>, EntryMetadata)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut map = self.entries.write().await;
        for entry in entries {
            map.insert(
                entry.key.clone(),
                (entry.vector.clone(), entry.metadata.clone()),
            );
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>> {
        let map = self.entries.read().await;
        let mut matches: Vec<IndexMatch> = map
            .values()
            .map(|(stored, metadata)| IndexMatch {
                metadata: metadata.clone(),
                score: cosine(vector, stored),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(k);
        Ok(matches)
    }
}

/// Create a vector index from configuration; `None` means the capability
/// is unconfigured and retrieval degrades to empty evidence.
pub fn create_index(config: &IndexConfig) -> Result<Option<Arc<dyn VectorIndex>>> {
    match config.provider.as_str() {
        "none" | "" => {
            warn!("No vector index configured; retrieval will return empty evidence");
            Ok(None)
        }
        "memory" => Ok(Some(Arc::new(InMemoryIndex::new()))),
        "pinecone" => {
            let host = config
                .host
                .clone()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "index.host is required for the pinecone provider".to_string(),
                })?;
            let api_key = config
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| AppError::Configuration {
                    message: "index.api_key is required for the pinecone provider".to_string(),
                })?;
            Ok(Some(Arc::new(PineconeIndex::new(
                host,
                api_key,
                Duration::from_secs(config.timeout_secs),
            )?)))
        }
        other => Err(AppError::Configuration {
            message: format!(
                "unknown index provider '{}' (expected pinecone, memory, or none)",
                other
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, vector: Vec<f32>, chunk_id: &str) -> IndexEntry {
        IndexEntry {
            key: key.to_string(),
            vector,
            metadata: EntryMetadata {
                document_id: "doc1".to_string(),
                chunk_id: chunk_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_in_memory_ranking() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                entry("doc1::c_0", vec![1.0, 0.0, 0.0], "c_0"),
                entry("doc1::c_1", vec![0.0, 1.0, 0.0], "c_1"),
                entry("doc1::c_2", vec![0.7, 0.7, 0.0], "c_2"),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].metadata.chunk_id, "c_0");
        assert_eq!(matches[1].metadata.chunk_id, "c_2");
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn test_in_memory_upsert_is_idempotent() {
        let index = InMemoryIndex::new();
        let e = entry("doc1::c_0", vec![1.0, 0.0], "c_0");
        index.upsert(std::slice::from_ref(&e)).await.unwrap();
        index.upsert(std::slice::from_ref(&e)).await.unwrap();
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_respects_k() {
        let index = InMemoryIndex::new();
        for i in 0..10 {
            index
                .upsert(&[entry(
                    &format!("doc1::c_{}", i),
                    vec![i as f32, 1.0],
                    &format!("c_{}", i),
                )])
                .await
                .unwrap();
        }
        let matches = index.query(&[1.0, 1.0], 3).await.unwrap();
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn test_metric_normalization() {
        let cos = ScoreMetric::CosineSimilarity;
        assert_eq!(cos.normalize(0.8), 0.8);

        let l2 = ScoreMetric::L2Distance;
        // Smaller distance must yield a larger normalized score
        assert!(l2.normalize(0.1) > l2.normalize(2.0));
        assert!(l2.normalize(0.0) <= 1.0);
        assert!(l2.normalize(1000.0) > 0.0);
        // Negative raw distances are clamped rather than inverted
        assert_eq!(l2.normalize(-1.0), 1.0);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!(
            ScoreMetric::parse("cosine_similarity").unwrap(),
            ScoreMetric::CosineSimilarity
        );
        assert_eq!(
            ScoreMetric::parse("l2_distance").unwrap(),
            ScoreMetric::L2Distance
        );
        assert!(ScoreMetric::parse("dot_product").is_err());
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
