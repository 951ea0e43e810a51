//! End-to-end question answering pipeline
//!
//! One run: fetch the document, chunk it, assign a run-scoped document
//! id, audit the chunks, index them, then answer every question against
//! the indexed evidence. Fetch and chunking failures abort the run;
//! everything downstream degrades per component so a run that starts
//! always produces one answer per question, in input order.

use metrics::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chunking::{Chunk, Chunker};
use crate::config::{ChunkingConfig, RetrievalConfig};
use crate::errors::Result;
use crate::fetch::DocumentFetcher;
use crate::reasoner::{Answer, Evidence, Synthesizer};
use crate::retriever::Retriever;
use crate::store::ChunkStore;

/// The orchestrator owning every pipeline capability
pub struct Pipeline {
    fetcher: Arc<dyn DocumentFetcher>,
    chunker: Chunker,
    retriever: Retriever,
    synthesizer: Synthesizer,
    store: Arc<dyn ChunkStore>,
    chunking: ChunkingConfig,
    retrieval: RetrievalConfig,
}

/// Short run-scoped document id (8 hex chars)
fn new_document_id() -> String {
    let mut buffer = Uuid::encode_buffer();
    let simple = Uuid::new_v4().simple().encode_lower(&mut buffer);
    simple[..8].to_string()
}

/// Truncate on a character boundary, never splitting a code point
fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        chunker: Chunker,
        retriever: Retriever,
        synthesizer: Synthesizer,
        store: Arc<dyn ChunkStore>,
        chunking: ChunkingConfig,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            fetcher,
            chunker,
            retriever,
            synthesizer,
            store,
            chunking,
            retrieval,
        }
    }

    /// Run the full pipeline for one document and a batch of questions.
    ///
    /// Answers come back in question order, one per question.
    pub async fn run(&self, document_url: &str, questions: &[String]) -> Result<Vec<Answer>> {
        let started = Instant::now();
        counter!("askdoc_runs_total").increment(1);

        let text = self.fetcher.fetch_text(document_url).await?;
        debug!(bytes = text.len(), "Document fetched");

        let chunks = self
            .chunker
            .chunk(&text, self.chunking.max_tokens, self.chunking.overlap)?;
        let document_id = new_document_id();
        info!(
            doc_id = %document_id,
            chunks = chunks.len(),
            questions = questions.len(),
            "Document chunked"
        );
        counter!("askdoc_chunks_total").increment(chunks.len() as u64);

        // Audit failures must not block answering
        for chunk in &chunks {
            if let Err(e) = self
                .store
                .append(document_url, &chunk.text, chunk.token_count as i32)
                .await
            {
                debug!(chunk_id = %chunk.id, error = %e, "Chunk audit write failed");
            }
        }

        let outcome = self.retriever.index_document(&document_id, &chunks).await;
        if outcome.failed > 0 {
            warn!(
                doc_id = %document_id,
                attempted = outcome.attempted,
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                "Indexing completed with failures"
            );
            counter!("askdoc_index_chunks_failed_total").increment(outcome.failed as u64);
        } else {
            info!(doc_id = %document_id, indexed = outcome.succeeded, "Indexing complete");
        }

        let by_id: HashMap<&str, &Chunk> = chunks.iter().map(|c| (c.id.as_str(), c)).collect();

        let answers = futures::future::join_all(
            questions
                .iter()
                .map(|q| self.answer_question(q, &document_id, &by_id)),
        )
        .await;

        histogram!("askdoc_run_duration_seconds").record(started.elapsed().as_secs_f64());
        counter!("askdoc_questions_total").increment(questions.len() as u64);
        Ok(answers)
    }

    async fn answer_question(
        &self,
        question: &str,
        document_id: &str,
        chunks_by_id: &HashMap<&str, &Chunk>,
    ) -> Answer {
        let hits = self.retriever.query(question, self.retrieval.top_k).await;

        let mut evidence = Vec::with_capacity(hits.len());
        for hit in hits {
            // The index may hold entries from other runs; only chunks
            // from this document are usable as evidence.
            if hit.document_id != document_id {
                debug!(chunk_id = %hit.chunk_id, hit_doc = %hit.document_id, "Skipping foreign-document hit");
                continue;
            }
            let Some(chunk) = chunks_by_id.get(hit.chunk_id.as_str()) else {
                debug!(chunk_id = %hit.chunk_id, "Hit references unknown chunk, skipping");
                continue;
            };
            evidence.push(Evidence {
                document_id: hit.document_id,
                chunk_id: hit.chunk_id,
                text_snippet: truncate_chars(&chunk.text, self.retrieval.snippet_max_chars),
                similarity_score: hit.score,
                extracted_facts: None,
            });
        }

        self.synthesizer.synthesize(question, evidence).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::embeddings::MockEmbedder;
    use crate::errors::AppError;
    use crate::index::{InMemoryIndex, ScoreMetric};
    use crate::llm::{CompletionParams, OfflineLlm};
    use crate::store::NoopChunkStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct StaticFetcher(String);

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch_text(&self, _url: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl DocumentFetcher for FailingFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            Err(AppError::Fetch {
                message: format!("{} unreachable", url),
            })
        }
    }

    fn pipeline_with(fetcher: impl DocumentFetcher + 'static) -> Pipeline {
        let embedder = Arc::new(MockEmbedder::new(128));
        let retriever = Retriever::new(
            embedder,
            Some(Arc::new(InMemoryIndex::new())),
            ScoreMetric::CosineSimilarity,
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let synthesizer = Synthesizer::new(
            Arc::new(OfflineLlm),
            CompletionParams::from(&LlmConfig::default()),
            Duration::from_secs(5),
        );
        Pipeline::new(
            Arc::new(fetcher),
            Chunker::new().unwrap(),
            retriever,
            synthesizer,
            Arc::new(NoopChunkStore),
            ChunkingConfig {
                max_tokens: 40,
                overlap: 8,
            },
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_run_answers_every_question_in_order() {
        let pipeline = pipeline_with(StaticFetcher(
            "Knee surgery is covered after a waiting period of twenty four months. \
             Premium payments are due on the first of each month. \
             Maternity benefits require twelve months of continuous coverage."
                .to_string(),
        ));

        let questions = vec![
            "Is knee surgery covered?".to_string(),
            "When are premiums due?".to_string(),
            "What do maternity benefits require?".to_string(),
        ];
        let answers = pipeline
            .run("https://example.com/policy.txt", &questions)
            .await
            .unwrap();

        assert_eq!(answers.len(), 3);
        for (answer, question) in answers.iter().zip(&questions) {
            assert_eq!(&answer.question, question);
            assert!(!answer.answer_text.is_empty());
            assert!((0.0..=1.0).contains(&answer.confidence));
        }
    }

    #[tokio::test]
    async fn test_run_attaches_evidence_from_this_document() {
        let pipeline = pipeline_with(StaticFetcher(
            "Knee surgery has a waiting period of two years. \
             Unrelated filler about premium payment schedules and grace periods."
                .to_string(),
        ));

        let answers = pipeline
            .run(
                "https://example.com/policy.txt",
                &["waiting period for knee surgery".to_string()],
            )
            .await
            .unwrap();

        let answer = &answers[0];
        assert!(!answer.sources.is_empty());
        for source in &answer.sources {
            assert!(source.chunk_id.starts_with("c_"));
            assert!(!source.text_snippet.is_empty());
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_run() {
        let pipeline = pipeline_with(FailingFetcher);
        let result = pipeline
            .run("https://example.com/gone.txt", &["q".to_string()])
            .await;
        assert!(matches!(result, Err(AppError::Fetch { .. })));
    }

    #[tokio::test]
    async fn test_empty_questions_yield_empty_answers() {
        let pipeline = pipeline_with(StaticFetcher("Some document text.".to_string()));
        let answers = pipeline
            .run("https://example.com/doc.txt", &[])
            .await
            .unwrap();
        assert!(answers.is_empty());
    }

    #[test]
    fn test_document_id_shape() {
        let id = new_document_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(new_document_id(), id);
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("", 10), "");
    }
}
