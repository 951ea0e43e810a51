//! Answer synthesis from retrieved evidence
//!
//! Builds a grounded prompt, invokes the LLM capability, and parses a
//! structured answer out of free-form model output. Synthesis never
//! fails: provider errors, timeouts, and malformed output all degrade to
//! a well-formed `Answer` with zero confidence.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::llm::{ChatMessage, CompletionParams, LlmClient};

/// Sentinel answer used when synthesis yields no usable content
pub const NOT_FOUND_ANSWER: &str = "Not found";

const SYSTEM_PROMPT: &str = "You are an expert document analyst. Answer strictly from the \
supplied evidence. Never invent information that is not present in the evidence; if the \
evidence does not contain the answer, say so.";

/// A retrieved chunk plus its relevance, presented to the model
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    #[serde(rename = "doc_id")]
    pub document_id: String,
    pub chunk_id: String,
    pub text_snippet: String,
    pub similarity_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_facts: Option<Map<String, Value>>,
}

/// One grounded answer per input question
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    #[serde(rename = "answer")]
    pub answer_text: String,
    pub confidence: f32,
    pub rationale: String,
    pub sources: Vec<Evidence>,
}

/// Structured payload requested from the model
#[derive(Debug, Deserialize)]
struct ModelPayload {
    answer: Option<String>,
    #[serde(default)]
    facts: Map<String, Value>,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    confidence: f32,
}

struct ParsedOutput {
    answer: String,
    facts: Map<String, Value>,
    rationale: String,
    confidence: f32,
}

/// Synthesizer for grounded answers
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
    params: CompletionParams,
    timeout: Duration,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>, params: CompletionParams, timeout: Duration) -> Self {
        Self {
            llm,
            params,
            timeout,
        }
    }

    /// Synthesize an answer for `question` from `evidence`.
    ///
    /// Always returns a well-formed `Answer`; sources are the evidence
    /// items in the order they were presented to the model.
    pub async fn synthesize(&self, question: &str, evidence: Vec<Evidence>) -> Answer {
        let prompt = build_prompt(question, &evidence);
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];

        let raw = match tokio::time::timeout(
            self.timeout,
            self.llm.complete(&messages, &self.params),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                warn!(error = %e, "LLM call failed, returning degraded answer");
                return degraded_answer(question, format!("Error generating answer: {}", e), evidence);
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "LLM call timed out");
                return degraded_answer(
                    question,
                    format!(
                        "Error generating answer: model call timed out after {}ms",
                        self.timeout.as_millis()
                    ),
                    evidence,
                );
            }
        };

        let parsed = parse_model_output(&raw);

        let mut sources = evidence;
        if !parsed.facts.is_empty() {
            for source in &mut sources {
                source.extracted_facts = Some(parsed.facts.clone());
            }
        }

        Answer {
            question: question.to_string(),
            answer_text: parsed.answer,
            confidence: parsed.confidence,
            rationale: parsed.rationale,
            sources,
        }
    }
}

fn degraded_answer(question: &str, message: String, sources: Vec<Evidence>) -> Answer {
    Answer {
        question: question.to_string(),
        answer_text: message,
        confidence: 0.0,
        rationale: String::new(),
        sources,
    }
}

/// Build the grounded prompt: numbered evidence, strict instructions, and
/// a request for a four-field JSON payload.
fn build_prompt(question: &str, evidence: &[Evidence]) -> String {
    let mut prompt = format!(
        "Answer only from the evidence below.\nQuestion: {}\n\nEvidence:\n",
        question
    );

    for (i, e) in evidence.iter().enumerate() {
        let _ = write!(
            prompt,
            "[{}] (doc:{}, chunk:{})\n{}\n\n",
            i + 1,
            e.document_id,
            e.chunk_id,
            e.text_snippet
        );
    }

    prompt.push_str(
        "Instructions: answer succinctly, extract factual fields when present, give a short \
         rationale and a confidence between 0 and 1. Return a JSON object with exactly these \
         keys: answer, facts, rationale, confidence.",
    );
    prompt
}

/// Parse free-form model output into a structured answer.
///
/// The first balanced brace-delimited substring is decoded as JSON; on
/// any failure the full trimmed raw output becomes the answer with zero
/// confidence.
fn parse_model_output(raw: &str) -> ParsedOutput {
    if let Some(json) = extract_json_object(raw) {
        if let Ok(payload) = serde_json::from_str::<ModelPayload>(json) {
            let confidence = if payload.confidence.is_finite() {
                payload.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
            return ParsedOutput {
                answer: payload
                    .answer
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| NOT_FOUND_ANSWER.to_string()),
                facts: payload.facts,
                rationale: payload.rationale,
                confidence,
            };
        }
    }

    let trimmed = raw.trim();
    ParsedOutput {
        answer: if trimmed.is_empty() {
            NOT_FOUND_ANSWER.to_string()
        } else {
            trimmed.to_string()
        },
        facts: Map::new(),
        rationale: String::new(),
        confidence: 0.0,
    }
}

/// Find the first balanced `{...}` substring, respecting JSON strings and
/// escape sequences.
fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
