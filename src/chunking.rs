//! Token-aware text chunking
//!
//! Splits normalized document text into overlapping, token-bounded chunks.
//! Windows are computed over cl100k_base token ids and decoded back to text,
//! so token counts are stable between chunk time and any later
//! reconstruction.

use serde::Serialize;
use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::debug;

use crate::errors::{AppError, Result};

/// A chunk of document text, the unit of retrieval
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    /// Sequential id ("c_0", "c_1", ...) reflecting window order
    pub id: String,
    /// The chunk content, non-empty after cleaning
    pub text: String,
    /// Exact token count of the window this chunk was decoded from
    pub token_count: usize,
}

/// Tokenizer-backed sliding-window chunker
pub struct Chunker {
    bpe: CoreBPE,
}

impl Chunker {
    /// Create a chunker backed by the cl100k_base vocabulary
    pub fn new() -> Result<Self> {
        let bpe = cl100k_base().map_err(|e| AppError::Configuration {
            message: format!("failed to load cl100k_base tokenizer: {}", e),
        })?;
        Ok(Self { bpe })
    }

    /// Count tokens in a string with the chunker's tokenizer
    pub fn count_tokens(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Split text into overlapping token windows of at most `max_tokens`
    /// tokens, adjacent windows sharing `overlap` tokens.
    ///
    /// Empty or whitespace-only input yields an empty sequence, not an
    /// error. Window edges that split a multi-byte character are decoded
    /// lossily and the partial character dropped; windows that decode to
    /// an empty string are dropped entirely.
    pub fn chunk(&self, text: &str, max_tokens: usize, overlap: usize) -> Result<Vec<Chunk>> {
        if max_tokens < 1 {
            return Err(AppError::Validation {
                message: "max_tokens must be at least 1".to_string(),
                field: Some("max_tokens".to_string()),
            });
        }
        if overlap >= max_tokens {
            return Err(AppError::Validation {
                message: format!(
                    "overlap ({}) must be smaller than max_tokens ({})",
                    overlap, max_tokens
                ),
                field: Some("overlap".to_string()),
            });
        }

        let cleaned = normalize(text);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let tokens = self.bpe.encode_ordinary(&cleaned);
        let stride = max_tokens - overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < tokens.len() {
            let end = (start + max_tokens).min(tokens.len());
            let window = &tokens[start..end];
            let token_count = window.len();

            // cl100k_base is a byte-level BPE, so a window edge can land in
            // the middle of a multi-byte character. Decode lossily and strip
            // the edge artifacts instead of failing the whole document.
            let bytes = self.bpe._decode_native(window);
            let decoded = String::from_utf8_lossy(&bytes);
            let chunk_text = decoded.trim_matches(|c: char| c == '\u{FFFD}' || c.is_whitespace());

            if !chunk_text.is_empty() {
                chunks.push(Chunk {
                    id: format!("c_{}", chunks.len()),
                    text: chunk_text.to_string(),
                    token_count,
                });
            }

            start += stride;
        }

        debug!(
            input_len = cleaned.len(),
            total_tokens = tokens.len(),
            chunk_count = chunks.len(),
            max_tokens,
            overlap,
            "Text chunked"
        );

        Ok(chunks)
    }
}

/// Normalize raw document text before chunking.
///
/// NUL and other control characters (except newlines) are removed, runs of
/// non-newline whitespace collapse to a single space, and the result is
/// trimmed.
pub(crate) fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space_run = false;

    for ch in text.chars() {
        if ch == '\n' {
            if in_space_run {
                out.push(' ');
                in_space_run = false;
            }
            out.push('\n');
        } else if ch.is_whitespace() {
            in_space_run = true;
        } else if ch.is_control() {
            // NUL and friends break downstream consumers; drop outright
        } else {
            if in_space_run {
                out.push(' ');
                in_space_run = false;
            }
            out.push(ch);
        }
    }

    out.trim().to_string()
}
