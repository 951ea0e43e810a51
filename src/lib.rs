//! askdoc - retrieval-augmented question answering over remote documents
//!
//! The pipeline fetches a document, splits it into token-bounded chunks,
//! indexes chunk embeddings in a vector store, and answers each question
//! from retrieved evidence via an LLM, with a defined degradation policy
//! at every external seam.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod reasoner;
pub mod retriever;
pub mod routes;
pub mod store;

/// Crate version, exposed on the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
