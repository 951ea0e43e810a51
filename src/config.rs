//! Configuration management for the askdoc service
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{env}, config/local)
//! - Default values
//!
//! Components receive their config sections by value; nothing reads the
//! process environment at use time.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Bearer-token authentication
    #[serde(default)]
    pub auth: AuthConfig,

    /// Document fetch configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Chunking policy
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval policy
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Audit database (optional)
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Shared bearer token checked on every run request
    #[serde(default)]
    pub team_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    /// Document download timeout in seconds
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Maximum tokens per chunk
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Tokens shared between adjacent chunks
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default = "default_embedding_base")]
    pub api_base: String,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Vector index provider: pinecone, memory, none
    #[serde(default = "default_index_provider")]
    pub provider: String,

    /// API key for the index service
    pub api_key: Option<String>,

    /// Index host URL (pinecone)
    pub host: Option<String>,

    /// Native score semantics: cosine_similarity or l2_distance
    #[serde(default = "default_index_metric")]
    pub metric: String,

    /// Request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key; when empty an offline stub is used
    #[serde(default)]
    pub api_key: String,

    /// OpenAI-compatible API base URL
    #[serde(default = "default_llm_base")]
    pub api_base: String,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum completion tokens
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; low for factual extraction
    #[serde(default = "default_llm_temperature")]
    pub temperature: f32,

    /// Nucleus sampling parameter
    #[serde(default = "default_llm_top_p")]
    pub top_p: f32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Evidence chunks retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Maximum snippet length in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres URL for the chunk audit log; audit is disabled when unset
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level filter (e.g. "info", "askdoc=debug,info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logging: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 120 }
fn default_max_concurrent() -> usize { 100 }
fn default_fetch_timeout() -> u64 { 20 }
fn default_max_tokens() -> usize { 700 }
fn default_overlap() -> usize { 100 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_upstream_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_index_provider() -> String { "none".to_string() }
fn default_index_metric() -> String { "cosine_similarity".to_string() }
fn default_llm_base() -> String { "https://api.groq.com/openai/v1".to_string() }
fn default_llm_model() -> String { "llama3-70b-8192".to_string() }
fn default_llm_max_tokens() -> u32 { 1024 }
fn default_llm_temperature() -> f32 { 0.1 }
fn default_llm_top_p() -> f32 { 0.9 }
fn default_llm_timeout() -> u64 { 30 }
fn default_top_k() -> usize { 5 }
fn default_snippet_max_chars() -> usize { 1000 }
fn default_max_connections() -> u32 { 10 }
fn default_log_level() -> String { "info".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap: default_overlap(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: default_embedding_base(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_upstream_timeout(),
            max_retries: default_embedding_retries(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            api_key: None,
            host: None,
            metric: default_index_metric(),
            timeout_secs: default_upstream_timeout(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_llm_base(),
            model: default_llm_model(),
            max_tokens: default_llm_max_tokens(),
            temperature: default_llm_temperature(),
            top_p: default_llm_top_p(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            fetch: FetchConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            database: DatabaseConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
