//! Chunk audit log
//!
//! Persists every chunk produced by an ingest so runs can be inspected
//! after the fact. Postgres-backed in production; a no-op store keeps the
//! pipeline wiring uniform when no database is configured.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};

/// Capability for recording chunks as they are produced
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn append(&self, document_url: &str, chunk_text: &str, token_count: i32) -> Result<()>;
}

/// Postgres-backed audit log
pub struct PostgresChunkStore {
    pool: PgPool,
}

impl PostgresChunkStore {
    /// Connect and ensure the audit table exists
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| AppError::Store {
                message: format!("failed to connect to database: {}", e),
            })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS document_chunks (
                id UUID PRIMARY KEY,
                document_url TEXT NOT NULL,
                chunk_text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| AppError::Store {
            message: format!("failed to create audit table: {}", e),
        })?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl ChunkStore for PostgresChunkStore {
    async fn append(&self, document_url: &str, chunk_text: &str, token_count: i32) -> Result<()> {
        sqlx::query(
            "INSERT INTO document_chunks (id, document_url, chunk_text, token_count, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(document_url)
        .bind(chunk_text)
        .bind(token_count)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Store {
            message: format!("failed to insert chunk record: {}", e),
        })?;
        Ok(())
    }
}

/// No-op store used when auditing is disabled
pub struct NoopChunkStore;

#[async_trait]
impl ChunkStore for NoopChunkStore {
    async fn append(&self, _document_url: &str, _chunk_text: &str, _token_count: i32) -> Result<()> {
        Ok(())
    }
}

/// Create a chunk store from configuration
pub async fn create_chunk_store(config: &DatabaseConfig) -> Result<Arc<dyn ChunkStore>> {
    match &config.url {
        Some(url) if !url.is_empty() => {
            let store = PostgresChunkStore::connect(url, config.max_connections).await?;
            info!("Chunk audit log enabled");
            Ok(Arc::new(store))
        }
        _ => {
            warn!("No database configured, chunk audit log disabled");
            Ok(Arc::new(NoopChunkStore))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_store_accepts_writes() {
        let store = NoopChunkStore;
        store.append("https://example.com/doc", "chunk text", 42).await.unwrap();
    }

    #[tokio::test]
    async fn test_factory_defaults_to_noop() {
        let store = create_chunk_store(&DatabaseConfig::default()).await.unwrap();
        store.append("https://example.com/doc", "chunk", 1).await.unwrap();
    }
}
