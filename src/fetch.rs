//! Document fetching
//!
//! Retrieves the raw text of a remote document. Fetch failures are fatal
//! for the pipeline run: without the document there is nothing to answer
//! from.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Capability for obtaining raw document text from a URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// HTTP document fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::Fetch {
                message: format!("request to {} failed: {}", url, e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                message: format!("{} returned {}", url, status),
            });
        }

        response.text().await.map_err(|e| AppError::Fetch {
            message: format!("failed to read body from {}: {}", url, e),
        })
    }
}
