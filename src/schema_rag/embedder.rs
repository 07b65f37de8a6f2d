//! Text embedding backends
//!
//! Embeds user questions and stored example queries via the OpenAI embeddings API.

use crate::error::{QueryGptError, Result};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed_text(&self, text: &str) -> Result<Embedding>;
}

/// Rejects embeddings that cannot carry any similarity signal.
pub fn validate_embedding(embedding: &[f32]) -> Result<()> {
    if embedding.is_empty() {
        return Err(QueryGptError::Embedding("Invalid embedding: empty vector".to_string()));
    }
    if embedding.iter().all(|v| *v == 0.0) {
        return Err(QueryGptError::Embedding("Invalid embedding: all zero values".to_string()));
    }
    Ok(())
}

/// Embedding client using OpenAI API
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        dimension: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryGptError::Embedding(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url,
            model,
            dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryGptError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QueryGptError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| QueryGptError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let data = response_json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| QueryGptError::Embedding("No embedding data in response".to_string()))?;

        let embedding: Vec<f32> = data
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| QueryGptError::Embedding("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        Ok(embedding)
    }
}

/// Constant embedding used when no API key is configured.
#[derive(Debug, Clone)]
pub struct OfflineEmbedder {
    dimension: usize,
}

impl OfflineEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for OfflineEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, _text: &str) -> Result<Embedding> {
        Ok(vec![0.1; self.dimension])
    }
}
