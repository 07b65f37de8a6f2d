//! Text-generation backends
//!
//! The pipeline only sees [`TextGenerator`]: render a prompt, get back either
//! plain text or an already-structured JSON object.

use crate::error::{QueryGptError, Result};
use crate::prompts::Prompt;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Returned by the offline generator so the pipeline stays exercisable without credentials.
pub const OFFLINE_PLACEHOLDER: &str =
    "This is a placeholder response as the LLM service is unavailable.";

/// Output of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    Structured(Map<String, Value>),
}

impl Generation {
    pub fn text(s: impl Into<String>) -> Self {
        Generation::Text(s.into())
    }

    /// Raw output as JSON, for debug echoing.
    pub fn to_value(&self) -> Value {
        match self {
            Generation::Text(s) => Value::String(s.clone()),
            Generation::Structured(map) => Value::Object(map.clone()),
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(&self, prompt: &Prompt) -> Result<Generation>;
}

/// OpenAI-compatible chat completions client.
#[derive(Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryGptError::Llm(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url,
            model,
        })
    }

    pub async fn call_llm(&self, prompt: &str) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1,
        });

        // Reasoning models spend completion tokens on reasoning
        if self.model.starts_with("gpt-5") || self.model.contains("o1") {
            body["max_completion_tokens"] = serde_json::json!(4000);
        } else {
            body["max_tokens"] = serde_json::json!(1500);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryGptError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QueryGptError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| QueryGptError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_completion(&response_json)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
        debug!("Calling {} for prompt '{}'", self.model, prompt.name);
        let content = self.call_llm(&prompt.render()).await?;
        Ok(Generation::Text(content))
    }
}

/// Pull the message content out of a chat completions payload.
fn extract_completion(response_json: &Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(QueryGptError::Llm(format!("LLM API error: {}", error)));
    }

    let choices = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| QueryGptError::Llm("No choices array in LLM response".to_string()))?;

    let first = choices
        .first()
        .ok_or_else(|| QueryGptError::Llm("Empty choices array in LLM response".to_string()))?;

    match first.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(QueryGptError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        _ => {}
    }

    let content = first["message"]["content"]
        .as_str()
        .ok_or_else(|| QueryGptError::Llm("No content in LLM response".to_string()))?;

    if content.is_empty() {
        return Err(QueryGptError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

/// Stands in for the real backend when no API key is configured.
#[derive(Debug, Clone, Default)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<Generation> {
        Ok(Generation::text(OFFLINE_PLACEHOLDER))
    }
}
