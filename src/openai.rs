//! OpenAI-compatible HTTP backends.
//!
//! [`OpenAiCompletion`] calls `POST {base_url}/chat/completions` with a
//! `json_schema` response format; [`OpenAiEmbedding`] calls
//! `POST {base_url}/embeddings`. Both need `OPENAI_API_KEY`.
//!
//! # Error Mapping
//!
//! | Outcome | [`BackendError`] |
//! |---------|------------------|
//! | HTTP 429 | `Throttled` |
//! | HTTP 5xx, request timeout, connection failure | `Timeout` |
//! | HTTP 401 / 403 | `Fatal` |
//! | other HTTP 4xx | `Rejected` |
//! | unparsable body, missing fields | `Malformed` |
//!
//! No retrying happens here; [`crate::rate_limit::RateLimiter`] owns that.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use project_indexer_core::error::BackendError;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::inference::{CompletionBackend, CompletionRequest, EmbeddingBackend};
use crate::rate_limit::Metered;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

fn api_key() -> Result<String> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(k) if !k.trim().is_empty() => Ok(k),
        _ => bail!("OPENAI_API_KEY environment variable not set"),
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Map a non-success HTTP status to the error taxonomy.
pub fn classify_status(status: u16, body: &str) -> BackendError {
    let message = format!("HTTP {}: {}", status, truncate(body, 500));
    match status {
        429 => BackendError::Throttled(message),
        401 | 403 => BackendError::Fatal(message),
        s if s >= 500 => BackendError::Timeout(message),
        _ => BackendError::Rejected(message),
    }
}

fn classify_transport(e: reqwest::Error) -> BackendError {
    if e.is_decode() {
        BackendError::Malformed(e.to_string())
    } else {
        BackendError::Timeout(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut i = max;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    &s[..i]
}

fn usage_tokens(json: &serde_json::Value) -> Option<u64> {
    json.get("usage")
        .and_then(|u| u.get("total_tokens"))
        .and_then(|t| t.as_u64())
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value, BackendError> {
    let response = client
        .post(url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(classify_transport)?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(classify_status(status.as_u16(), &body_text));
    }
    response.json().await.map_err(classify_transport)
}

// ============ Completion ============

pub struct OpenAiCompletion {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompletion {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
        })
    }
}

/// Pull the structured answer out of a chat completion response.
pub fn parse_completion_response(json: &serde_json::Value) -> Result<serde_json::Value, BackendError> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| BackendError::Malformed("missing choices[0].message.content".into()))?;
    serde_json::from_str(content)
        .map_err(|e| BackendError::Malformed(format!("content is not JSON: {}", e)))
}

#[async_trait]
impl CompletionBackend for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Metered<serde_json::Value>, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "schema": request.schema,
                    "strict": true,
                },
            },
        });
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let json = post_json(&self.client, &url, &self.api_key, &body).await?;
        let value = parse_completion_response(&json)?;
        Ok(Metered::new(value, usage_tokens(&json)))
    }
}

// ============ Embeddings ============

pub struct OpenAiEmbedding {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key: api_key()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            dims,
        })
    }
}

/// Extract `data[].embedding` ordered by `data[].index`.
pub fn parse_embedding_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>, BackendError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| BackendError::Malformed("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| BackendError::Malformed("missing embedding".into()))?;
        let vec = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| BackendError::Malformed("non-numeric embedding value".into()))?;
        indexed.push((index, vec));
    }

    if indexed.len() != expected {
        return Err(BackendError::Malformed(format!(
            "expected {} embeddings, got {}",
            expected,
            indexed.len()
        )));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedding {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Metered<Vec<Vec<f32>>>, BackendError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let json = post_json(&self.client, &url, &self.api_key, &body).await?;
        let vectors = parse_embedding_response(&json, texts.len())?;
        Ok(Metered::new(vectors, usage_tokens(&json)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(classify_status(429, ""), BackendError::Throttled(_)));
        assert!(matches!(classify_status(503, ""), BackendError::Timeout(_)));
        assert!(matches!(classify_status(401, ""), BackendError::Fatal(_)));
        assert!(matches!(classify_status(400, "bad"), BackendError::Rejected(_)));
    }

    #[test]
    fn test_parse_completion_content() {
        let json = serde_json::json!({
            "choices": [{ "message": { "content": "{\"purpose\":\"x\"}" } }],
            "usage": { "total_tokens": 42 }
        });
        let value = parse_completion_response(&json).unwrap();
        assert_eq!(value["purpose"], "x");
        assert_eq!(usage_tokens(&json), Some(42));

        let not_json = serde_json::json!({
            "choices": [{ "message": { "content": "sure! here you go" } }]
        });
        assert!(matches!(
            parse_completion_response(&not_json),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_embeddings_reorders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        let vecs = parse_embedding_response(&json, 2).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert!(parse_embedding_response(&json, 3).is_err());
    }
}
