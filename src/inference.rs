//! Inference backend abstraction.
//!
//! Two async traits sit at the seam between the pipeline and whatever model
//! server answers it:
//!
//! - [`CompletionBackend`]: structured completion. The caller sends a prompt
//!   plus a JSON schema and gets back a JSON value claimed to match it.
//! - [`EmbeddingBackend`]: batched text embeddings.
//!
//! Both report failures as [`BackendError`] so the rate limiter can tell
//! transient failures from terminal ones. Use [`create_completion_backend`]
//! and [`create_embedding_backend`] to build the configured implementation.
//!
//! # Provider Selection
//!
//! | Config Value | Backend |
//! |-------------|---------|
//! | `"disabled"` | [`DisabledBackend`], every call fails with `Fatal` |
//! | `"openai"` | [`OpenAiCompletion`] / [`OpenAiEmbedding`] |

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use project_indexer_core::chunk::estimate_tokens;
use project_indexer_core::error::BackendError;
use serde::de::DeserializeOwned;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::openai::{OpenAiCompletion, OpenAiEmbedding};
use crate::rate_limit::{Metered, RateLimiter};

/// Tokens reserved for the model's answer when estimating a completion.
const COMPLETION_OUTPUT_ALLOWANCE: u64 = 1024;

/// A structured completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    /// Name reported to the backend for the response schema.
    pub schema_name: String,
    /// JSON schema the response must satisfy.
    pub schema: serde_json::Value,
}

impl CompletionRequest {
    pub fn estimated_tokens(&self) -> u64 {
        (estimate_tokens(&self.system) + estimate_tokens(&self.prompt)) as u64
            + COMPLETION_OUTPUT_ALLOWANCE
    }
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// One attempt. Retrying is the rate limiter's job.
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Metered<serde_json::Value>, BackendError>;
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn model_name(&self) -> &str;

    /// Vector dimensionality every returned vector must have.
    fn dims(&self) -> usize;

    /// One attempt. Returns one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Metered<Vec<Vec<f32>>>, BackendError>;
}

/// Decode a backend's JSON into a typed result. Any mismatch is `Malformed`.
pub fn decode_structured<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, BackendError> {
    serde_json::from_value(value).map_err(|e| BackendError::Malformed(e.to_string()))
}

/// Run a structured completion through the limiter and decode the result.
pub async fn complete_structured<T: DeserializeOwned>(
    backend: &dyn CompletionBackend,
    limiter: &RateLimiter,
    request: &CompletionRequest,
) -> Result<T, BackendError> {
    let value = limiter
        .call_with_retry(request.estimated_tokens(), || backend.complete(request))
        .await?;
    decode_structured(value)
}

// ============ Disabled Backend ============

/// Backend used when a provider is `"disabled"`. Every call is `Fatal`.
pub struct DisabledBackend;

#[async_trait]
impl CompletionBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(
        &self,
        _request: &CompletionRequest,
    ) -> Result<Metered<serde_json::Value>, BackendError> {
        Err(BackendError::Fatal("completion provider is disabled".into()))
    }
}

#[async_trait]
impl EmbeddingBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Metered<Vec<Vec<f32>>>, BackendError> {
        Err(BackendError::Fatal("embedding provider is disabled".into()))
    }
}

pub fn create_completion_backend(config: &LlmConfig) -> Result<Arc<dyn CompletionBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "openai" => Ok(Arc::new(OpenAiCompletion::new(config)?)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

pub fn create_embedding_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledBackend)),
        "openai" => Ok(Arc::new(OpenAiEmbedding::new(config)?)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}
