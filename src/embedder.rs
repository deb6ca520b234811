//! Batched embedding with per-item failure isolation.
//!
//! Texts are sent in batches of at most `batch_size`. When a whole batch
//! fails with a non-fatal error, its texts are retried one by one so a
//! single bad input fails only itself. Every returned vector is checked
//! against the backend's declared dimensionality.

use std::sync::Arc;

use project_indexer_core::chunk::estimate_tokens;
use project_indexer_core::error::BackendError;
use tracing::{debug, warn};

use crate::inference::EmbeddingBackend;
use crate::rate_limit::RateLimiter;

pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    limiter: Arc<RateLimiter>,
    batch_size: usize,
}

impl Embedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, limiter: Arc<RateLimiter>, batch_size: usize) -> Self {
        Self {
            backend,
            limiter,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// One result per input, same order.
    pub async fn embed(&self, texts: &[String]) -> Vec<Result<Vec<f32>, BackendError>> {
        let mut results = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            match self.call(batch).await {
                Ok(vectors) => {
                    results.extend(vectors.into_iter().map(|v| self.check_dims(v)));
                }
                Err(e) if e.is_fatal() || batch.len() == 1 => {
                    results.extend(batch.iter().map(|_| Err(e.clone())));
                }
                Err(e) => {
                    warn!(
                        batch = batch.len(),
                        error = %e,
                        "embedding batch failed, falling back to single items"
                    );
                    for text in batch {
                        let single = self
                            .call(std::slice::from_ref(text))
                            .await
                            .and_then(|mut v| {
                                v.pop().ok_or_else(|| {
                                    BackendError::Malformed("empty embedding response".into())
                                })
                            })
                            .and_then(|v| self.check_dims(v));
                        results.push(single);
                    }
                }
            }
        }

        results
    }

    /// Embed a single text, e.g. a search query.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.embed(&[text.to_string()])
            .await
            .pop()
            .unwrap_or_else(|| Err(BackendError::Malformed("empty embedding response".into())))
    }

    async fn call(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let estimated: u64 = batch.iter().map(|t| estimate_tokens(t) as u64).sum();
        debug!(batch = batch.len(), estimated, "embedding batch");
        let vectors = self
            .limiter
            .call_with_retry(estimated, || self.backend.embed(batch))
            .await?;
        if vectors.len() != batch.len() {
            return Err(BackendError::Malformed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn check_dims(&self, vector: Vec<f32>) -> Result<Vec<f32>, BackendError> {
        let dims = self.backend.dims();
        if dims > 0 && vector.len() != dims {
            return Err(BackendError::Malformed(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                dims
            )));
        }
        Ok(vector)
    }
}
