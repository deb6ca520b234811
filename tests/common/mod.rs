//! Deterministic stand-ins for the model backends and the filesystem.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use project_indexer::config::Config;
use project_indexer::index_manager::IndexManager;
use project_indexer::inference::{CompletionBackend, CompletionRequest, EmbeddingBackend};
use project_indexer::rate_limit::Metered;
use project_indexer::scanner::{classify, content_hash, detect_language, FileContent, ScanFilter, Scanner};
use project_indexer_core::error::BackendError;
use project_indexer_core::models::FileMetadata;
use project_indexer_core::store::memory::InMemoryStore;
use project_indexer_core::store::{ProjectCatalog, VectorStore};
use serde_json::json;
use tokio_util::sync::CancellationToken;

pub const ROOT: &str = "/mem/project";

/// Chunks containing this text get an undecodable analysis.
pub const MALFORMED_MARKER: &str = "MALFORMED_ANALYSIS";
/// Chunks containing this text get a fatal backend error.
pub const FATAL_MARKER: &str = "FATAL_ANALYSIS";
/// Analyzing a chunk containing this text cancels the armed token.
pub const CANCEL_MARKER: &str = "CANCEL_DURING_ANALYSIS";

// ============ Scanner ============

#[derive(Default)]
pub struct MemoryScanner {
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryScanner {
    pub fn with_files(files: &[(&str, &str)]) -> Arc<Self> {
        let scanner = Self::default();
        for (path, text) in files {
            scanner.set(path, text);
        }
        Arc::new(scanner)
    }

    pub fn set(&self, path: &str, text: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().unwrap().remove(path);
    }
}

#[async_trait]
impl Scanner for MemoryScanner {
    async fn list_files(&self, _root: &Path, _filter: &ScanFilter) -> Result<Vec<FileMetadata>> {
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .map(|(path, text)| {
                let language = detect_language(path);
                FileMetadata {
                    absolute_path: format!("{}/{}", ROOT, path),
                    relative_path: path.clone(),
                    kind: classify(path, &language),
                    language,
                    content_hash: content_hash(text.as_bytes()),
                    size_bytes: text.len() as u64,
                    modified_at: Utc::now(),
                }
            })
            .collect())
    }

    async fn read_file(&self, absolute_path: &str) -> Result<FileContent> {
        let rel = absolute_path
            .strip_prefix(&format!("{}/", ROOT))
            .ok_or_else(|| anyhow!("outside project: {}", absolute_path))?;
        let files = self.files.lock().unwrap();
        let text = files
            .get(rel)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", rel))?;
        Ok(FileContent {
            content_hash: content_hash(text.as_bytes()),
            text,
        })
    }
}

// ============ Completion ============

/// Answers context requests from a confidence schedule and chunk requests
/// with a canned analysis.
pub struct ScriptedCompletion {
    /// Confidence for every field at iteration N is `schedule[N - 1]`
    /// (the last entry repeats).
    schedule: Vec<u8>,
    fail_at_iteration: Mutex<Option<u32>>,
    cancel_at_iteration: Mutex<Option<(u32, CancellationToken)>>,
    cancel_on_marker: Mutex<Option<CancellationToken>>,
    frameworks: Mutex<Vec<String>>,
    pub context_calls: AtomicUsize,
    pub chunk_calls: AtomicUsize,
    /// Chunk requests answered with malformed output.
    pub malformed_calls: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new(schedule: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            schedule: schedule.to_vec(),
            fail_at_iteration: Mutex::new(None),
            cancel_at_iteration: Mutex::new(None),
            cancel_on_marker: Mutex::new(None),
            frameworks: Mutex::new(vec!["flask".to_string()]),
            context_calls: AtomicUsize::new(0),
            chunk_calls: AtomicUsize::new(0),
            malformed_calls: AtomicUsize::new(0),
        })
    }

    /// Frameworks reported by every context update.
    pub fn set_frameworks(&self, frameworks: &[&str]) {
        *self.frameworks.lock().unwrap() = frameworks.iter().map(|s| s.to_string()).collect();
    }

    /// Cancel `token` while answering the context request for `iteration`.
    /// The answer itself still succeeds.
    pub fn cancel_at_iteration(&self, iteration: u32, token: CancellationToken) {
        *self.cancel_at_iteration.lock().unwrap() = Some((iteration, token));
    }

    pub fn context_calls(&self) -> usize {
        self.context_calls.load(Ordering::SeqCst)
    }

    pub fn malformed_calls(&self) -> usize {
        self.malformed_calls.load(Ordering::SeqCst)
    }

    /// Fail the context request for `iteration` once.
    pub fn fail_once_at(&self, iteration: u32) {
        *self.fail_at_iteration.lock().unwrap() = Some(iteration);
    }

    pub fn cancel_on_marker(&self, token: CancellationToken) {
        *self.cancel_on_marker.lock().unwrap() = Some(token);
    }

    pub fn chunk_calls(&self) -> usize {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    fn context_update(&self, request: &CompletionRequest) -> Result<serde_json::Value, BackendError> {
        let iteration = line_value(&request.prompt, "Iteration: ")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        {
            let mut fail = self.fail_at_iteration.lock().unwrap();
            if *fail == Some(iteration) {
                *fail = None;
                return Err(BackendError::Fatal("scripted outage".into()));
            }
        }
        if let Some((at, token)) = self.cancel_at_iteration.lock().unwrap().as_ref() {
            if *at == iteration {
                token.cancel();
            }
        }

        let idx = (iteration as usize).saturating_sub(1).min(self.schedule.len() - 1);
        let c = self.schedule[idx];
        let listing: Vec<String> = request
            .prompt
            .lines()
            .filter_map(|l| l.strip_prefix("- "))
            .map(|s| s.to_string())
            .collect();
        let frameworks = self.frameworks.lock().unwrap().clone();

        Ok(json!({
            "name": { "value": "demo", "confidence": c },
            "purpose": { "value": format!("Demo service, pass {}", iteration), "confidence": c },
            "languages": { "value": ["python"], "confidence": c },
            "frameworks": { "value": frameworks, "confidence": c },
            "modules": { "value": ["src"], "confidence": c },
            "entry_points": { "value": ["main.py"], "confidence": c },
            "architecture": { "value": "single process web service", "confidence": c },
            "next_paths": listing,
            "reasoning": format!("iteration {}", iteration)
        }))
    }

    fn chunk_analysis(&self, request: &CompletionRequest) -> Result<serde_json::Value, BackendError> {
        if request.prompt.contains(FATAL_MARKER) {
            return Err(BackendError::Fatal("account disabled".into()));
        }
        if request.prompt.contains(MALFORMED_MARKER) {
            self.malformed_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(json!({ "unexpected": true }));
        }
        if request.prompt.contains(CANCEL_MARKER) {
            if let Some(token) = self.cancel_on_marker.lock().unwrap().as_ref() {
                token.cancel();
            }
        }

        let path = line_value(&request.prompt, "File: ")
            .and_then(|v| v.split(" (").next().map(|s| s.to_string()))
            .unwrap_or_default();
        let symbols: Vec<String> = request
            .prompt
            .lines()
            .filter_map(|l| l.strip_prefix("def "))
            .filter_map(|l| l.split('(').next())
            .map(|s| s.to_string())
            .collect();

        let functions: Vec<serde_json::Value> = symbols
            .iter()
            .map(|name| json!({ "name": name, "description": format!("Handles {}", name) }))
            .collect();

        Ok(json!({
            "purpose": format!("Contents of {}", path),
            "dependencies": [],
            "exported_symbols": symbols,
            "key_functions": functions,
            "architectural_notes": ""
        }))
    }
}

fn line_value<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|l| l.strip_prefix(prefix))
}

#[async_trait]
impl CompletionBackend for ScriptedCompletion {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<Metered<serde_json::Value>, BackendError> {
        let value = if request.schema_name == "project_context_update" {
            self.context_calls.fetch_add(1, Ordering::SeqCst);
            self.context_update(request)?
        } else {
            self.chunk_calls.fetch_add(1, Ordering::SeqCst);
            self.chunk_analysis(request)?
        };
        Ok(Metered::new(value, Some(100)))
    }
}

// ============ Embedding ============

pub const DIMS: usize = 256;

/// Normalized bag-of-words vector over hashed, lowercased word tokens.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h = DefaultHasher::new();
        word.to_lowercase().hash(&mut h);
        v[(h.finish() % DIMS as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Metered<Vec<Vec<f32>>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Metered::new(texts.iter().map(|t| bag_of_words(t)).collect(), None))
    }
}

// ============ Harness ============

/// Fast limits, no retry sleeps, sequential file workers.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.max_retries = 0;
    config.rate_limit.base_delay_ms = 1;
    config.rate_limit.max_delay_ms = 1;
    config.analysis.max_files_per_iteration = 1;
    config.analysis.confidence_threshold = 90;
    config.analysis.max_iterations = 10;
    config.indexing.max_concurrent_files = 1;
    config
}

/// Chunking small enough that each ~100-char python function is its own chunk.
pub fn tiny_chunks(config: &mut Config) {
    config.chunking.max_tokens = 30;
    config.chunking.overlap_tokens = 5;
}

/// A python file of `n` functions, each one chunk under [`tiny_chunks`].
pub fn python_functions(n: usize, body: &str) -> String {
    (0..n)
        .map(|i| format!("def func_{}():\n    return \"{:x<70}\"\n", i, body))
        .collect()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub scanner: Arc<MemoryScanner>,
    pub completion: Arc<ScriptedCompletion>,
    pub embedder: Arc<HashEmbedder>,
    pub manager: IndexManager,
    pub project_id: String,
}

impl Harness {
    pub async fn new(config: &Config, files: &[(&str, &str)], schedule: &[u8]) -> Self {
        Self::with_parts(
            config,
            Arc::new(InMemoryStore::default()),
            MemoryScanner::with_files(files),
            ScriptedCompletion::new(schedule),
            CancellationToken::new(),
        )
        .await
    }

    pub async fn with_parts(
        config: &Config,
        store: Arc<InMemoryStore>,
        scanner: Arc<MemoryScanner>,
        completion: Arc<ScriptedCompletion>,
        cancel: CancellationToken,
    ) -> Self {
        let embedder = HashEmbedder::new();
        let manager = IndexManager::new(
            config,
            store.clone(),
            scanner.clone(),
            completion.clone(),
            embedder.clone(),
        )
        .with_cancellation(cancel);
        let project_id = manager
            .register_project(Path::new(ROOT))
            .await
            .expect("register project");
        Self {
            store,
            scanner,
            completion,
            embedder,
            manager,
            project_id,
        }
    }

    pub async fn ids_for(&self, path: &str) -> Vec<String> {
        let mut ids = self
            .store
            .file_state(&self.project_id, path)
            .await
            .unwrap()
            .map(|s| s.ids)
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn iteration_numbers(&self) -> Vec<u32> {
        self.store
            .iterations(&self.project_id)
            .await
            .unwrap()
            .iter()
            .map(|i| i.iteration)
            .collect()
    }
}
