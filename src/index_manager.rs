//! Pipeline orchestration.
//!
//! [`IndexManager`] is the library entry point. It binds project roots to
//! ids, makes sure a converged project context exists, and runs files
//! through chunking, analysis, embedding and storage on a bounded worker
//! pool.
//!
//! # Indexing a Project
//!
//! ```text
//! ensure context ──▶ list files ──▶ ┌ worker (≤ max_concurrent_files) ┐ ──▶ prune vanished
//!                                   │ read → hash check → chunk       │     files
//!                                   │ → analyze each chunk (in order) │
//!                                   │ → embed → upsert → drop stale   │
//!                                   └─────────────────────────────────┘
//! ```
//!
//! Each file commits on its own as soon as it is done, so one file's
//! failure never touches another's records. Failures are contained at the
//! smallest unit (chunk or file) and reported in the [`IndexReport`]. A
//! `Fatal` backend error stops every worker before its next backend call and
//! the run ends as `Aborted`. Cancelling the manager's token does the same
//! and the run ends as `Cancelled`; an interrupted file writes nothing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use project_indexer_core::chunk::{chunk_file, ChunkSettings};
use project_indexer_core::context::{AnalysisIteration, ContextSummary, ProjectContext};
use project_indexer_core::embedding::compose_embedding_text;
use project_indexer_core::error::{BackendError, FailureKind};
use project_indexer_core::identity::{document_id, normalize_path, project_id_for_root, stale_ids};
use project_indexer_core::models::{
    DocumentMetadata, FileMatch, FileMetadata, FunctionMatch, IndexReport, IndexedDocument,
    RemovalReport, RunStatus, SearchFilters, SearchMatch, UnitFailure,
};
use project_indexer_core::search::{function_matches, group_by_file, CANDIDATE_FANOUT};
use project_indexer_core::store::{ProjectCatalog, ProjectStats, VectorStore};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::content_analyzer::ContentAnalyzer;
use crate::context_analyzer::ContextAnalyzer;
use crate::embedder::Embedder;
use crate::inference::{CompletionBackend, EmbeddingBackend};
use crate::progress::{FileOutcome, IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::rate_limit::{RateLimitSettings, RateLimiter};
use crate::scanner::{ScanFilter, Scanner};

/// Everything `pidx status` shows about a project.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    pub project_id: String,
    pub root: String,
    pub context: Option<ContextSummary>,
    pub iterations: usize,
    pub stats: ProjectStats,
}

pub struct IndexManager {
    store: Arc<dyn VectorStore>,
    catalog: Arc<dyn ProjectCatalog>,
    scanner: Arc<dyn Scanner>,
    analyzer: ContextAnalyzer,
    content: Arc<ContentAnalyzer>,
    embedder: Arc<Embedder>,
    chunking: ChunkSettings,
    filter: ScanFilter,
    max_concurrent_files: usize,
    default_top_k: usize,
    progress: Arc<dyn IndexProgressReporter>,
    cancel: CancellationToken,
}

impl IndexManager {
    /// Wire the pipeline from configuration. `store` serves both as the
    /// vector store and the project catalog.
    pub fn new<S>(
        config: &Config,
        store: Arc<S>,
        scanner: Arc<dyn Scanner>,
        completion: Arc<dyn CompletionBackend>,
        embedding: Arc<dyn EmbeddingBackend>,
    ) -> Self
    where
        S: VectorStore + ProjectCatalog + 'static,
    {
        let limiter = Arc::new(RateLimiter::new(RateLimitSettings::from(&config.rate_limit)));
        let vectors: Arc<dyn VectorStore> = store.clone();
        let catalog: Arc<dyn ProjectCatalog> = store;

        let analyzer = ContextAnalyzer::new(
            completion.clone(),
            limiter.clone(),
            vectors.clone(),
            catalog.clone(),
            scanner.clone(),
            config.analysis.settings(),
        );

        Self {
            store: vectors,
            catalog,
            scanner,
            analyzer,
            content: Arc::new(ContentAnalyzer::new(completion, limiter.clone())),
            embedder: Arc::new(Embedder::new(embedding, limiter, config.embedding.batch_size)),
            chunking: config.chunking.settings(),
            filter: ScanFilter::from(&config.indexing),
            max_concurrent_files: config.indexing.max_concurrent_files.max(1),
            default_top_k: config.retrieval.top_k,
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, reporter: Arc<dyn IndexProgressReporter>) -> Self {
        self.progress = reporter;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    // ============ Projects ============

    /// Bind a root directory to its deterministic project id.
    pub async fn register_project(&self, root: &Path) -> Result<String> {
        let canonical = tokio::fs::canonicalize(root)
            .await
            .unwrap_or_else(|_| root.to_path_buf());
        let root_str = canonical.to_string_lossy().to_string();
        let project_id = project_id_for_root(&root_str);
        self.catalog.register_project(&project_id, &root_str).await?;
        debug!(project_id = %project_id, root = %root_str, "registered project");
        Ok(project_id)
    }

    async fn project_root(&self, project_id: &str) -> Result<PathBuf> {
        match self.catalog.project_root(project_id).await? {
            Some(root) => Ok(PathBuf::from(root)),
            None => bail!("Unknown project: {}", project_id),
        }
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let removed = self.store.delete_project(project_id).await?;
        self.catalog.forget_project(project_id).await?;
        info!(project_id, documents = removed, "deleted project");
        Ok(removed)
    }

    pub async fn status(&self, project_id: &str) -> Result<ProjectStatus> {
        let root = self.project_root(project_id).await?;
        Ok(ProjectStatus {
            project_id: project_id.to_string(),
            root: root.to_string_lossy().to_string(),
            context: self
                .store
                .load_project_context(project_id)
                .await?
                .map(|c| c.summary()),
            iterations: self.catalog.iterations(project_id).await?.len(),
            stats: self.store.project_stats(project_id).await?,
        })
    }

    // ============ Analysis ============

    pub async fn start_or_resume_analysis(&self, project_id: &str, force: bool) -> Result<ContextSummary> {
        Ok(self.ensure_context(project_id, force).await?.summary())
    }

    pub async fn get_iterations(&self, project_id: &str) -> Result<Vec<AnalysisIteration>> {
        self.catalog.iterations(project_id).await
    }

    async fn ensure_context(&self, project_id: &str, force: bool) -> Result<ProjectContext> {
        let root = self.project_root(project_id).await?;
        self.analyzer
            .analyze(project_id, &root, &self.filter, force, &self.cancel)
            .await
    }

    // ============ Indexing ============

    /// Index every listed file. `force` re-runs analysis and ignores the
    /// unchanged-content skip.
    pub async fn index_project(&self, project_id: &str, force: bool) -> Result<IndexReport> {
        let context = Arc::new(self.ensure_context(project_id, force).await?);
        let root = self.project_root(project_id).await?;

        self.progress.report(IndexProgressEvent::Discovering {
            project_id: project_id.to_string(),
        });
        let files = self.scanner.list_files(&root, &self.filter).await?;
        let listed: HashSet<String> = files.iter().map(|f| f.relative_path.clone()).collect();
        info!(
            project_id,
            files = files.len(),
            force,
            embedding_model = self.embedder.model_name(),
            "indexing project"
        );

        let mut report = self.run_files(project_id, context, files, force).await;

        if matches!(report.status, RunStatus::Completed) {
            for path in self.store.indexed_paths(project_id).await? {
                if !listed.contains(&path) {
                    self.remove_path(project_id, &path).await?;
                    report.files_pruned += 1;
                }
            }
        }

        report.finish();
        log_report(&report);
        Ok(report)
    }

    /// Re-index specific files or directories. Paths that no longer exist
    /// are removed from the index.
    pub async fn update_files(&self, project_id: &str, paths: &[String]) -> Result<IndexReport> {
        let context = Arc::new(self.ensure_context(project_id, false).await?);
        let root = self.project_root(project_id).await?;
        let wanted: Vec<String> = paths.iter().map(|p| relative_to(&root, p)).collect();

        let listing = self.scanner.list_files(&root, &self.filter).await?;
        let selected: Vec<FileMetadata> = listing
            .into_iter()
            .filter(|f| wanted.iter().any(|w| covers(w, &f.relative_path)))
            .collect();
        let selected_paths: HashSet<String> =
            selected.iter().map(|f| f.relative_path.clone()).collect();
        info!(project_id, files = selected.len(), "updating files");

        let mut report = self.run_files(project_id, context, selected, false).await;

        if matches!(report.status, RunStatus::Completed) {
            for path in self.store.indexed_paths(project_id).await? {
                let requested = wanted.iter().any(|w| covers(w, &path));
                if requested && !selected_paths.contains(&path) {
                    self.remove_path(project_id, &path).await?;
                    report.files_pruned += 1;
                }
            }
        }

        report.finish();
        log_report(&report);
        Ok(report)
    }

    pub async fn remove_files(&self, project_id: &str, paths: &[String]) -> Result<RemovalReport> {
        let root = self.project_root(project_id).await?;
        let indexed = self.store.indexed_paths(project_id).await?;
        let mut report = RemovalReport::default();

        for raw in paths {
            let wanted = relative_to(&root, raw);
            let matched: Vec<&String> = indexed.iter().filter(|p| covers(&wanted, p)).collect();
            if matched.is_empty() {
                report.not_indexed.push(wanted);
                continue;
            }
            for path in matched {
                report.documents_deleted += self.remove_path(project_id, path).await?;
                report.files_removed += 1;
            }
        }

        info!(
            project_id,
            files = report.files_removed,
            documents = report.documents_deleted,
            "removed files from index"
        );
        Ok(report)
    }

    async fn remove_path(&self, project_id: &str, path: &str) -> Result<usize> {
        match self.store.file_state(project_id, path).await? {
            Some(state) => self.store.delete(&state.ids).await,
            None => Ok(0),
        }
    }

    // ============ Search ============

    pub async fn search(
        &self,
        project_id: &str,
        query: &str,
        filters: &SearchFilters,
        top_k: Option<usize>,
    ) -> Result<Vec<SearchMatch>> {
        let k = self.top_k(top_k);
        self.candidates(project_id, query, filters, k).await
    }

    /// Most relevant files, one entry per file, scored by its best chunk.
    pub async fn search_files(
        &self,
        project_id: &str,
        query: &str,
        filters: &SearchFilters,
        top_k: Option<usize>,
    ) -> Result<Vec<FileMatch>> {
        let k = self.top_k(top_k);
        let hits = self
            .candidates(project_id, query, filters, k * CANDIDATE_FANOUT)
            .await?;
        Ok(group_by_file(&hits, k))
    }

    /// Key functions from the most relevant chunks. `name` narrows the
    /// result to functions whose name contains it.
    pub async fn search_functions(
        &self,
        project_id: &str,
        query: &str,
        name: Option<&str>,
        filters: &SearchFilters,
        top_k: Option<usize>,
    ) -> Result<Vec<FunctionMatch>> {
        let k = self.top_k(top_k);
        let hits = self
            .candidates(project_id, query, filters, k * CANDIDATE_FANOUT)
            .await?;
        Ok(function_matches(&hits, name, k))
    }

    fn top_k(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default_top_k).max(1)
    }

    async fn candidates(
        &self,
        project_id: &str,
        query: &str,
        filters: &SearchFilters,
        k: usize,
    ) -> Result<Vec<SearchMatch>> {
        if query.trim().is_empty() {
            bail!("Search query must not be empty");
        }
        let query_vec = self.embedder.embed_one(query).await?;
        self.store.search(project_id, &query_vec, filters, k).await
    }

    // ============ Worker Pool ============

    async fn run_files(
        &self,
        project_id: &str,
        context: Arc<ProjectContext>,
        files: Vec<FileMetadata>,
        force: bool,
    ) -> IndexReport {
        let mut report = IndexReport::new(uuid::Uuid::new_v4().to_string(), project_id.to_string());
        let total = files.len() as u64;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_files));
        // Child of the manager's token: cancelled by the caller or by a fatal error.
        let stop = self.cancel.child_token();

        let mut workers = JoinSet::new();
        for file in files {
            let worker = FileWorker {
                project_id: project_id.to_string(),
                context: context.clone(),
                store: self.store.clone(),
                scanner: self.scanner.clone(),
                content: self.content.clone(),
                embedder: self.embedder.clone(),
                chunking: self.chunking,
                force,
                stop: stop.clone(),
            };
            let semaphore = semaphore.clone();
            workers.spawn(async move {
                let path = file.relative_path.clone();
                match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.run(file).await,
                    Err(_) => FileResult::cancelled(path),
                }
            });
        }

        let mut done = 0u64;
        let mut fatal = false;
        while let Some(joined) = workers.join_next().await {
            done += 1;
            let result = match joined {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "indexing worker panicked");
                    report.files_failed += 1;
                    report.record("worker", FailureKind::Fatal, e.to_string());
                    continue;
                }
            };
            if result.fatal && !fatal {
                fatal = true;
                stop.cancel();
                error!(path = %result.path, "fatal backend error, aborting run");
            }
            self.progress.report(IndexProgressEvent::FileDone {
                project_id: project_id.to_string(),
                path: result.path.clone(),
                outcome: result.outcome,
                n: done,
                total,
            });
            apply(&mut report, result);
        }

        if fatal {
            report.status = RunStatus::Aborted;
        } else if self.cancel.is_cancelled() {
            report.status = RunStatus::Cancelled;
        }
        report
    }
}

fn log_report(report: &IndexReport) {
    info!(
        project_id = %report.project_id,
        run_id = %report.run_id,
        status = ?report.status,
        indexed = report.files_indexed,
        partial = report.files_partial,
        skipped = report.files_skipped,
        failed = report.files_failed,
        pruned = report.files_pruned,
        chunks = report.chunks_indexed,
        chunks_failed = report.chunks_failed,
        "indexing run finished"
    );
}

fn apply(report: &mut IndexReport, result: FileResult) {
    match result.outcome {
        FileOutcome::Indexed => report.files_indexed += 1,
        FileOutcome::Partial => report.files_partial += 1,
        FileOutcome::Skipped => report.files_skipped += 1,
        FileOutcome::Failed => report.files_failed += 1,
        FileOutcome::Cancelled => {}
    }
    report.chunks_indexed += result.chunks_indexed;
    report.chunks_failed += result.chunks_failed;
    report.failures.extend(result.failures);
}

/// Project-relative form of a user-supplied path.
fn relative_to(root: &Path, raw: &str) -> String {
    let p = Path::new(raw);
    let rel = p.strip_prefix(root).unwrap_or(p);
    normalize_path(&rel.to_string_lossy())
        .trim_end_matches('/')
        .to_string()
}

/// Whether `wanted` names `path` itself or a directory containing it.
fn covers(wanted: &str, path: &str) -> bool {
    wanted.is_empty()
        || wanted == "."
        || path == wanted
        || path
            .strip_prefix(wanted)
            .map(|rest| rest.starts_with('/'))
            .unwrap_or(false)
}

// ============ File Worker ============

struct FileResult {
    path: String,
    outcome: FileOutcome,
    chunks_indexed: usize,
    chunks_failed: usize,
    failures: Vec<UnitFailure>,
    fatal: bool,
}

impl FileResult {
    fn new(path: String, outcome: FileOutcome) -> Self {
        Self {
            path,
            outcome,
            chunks_indexed: 0,
            chunks_failed: 0,
            failures: Vec::new(),
            fatal: false,
        }
    }

    fn cancelled(path: String) -> Self {
        let mut r = Self::new(path.clone(), FileOutcome::Cancelled);
        r.failures.push(UnitFailure {
            unit: path,
            kind: FailureKind::Cancelled,
            message: "run stopped before this file was committed".into(),
        });
        r
    }

    fn failed(path: String, kind: FailureKind, message: String) -> Self {
        let mut r = Self::new(path.clone(), FileOutcome::Failed);
        r.failures.push(UnitFailure {
            unit: path,
            kind,
            message,
        });
        r
    }

    fn fatal(path: String, unit: String, e: &BackendError) -> Self {
        let mut r = Self::new(path, FileOutcome::Failed);
        r.failures.push(UnitFailure {
            unit,
            kind: FailureKind::Fatal,
            message: e.to_string(),
        });
        r.fatal = true;
        r
    }
}

struct FileWorker {
    project_id: String,
    context: Arc<ProjectContext>,
    store: Arc<dyn VectorStore>,
    scanner: Arc<dyn Scanner>,
    content: Arc<ContentAnalyzer>,
    embedder: Arc<Embedder>,
    chunking: ChunkSettings,
    force: bool,
    stop: CancellationToken,
}

impl FileWorker {
    /// Stop sibling workers before reporting the fatal error.
    fn abort(&self, path: String, unit: String, e: &BackendError) -> FileResult {
        self.stop.cancel();
        FileResult::fatal(path, unit, e)
    }

    async fn run(self, file: FileMetadata) -> FileResult {
        let path = file.relative_path.clone();
        if self.stop.is_cancelled() {
            return FileResult::cancelled(path);
        }

        let previous = match self.store.file_state(&self.project_id, &path).await {
            Ok(p) => p,
            Err(e) => return FileResult::failed(path, FailureKind::Store, e.to_string()),
        };
        let content = match self.scanner.read_file(&file.absolute_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path, error = %e, "could not read file");
                return FileResult::failed(path, FailureKind::ScannerIo, e.to_string());
            }
        };

        if !self.force {
            if let Some(ref prev) = previous {
                if prev.content_hash == content.content_hash && prev.is_complete() {
                    debug!(path = %path, "unchanged, skipping");
                    return FileResult::new(path, FileOutcome::Skipped);
                }
            }
        }

        let chunks = chunk_file(&content.text, &file.language, &self.chunking);
        let previous_ids = previous.map(|p| p.ids).unwrap_or_default();

        if chunks.is_empty() {
            if !previous_ids.is_empty() {
                if let Err(e) = self.store.delete(&previous_ids).await {
                    return FileResult::failed(path, FailureKind::Store, e.to_string());
                }
            }
            return FileResult::new(path, FileOutcome::Skipped);
        }

        // Analyze chunks in order.
        let mut result = FileResult::new(path.clone(), FileOutcome::Indexed);
        let mut analyzed = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            if self.stop.is_cancelled() {
                return FileResult::cancelled(path);
            }
            let unit = format!("{}#{}", path, chunk.chunk_index);
            match self.content.analyze(chunk, &file, &self.context).await {
                Ok(analysis) => analyzed.push((chunk, analysis)),
                Err(e) if e.is_fatal() => return self.abort(path, unit, &e),
                Err(e) => {
                    warn!(unit = %unit, error = %e, "chunk analysis failed");
                    result.chunks_failed += 1;
                    result.failures.push(UnitFailure {
                        unit,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.stop.is_cancelled() {
            return FileResult::cancelled(path);
        }

        let texts: Vec<String> = analyzed
            .iter()
            .map(|(chunk, analysis)| compose_embedding_text(&self.context, &file, analysis, &chunk.text))
            .collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(&texts).await
        };

        let mut docs = Vec::with_capacity(analyzed.len());
        for ((chunk, analysis), vector) in analyzed.into_iter().zip(vectors) {
            let unit = format!("{}#{}", path, chunk.chunk_index);
            match vector {
                Ok(embedding) => docs.push(IndexedDocument {
                    id: document_id(&self.project_id, &path, chunk.chunk_index),
                    embedding,
                    text: chunk.text.clone(),
                    metadata: DocumentMetadata {
                        project_id: self.project_id.clone(),
                        project_name: self.context.name.value.clone(),
                        relative_path: path.clone(),
                        language: file.language.clone(),
                        kind: file.kind,
                        content_hash: content.content_hash.clone(),
                        chunk_index: chunk.chunk_index,
                        total_chunks: chunk.total_chunks,
                        start_line: chunk.start_line,
                        end_line: chunk.end_line,
                        analysis,
                    },
                }),
                Err(e) if e.is_fatal() => return self.abort(path, unit, &e),
                Err(e) => {
                    warn!(unit = %unit, error = %e, "chunk embedding failed");
                    result.chunks_failed += 1;
                    result.failures.push(UnitFailure {
                        unit,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.stop.is_cancelled() {
            return FileResult::cancelled(path);
        }

        if !docs.is_empty() {
            if let Err(e) = self.store.upsert(&docs).await {
                return FileResult::failed(path, FailureKind::Store, e.to_string());
            }
        }
        let written: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let stale = stale_ids(&previous_ids, &written);
        if !stale.is_empty() {
            match self.store.delete(&stale).await {
                Ok(n) => debug!(path = %path, removed = n, "removed stale documents"),
                Err(e) => return FileResult::failed(path, FailureKind::Store, e.to_string()),
            }
        }

        result.chunks_indexed = docs.len();
        result.outcome = if result.chunks_failed == 0 {
            FileOutcome::Indexed
        } else if docs.is_empty() {
            FileOutcome::Failed
        } else {
            FileOutcome::Partial
        };
        result
    }
}
