//! Storage abstraction for Project Indexer.
//!
//! Two traits split persistence along its two concerns:
//!
//! - [`VectorStore`] holds indexed documents and the serialized project
//!   context, keyed by the identity scheme in [`crate::identity`].
//! - [`ProjectCatalog`] holds project registrations and the append-only
//!   analysis iteration log.
//!
//! Both are `Send + Sync` and async (via `async-trait`) so one store can be
//! shared across the indexing worker pool. The in-memory implementation in
//! [`memory`] backs tests; the app crate provides a SQLite implementation.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::context::{AnalysisIteration, ProjectContext};
use crate::models::{FileIndexState, IndexedDocument, SearchFilters, SearchMatch};

/// Indexed volume for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectStats {
    pub files: usize,
    pub documents: usize,
    /// `(language, documents)` sorted by count descending.
    pub languages: Vec<(String, usize)>,
}

/// Vector records scoped per project.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite documents by identity |
/// | [`delete`](VectorStore::delete) | Remove documents by identity |
/// | [`delete_project`](VectorStore::delete_project) | Remove every record of a project |
/// | [`search`](VectorStore::search) | Cosine similarity search within a project |
/// | [`file_state`](VectorStore::file_state) | Stored hash and live ids of one file |
/// | [`indexed_paths`](VectorStore::indexed_paths) | Every file with live documents |
/// | [`save_project_context`](VectorStore::save_project_context) | Write the reserved context record |
/// | [`load_project_context`](VectorStore::load_project_context) | Read the reserved context record |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite. Same-identity writes are last-writer-wins.
    async fn upsert(&self, docs: &[IndexedDocument]) -> Result<()>;

    /// Returns how many records existed and were removed.
    async fn delete(&self, ids: &[String]) -> Result<usize>;

    /// Remove every document and the context record of a project.
    async fn delete_project(&self, project_id: &str) -> Result<usize>;

    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<SearchMatch>>;

    async fn file_state(&self, project_id: &str, relative_path: &str) -> Result<Option<FileIndexState>>;

    async fn indexed_paths(&self, project_id: &str) -> Result<Vec<String>>;

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()>;

    async fn load_project_context(&self, project_id: &str) -> Result<Option<ProjectContext>>;

    async fn project_stats(&self, project_id: &str) -> Result<ProjectStats>;
}

/// Project registrations and the analysis log.
#[async_trait]
pub trait ProjectCatalog: Send + Sync {
    /// Bind a project id to its root directory. Idempotent.
    async fn register_project(&self, project_id: &str, root: &str) -> Result<()>;

    async fn project_root(&self, project_id: &str) -> Result<Option<String>>;

    async fn forget_project(&self, project_id: &str) -> Result<()>;

    /// Append one iteration. Fails if that iteration number already exists.
    async fn append_iteration(&self, project_id: &str, iteration: &AnalysisIteration) -> Result<()>;

    /// The full log, ordered by iteration number.
    async fn iterations(&self, project_id: &str) -> Result<Vec<AnalysisIteration>>;

    /// Drop the iteration log, ahead of a forced re-analysis.
    async fn clear_iterations(&self, project_id: &str) -> Result<()>;
}

/// Rank scored candidates: score descending, id ascending on ties.
pub fn rank_matches(mut matches: Vec<SearchMatch>, top_k: usize) -> Vec<SearchMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches.truncate(top_k);
    matches
}
