//! In-memory [`VectorStore`] and [`ProjectCatalog`] for tests.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Search is brute-force cosine
//! similarity over the project's documents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::context::{AnalysisIteration, ProjectContext};
use crate::embedding::cosine_similarity;
use crate::models::{FileIndexState, IndexedDocument, SearchFilters, SearchMatch};

use super::{rank_matches, ProjectCatalog, ProjectStats, VectorStore};

/// In-memory store for tests and embedding in other tools.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, IndexedDocument>>,
    contexts: RwLock<HashMap<String, ProjectContext>>,
    projects: RwLock<HashMap<String, String>>,
    iterations: RwLock<HashMap<String, Vec<AnalysisIteration>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored document, ordered by id.
    pub fn documents(&self) -> Result<Vec<IndexedDocument>> {
        let docs = read(&self.docs)?;
        let mut all: Vec<IndexedDocument> = docs.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, docs: &[IndexedDocument]) -> Result<()> {
        let mut stored = write(&self.docs)?;
        for doc in docs {
            stored.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut stored = write(&self.docs)?;
        Ok(ids.iter().filter(|id| stored.remove(*id).is_some()).count())
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let removed = {
            let mut stored = write(&self.docs)?;
            let before = stored.len();
            stored.retain(|_, d| d.metadata.project_id != project_id);
            before - stored.len()
        };
        write(&self.contexts)?.remove(project_id);
        Ok(removed)
    }

    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<SearchMatch>> {
        let stored = read(&self.docs)?;
        let matches = stored
            .values()
            .filter(|d| d.metadata.project_id == project_id && filters.matches(&d.metadata))
            .map(|d| SearchMatch {
                id: d.id.clone(),
                score: cosine_similarity(query_vec, &d.embedding),
                text: d.text.clone(),
                metadata: d.metadata.clone(),
            })
            .collect();
        Ok(rank_matches(matches, top_k))
    }

    async fn file_state(&self, project_id: &str, relative_path: &str) -> Result<Option<FileIndexState>> {
        let stored = read(&self.docs)?;
        let mut docs: Vec<&IndexedDocument> = stored
            .values()
            .filter(|d| d.metadata.project_id == project_id && d.metadata.relative_path == relative_path)
            .collect();
        if docs.is_empty() {
            return Ok(None);
        }
        docs.sort_by_key(|d| d.metadata.chunk_index);

        let hashes: HashSet<&str> = docs.iter().map(|d| d.metadata.content_hash.as_str()).collect();
        let content_hash = if hashes.len() == 1 {
            docs[0].metadata.content_hash.clone()
        } else {
            String::new()
        };
        Ok(Some(FileIndexState {
            content_hash,
            total_chunks: docs[0].metadata.total_chunks,
            ids: docs.iter().map(|d| d.id.clone()).collect(),
        }))
    }

    async fn indexed_paths(&self, project_id: &str) -> Result<Vec<String>> {
        let stored = read(&self.docs)?;
        let mut paths: Vec<String> = stored
            .values()
            .filter(|d| d.metadata.project_id == project_id)
            .map(|d| d.metadata.relative_path.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()> {
        write(&self.contexts)?.insert(context.project_id.clone(), context.clone());
        Ok(())
    }

    async fn load_project_context(&self, project_id: &str) -> Result<Option<ProjectContext>> {
        Ok(read(&self.contexts)?.get(project_id).cloned())
    }

    async fn project_stats(&self, project_id: &str) -> Result<ProjectStats> {
        let stored = read(&self.docs)?;
        let mut files = HashSet::new();
        let mut languages: BTreeMap<String, usize> = BTreeMap::new();
        let mut documents = 0;
        for d in stored.values().filter(|d| d.metadata.project_id == project_id) {
            documents += 1;
            files.insert(d.metadata.relative_path.as_str());
            *languages.entry(d.metadata.language.clone()).or_default() += 1;
        }
        let mut languages: Vec<(String, usize)> = languages.into_iter().collect();
        languages.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(ProjectStats {
            files: files.len(),
            documents,
            languages,
        })
    }
}

#[async_trait]
impl ProjectCatalog for InMemoryStore {
    async fn register_project(&self, project_id: &str, root: &str) -> Result<()> {
        write(&self.projects)?.insert(project_id.to_string(), root.to_string());
        Ok(())
    }

    async fn project_root(&self, project_id: &str) -> Result<Option<String>> {
        Ok(read(&self.projects)?.get(project_id).cloned())
    }

    async fn forget_project(&self, project_id: &str) -> Result<()> {
        write(&self.projects)?.remove(project_id);
        write(&self.iterations)?.remove(project_id);
        Ok(())
    }

    async fn append_iteration(&self, project_id: &str, iteration: &AnalysisIteration) -> Result<()> {
        let mut log = write(&self.iterations)?;
        let entries = log.entry(project_id.to_string()).or_default();
        if entries.iter().any(|e| e.iteration == iteration.iteration) {
            bail!(
                "iteration {} already recorded for project {}",
                iteration.iteration,
                project_id
            );
        }
        entries.push(iteration.clone());
        entries.sort_by_key(|e| e.iteration);
        Ok(())
    }

    async fn iterations(&self, project_id: &str) -> Result<Vec<AnalysisIteration>> {
        Ok(read(&self.iterations)?
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_iterations(&self, project_id: &str) -> Result<()> {
        write(&self.iterations)?.remove(project_id);
        Ok(())
    }
}
