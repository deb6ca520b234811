//! SQLite-backed [`VectorStore`] and [`ProjectCatalog`].
//!
//! Documents live in the `vectors` table with their embedding as a
//! little-endian f32 BLOB. The project context is stored in the same table
//! under its reserved identity with `chunk_index = -1` and no embedding, so
//! every document query filters on `chunk_index >= 0`. Similarity search is
//! brute-force cosine over the project's rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use project_indexer_core::context::{AnalysisIteration, ProjectContext};
use project_indexer_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use project_indexer_core::identity::{project_context_id, PROJECT_CONTEXT_KEY};
use project_indexer_core::models::{
    DocumentMetadata, FileIndexState, IndexedDocument, SearchFilters, SearchMatch,
};
use project_indexer_core::store::{rank_matches, ProjectCatalog, ProjectStats, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(&self, docs: &[IndexedDocument]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let indexed_at = now_ts();

        for doc in docs {
            let metadata_json = serde_json::to_string(&doc.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO vectors (id, project_id, relative_path, chunk_index, total_chunks,
                                     content_hash, language, file_kind, text, metadata_json,
                                     embedding, dims, indexed_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    total_chunks = excluded.total_chunks,
                    content_hash = excluded.content_hash,
                    language = excluded.language,
                    file_kind = excluded.file_kind,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.metadata.project_id)
            .bind(&doc.metadata.relative_path)
            .bind(doc.metadata.chunk_index as i64)
            .bind(doc.metadata.total_chunks as i64)
            .bind(&doc.metadata.content_hash)
            .bind(&doc.metadata.language)
            .bind(doc.metadata.kind.as_str())
            .bind(&doc.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&doc.embedding))
            .bind(doc.embedding.len() as i64)
            .bind(indexed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            removed += sqlx::query("DELETE FROM vectors WHERE id = ? AND chunk_index >= 0")
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn delete_project(&self, project_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM vectors WHERE project_id = ? AND chunk_index >= 0")
            .bind(project_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM vectors WHERE id = ?")
            .bind(project_context_id(project_id))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed as usize)
    }

    async fn search(
        &self,
        project_id: &str,
        query_vec: &[f32],
        filters: &SearchFilters,
        top_k: usize,
    ) -> Result<Vec<SearchMatch>> {
        let rows = match filters.kind {
            Some(kind) => {
                sqlx::query(
                    r#"
                    SELECT id, text, metadata_json, embedding FROM vectors
                    WHERE project_id = ? AND chunk_index >= 0 AND file_kind = ?
                      AND embedding IS NOT NULL
                    "#,
                )
                .bind(project_id)
                .bind(kind.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, text, metadata_json, embedding FROM vectors
                    WHERE project_id = ? AND chunk_index >= 0 AND embedding IS NOT NULL
                    "#,
                )
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| format!("Corrupt metadata for {}", id))?;
            if !filters.matches(&metadata) {
                continue;
            }
            let blob: Vec<u8> = row.get("embedding");
            matches.push(SearchMatch {
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                text: row.get("text"),
                id,
                metadata,
            });
        }

        Ok(rank_matches(matches, top_k))
    }

    async fn file_state(&self, project_id: &str, relative_path: &str) -> Result<Option<FileIndexState>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_hash, total_chunks FROM vectors
            WHERE project_id = ? AND relative_path = ? AND chunk_index >= 0
            ORDER BY chunk_index
            "#,
        )
        .bind(project_id)
        .bind(relative_path)
        .fetch_all(&self.pool)
        .await?;

        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let first_hash: String = first.get("content_hash");
        let total: i64 = first.get("total_chunks");
        let uniform = rows
            .iter()
            .all(|r| r.get::<String, _>("content_hash") == first_hash);

        Ok(Some(FileIndexState {
            content_hash: if uniform { first_hash } else { String::new() },
            total_chunks: total as usize,
            ids: rows.iter().map(|r| r.get("id")).collect(),
        }))
    }

    async fn indexed_paths(&self, project_id: &str) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT relative_path FROM vectors
            WHERE project_id = ? AND chunk_index >= 0
            ORDER BY relative_path
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(paths)
    }

    async fn save_project_context(&self, context: &ProjectContext) -> Result<()> {
        let json = serde_json::to_string(context)?;
        sqlx::query(
            r#"
            INSERT INTO vectors (id, project_id, relative_path, chunk_index, total_chunks,
                                 content_hash, language, file_kind, text, metadata_json,
                                 embedding, dims, indexed_at)
            VALUES (?, ?, ?, -1, 0, '', '', 'context', '', ?, NULL, 0, ?)
            ON CONFLICT(id) DO UPDATE SET
                metadata_json = excluded.metadata_json,
                indexed_at = excluded.indexed_at
            "#,
        )
        .bind(project_context_id(&context.project_id))
        .bind(&context.project_id)
        .bind(PROJECT_CONTEXT_KEY)
        .bind(&json)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_project_context(&self, project_id: &str) -> Result<Option<ProjectContext>> {
        let json: Option<String> = sqlx::query_scalar("SELECT metadata_json FROM vectors WHERE id = ?")
            .bind(project_context_id(project_id))
            .fetch_optional(&self.pool)
            .await?;
        match json {
            Some(j) => Ok(Some(
                serde_json::from_str(&j).with_context(|| "Corrupt project context record")?,
            )),
            None => Ok(None),
        }
    }

    async fn project_stats(&self, project_id: &str) -> Result<ProjectStats> {
        let files: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT relative_path) FROM vectors WHERE project_id = ? AND chunk_index >= 0",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        let documents: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM vectors WHERE project_id = ? AND chunk_index >= 0",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;
        let rows = sqlx::query(
            r#"
            SELECT language, COUNT(*) AS n FROM vectors
            WHERE project_id = ? AND chunk_index >= 0
            GROUP BY language
            ORDER BY n DESC, language ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ProjectStats {
            files: files as usize,
            documents: documents as usize,
            languages: rows
                .iter()
                .map(|r| (r.get::<String, _>("language"), r.get::<i64, _>("n") as usize))
                .collect(),
        })
    }
}

#[async_trait]
impl ProjectCatalog for SqliteStore {
    async fn register_project(&self, project_id: &str, root: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, root, registered_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET root = excluded.root
            "#,
        )
        .bind(project_id)
        .bind(root)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn project_root(&self, project_id: &str) -> Result<Option<String>> {
        let root: Option<String> = sqlx::query_scalar("SELECT root FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(root)
    }

    async fn forget_project(&self, project_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM analysis_iterations WHERE project_id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(project_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_iteration(&self, project_id: &str, iteration: &AnalysisIteration) -> Result<()> {
        let json = serde_json::to_string(iteration)?;
        sqlx::query(
            "INSERT INTO analysis_iterations (project_id, iteration, record_json, recorded_at) VALUES (?, ?, ?, ?)",
        )
        .bind(project_id)
        .bind(iteration.iteration as i64)
        .bind(&json)
        .bind(iteration.recorded_at.timestamp())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to append iteration {} for project {}",
                iteration.iteration, project_id
            )
        })?;
        Ok(())
    }

    async fn iterations(&self, project_id: &str) -> Result<Vec<AnalysisIteration>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT record_json FROM analysis_iterations WHERE project_id = ? ORDER BY iteration",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|j| serde_json::from_str(j).with_context(|| "Corrupt analysis iteration record"))
            .collect()
    }

    async fn clear_iterations(&self, project_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM analysis_iterations WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
