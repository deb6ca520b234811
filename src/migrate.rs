use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Project registrations
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            root TEXT NOT NULL,
            registered_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per indexed document, plus the reserved context row per project
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vectors (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            relative_path TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            total_chunks INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            language TEXT NOT NULL,
            file_kind TEXT NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB,
            dims INTEGER NOT NULL DEFAULT 0,
            indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only analysis log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_iterations (
            project_id TEXT NOT NULL,
            iteration INTEGER NOT NULL,
            record_json TEXT NOT NULL,
            recorded_at INTEGER NOT NULL,
            PRIMARY KEY (project_id, iteration)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_vectors_project_path ON vectors(project_id, relative_path)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vectors_project_kind ON vectors(project_id, file_kind)")
        .execute(pool)
        .await?;

    Ok(())
}
