//! Core data models shared across the indexing pipeline.
//!
//! # Data Flow
//!
//! ```text
//! Scanner ──▶ FileMetadata ──▶ Chunker ──▶ CodeChunk
//!                                              │
//!                          ContentAnalyzer ◀───┘
//!                                 │
//!                                 ▼
//!                          ChunkAnalysis ──▶ Embedder ──▶ IndexedDocument ──▶ VectorStore
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FailureKind;

/// Coarse classification of a project file.
///
/// Drives which analysis prompt is used and is filterable at search time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Code,
    Test,
    Documentation,
    Configuration,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Code => "code",
            FileKind::Test => "test",
            FileKind::Documentation => "documentation",
            FileKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(FileKind::Code),
            "test" => Ok(FileKind::Test),
            "documentation" | "docs" => Ok(FileKind::Documentation),
            "configuration" | "config" => Ok(FileKind::Configuration),
            other => anyhow::bail!(
                "Unknown file kind '{}'. Must be code, test, documentation or configuration.",
                other
            ),
        }
    }
}

/// A file discovered by the scanner. Read-only downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub absolute_path: String,
    /// Project-relative path, always `/`-separated.
    pub relative_path: String,
    pub language: String,
    pub kind: FileKind,
    /// SHA-256 hex digest of the file contents.
    pub content_hash: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// A bounded, position-addressable segment of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Zero-based index within the file.
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub text: String,
    pub token_count: usize,
}

/// A function or method the analyzer considered important.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFunction {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Structured annotation of one chunk. Replaced wholesale on re-index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkAnalysis {
    pub purpose: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub exported_symbols: Vec<String>,
    #[serde(default)]
    pub key_functions: Vec<KeyFunction>,
    #[serde(default)]
    pub architectural_notes: String,
}

/// Metadata persisted alongside every indexed vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub project_id: String,
    pub project_name: String,
    pub relative_path: String,
    pub language: String,
    pub kind: FileKind,
    pub content_hash: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub analysis: ChunkAnalysis,
}

/// A vector record ready for the store.
///
/// Identity is `{project_id}:{relative_path}:{chunk_index}`, see
/// [`crate::identity::document_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// Optional constraints applied to a similarity search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub kind: Option<FileKind>,
    pub language: Option<String>,
    pub path_prefix: Option<String>,
}

impl SearchFilters {
    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        if let Some(kind) = self.kind {
            if metadata.kind != kind {
                return false;
            }
        }
        if let Some(ref language) = self.language {
            if !metadata.language.eq_ignore_ascii_case(language) {
                return false;
            }
        }
        if let Some(ref prefix) = self.path_prefix {
            if !metadata.relative_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A single search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchMatch {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A file ranked by its best-matching chunk.
#[derive(Debug, Clone, Serialize)]
pub struct FileMatch {
    pub relative_path: String,
    pub language: String,
    pub kind: FileKind,
    /// Score of the best chunk.
    pub score: f32,
    /// Chunks of this file among the candidates.
    pub matched_chunks: usize,
    /// The best chunk's purpose.
    pub purpose: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// A key function found in a matching chunk.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionMatch {
    pub name: String,
    pub description: String,
    pub relative_path: String,
    pub language: String,
    /// Score of the chunk that defines it.
    pub score: f32,
    pub start_line: usize,
    pub end_line: usize,
}

/// What the store currently holds for one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndexState {
    pub content_hash: String,
    /// `total_chunks` as recorded when the file was last indexed.
    pub total_chunks: usize,
    /// Live document identities for the file.
    pub ids: Vec<String>,
}

impl FileIndexState {
    /// Whether every chunk of the last pass made it into the store.
    pub fn is_complete(&self) -> bool {
        self.total_chunks > 0 && self.ids.len() == self.total_chunks
    }
}

// ============ Reports ============

/// Overall outcome of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every file succeeded or was skipped.
    Completed,
    /// At least one file or chunk failed; the rest were committed.
    CompletedWithFailures,
    /// The run was cancelled before all files were processed.
    Cancelled,
    /// A fatal backend error halted the run.
    Aborted,
}

/// A failure contained at one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    /// `path` for a file, `path#index` for a chunk.
    pub unit: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Aggregate counts plus per-unit detail for an indexing run.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub run_id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub files_indexed: usize,
    /// Files committed with some chunks missing.
    pub files_partial: usize,
    pub files_failed: usize,
    pub files_skipped: usize,
    pub files_pruned: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    pub failures: Vec<UnitFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IndexReport {
    pub fn new(run_id: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            project_id,
            status: RunStatus::Completed,
            files_indexed: 0,
            files_partial: 0,
            files_failed: 0,
            files_skipped: 0,
            files_pruned: 0,
            chunks_indexed: 0,
            chunks_failed: 0,
            failures: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record(&mut self, unit: impl Into<String>, kind: FailureKind, message: impl Into<String>) {
        self.failures.push(UnitFailure {
            unit: unit.into(),
            kind,
            message: message.into(),
        });
    }

    /// Settle the final status from the counters, unless already decided.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
        if self.status == RunStatus::Completed
            && (self.files_failed > 0 || self.files_partial > 0 || self.chunks_failed > 0)
        {
            self.status = RunStatus::CompletedWithFailures;
        }
    }
}

/// Result of removing files from the index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemovalReport {
    pub files_removed: usize,
    pub documents_deleted: usize,
    /// Requested paths that had nothing indexed.
    pub not_indexed: Vec<String>,
}
