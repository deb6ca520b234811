//! Project file discovery.
//!
//! The [`Scanner`] trait is how the pipeline sees a project's files. The
//! filesystem implementation, [`FsScanner`], walks the root with `walkdir`,
//! filters project-relative paths through include/exclude glob sets, skips
//! oversized and binary files, and fills in [`FileMetadata`] (language, file
//! kind, SHA-256 content hash, size, modification time).
//!
//! Listings are sorted by relative path so every consumer sees the same order.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use project_indexer_core::identity::normalize_path;
use project_indexer_core::models::{FileKind, FileMetadata};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::IndexingConfig;

/// Bytes inspected for NUL when sniffing binary content.
const BINARY_SNIFF_BYTES: usize = 8000;

/// Which files a listing includes.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub max_file_bytes: u64,
    pub follow_symlinks: bool,
}

impl From<&IndexingConfig> for ScanFilter {
    fn from(c: &IndexingConfig) -> Self {
        Self {
            include_globs: c.include_globs.clone(),
            exclude_globs: c.exclude_globs.clone(),
            max_file_bytes: c.max_file_bytes(),
            follow_symlinks: c.follow_symlinks,
        }
    }
}

/// Text of a file plus the hash of exactly that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub text: String,
    pub content_hash: String,
}

#[async_trait]
pub trait Scanner: Send + Sync {
    async fn list_files(&self, root: &Path, filter: &ScanFilter) -> Result<Vec<FileMetadata>>;

    async fn read_file(&self, absolute_path: &str) -> Result<FileContent>;
}

pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

// ============ Classification ============

pub fn detect_language(relative_path: &str) -> String {
    let name = relative_path.rsplit('/').next().unwrap_or(relative_path);
    let lang = match name {
        "Dockerfile" => "dockerfile",
        "Makefile" => "makefile",
        "Pipfile" => "toml",
        "README" => "text",
        _ => {
            let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
            match ext.as_deref() {
                Some("py") => "python",
                Some("js" | "jsx" | "mjs" | "cjs") => "javascript",
                Some("ts" | "tsx") => "typescript",
                Some("rs") => "rust",
                Some("go") => "go",
                Some("java") => "java",
                Some("kt" | "kts") => "kotlin",
                Some("rb") => "ruby",
                Some("php") => "php",
                Some("c" | "h") => "c",
                Some("cpp" | "cc" | "hpp" | "hh") => "cpp",
                Some("cs") => "csharp",
                Some("swift") => "swift",
                Some("scala") => "scala",
                Some("sh" | "bash") => "shell",
                Some("sql") => "sql",
                Some("md" | "markdown") => "markdown",
                Some("rst") => "restructuredtext",
                Some("txt") => "text",
                Some("toml") => "toml",
                Some("yaml" | "yml") => "yaml",
                Some("json") => "json",
                Some("cfg" | "ini") => "ini",
                Some("example" | "env") => "dotenv",
                _ => "text",
            }
        }
    };
    lang.to_string()
}

pub fn classify(relative_path: &str, language: &str) -> FileKind {
    let path = relative_path.to_ascii_lowercase();
    let name = path.rsplit('/').next().unwrap_or(&path);

    let in_test_dir = path.starts_with("tests/")
        || path.starts_with("test/")
        || path.contains("/tests/")
        || path.contains("/test/")
        || path.contains("__tests__/");
    let test_name = name.starts_with("test_")
        || name.contains("_test.")
        || name.contains(".test.")
        || name.contains(".spec.");
    if in_test_dir || test_name {
        return FileKind::Test;
    }

    match language {
        "markdown" | "restructuredtext" | "text" => FileKind::Documentation,
        "toml" | "yaml" | "json" | "ini" | "dotenv" | "dockerfile" | "makefile" => {
            FileKind::Configuration
        }
        _ => FileKind::Code,
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|b| *b == 0)
}

// ============ Filesystem Scanner ============

#[derive(Debug, Default, Clone)]
pub struct FsScanner;

impl FsScanner {
    pub fn new() -> Self {
        Self
    }
}

fn list_blocking(root: PathBuf, filter: ScanFilter) -> Result<Vec<FileMetadata>> {
    if !root.is_dir() {
        bail!("Project root does not exist: {}", root.display());
    }

    let include_set = build_globset(&filter.include_globs)?;
    let exclude_set = build_globset(&filter.exclude_globs)?;

    let mut files = Vec::new();
    let walker = WalkDir::new(&root).follow_links(filter.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let rel_str = normalize_path(&relative.to_string_lossy());

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %rel_str, error = %e, "skipping file without metadata");
                continue;
            }
        };
        if meta.len() > filter.max_file_bytes {
            debug!(path = %rel_str, size = meta.len(), "skipping oversized file");
            continue;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %rel_str, error = %e, "skipping unreadable file");
                continue;
            }
        };
        if looks_binary(&bytes) {
            debug!(path = %rel_str, "skipping binary file");
            continue;
        }

        let modified_at: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let language = detect_language(&rel_str);
        let kind = classify(&rel_str, &language);

        files.push(FileMetadata {
            absolute_path: path.to_string_lossy().to_string(),
            relative_path: rel_str,
            language,
            kind,
            content_hash: content_hash(&bytes),
            size_bytes: meta.len(),
            modified_at,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

#[async_trait]
impl Scanner for FsScanner {
    async fn list_files(&self, root: &Path, filter: &ScanFilter) -> Result<Vec<FileMetadata>> {
        let root = root.to_path_buf();
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || list_blocking(root, filter))
            .await
            .context("Scanner task panicked")?
    }

    async fn read_file(&self, absolute_path: &str) -> Result<FileContent> {
        let bytes = tokio::fs::read(absolute_path)
            .await
            .with_context(|| format!("Failed to read {}", absolute_path))?;
        let content_hash = content_hash(&bytes);
        let text = String::from_utf8(bytes)
            .with_context(|| format!("{} is not valid UTF-8", absolute_path))?;
        Ok(FileContent { text, content_hash })
    }
}
