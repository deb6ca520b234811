//! # Project Indexer
//!
//! Builds a semantic index of a source tree for retrieval by AI tools.
//!
//! Before any file is indexed the project is understood as a whole: an
//! iterative analysis reads key files until every field of the project
//! context is known with enough confidence (or a ceiling is hit). Every
//! chunk is then annotated in light of that context, embedded together with
//! it, and stored under a deterministic id so re-runs overwrite in place.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Scanner  │──▶│   Context    │──▶│ Chunk+Analyze│──▶│  SQLite  │
//! │ (walkdir)│   │   Analyzer   │   │   +Embed     │   │ vectors  │
//! └──────────┘   └──────────────┘   └──────────────┘   └────┬─────┘
//!                        │ all model calls go through        │
//!                        ▼ the shared RateLimiter            ▼
//!                                                       ┌──────────┐
//!                                                       │ CLI pidx │
//!                                                       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scanner`] | File discovery, language and kind detection |
//! | [`rate_limit`] | Request/token budgets with retry and backoff |
//! | [`inference`] | Completion and embedding backend traits |
//! | [`openai`] | OpenAI-compatible HTTP backends |
//! | [`context_analyzer`] | Iterative project understanding |
//! | [`content_analyzer`] | Per-chunk annotation |
//! | [`embedder`] | Batched embedding |
//! | [`sqlite_store`] | SQLite vector store and project catalog |
//! | [`index_manager`] | Pipeline orchestration |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod content_analyzer;
pub mod context_analyzer;
pub mod db;
pub mod embedder;
pub mod index_manager;
pub mod inference;
pub mod migrate;
pub mod openai;
pub mod progress;
pub mod rate_limit;
pub mod scanner;
pub mod search;
pub mod sqlite_store;
pub mod stats;
