//! # Project Indexer Core
//!
//! Shared, I/O-free logic for Project Indexer: data models, chunking,
//! the document identity scheme, the context convergence policy, the
//! store abstraction, result grouping, and vector utilities.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem access. The
//! `project-indexer` app crate wires these pieces to real backends.

pub mod chunk;
pub mod context;
pub mod embedding;
pub mod error;
pub mod identity;
pub mod models;
pub mod search;
pub mod store;
