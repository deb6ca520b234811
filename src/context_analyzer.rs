//! Iterative project-context analysis.
//!
//! Drives the convergence loop defined by
//! [`project_indexer_core::context::next_step`] against real collaborators:
//!
//! ```text
//!  ┌──────────── next_step(listing, log, context) ◀──────────────┐
//!  │                                                             │
//!  ├─ Finish(t) ──▶ status = Converged, save, return             │
//!  │                                                             │
//!  └─ Read(paths) ──▶ scanner.read_file ──▶ completion (limited)  │
//!                         ──▶ merge ──▶ append iteration ──▶ save ┘
//! ```
//!
//! Each iteration is committed (log entry first, then the context record)
//! before the next one starts, so an interrupted or failed run resumes from
//! its last committed iteration and makes the same next request a fresh
//! run would have made. Analyses of the same project are serialized by a
//! per-project async mutex.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Result};
use chrono::Utc;
use project_indexer_core::context::{
    next_step, AnalysisIteration, AnalysisSettings, ContextStatus, ContextUpdate, NextStep,
    ProjectContext,
};
use project_indexer_core::error::BackendError;
use project_indexer_core::identity::normalize_path;
use project_indexer_core::store::{ProjectCatalog, VectorStore};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::inference::{complete_structured, CompletionBackend, CompletionRequest};
use crate::rate_limit::RateLimiter;
use crate::scanner::{ScanFilter, Scanner};

/// Paths from the listing shown to the model each iteration.
const LISTING_PREVIEW: usize = 300;

const SYSTEM_PROMPT: &str = "You analyze software projects. Given the project's file listing, \
your current understanding, and the contents of some files, return an improved structured \
description of the project. Every field carries a confidence from 0 to 100. Raise a confidence \
only when the files you have seen support it. Use next_paths to name the files or directories \
you most need to read next.";

pub struct ContextAnalyzer {
    backend: Arc<dyn CompletionBackend>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn VectorStore>,
    catalog: Arc<dyn ProjectCatalog>,
    scanner: Arc<dyn Scanner>,
    settings: AnalysisSettings,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ContextAnalyzer {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        limiter: Arc<RateLimiter>,
        store: Arc<dyn VectorStore>,
        catalog: Arc<dyn ProjectCatalog>,
        scanner: Arc<dyn Scanner>,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            backend,
            limiter,
            store,
            catalog,
            scanner,
            settings,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return a converged context for the project, running or resuming
    /// the loop as needed.
    ///
    /// `force` starts over from an empty context. The previous record and
    /// log stay in place until the first new iteration commits, so a forced
    /// run that fails or is cancelled early leaves the old analysis intact.
    ///
    /// Cancelling `cancel` stops the loop before its next model call. The
    /// in-flight call is dropped and nothing from it is committed; the
    /// context keeps its last committed state and the next call resumes
    /// from the log.
    pub async fn analyze(
        &self,
        project_id: &str,
        root: &Path,
        filter: &ScanFilter,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<ProjectContext> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        if cancel.is_cancelled() {
            return interrupted(project_id, 0);
        }

        let (mut context, mut iterations) = if force {
            info!(project_id, "starting analysis over");
            (ProjectContext::new(project_id), Vec::new())
        } else {
            let context = self
                .store
                .load_project_context(project_id)
                .await?
                .unwrap_or_else(|| ProjectContext::new(project_id));
            if context.is_converged() {
                return Ok(context);
            }
            (context, self.catalog.iterations(project_id).await?)
        };
        // Old analysis is discarded on the first commit of a forced run.
        let mut pending_reset = force;

        if let Some(last) = iterations.last() {
            if last.iteration > context.iteration_count {
                info!(
                    project_id,
                    iteration = last.iteration,
                    "restoring context from iteration log"
                );
                context = last.snapshot.clone();
            }
        }
        if !iterations.is_empty() || context.iteration_count > 0 {
            info!(project_id, iteration = context.iteration_count, "resuming analysis");
        }

        let files = match self.scanner.list_files(root, filter).await {
            Ok(f) => f,
            Err(e) => {
                if !pending_reset {
                    self.mark_failed(&mut context, &e.to_string()).await?;
                }
                return Err(e);
            }
        };
        let available: Vec<String> = files.iter().map(|f| f.relative_path.clone()).collect();
        let absolute: HashMap<&str, &str> = files
            .iter()
            .map(|f| (f.relative_path.as_str(), f.absolute_path.as_str()))
            .collect();
        let root_name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        context.status = ContextStatus::Iterating;
        context.last_error = None;

        loop {
            match next_step(&available, &iterations, &context, &self.settings) {
                NextStep::Finish(termination) => {
                    if pending_reset {
                        self.catalog.clear_iterations(project_id).await?;
                    }
                    context.status = ContextStatus::Converged;
                    context.termination = Some(termination);
                    context.updated_at = Utc::now();
                    self.store.save_project_context(&context).await?;
                    if termination.is_complete() {
                        info!(
                            project_id,
                            iterations = context.iteration_count,
                            "project context converged"
                        );
                    } else {
                        warn!(
                            project_id,
                            iterations = context.iteration_count,
                            min_confidence = context.min_confidence(),
                            termination = ?termination,
                            "project context converged without reaching the confidence threshold"
                        );
                    }
                    return Ok(context);
                }
                NextStep::Read(paths) => {
                    let attempt = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        r = self.run_iteration(&context, &paths, &available, &absolute, &root_name) => Some(r),
                    };
                    let record = match attempt {
                        None => return interrupted(project_id, context.iteration_count),
                        Some(Ok(r)) => r,
                        Some(Err(e)) => {
                            warn!(
                                project_id,
                                iteration = context.iteration_count + 1,
                                error = %e,
                                "analysis iteration failed"
                            );
                            if !pending_reset {
                                self.mark_failed(&mut context, &e.to_string()).await?;
                            }
                            return Err(e.into());
                        }
                    };

                    if pending_reset {
                        self.catalog.clear_iterations(project_id).await?;
                        pending_reset = false;
                    }
                    self.catalog.append_iteration(project_id, &record).await?;
                    context = record.snapshot.clone();
                    self.store.save_project_context(&context).await?;
                    info!(
                        project_id,
                        iteration = record.iteration,
                        requested = record.requested.len(),
                        read = record.read.len(),
                        min_confidence = context.min_confidence(),
                        average_confidence = context.average_confidence(),
                        "analysis iteration complete"
                    );
                    iterations.push(record);
                }
            }
        }
    }

    async fn mark_failed(&self, context: &mut ProjectContext, error: &str) -> Result<()> {
        context.status = ContextStatus::Failed;
        context.last_error = Some(error.to_string());
        context.updated_at = Utc::now();
        self.store.save_project_context(context).await
    }

    /// Read, ask, merge. Commits nothing.
    async fn run_iteration(
        &self,
        context: &ProjectContext,
        paths: &[String],
        available: &[String],
        absolute: &HashMap<&str, &str>,
        root_name: &str,
    ) -> Result<AnalysisIteration, BackendError> {
        let mut contents = Vec::new();
        for path in paths {
            let Some(abs) = absolute.get(path.as_str()) else {
                continue;
            };
            match self.scanner.read_file(abs).await {
                Ok(c) => contents.push((path.clone(), c.text)),
                Err(e) => warn!(path = %path, error = %e, "could not read file for analysis"),
            }
        }

        let request = build_request(
            context,
            root_name,
            available,
            &contents,
            &self.settings,
        );
        let update: ContextUpdate =
            complete_structured(self.backend.as_ref(), &self.limiter, &request).await?;
        update.validate().map_err(BackendError::Malformed)?;

        let suggested: Vec<String> = update
            .next_paths
            .iter()
            .map(|p| normalize_path(p))
            .filter(|p| !p.is_empty())
            .collect();
        let reasoning = update.reasoning.clone();
        let read: Vec<String> = contents.iter().map(|(p, _)| p.clone()).collect();

        let mut next = context.clone();
        next.merge(update);
        next.mark_read(&read);
        next.iteration_count += 1;
        next.status = ContextStatus::Iterating;
        next.updated_at = Utc::now();

        Ok(AnalysisIteration {
            iteration: next.iteration_count,
            requested: paths.to_vec(),
            read,
            suggested,
            reasoning,
            snapshot: next,
            recorded_at: Utc::now(),
        })
    }
}

fn interrupted(project_id: &str, committed: u32) -> Result<ProjectContext> {
    info!(project_id, iterations = committed, "analysis cancelled");
    bail!("Analysis cancelled after {} committed iteration(s)", committed)
}

fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => (&text[..idx], true),
        None => (text, false),
    }
}

fn scored_schema(value: serde_json::Value) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "value": value,
            "confidence": { "type": "integer", "minimum": 0, "maximum": 100 }
        },
        "required": ["value", "confidence"],
        "additionalProperties": false
    })
}

/// JSON schema of [`ContextUpdate`].
pub fn context_update_schema() -> serde_json::Value {
    let text = json!({ "type": "string" });
    let list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "name": scored_schema(text.clone()),
            "purpose": scored_schema(text.clone()),
            "languages": scored_schema(list.clone()),
            "frameworks": scored_schema(list.clone()),
            "modules": scored_schema(list.clone()),
            "entry_points": scored_schema(list.clone()),
            "architecture": scored_schema(text),
            "next_paths": list,
            "reasoning": { "type": "string" }
        },
        "required": [
            "name", "purpose", "languages", "frameworks", "modules",
            "entry_points", "architecture", "next_paths", "reasoning"
        ],
        "additionalProperties": false
    })
}

fn build_request(
    context: &ProjectContext,
    root_name: &str,
    available: &[String],
    contents: &[(String, String)],
    settings: &AnalysisSettings,
) -> CompletionRequest {
    let mut prompt = String::new();
    prompt.push_str(&format!("Project directory: {}\n", root_name));
    prompt.push_str(&format!("Iteration: {}\n\n", context.iteration_count + 1));

    prompt.push_str(&format!("File listing ({} files):\n", available.len()));
    for path in available.iter().take(LISTING_PREVIEW) {
        prompt.push_str(&format!("- {}\n", path));
    }
    if available.len() > LISTING_PREVIEW {
        prompt.push_str(&format!("... and {} more\n", available.len() - LISTING_PREVIEW));
    }

    let current = json!({
        "name": context.name,
        "purpose": context.purpose,
        "languages": context.languages,
        "frameworks": context.frameworks,
        "modules": context.modules,
        "entry_points": context.entry_points,
        "architecture": context.architecture,
    });
    prompt.push_str("\nCurrent understanding:\n");
    prompt.push_str(&serde_json::to_string_pretty(&current).unwrap_or_default());
    prompt.push_str(&format!(
        "\nAlready read: {}\n\n",
        if context.files_analyzed.is_empty() {
            "(nothing yet)".to_string()
        } else {
            context.files_analyzed.join(", ")
        }
    ));

    prompt.push_str("Files for this iteration:\n");
    for (path, text) in contents {
        let (body, truncated) = truncate_chars(text, settings.max_file_chars);
        prompt.push_str(&format!("\n=== {} ===\n{}\n", path, body));
        if truncated {
            prompt.push_str("[... truncated ...]\n");
        }
    }

    prompt.push_str(&format!(
        "\nReturn every field. Name at most {} next_paths that have not been read yet.\n",
        settings.max_files_per_iteration
    ));

    CompletionRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        schema_name: "project_context_update".to_string(),
        schema: context_update_schema(),
    }
}
