//! Project context model and the convergence policy that drives analysis.
//!
//! A [`ProjectContext`] is a structured description of a project in which
//! every field carries a confidence score (0–100). The analyzer refines it
//! over several iterations, each of which reads a handful of files and merges
//! the model's structured update.
//!
//! # State Machine
//!
//! ```text
//! NotStarted ──▶ Iterating ──▶ Converged
//!                   │  ▲
//!                   ▼  │ (resume)
//!                  Failed
//! ```
//!
//! Everything in this module is pure. [`next_step`] decides what the next
//! iteration reads (or that analysis is finished) from nothing but the file
//! listing, the iteration log, and the current context, so a resumed run
//! issues exactly the request a fresh run would have issued.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::normalize_path;

// ============ Settings ============

/// Files read first, when present, in this order.
pub const DEFAULT_SEED_FILES: &[&str] = &[
    "README.md",
    "README.rst",
    "README.txt",
    "README",
    "ARCHITECTURE.md",
    "docs/README.md",
    "docs/index.md",
    "pyproject.toml",
    "setup.py",
    "setup.cfg",
    "requirements.txt",
    "Pipfile",
    "package.json",
    "tsconfig.json",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle.kts",
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    "Makefile",
    ".env.example",
    "config.yaml",
    "config.json",
];

/// Conventional source directories whose first-level files are read on the
/// first iteration.
pub const DEFAULT_SEED_DIRS: &[&str] = &["src", "lib", "app", "cmd", "internal", "pkg"];

/// Tunables for the convergence loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    /// Every field must reach this confidence for analysis to be complete.
    pub confidence_threshold: u8,
    pub max_iterations: u32,
    pub max_files_per_iteration: usize,
    /// File contents sent to the model are truncated to this many chars.
    pub max_file_chars: usize,
    pub seed_files: Vec<String>,
    pub seed_dirs: Vec<String>,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 90,
            max_iterations: 10,
            max_files_per_iteration: 20,
            max_file_chars: 10_000,
            seed_files: DEFAULT_SEED_FILES.iter().map(|s| s.to_string()).collect(),
            seed_dirs: DEFAULT_SEED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

// ============ Scored Fields ============

/// A value with the model's confidence in it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scored<T> {
    pub value: T,
    pub confidence: u8,
}

/// Whether a field value says nothing.
///
/// A blank string is no answer at all. An empty list is an answer
/// ("no frameworks") and is merged like any other value.
pub trait FieldValue {
    fn is_blank(&self) -> bool;
}

impl FieldValue for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl FieldValue for Vec<String> {
    fn is_blank(&self) -> bool {
        false
    }
}

impl<T: FieldValue> Scored<T> {
    /// Take `update` if it carries a value and is at least as confident as
    /// the current one, or if the current value is blank.
    pub fn revise(&mut self, update: Scored<T>) -> bool {
        if update.value.is_blank() {
            return false;
        }
        if update.confidence >= self.confidence || self.value.is_blank() {
            self.value = update.value;
            self.confidence = update.confidence.min(100);
            return true;
        }
        false
    }
}

/// Dedupe while keeping first-seen order.
fn ordered_set(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

// ============ Context ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextStatus {
    NotStarted,
    Iterating,
    Converged,
    Failed,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Every field reached the threshold.
    ConfidenceReached,
    /// Iteration ceiling hit first. Attained confidences are kept.
    IterationCeiling,
    /// Nothing left to read. Attained confidences are kept.
    NoNewFiles,
}

impl Termination {
    /// Whether the context converged with full confidence.
    pub fn is_complete(&self) -> bool {
        matches!(self, Termination::ConfidenceReached)
    }
}

/// The structured description of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: String,
    pub name: Scored<String>,
    pub purpose: Scored<String>,
    pub languages: Scored<Vec<String>>,
    pub frameworks: Scored<Vec<String>>,
    pub modules: Scored<Vec<String>>,
    pub entry_points: Scored<Vec<String>>,
    pub architecture: Scored<String>,
    pub status: ContextStatus,
    pub termination: Option<Termination>,
    pub iteration_count: u32,
    /// Every path read so far, in read order.
    pub files_analyzed: Vec<String>,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One structured update returned by the model for an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub name: Scored<String>,
    pub purpose: Scored<String>,
    pub languages: Scored<Vec<String>>,
    pub frameworks: Scored<Vec<String>>,
    pub modules: Scored<Vec<String>>,
    pub entry_points: Scored<Vec<String>>,
    pub architecture: Scored<String>,
    /// Files or directories the model wants to see next.
    #[serde(default)]
    pub next_paths: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
}

impl ContextUpdate {
    /// Reject values the schema cannot express.
    pub fn validate(&self) -> Result<(), String> {
        for (field, confidence) in [
            ("name", self.name.confidence),
            ("purpose", self.purpose.confidence),
            ("languages", self.languages.confidence),
            ("frameworks", self.frameworks.confidence),
            ("modules", self.modules.confidence),
            ("entry_points", self.entry_points.confidence),
            ("architecture", self.architecture.confidence),
        ] {
            if confidence > 100 {
                return Err(format!("{field} confidence {confidence} exceeds 100"));
            }
        }
        Ok(())
    }
}

impl ProjectContext {
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            name: Scored::default(),
            purpose: Scored::default(),
            languages: Scored::default(),
            frameworks: Scored::default(),
            modules: Scored::default(),
            entry_points: Scored::default(),
            architecture: Scored::default(),
            status: ContextStatus::NotStarted,
            termination: None,
            iteration_count: 0,
            files_analyzed: Vec::new(),
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    /// Merge a model update field by field.
    pub fn merge(&mut self, update: ContextUpdate) {
        self.name.revise(update.name);
        self.purpose.revise(update.purpose);
        self.architecture.revise(update.architecture);
        self.languages.revise(Scored {
            value: ordered_set(update.languages.value),
            confidence: update.languages.confidence,
        });
        self.frameworks.revise(Scored {
            value: ordered_set(update.frameworks.value),
            confidence: update.frameworks.confidence,
        });
        self.modules.revise(Scored {
            value: ordered_set(update.modules.value),
            confidence: update.modules.confidence,
        });
        self.entry_points.revise(Scored {
            value: ordered_set(update.entry_points.value.iter().map(|p| normalize_path(p)).collect()),
            confidence: update.entry_points.confidence,
        });
    }

    /// Record that `paths` were read this iteration.
    pub fn mark_read(&mut self, paths: &[String]) {
        for p in paths {
            if !self.files_analyzed.contains(p) {
                self.files_analyzed.push(p.clone());
            }
        }
    }

    pub fn confidences(&self) -> [(&'static str, u8); 7] {
        [
            ("name", self.name.confidence),
            ("purpose", self.purpose.confidence),
            ("languages", self.languages.confidence),
            ("frameworks", self.frameworks.confidence),
            ("modules", self.modules.confidence),
            ("entry_points", self.entry_points.confidence),
            ("architecture", self.architecture.confidence),
        ]
    }

    pub fn min_confidence(&self) -> u8 {
        self.confidences().iter().map(|(_, c)| *c).min().unwrap_or(0)
    }

    pub fn average_confidence(&self) -> f32 {
        let c = self.confidences();
        c.iter().map(|(_, v)| *v as f32).sum::<f32>() / c.len() as f32
    }

    pub fn is_converged(&self) -> bool {
        self.status == ContextStatus::Converged
    }

    /// Short stack line used when composing embedding text.
    pub fn stack_line(&self) -> String {
        let mut parts: Vec<String> = self.languages.value.clone();
        parts.extend(self.frameworks.value.iter().cloned());
        parts.join(", ")
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            project_id: self.project_id.clone(),
            name: self.name.value.clone(),
            purpose: self.purpose.value.clone(),
            architecture: self.architecture.value.clone(),
            status: self.status,
            termination: self.termination,
            iterations: self.iteration_count,
            files_analyzed: self.files_analyzed.len(),
            confidences: self
                .confidences()
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            min_confidence: self.min_confidence(),
            convergence_incomplete: self.is_converged()
                && !self.termination.map(|t| t.is_complete()).unwrap_or(false),
            last_error: self.last_error.clone(),
        }
    }
}

/// Caller-facing view of a context, returned by analysis entry points.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub project_id: String,
    pub name: String,
    pub purpose: String,
    pub architecture: String,
    pub status: ContextStatus,
    pub termination: Option<Termination>,
    pub iterations: u32,
    pub files_analyzed: usize,
    pub confidences: Vec<(String, u8)>,
    pub min_confidence: u8,
    /// Converged by ceiling or exhaustion rather than by confidence.
    pub convergence_incomplete: bool,
    pub last_error: Option<String>,
}

/// One entry of the append-only analysis log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisIteration {
    /// 1-based, monotonic.
    pub iteration: u32,
    pub requested: Vec<String>,
    pub read: Vec<String>,
    /// Paths the model asked for next.
    pub suggested: Vec<String>,
    pub reasoning: String,
    /// Context after this iteration's merge.
    pub snapshot: ProjectContext,
    pub recorded_at: DateTime<Utc>,
}

// ============ Policy ============

/// What the analyzer should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    Read(Vec<String>),
    Finish(Termination),
}

/// Decide the next action for a project.
///
/// `available` is the scanner listing as project-relative paths.
pub fn next_step(
    available: &[String],
    iterations: &[AnalysisIteration],
    context: &ProjectContext,
    settings: &AnalysisSettings,
) -> NextStep {
    if context.iteration_count > 0 && context.min_confidence() >= settings.confidence_threshold {
        return NextStep::Finish(Termination::ConfidenceReached);
    }
    if context.iteration_count >= settings.max_iterations {
        return NextStep::Finish(Termination::IterationCeiling);
    }
    let plan = plan_request(available, iterations, context, settings);
    if plan.is_empty() {
        NextStep::Finish(Termination::NoNewFiles)
    } else {
        NextStep::Read(plan)
    }
}

/// Choose up to `max_files_per_iteration` unread files.
///
/// Priority: seed files, then first-level files of seed directories (first
/// iteration only), then entry points and the paths suggested by the last
/// iteration. Directory suggestions expand to the files beneath them.
pub fn plan_request(
    available: &[String],
    iterations: &[AnalysisIteration],
    context: &ProjectContext,
    settings: &AnalysisSettings,
) -> Vec<String> {
    let available_set: HashSet<&str> = available.iter().map(|s| s.as_str()).collect();
    let mut already: HashSet<String> = context.files_analyzed.iter().cloned().collect();
    for it in iterations {
        already.extend(it.requested.iter().cloned());
    }

    let mut candidates: Vec<String> = Vec::new();

    for seed in &settings.seed_files {
        let seed = normalize_path(seed);
        if available_set.contains(seed.as_str()) {
            candidates.push(seed);
        }
    }

    if iterations.is_empty() {
        for dir in &settings.seed_dirs {
            let prefix = format!("{}/", normalize_path(dir).trim_end_matches('/'));
            for path in available {
                if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                    if !rest.contains('/') {
                        candidates.push(path.clone());
                    }
                }
            }
        }
    }

    let suggested = iterations.last().map(|it| it.suggested.as_slice()).unwrap_or(&[]);
    for hint in context.entry_points.value.iter().chain(suggested.iter()) {
        let hint = normalize_path(hint);
        if hint.is_empty() {
            continue;
        }
        if available_set.contains(hint.as_str()) {
            candidates.push(hint);
        } else {
            let prefix = format!("{}/", hint.trim_end_matches('/'));
            candidates.extend(available.iter().filter(|p| p.starts_with(prefix.as_str())).cloned());
        }
    }

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|p| !already.contains(p) && seen.insert(p.clone()))
        .take(settings.max_files_per_iteration)
        .collect()
}
