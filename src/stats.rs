//! Project status and analysis history.
//!
//! Prints what `pidx status` and `pidx iterations` show: the converged
//! context with per-field confidence, indexed volume per language, and the
//! analysis log.

use anyhow::Result;
use project_indexer_core::context::{AnalysisIteration, ContextSummary};
use project_indexer_core::models::{IndexReport, RemovalReport};

use crate::index_manager::{IndexManager, ProjectStatus};

pub async fn run_status(manager: &IndexManager, project_id: &str) -> Result<()> {
    let status = manager.status(project_id).await?;
    print_status(&status);
    Ok(())
}

pub async fn run_iterations(manager: &IndexManager, project_id: &str) -> Result<()> {
    let iterations = manager.get_iterations(project_id).await?;
    if iterations.is_empty() {
        println!("No analysis iterations recorded.");
        return Ok(());
    }
    for it in &iterations {
        print_iteration(it);
    }
    Ok(())
}

fn print_status(status: &ProjectStatus) {
    println!("Project {}", status.project_id);
    println!("================================");
    println!();
    println!("  Root:        {}", status.root);
    println!("  Files:       {}", status.stats.files);
    println!("  Documents:   {}", status.stats.documents);
    println!("  Iterations:  {}", status.iterations);

    match &status.context {
        Some(ctx) => print_context(ctx),
        None => {
            println!();
            println!("  Context:     not analyzed");
        }
    }

    if !status.stats.languages.is_empty() {
        println!();
        println!("  By language:");
        println!("  {:<24} {:>10}", "LANGUAGE", "DOCUMENTS");
        println!("  {}", "-".repeat(36));
        for (lang, count) in &status.stats.languages {
            println!("  {:<24} {:>10}", lang, count);
        }
    }
    println!();
}

pub fn print_context(ctx: &ContextSummary) {
    println!();
    println!("  Name:        {}", ctx.name);
    println!("  Status:      {:?}", ctx.status);
    if let Some(t) = ctx.termination {
        println!("  Stopped:     {:?}", t);
    }
    if ctx.convergence_incomplete {
        println!("  Warning:     converged below the confidence threshold");
    }
    if let Some(ref err) = ctx.last_error {
        println!("  Last error:  {}", err);
    }
    println!("  Purpose:     {}", ctx.purpose);
    println!("  Architecture: {}", ctx.architecture);
    println!();
    println!("  {:<16} {:>10}", "FIELD", "CONFIDENCE");
    println!("  {}", "-".repeat(28));
    for (field, confidence) in &ctx.confidences {
        println!("  {:<16} {:>10}", field, confidence);
    }
}

fn print_iteration(it: &AnalysisIteration) {
    println!(
        "#{}  {}  read {} / requested {}  min confidence {}",
        it.iteration,
        it.recorded_at.format("%Y-%m-%d %H:%M:%S"),
        it.read.len(),
        it.requested.len(),
        it.snapshot.min_confidence()
    );
    for path in &it.read {
        println!("    read: {}", path);
    }
    if !it.suggested.is_empty() {
        println!("    next: {}", it.suggested.join(", "));
    }
    if !it.reasoning.is_empty() {
        println!("    reasoning: {}", it.reasoning.replace('\n', " ").trim());
    }
    println!();
}

pub fn print_report(report: &IndexReport) {
    println!("Run {} ({:?})", report.run_id, report.status);
    println!("  indexed: {}", report.files_indexed);
    println!("  partial: {}", report.files_partial);
    println!("  skipped: {}", report.files_skipped);
    println!("  failed:  {}", report.files_failed);
    println!("  pruned:  {}", report.files_pruned);
    println!(
        "  chunks:  {} indexed, {} failed",
        report.chunks_indexed, report.chunks_failed
    );
    if !report.failures.is_empty() {
        println!();
        for f in &report.failures {
            println!("  [{}] {}: {}", f.kind, f.unit, f.message);
        }
    }
}

pub fn print_removal(report: &RemovalReport) {
    println!(
        "Removed {} file(s), {} document(s).",
        report.files_removed, report.documents_deleted
    );
    for path in &report.not_indexed {
        println!("  not indexed: {}", path);
    }
}
