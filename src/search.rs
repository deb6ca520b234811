use anyhow::Result;
use project_indexer_core::models::{FileMatch, FunctionMatch, SearchFilters, SearchMatch};

use crate::index_manager::IndexManager;

/// What `pidx search` ranks.
#[derive(Debug, Clone, Default)]
pub enum SearchScope {
    #[default]
    Chunks,
    Files,
    Functions { name: Option<String> },
}

pub async fn run_search(
    manager: &IndexManager,
    project_id: &str,
    query: &str,
    filters: &SearchFilters,
    limit: Option<usize>,
    scope: SearchScope,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let printed = match scope {
        SearchScope::Chunks => {
            let matches = manager.search(project_id, query, filters, limit).await?;
            for (i, m) in matches.iter().enumerate() {
                print_match(i + 1, m);
            }
            matches.len()
        }
        SearchScope::Files => {
            let files = manager.search_files(project_id, query, filters, limit).await?;
            for (i, f) in files.iter().enumerate() {
                print_file(i + 1, f);
            }
            files.len()
        }
        SearchScope::Functions { name } => {
            let functions = manager
                .search_functions(project_id, query, name.as_deref(), filters, limit)
                .await?;
            for (i, f) in functions.iter().enumerate() {
                print_function(i + 1, f);
            }
            functions.len()
        }
    };

    if printed == 0 {
        println!("No results.");
    }
    Ok(())
}

fn print_match(rank: usize, m: &SearchMatch) {
    let meta = &m.metadata;
    println!(
        "{}. [{:.3}] {}:{}-{}",
        rank, m.score, meta.relative_path, meta.start_line, meta.end_line
    );
    println!("    kind: {} ({})", meta.kind, meta.language);
    if !meta.analysis.purpose.is_empty() {
        println!("    purpose: {}", one_line(&meta.analysis.purpose, 160));
    }
    if !meta.analysis.exported_symbols.is_empty() {
        println!("    exports: {}", meta.analysis.exported_symbols.join(", "));
    }
    println!("    excerpt: \"{}\"", one_line(&m.text, 120));
    println!("    id: {}", m.id);
    println!();
}

fn print_file(rank: usize, f: &FileMatch) {
    println!("{}. [{:.3}] {}", rank, f.score, f.relative_path);
    println!(
        "    kind: {} ({}), best chunk lines {}-{}, {} matching chunk(s)",
        f.kind, f.language, f.start_line, f.end_line, f.matched_chunks
    );
    if !f.purpose.is_empty() {
        println!("    purpose: {}", one_line(&f.purpose, 160));
    }
    println!();
}

fn print_function(rank: usize, f: &FunctionMatch) {
    println!(
        "{}. [{:.3}] {} ({}:{}-{})",
        rank, f.score, f.name, f.relative_path, f.start_line, f.end_line
    );
    if !f.description.is_empty() {
        println!("    {}", one_line(&f.description, 160));
    }
    println!();
}

/// Collapse whitespace and cut to `max` chars.
fn one_line(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}
