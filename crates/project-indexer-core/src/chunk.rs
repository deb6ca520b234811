//! Line-addressed source chunker.
//!
//! Splits file contents into [`CodeChunk`]s bounded by a `max_tokens`
//! ceiling. Chunks always cover whole lines, so every chunk carries an exact
//! 1-based line range and the original file can be rebuilt with
//! [`reassemble`].
//!
//! # Algorithm
//!
//! 1. Estimate tokens with a 4 chars/token ratio.
//! 2. Empty or whitespace-only files produce no chunks.
//! 3. Files at or under `max_tokens` produce exactly one chunk.
//! 4. For languages with a known declaration syntax, the file is cut into
//!    units at top-level declaration lines (decorators and attributes stay
//!    with the declaration below them). Units are packed greedily into chunks
//!    without overlap.
//! 5. Any unit that alone exceeds `max_tokens`, and every file in a language
//!    without declaration rules, is split into line windows. Consecutive
//!    windows share up to `overlap_tokens` worth of trailing lines.
//! 6. A single line longer than `max_tokens` becomes its own chunk.
//!
//! # Example
//!
//! ```rust
//! use project_indexer_core::chunk::{chunk_file, ChunkSettings};
//!
//! let chunks = chunk_file("def main():\n    pass\n", "python", &ChunkSettings::default());
//! assert_eq!(chunks.len(), 1);
//! assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
//! ```

use serde::{Deserialize, Serialize};

use crate::models::CodeChunk;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Size limits for chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSettings {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_tokens: 6000,
            overlap_tokens: 500,
        }
    }
}

/// Rough token estimate used for chunk sizing and rate-limit budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Split `text` into chunks. Pure and deterministic.
pub fn chunk_file(text: &str, language: &str, settings: &ChunkSettings) -> Vec<CodeChunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let max_tokens = settings.max_tokens.max(1);
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let ranges = if estimate_tokens(text) <= max_tokens {
        vec![(0, lines.len())]
    } else {
        match declaration_prefixes(language) {
            Some(prefixes) => structural_ranges(&lines, prefixes, max_tokens, settings.overlap_tokens),
            None => window_ranges(&lines, 0, lines.len(), max_tokens, settings.overlap_tokens),
        }
    };

    let total = ranges.len();
    ranges
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| {
            let text: String = lines[start..end].concat();
            CodeChunk {
                chunk_index: i,
                total_chunks: total,
                start_line: start + 1,
                end_line: end,
                token_count: estimate_tokens(&text),
                text,
            }
        })
        .collect()
}

/// Rebuild the original text from chunks in index order, dropping the lines
/// that consecutive chunks share.
pub fn reassemble(chunks: &[CodeChunk]) -> String {
    let mut out = String::new();
    let mut last_end = 0usize;

    for chunk in chunks {
        let skip = if last_end >= chunk.start_line {
            last_end - chunk.start_line + 1
        } else {
            0
        };
        for line in chunk.text.split_inclusive('\n').skip(skip) {
            out.push_str(line);
        }
        last_end = last_end.max(chunk.end_line);
    }

    out
}

// ============ Declaration Rules ============

const PYTHON: &[&str] = &["def ", "async def ", "class ", "@"];
const JAVASCRIPT: &[&str] = &[
    "function ",
    "async function ",
    "class ",
    "export ",
    "const ",
    "let ",
    "var ",
    "interface ",
    "type ",
    "enum ",
    "@",
];
const RUST: &[&str] = &[
    "fn ",
    "async fn ",
    "pub ",
    "pub(",
    "impl",
    "struct ",
    "enum ",
    "trait ",
    "mod ",
    "const ",
    "static ",
    "type ",
    "unsafe ",
    "macro_rules!",
    "#[",
];
const GO: &[&str] = &["func ", "type ", "var ", "const "];
const JVM: &[&str] = &[
    "public ",
    "private ",
    "protected ",
    "internal ",
    "abstract ",
    "final ",
    "class ",
    "interface ",
    "enum ",
    "data class ",
    "object ",
    "fun ",
    "@",
];

fn declaration_prefixes(language: &str) -> Option<&'static [&'static str]> {
    match language.to_ascii_lowercase().as_str() {
        "python" => Some(PYTHON),
        "javascript" | "typescript" => Some(JAVASCRIPT),
        "rust" => Some(RUST),
        "go" => Some(GO),
        "java" | "kotlin" => Some(JVM),
        _ => None,
    }
}

fn starts_with_any(line: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| line.starts_with(p))
}

fn is_attribute(line: &str) -> bool {
    line.starts_with('@') || line.starts_with("#[")
}

/// Cut the file into declaration units, then pack units into chunks.
fn structural_ranges(
    lines: &[&str],
    prefixes: &[&str],
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<(usize, usize)> {
    let mut boundaries = vec![0];
    for i in 1..lines.len() {
        if starts_with_any(lines[i], prefixes) && !is_attribute(lines[i - 1]) {
            boundaries.push(i);
        }
    }
    boundaries.push(lines.len());

    let mut ranges = Vec::new();
    let mut group: Option<(usize, usize, usize)> = None;

    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start == end {
            continue;
        }
        let tokens = tokens_of(&lines[start..end]);

        if tokens > max_tokens {
            if let Some((gs, ge, _)) = group.take() {
                ranges.push((gs, ge));
            }
            ranges.extend(window_ranges(lines, start, end, max_tokens, overlap_tokens));
            continue;
        }

        group = match group {
            Some((gs, _, gt)) if gt + tokens <= max_tokens => Some((gs, end, gt + tokens)),
            Some((gs, ge, _)) => {
                ranges.push((gs, ge));
                Some((start, end, tokens))
            }
            None => Some((start, end, tokens)),
        };
    }

    if let Some((gs, ge, _)) = group {
        ranges.push((gs, ge));
    }
    ranges
}

/// Fixed-size line windows over `lines[from..to]` with trailing-line overlap.
fn window_ranges(
    lines: &[&str],
    from: usize,
    to: usize,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = from;

    while start < to {
        let mut end = start;
        let mut tokens = 0;
        while end < to {
            let t = estimate_tokens(lines[end]);
            if end > start && tokens + t > max_tokens {
                break;
            }
            tokens += t;
            end += 1;
        }
        ranges.push((start, end));
        if end >= to {
            break;
        }

        let mut next = end;
        let mut overlap = 0;
        while next - 1 > start {
            let t = estimate_tokens(lines[next - 1]);
            if overlap + t > overlap_tokens {
                break;
            }
            overlap += t;
            next -= 1;
        }
        start = next;
    }

    ranges
}

fn tokens_of(lines: &[&str]) -> usize {
    lines.iter().map(|l| estimate_tokens(l)).sum()
}
