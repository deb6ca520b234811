//! Grouping of chunk-level hits into file and function results.
//!
//! The store ranks chunks. Callers that want files or functions fetch a
//! wider candidate set (see [`CANDIDATE_FANOUT`]) and group it here:
//! each group takes the score of its best chunk (MAX aggregation), then
//! groups are ranked by that score with the path as tie-breaker.

use std::collections::HashMap;

use crate::models::{FileMatch, FunctionMatch, SearchMatch};

/// Chunk candidates fetched per requested group result.
pub const CANDIDATE_FANOUT: usize = 3;

fn by_score_then<T>(a: f32, b: f32, tie: T) -> std::cmp::Ordering
where
    T: FnOnce() -> std::cmp::Ordering,
{
    b.partial_cmp(&a)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(tie)
}

/// One entry per file, best chunk first.
pub fn group_by_file(matches: &[SearchMatch], top_k: usize) -> Vec<FileMatch> {
    let mut files: HashMap<&str, FileMatch> = HashMap::new();
    for m in matches {
        let meta = &m.metadata;
        let entry = files
            .entry(meta.relative_path.as_str())
            .or_insert_with(|| FileMatch {
                relative_path: meta.relative_path.clone(),
                language: meta.language.clone(),
                kind: meta.kind,
                score: f32::NEG_INFINITY,
                matched_chunks: 0,
                purpose: String::new(),
                start_line: meta.start_line,
                end_line: meta.end_line,
            });
        entry.matched_chunks += 1;
        if m.score > entry.score {
            entry.score = m.score;
            entry.purpose = meta.analysis.purpose.clone();
            entry.start_line = meta.start_line;
            entry.end_line = meta.end_line;
        }
    }

    let mut ranked: Vec<FileMatch> = files.into_values().collect();
    ranked.sort_by(|a, b| by_score_then(a.score, b.score, || a.relative_path.cmp(&b.relative_path)));
    ranked.truncate(top_k);
    ranked
}

/// Key functions of the matching chunks, one entry per `(path, name)`.
///
/// `name` keeps only functions whose name contains it, case-insensitively.
pub fn function_matches(matches: &[SearchMatch], name: Option<&str>, top_k: usize) -> Vec<FunctionMatch> {
    let needle = name.map(|n| n.trim().to_lowercase()).filter(|n| !n.is_empty());
    let mut found: HashMap<(&str, &str), FunctionMatch> = HashMap::new();
    for m in matches {
        let meta = &m.metadata;
        for f in &meta.analysis.key_functions {
            if f.name.trim().is_empty() {
                continue;
            }
            if let Some(ref needle) = needle {
                if !f.name.to_lowercase().contains(needle.as_str()) {
                    continue;
                }
            }
            let key = (meta.relative_path.as_str(), f.name.as_str());
            let better = found.get(&key).map_or(true, |existing| m.score > existing.score);
            if better {
                found.insert(
                    key,
                    FunctionMatch {
                        name: f.name.clone(),
                        description: f.description.clone(),
                        relative_path: meta.relative_path.clone(),
                        language: meta.language.clone(),
                        score: m.score,
                        start_line: meta.start_line,
                        end_line: meta.end_line,
                    },
                );
            }
        }
    }

    let mut ranked: Vec<FunctionMatch> = found.into_values().collect();
    ranked.sort_by(|a, b| {
        by_score_then(a.score, b.score, || {
            a.relative_path
                .cmp(&b.relative_path)
                .then_with(|| a.name.cmp(&b.name))
        })
    });
    ranked.truncate(top_k);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkAnalysis, DocumentMetadata, FileKind, KeyFunction};

    fn hit(path: &str, index: usize, score: f32, functions: &[&str]) -> SearchMatch {
        SearchMatch {
            id: format!("p:{path}:{index}"),
            score,
            text: String::new(),
            metadata: DocumentMetadata {
                project_id: "p".into(),
                project_name: "demo".into(),
                relative_path: path.into(),
                language: "python".into(),
                kind: FileKind::Code,
                content_hash: "h".into(),
                chunk_index: index,
                total_chunks: 4,
                start_line: index * 10 + 1,
                end_line: index * 10 + 10,
                analysis: ChunkAnalysis {
                    purpose: format!("{path} part {index}"),
                    key_functions: functions
                        .iter()
                        .map(|n| KeyFunction {
                            name: n.to_string(),
                            description: format!("does {n}"),
                        })
                        .collect(),
                    ..Default::default()
                },
            },
        }
    }

    #[test]
    fn test_group_by_file_keeps_best_chunk() {
        let hits = vec![
            hit("a.py", 0, 0.4, &[]),
            hit("b.py", 2, 0.7, &[]),
            hit("a.py", 3, 0.9, &[]),
            hit("c.py", 0, 0.1, &[]),
        ];
        let files = group_by_file(&hits, 2);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].relative_path, "a.py");
        assert_eq!(files[0].score, 0.9);
        assert_eq!(files[0].matched_chunks, 2);
        assert_eq!(files[0].purpose, "a.py part 3");
        assert_eq!(files[0].start_line, 31);
        assert_eq!(files[1].relative_path, "b.py");
    }

    #[test]
    fn test_group_by_file_ties_break_on_path() {
        let hits = vec![hit("z.py", 0, 0.5, &[]), hit("m.py", 0, 0.5, &[])];
        let paths: Vec<_> = group_by_file(&hits, 10)
            .into_iter()
            .map(|f| f.relative_path)
            .collect();
        assert_eq!(paths, vec!["m.py", "z.py"]);
    }

    #[test]
    fn test_function_matches_dedupes_and_filters() {
        let hits = vec![
            hit("a.py", 0, 0.3, &["load_config", "main"]),
            hit("a.py", 1, 0.8, &["load_config"]),
            hit("b.py", 0, 0.6, &["LoadUser", ""]),
        ];
        let all = function_matches(&hits, None, 10);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name, "load_config");
        assert_eq!(all[0].score, 0.8);
        assert_eq!(all[0].start_line, 11);

        let named = function_matches(&hits, Some("LOAD"), 10);
        let names: Vec<_> = named.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["load_config", "LoadUser"]);
    }
}
