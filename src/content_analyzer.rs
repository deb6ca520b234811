//! Per-chunk structured annotation.
//!
//! Each chunk is sent to the completion backend with the converged project
//! context and a prompt chosen by the file's kind. Whatever the prompt, the
//! answer must decode into [`ChunkAnalysis`]; anything else is a
//! `Malformed` failure for that chunk alone.

use std::sync::Arc;

use project_indexer_core::context::ProjectContext;
use project_indexer_core::error::BackendError;
use project_indexer_core::models::{ChunkAnalysis, CodeChunk, FileKind, FileMetadata};
use serde_json::json;

use crate::inference::{complete_structured, CompletionBackend, CompletionRequest};
use crate::rate_limit::RateLimiter;

const CODE_PROMPT: &str = "You document source code. Describe what this chunk does, which \
modules or packages it depends on, which symbols it exports, its key functions or methods \
with a one-line description each, and any architectural notes (patterns, layering, side effects).";

const DOCUMENTATION_PROMPT: &str = "You summarize project documentation. Describe what this \
section explains, which components or tools it references (as dependencies), the topics or \
commands it documents (as exported_symbols), any procedures worth finding later (as \
key_functions), and how it relates to the architecture.";

const CONFIGURATION_PROMPT: &str = "You explain configuration files. Describe what this \
configuration controls, which packages, services or images it references (as dependencies), \
the settings or targets it defines (as exported_symbols), notable entries (as key_functions), \
and what it implies about deployment or build architecture.";

pub struct ContentAnalyzer {
    backend: Arc<dyn CompletionBackend>,
    limiter: Arc<RateLimiter>,
}

impl ContentAnalyzer {
    pub fn new(backend: Arc<dyn CompletionBackend>, limiter: Arc<RateLimiter>) -> Self {
        Self { backend, limiter }
    }

    pub async fn analyze(
        &self,
        chunk: &CodeChunk,
        file: &FileMetadata,
        context: &ProjectContext,
    ) -> Result<ChunkAnalysis, BackendError> {
        let request = build_request(chunk, file, context);
        let analysis: ChunkAnalysis =
            complete_structured(self.backend.as_ref(), &self.limiter, &request).await?;
        if analysis.purpose.trim().is_empty() {
            return Err(BackendError::Malformed("analysis has an empty purpose".into()));
        }
        Ok(analysis)
    }
}

/// JSON schema of [`ChunkAnalysis`].
pub fn chunk_analysis_schema() -> serde_json::Value {
    let list = json!({ "type": "array", "items": { "type": "string" } });
    json!({
        "type": "object",
        "properties": {
            "purpose": { "type": "string" },
            "dependencies": list.clone(),
            "exported_symbols": list,
            "key_functions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" }
                    },
                    "required": ["name", "description"],
                    "additionalProperties": false
                }
            },
            "architectural_notes": { "type": "string" }
        },
        "required": [
            "purpose", "dependencies", "exported_symbols", "key_functions", "architectural_notes"
        ],
        "additionalProperties": false
    })
}

fn system_prompt(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Code | FileKind::Test => CODE_PROMPT,
        FileKind::Documentation => DOCUMENTATION_PROMPT,
        FileKind::Configuration => CONFIGURATION_PROMPT,
    }
}

pub fn build_request(chunk: &CodeChunk, file: &FileMetadata, context: &ProjectContext) -> CompletionRequest {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Project: {}\nPurpose: {}\nArchitecture: {}\nStack: {}\n\n",
        context.name.value,
        context.purpose.value,
        context.architecture.value,
        context.stack_line()
    ));
    prompt.push_str(&format!(
        "File: {} ({}, {})\nChunk {} of {}, lines {}-{}\n",
        file.relative_path,
        file.kind,
        file.language,
        chunk.chunk_index + 1,
        chunk.total_chunks,
        chunk.start_line,
        chunk.end_line
    ));
    if file.kind == FileKind::Test {
        prompt.push_str("This file contains tests; describe what behavior they verify.\n");
    }
    prompt.push_str("\n```\n");
    prompt.push_str(&chunk.text);
    if !chunk.text.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n");

    CompletionRequest {
        system: system_prompt(file.kind).to_string(),
        prompt,
        schema_name: "chunk_analysis".to_string(),
        schema: chunk_analysis_schema(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(kind: FileKind) -> FileMetadata {
        FileMetadata {
            absolute_path: "/repo/x".into(),
            relative_path: "x".into(),
            language: "python".into(),
            kind,
            content_hash: "h".into(),
            size_bytes: 1,
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_varies_by_kind_schema_does_not() {
        let chunk = CodeChunk {
            chunk_index: 0,
            total_chunks: 2,
            start_line: 1,
            end_line: 3,
            text: "print('hi')".into(),
            token_count: 3,
        };
        let ctx = ProjectContext::new("p");
        let code = build_request(&chunk, &file(FileKind::Code), &ctx);
        let docs = build_request(&chunk, &file(FileKind::Documentation), &ctx);
        let conf = build_request(&chunk, &file(FileKind::Configuration), &ctx);
        assert_ne!(code.system, docs.system);
        assert_ne!(docs.system, conf.system);
        assert_eq!(code.schema, docs.schema);
        assert!(code.prompt.contains("Chunk 1 of 2, lines 1-3"));
        assert!(code.prompt.contains("```\nprint('hi')\n```"));
    }
}
