//! Vector utilities and embedding text composition.
//!
//! Pure helpers for vector serialization and similarity, plus
//! [`compose_embedding_text`], which decides what text represents a chunk in
//! vector space. Concrete embedding backends live in the `project-indexer`
//! app crate.

use crate::context::ProjectContext;
use crate::models::{ChunkAnalysis, FileMetadata};

/// Raw chunk text included in the embedding input is cut at this many bytes.
pub const EMBEDDED_CODE_CHARS: usize = 2000;

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use project_indexer_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Largest char boundary at or below `max` bytes.
fn snap_to_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Build the text that is embedded for one chunk.
///
/// ```text
/// Project: <name> (<purpose>)
/// Stack: <languages and frameworks>
/// File: <relative path> [<kind>, <language>]
/// Purpose: <chunk purpose>
/// Exports: ...
/// Dependencies: ...
/// Functions: name: description; ...
/// Notes: ...
/// Code:
/// <chunk text, truncated>
/// ```
pub fn compose_embedding_text(
    context: &ProjectContext,
    file: &FileMetadata,
    analysis: &ChunkAnalysis,
    chunk_text: &str,
) -> String {
    let mut lines = Vec::new();

    if !context.name.value.is_empty() {
        if context.purpose.value.is_empty() {
            lines.push(format!("Project: {}", context.name.value));
        } else {
            lines.push(format!(
                "Project: {} ({})",
                context.name.value, context.purpose.value
            ));
        }
    }
    let stack = context.stack_line();
    if !stack.is_empty() {
        lines.push(format!("Stack: {}", stack));
    }
    lines.push(format!(
        "File: {} [{}, {}]",
        file.relative_path, file.kind, file.language
    ));
    if !analysis.purpose.is_empty() {
        lines.push(format!("Purpose: {}", analysis.purpose));
    }
    if !analysis.exported_symbols.is_empty() {
        lines.push(format!("Exports: {}", analysis.exported_symbols.join(", ")));
    }
    if !analysis.dependencies.is_empty() {
        lines.push(format!("Dependencies: {}", analysis.dependencies.join(", ")));
    }
    if !analysis.key_functions.is_empty() {
        let funcs: Vec<String> = analysis
            .key_functions
            .iter()
            .map(|f| {
                if f.description.is_empty() {
                    f.name.clone()
                } else {
                    format!("{}: {}", f.name, f.description)
                }
            })
            .collect();
        lines.push(format!("Functions: {}", funcs.join("; ")));
    }
    if !analysis.architectural_notes.is_empty() {
        lines.push(format!("Notes: {}", analysis.architectural_notes));
    }

    let cut = snap_to_char_boundary(chunk_text, EMBEDDED_CODE_CHARS);
    lines.push(format!("Code:\n{}", &chunk_text[..cut]));

    lines.join("\n")
}
