//! Stable document identities.
//!
//! Every indexed chunk is addressed as `{project_id}:{relative_path}:{chunk_index}`.
//! Re-indexing a file therefore overwrites its previous records in place;
//! whatever a pass did not rewrite is stale and gets deleted. The serialized project context lives at the reserved identity
//! `{project_id}:__project_context__`, which can never collide with a chunk
//! identity because it has no trailing index segment.

use sha2::{Digest, Sha256};

/// Path segment reserved for the project context record.
pub const PROJECT_CONTEXT_KEY: &str = "__project_context__";

/// Hex characters of the root-path digest used as the project id.
const PROJECT_ID_LEN: usize = 12;

/// Derive a deterministic project id from a canonical root path.
pub fn project_id_for_root(canonical_root: &str) -> String {
    let digest = Sha256::digest(canonical_root.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..PROJECT_ID_LEN].to_string()
}

/// Normalize a relative path: `/` separators, no leading `./` or `/`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut s = unified.as_str();
    loop {
        if let Some(rest) = s.strip_prefix("./") {
            s = rest;
        } else if let Some(rest) = s.strip_prefix('/') {
            s = rest;
        } else {
            break;
        }
    }
    s.to_string()
}

pub fn document_id(project_id: &str, relative_path: &str, chunk_index: usize) -> String {
    format!(
        "{}:{}:{}",
        project_id,
        normalize_path(relative_path),
        chunk_index
    )
}

pub fn project_context_id(project_id: &str) -> String {
    format!("{}:{}", project_id, PROJECT_CONTEXT_KEY)
}

/// Identities a previous pass produced that the latest pass did not write.
pub fn stale_ids(previous: &[String], written: &[String]) -> Vec<String> {
    previous
        .iter()
        .filter(|id| !written.contains(id))
        .cloned()
        .collect()
}
