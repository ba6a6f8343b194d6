//! Storage trait — the index/blob split behind the reference store.
//!
//! A backend stores exactly one small *index document* (loaded and saved as
//! a whole on every mutation) plus any number of *blobs* addressed by a
//! relative, `/`-separated location such as `refs/alice/code/x.md`.

use chrono::{DateTime, Utc};

use crate::error::MemoryError;

/// Size and modification time of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub location: String,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Backend for the reference index and artifact blobs.
pub trait Storage: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Load the index document. `None` if it has never been written.
    fn get_index(&self) -> Result<Option<String>, MemoryError>;

    /// Replace the index document. Must not leave a half-written index.
    fn put_index(&self, document: &str) -> Result<(), MemoryError>;

    /// Write (or overwrite) a blob.
    fn put_blob(&self, location: &str, data: &str) -> Result<(), MemoryError>;

    /// Read a blob. `None` if it does not exist.
    fn get_blob(&self, location: &str) -> Result<Option<String>, MemoryError>;

    /// Delete a blob and return the bytes freed, `None` if it did not exist.
    /// Directories left empty by the deletion are removed as well.
    fn delete_blob(&self, location: &str) -> Result<Option<u64>, MemoryError>;

    /// Size and mtime of a blob, `None` if it does not exist.
    fn stat_blob(&self, location: &str) -> Result<Option<BlobMeta>, MemoryError>;

    /// All blobs whose location starts with `prefix`.
    fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMeta>, MemoryError>;

    /// Normalize a caller-supplied locator (possibly absolute) to a relative
    /// location inside this backend. Rejects path traversal.
    fn resolve_location(&self, location: &str) -> Result<String, MemoryError> {
        normalize_location(location)
    }
}

/// Normalize a relative location: unify separators, drop `.` and empty
/// segments, reject `..`.
pub fn normalize_location(location: &str) -> Result<String, MemoryError> {
    let unified = location.trim().replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(MemoryError::Validation(format!(
                    "Path traversal detected in '{location}'"
                )));
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(MemoryError::Validation("Empty storage location".into()));
    }
    Ok(segments.join("/"))
}
