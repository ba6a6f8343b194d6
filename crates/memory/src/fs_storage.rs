//! File-system storage backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/index.json                      reference index (whole document)
//! <root>/refs/<user>/<type>/<file>.md    externalized artifacts
//! <root>/tasks/<user>/<task>_todo.md     task documents
//! ```
//!
//! The index is written to a temporary file and renamed over the old one,
//! so readers never observe a half-written index.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tether_core::error::MemoryError;
use tether_core::storage::{BlobMeta, Storage, normalize_location};
use tracing::debug;

const INDEX_FILENAME: &str = "index.json";
const INDEX_TMP_FILENAME: &str = "index.json.tmp";

/// A directory-backed [`Storage`].
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            MemoryError::Storage(format!(
                "Failed to create storage root {}: {e}",
                root.display()
            ))
        })?;
        debug!(root = %root.display(), "File storage opened");
        Ok(Self { root })
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, location: &str) -> Result<PathBuf, MemoryError> {
        let normalized = normalize_location(location)?;
        Ok(normalized
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    /// Remove directories left empty under `path`, stopping at the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            let is_empty = std::fs::read_dir(dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !is_empty || std::fs::remove_dir(dir).is_err() {
                break;
            }
            debug!(dir = %dir.display(), "Removed empty storage directory");
            current = dir.parent();
        }
    }

    fn collect_blobs(&self, dir: &Path, out: &mut Vec<BlobMeta>) -> Result<(), MemoryError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to list {}: {e}",
                    dir.display()
                )));
            }
        };

        for entry in entries {
            let entry = entry
                .map_err(|e| MemoryError::Storage(format!("Failed to read dir entry: {e}")))?;
            let path = entry.path();
            if path.is_dir() {
                self.collect_blobs(&path, out)?;
                continue;
            }
            if dir == self.root {
                let name = entry.file_name();
                if name == INDEX_FILENAME || name == INDEX_TMP_FILENAME {
                    continue;
                }
            }
            if let Some(meta) = self.meta_for(&path)? {
                out.push(meta);
            }
        }
        Ok(())
    }

    fn meta_for(&self, path: &Path) -> Result<Option<BlobMeta>, MemoryError> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to stat {}: {e}",
                    path.display()
                )));
            }
        };
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            MemoryError::Storage(format!("{} is outside the storage root", path.display()))
        })?;
        let location = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let modified_at = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(BlobMeta {
            location,
            size_bytes: metadata.len(),
            modified_at,
        }))
    }
}

impl Storage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    fn get_index(&self) -> Result<Option<String>, MemoryError> {
        match std::fs::read_to_string(self.root.join(INDEX_FILENAME)) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MemoryError::Storage(format!("Failed to read index: {e}"))),
        }
    }

    fn put_index(&self, document: &str) -> Result<(), MemoryError> {
        let tmp = self.root.join(INDEX_TMP_FILENAME);
        std::fs::write(&tmp, document)
            .map_err(|e| MemoryError::Storage(format!("Failed to write index: {e}")))?;
        std::fs::rename(&tmp, self.root.join(INDEX_FILENAME))
            .map_err(|e| MemoryError::Storage(format!("Failed to replace index: {e}")))
    }

    fn put_blob(&self, location: &str, data: &str) -> Result<(), MemoryError> {
        let path = self.path_for(location)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(&path, data)
            .map_err(|e| MemoryError::Storage(format!("Failed to write {location}: {e}")))
    }

    fn get_blob(&self, location: &str) -> Result<Option<String>, MemoryError> {
        let path = self.path_for(location)?;
        match std::fs::read_to_string(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MemoryError::Storage(format!("Failed to read {location}: {e}"))),
        }
    }

    fn delete_blob(&self, location: &str) -> Result<Option<u64>, MemoryError> {
        let path = self.path_for(location)?;
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MemoryError::Storage(format!("Failed to stat {location}: {e}"))),
        };
        std::fs::remove_file(&path)
            .map_err(|e| MemoryError::Storage(format!("Failed to delete {location}: {e}")))?;
        self.prune_empty_parents(&path);
        Ok(Some(size))
    }

    fn stat_blob(&self, location: &str) -> Result<Option<BlobMeta>, MemoryError> {
        let path = self.path_for(location)?;
        self.meta_for(&path)
    }

    fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMeta>, MemoryError> {
        let mut blobs = Vec::new();
        self.collect_blobs(&self.root, &mut blobs)?;
        blobs.retain(|b| b.location.starts_with(prefix));
        blobs.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(blobs)
    }

    fn resolve_location(&self, location: &str) -> Result<String, MemoryError> {
        let path = Path::new(location.trim());
        if path.is_absolute() {
            let relative = path.strip_prefix(&self.root).map_err(|_| {
                MemoryError::Validation(format!("'{location}' is outside the storage root"))
            })?;
            return normalize_location(&relative.to_string_lossy());
        }
        normalize_location(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, FileStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        (dir, storage)
    }

    #[test]
    fn index_roundtrip_and_missing() {
        let (_dir, s) = storage();
        assert!(s.get_index().unwrap().is_none());
        s.put_index("{\"version\":\"1.0\"}").unwrap();
        assert_eq!(s.get_index().unwrap().unwrap(), "{\"version\":\"1.0\"}");
        assert!(!s.root().join(INDEX_TMP_FILENAME).exists());
    }

    #[test]
    fn blob_roundtrip_and_stat() {
        let (_dir, s) = storage();
        s.put_blob("refs/alice/code/a.md", "hello").unwrap();
        assert_eq!(s.get_blob("refs/alice/code/a.md").unwrap().unwrap(), "hello");

        let meta = s.stat_blob("refs/alice/code/a.md").unwrap().unwrap();
        assert_eq!(meta.size_bytes, 5);
        assert_eq!(meta.location, "refs/alice/code/a.md");
        assert!(s.get_blob("refs/alice/code/missing.md").unwrap().is_none());
    }

    #[test]
    fn delete_prunes_empty_directories() {
        let (_dir, s) = storage();
        s.put_blob("refs/alice/code/a.md", "hello").unwrap();
        s.put_blob("refs/alice/notes/b.md", "keep").unwrap();

        assert_eq!(s.delete_blob("refs/alice/code/a.md").unwrap(), Some(5));
        assert!(!s.root().join("refs/alice/code").exists());
        assert!(s.root().join("refs/alice/notes").exists());
        assert_eq!(s.delete_blob("refs/alice/code/a.md").unwrap(), None);
    }

    #[test]
    fn list_filters_by_prefix_and_skips_index() {
        let (_dir, s) = storage();
        s.put_index("{}").unwrap();
        s.put_blob("refs/alice/code/a.md", "1").unwrap();
        s.put_blob("tasks/alice/default_todo.md", "2").unwrap();

        let refs = s.list_blobs("refs/").unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].location, "refs/alice/code/a.md");
        assert_eq!(s.list_blobs("").unwrap().len(), 2);
    }

    #[test]
    fn resolves_absolute_paths_under_root() {
        let (_dir, s) = storage();
        let abs = s.root().join("refs").join("alice").join("a.md");
        assert_eq!(
            s.resolve_location(&abs.to_string_lossy()).unwrap(),
            "refs/alice/a.md"
        );
        assert!(s.resolve_location("/etc/passwd").unwrap_err().is_validation());
        assert!(s.resolve_location("refs/../../x").is_err());
    }
}
