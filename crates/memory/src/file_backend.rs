//! File-based memory index — persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded [`MemoryItem`]. Default location:
//! `~/.tether/memory/memories.jsonl`.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tether_core::error::MemoryError;
use tether_core::memory::{MemoryIndex, MemoryItem, Metadata};
use tracing::{debug, warn};

use crate::in_memory::Items;

/// A file-backed index using JSONL (one JSON object per line).
///
/// Items are loaded into memory on creation and flushed to disk on every
/// mutation. Reads never touch the disk.
pub struct FileIndex {
    path: PathBuf,
    items: RwLock<Items>,
}

impl FileIndex {
    /// Open the index at `path`. A missing file starts empty and is created
    /// on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = items.len(), "File memory index loaded");
        Self {
            path,
            items: RwLock::new(Items(items)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<MemoryItem> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryItem>(line) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory item");
                    None
                }
            })
            .collect()
    }

    fn flush(&self, items: &Items) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        let mut content = String::new();
        for item in &items.0 {
            let line = serde_json::to_string(item).map_err(|e| {
                MemoryError::Storage(format!("Failed to serialize memory item: {e}"))
            })?;
            content.push_str(&line);
            content.push('\n');
        }

        std::fs::write(&self.path, &content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }

    /// Apply a mutation under the write lock. The change is made on a copy
    /// and only becomes visible once it has been flushed; a failed flush
    /// leaves the index as it was.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Items) -> T,
        changed: impl FnOnce(&T) -> bool,
    ) -> Result<T, MemoryError> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        let mut staged = items.clone();
        let result = op(&mut staged);
        if changed(&result) {
            self.flush(&staged)?;
            *items = staged;
        }
        Ok(result)
    }
}

impl MemoryIndex for FileIndex {
    fn name(&self) -> &str {
        "file"
    }

    fn add(
        &self,
        user_id: &str,
        content: &str,
        item_type: &str,
        metadata: Metadata,
    ) -> Result<String, MemoryError> {
        self.mutate(|items| items.add(user_id, content, item_type, metadata), |_| true)
    }

    fn get_by_type(
        &self,
        user_id: &str,
        item_type: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_type(user_id, item_type, limit))
    }

    fn replace(
        &self,
        user_id: &str,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, MemoryError> {
        self.mutate(
            |items| items.replace(user_id, id, content, metadata),
            |replaced| *replaced,
        )
    }

    fn delete(&self, user_id: &str, id: &str) -> Result<bool, MemoryError> {
        self.mutate(|items| items.delete(user_id, id), |deleted| *deleted)
    }

    fn search(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .search(user_id, query, limit))
    }

    fn get_recent(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(self
            .items
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .recent(user_id, limit))
    }

    fn clear_all(&self, user_id: &str) -> Result<usize, MemoryError> {
        self.mutate(|items| items.clear_user(user_id), |removed| *removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory").join("memories.jsonl");
        (dir, path)
    }

    #[test]
    fn add_persists_across_reload() {
        let (_dir, path) = temp_path();

        let mem = FileIndex::new(path.clone());
        let id = mem.add("u1", "Rust is great", "note", Metadata::new()).unwrap();
        assert!(!id.is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Rust is great"));

        let mem2 = FileIndex::new(path);
        let items = mem2.get_by_type("u1", "note", 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, id);
    }

    #[test]
    fn replace_persists() {
        let (_dir, path) = temp_path();
        let mem = FileIndex::new(path.clone());
        let id = mem.add("u1", "draft", "note", Metadata::new()).unwrap();
        assert!(mem.replace("u1", &id, "final", Metadata::new()).unwrap());

        let mem2 = FileIndex::new(path);
        assert_eq!(mem2.get_recent("u1", 1).unwrap()[0].content, "final");
    }

    #[test]
    fn delete_and_clear_persist() {
        let (_dir, path) = temp_path();
        let mem = FileIndex::new(path.clone());
        let id = mem.add("u1", "To be deleted", "note", Metadata::new()).unwrap();
        mem.add("u1", "Entry 2", "note", Metadata::new()).unwrap();
        mem.add("u2", "Other user", "note", Metadata::new()).unwrap();
        assert!(mem.delete("u1", &id).unwrap());
        assert_eq!(mem.clear_all("u1").unwrap(), 1);

        let mem2 = FileIndex::new(path);
        assert!(mem2.get_recent("u1", 10).unwrap().is_empty());
        assert_eq!(mem2.get_recent("u2", 10).unwrap().len(), 1);
    }

    #[test]
    fn handles_missing_file_gracefully() {
        let (_dir, path) = temp_path();
        let mem = FileIndex::new(path.clone());
        assert!(mem.get_recent("u1", 10).unwrap().is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn failed_flush_leaves_no_trace() {
        let (_dir, path) = temp_path();
        // A directory where the file should be makes every write fail.
        std::fs::create_dir_all(&path).unwrap();
        let mem = FileIndex::new(path.clone());

        assert!(mem.add("u1", "should not exist", "note", Metadata::new()).is_err());
        assert!(mem.get_recent("u1", 10).unwrap().is_empty());

        std::fs::remove_dir(&path).unwrap();
        mem.add("u1", "second", "note", Metadata::new()).unwrap();

        let reopened = FileIndex::new(path);
        let contents: Vec<String> = reopened
            .get_recent("u1", 10)
            .unwrap()
            .into_iter()
            .map(|i| i.content)
            .collect();
        assert_eq!(contents, vec!["second".to_string()]);
    }

    #[test]
    fn failed_replace_keeps_old_content() {
        let (_dir, path) = temp_path();
        let mem = FileIndex::new(path.clone());
        let id = mem.add("u1", "draft", "note", Metadata::new()).unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(mem.replace("u1", &id, "final", Metadata::new()).is_err());
        assert_eq!(mem.get_recent("u1", 1).unwrap()[0].content, "draft");
    }

    #[test]
    fn skips_corrupted_lines() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"id":"1","user_id":"u1","content":"valid","type":"note","timestamp":"2026-01-01T00:00:00Z"}}"#).unwrap();
        writeln!(tmp, "this is not json").unwrap();
        writeln!(tmp, r#"{{"id":"2","user_id":"u1","content":"also valid","type":"note","timestamp":"2026-01-01T00:00:01Z"}}"#).unwrap();

        let mem = FileIndex::new(tmp.path());
        assert_eq!(mem.get_by_type("u1", "note", 10).unwrap().len(), 2);
    }
}
