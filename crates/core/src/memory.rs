//! Memory index trait — small-content key/value storage namespaced by user.
//!
//! The memory index is the fast store that failure records and compressed
//! memories live in. Large payloads never go here directly: they are
//! externalized to a [`Storage`](crate::storage::Storage) blob and only a
//! compact reference marker is indexed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// Open key/value metadata attached to items and records.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single memory item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryItem {
    /// Unique ID for this item (assigned by the backend when empty)
    pub id: String,

    /// Owner namespace
    pub user_id: String,

    /// The content of the memory
    pub content: String,

    /// Item type, e.g. `failure_lesson`, `code`, `note`
    #[serde(rename = "type")]
    pub item_type: String,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,

    /// When this item was created or last replaced
    pub timestamp: DateTime<Utc>,
}

impl MemoryItem {
    /// Build a new item stamped with the current time and no id yet.
    pub fn new(
        user_id: impl Into<String>,
        content: impl Into<String>,
        item_type: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            id: String::new(),
            user_id: user_id.into(),
            content: content.into(),
            item_type: item_type.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Read a string metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// The memory index contract.
///
/// Every operation is scoped to one `user_id`; a backend must never return
/// or mutate another user's items.
///
/// Implementations: in-memory, JSON-lines file, no-op.
pub trait MemoryIndex: Send + Sync {
    /// The backend name (e.g., "file", "in_memory", "none").
    fn name(&self) -> &str;

    /// Store a new item and return its id.
    fn add(
        &self,
        user_id: &str,
        content: &str,
        item_type: &str,
        metadata: Metadata,
    ) -> Result<String, MemoryError>;

    /// Items of one type, in insertion order, keeping the most recent `limit`.
    fn get_by_type(
        &self,
        user_id: &str,
        item_type: &str,
        limit: usize,
    ) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Replace an item's content and metadata in place, keeping its id and
    /// position. Refreshes the timestamp. Returns `false` if no such item.
    fn replace(
        &self,
        user_id: &str,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> Result<bool, MemoryError>;

    /// Delete an item by id.
    fn delete(&self, user_id: &str, id: &str) -> Result<bool, MemoryError>;

    /// Case-insensitive keyword search, best match first.
    fn search(&self, user_id: &str, query: &str, limit: usize)
    -> Result<Vec<MemoryItem>, MemoryError>;

    /// Most recent items first.
    fn get_recent(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Remove every item of one user and return how many were removed.
    fn clear_all(&self, user_id: &str) -> Result<usize, MemoryError>;
}

/// Keyword relevance used by the simple backends: occurrences of the query
/// normalized by content length (per 100 chars).
pub fn keyword_score(content: &str, query_lower: &str) -> f32 {
    if query_lower.is_empty() {
        return 0.0;
    }
    let occurrences = content.to_lowercase().matches(query_lower).count();
    occurrences as f32 / (content.len() as f32 / 100.0).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_serializes_type_field() {
        let item = MemoryItem::new("u1", "The user prefers Rust", "preference", Metadata::new());
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"type\":\"preference\""));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn meta_str_reads_strings_only() {
        let mut meta = Metadata::new();
        meta.insert("failure_id".into(), "abc".into());
        meta.insert("count".into(), 3.into());
        let item = MemoryItem::new("u1", "x", "t", meta);
        assert_eq!(item.meta_str("failure_id"), Some("abc"));
        assert_eq!(item.meta_str("count"), None);
    }

    #[test]
    fn keyword_score_counts_occurrences() {
        assert_eq!(keyword_score("rust rust", "rust"), 2.0);
        assert_eq!(keyword_score("python", "rust"), 0.0);
        assert_eq!(keyword_score("anything", ""), 0.0);
    }
}
