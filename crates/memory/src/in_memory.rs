//! In-memory index backend — useful for testing and ephemeral sessions.

use chrono::Utc;
use std::sync::{PoisonError, RwLock};
use tether_core::error::MemoryError;
use tether_core::memory::{MemoryIndex, MemoryItem, Metadata, keyword_score};
use uuid::Uuid;

/// Item list operations shared by the in-memory and file backends.
///
/// Items are kept in insertion order; every query filters by `user_id`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Items(pub(crate) Vec<MemoryItem>);

impl Items {
    pub(crate) fn add(
        &mut self,
        user_id: &str,
        content: &str,
        item_type: &str,
        metadata: Metadata,
    ) -> String {
        let mut item = MemoryItem::new(user_id, content, item_type, metadata);
        item.id = Uuid::new_v4().to_string();
        let id = item.id.clone();
        self.0.push(item);
        id
    }

    pub(crate) fn by_type(&self, user_id: &str, item_type: &str, limit: usize) -> Vec<MemoryItem> {
        let matching: Vec<&MemoryItem> = self
            .0
            .iter()
            .filter(|i| i.user_id == user_id && i.item_type == item_type)
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub(crate) fn replace(
        &mut self,
        user_id: &str,
        id: &str,
        content: &str,
        metadata: Metadata,
    ) -> bool {
        match self
            .0
            .iter_mut()
            .find(|i| i.user_id == user_id && i.id == id)
        {
            Some(item) => {
                item.content = content.to_string();
                item.metadata = metadata;
                item.timestamp = Utc::now();
                true
            }
            None => false,
        }
    }

    pub(crate) fn delete(&mut self, user_id: &str, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|i| !(i.user_id == user_id && i.id == id));
        self.0.len() < before
    }

    pub(crate) fn search(&self, user_id: &str, query: &str, limit: usize) -> Vec<MemoryItem> {
        let query_lower = query.to_lowercase();
        let mut results: Vec<(f32, &MemoryItem)> = self
            .0
            .iter()
            .filter(|i| i.user_id == user_id)
            .filter(|i| i.content.to_lowercase().contains(&query_lower))
            .map(|i| (keyword_score(&i.content, &query_lower), i))
            .collect();

        results.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        results
            .into_iter()
            .take(limit)
            .map(|(_, i)| i.clone())
            .collect()
    }

    pub(crate) fn recent(&self, user_id: &str, limit: usize) -> Vec<MemoryItem> {
        let mut items: Vec<MemoryItem> = self
            .0
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        // Reversed first so equal timestamps list the later insert first.
        items.reverse();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(limit);
        items
    }

    pub(crate) fn clear_user(&mut self, user_id: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|i| i.user_id != user_id);
        before - self.0.len()
    }
}

/// An in-memory index that keeps items in a Vec.
/// Useful for testing and sessions where persistence isn't needed.
#[derive(Default)]
pub struct InMemoryIndex {
    items: RwLock<Items>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn add(
        &self,
        user_id: &str,
        content: &str,
        item_type: &str,
        metadata: Metadata,
    ) -> Result<String, MemoryError> {
        Ok(self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(user_id, content, item_type, metadata))
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
        Ok(self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(user_id, id, content, metadata))
    }

    fn delete(&self, user_id: &str, id: &str) -> Result<bool, MemoryError> {
        Ok(self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .delete(user_id, id))
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
        Ok(self
            .items
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear_user(user_id))
    }
}
