//! In-memory storage backend — useful for testing and ephemeral sessions.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use tether_core::error::MemoryError;
use tether_core::storage::{BlobMeta, Storage, normalize_location};

/// A [`Storage`] that keeps the index and blobs in process memory.
#[derive(Default)]
pub struct InMemoryStorage {
    index: RwLock<Option<String>>,
    blobs: RwLock<BTreeMap<String, (String, DateTime<Utc>)>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn get_index(&self) -> Result<Option<String>, MemoryError> {
        Ok(self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn put_index(&self, document: &str) -> Result<(), MemoryError> {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Some(document.to_string());
        Ok(())
    }

    fn put_blob(&self, location: &str, data: &str) -> Result<(), MemoryError> {
        let location = normalize_location(location)?;
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location, (data.to_string(), Utc::now()));
        Ok(())
    }

    fn get_blob(&self, location: &str) -> Result<Option<String>, MemoryError> {
        let location = normalize_location(location)?;
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&location)
            .map(|(data, _)| data.clone()))
    }

    fn delete_blob(&self, location: &str) -> Result<Option<u64>, MemoryError> {
        let location = normalize_location(location)?;
        Ok(self
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&location)
            .map(|(data, _)| data.len() as u64))
    }

    fn stat_blob(&self, location: &str) -> Result<Option<BlobMeta>, MemoryError> {
        let location = normalize_location(location)?;
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(&location).map(|(data, modified_at)| BlobMeta {
            location: location.clone(),
            size_bytes: data.len() as u64,
            modified_at: *modified_at,
        }))
    }

    fn list_blobs(&self, prefix: &str) -> Result<Vec<BlobMeta>, MemoryError> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs
            .iter()
            .filter(|(location, _)| location.starts_with(prefix))
            .map(|(location, (data, modified_at))| BlobMeta {
                location: location.clone(),
                size_bytes: data.len() as u64,
                modified_at: *modified_at,
            })
            .collect())
    }
}
