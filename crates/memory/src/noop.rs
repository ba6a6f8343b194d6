//! No-op memory index — disables persistent memory entirely.

use tether_core::error::MemoryError;
use tether_core::memory::{MemoryIndex, MemoryItem, Metadata};

/// An index that stores nothing.
pub struct NoopIndex;

impl MemoryIndex for NoopIndex {
    fn name(&self) -> &str {
        "none"
    }

    fn add(&self, _: &str, _: &str, _: &str, _: Metadata) -> Result<String, MemoryError> {
        Ok(String::new())
    }

    fn get_by_type(&self, _: &str, _: &str, _: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    fn replace(&self, _: &str, _: &str, _: &str, _: Metadata) -> Result<bool, MemoryError> {
        Ok(false)
    }

    fn delete(&self, _: &str, _: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }

    fn search(&self, _: &str, _: &str, _: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    fn get_recent(&self, _: &str, _: usize) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    fn clear_all(&self, _: &str) -> Result<usize, MemoryError> {
        Ok(0)
    }
}
