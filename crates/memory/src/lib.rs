//! Storage backends and stores for Tether.
//!
//! - [`FileStorage`] / [`InMemoryStorage`]: index + blob storage.
//! - [`ReferenceStore`]: large artifacts offloaded behind short markers.
//! - [`FailureLedger`]: classified, deduplicated failure history.
//! - [`TaskStore`]: per-task goal documents.
//! - [`FileIndex`] / [`InMemoryIndex`] / [`NoopIndex`]: memory index backends.

pub mod artifact;
pub mod blocks;
pub mod compressor;
pub mod failure;
pub mod file_backend;
pub mod fs_storage;
pub mod ids;
pub mod in_memory;
pub mod mem_storage;
pub mod noop;
pub mod reference;
pub mod task;

use std::sync::Arc;
use tether_config::AppConfig;
use tether_core::error::MemoryError;
use tether_core::memory::MemoryIndex;
use tether_core::storage::Storage;

pub use blocks::{extract_block, extract_blocks};
pub use compressor::{MemoryCompressor, parse_marker, strip_markers};
pub use failure::{ErrorKind, FailureLedger, FailureRecord, FailureStats, format_for_prompt};
pub use file_backend::FileIndex;
pub use fs_storage::FileStorage;
pub use in_memory::InMemoryIndex;
pub use mem_storage::InMemoryStorage;
pub use noop::NoopIndex;
pub use reference::{
    ConsistencyReport, IndexEntry, PurgeReport, ReferenceRecord, ReferenceStore, StorageStats,
};
pub use task::{DEFAULT_TASK_ID, TaskDocument, TaskStore, TaskSummary};

/// Build the storage backend selected by `config.storage.backend`.
pub fn create_storage(config: &AppConfig) -> Result<Arc<dyn Storage>, MemoryError> {
    match config.storage.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        "file" => Ok(Arc::new(FileStorage::new(config.storage_root())?)),
        other => Err(MemoryError::Validation(format!(
            "unknown storage backend: {other}"
        ))),
    }
}

/// Build the memory index selected by `config.memory_index.backend`.
pub fn create_memory_index(config: &AppConfig) -> Result<Arc<dyn MemoryIndex>, MemoryError> {
    match config.memory_index.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryIndex::new())),
        "file" => Ok(Arc::new(FileIndex::new(config.memory_index_path()))),
        "none" => Ok(Arc::new(NoopIndex)),
        other => Err(MemoryError::Validation(format!(
            "unknown memory index backend: {other}"
        ))),
    }
}
