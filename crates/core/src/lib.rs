//! # Tether Core
//!
//! Domain types, traits, and error definitions for the Tether context memory
//! subsystem. This crate has **zero framework dependencies**: it defines the
//! seams that the storage, memory and context crates implement against.
//!
//! ## Seams
//!
//! - [`Storage`] separates the small, whole-document reference index from
//!   the blob store holding large artifacts, so a backend (plain files,
//!   in-process map, object store) can be swapped without touching the
//!   reference, failure or task logic.
//! - [`MemoryIndex`] is the small-content key/value index that failure
//!   records and compressed memories are persisted through.

pub mod error;
pub mod memory;
pub mod storage;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, Result};
pub use memory::{MemoryIndex, MemoryItem, Metadata};
pub use storage::{BlobMeta, Storage};
