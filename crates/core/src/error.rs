//! Error types for the Tether domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Store operations return
//! [`MemoryError`]; everything else rolls up into [`Error`].

use thiserror::Error;

/// The top-level error type for all Tether operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory / storage errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the reference store, the memory index and the storage
/// backends.
///
/// `Validation` signals direct misuse and is surfaced to the caller. The
/// other kinds are degraded to safe defaults at the boundary of every
/// turn-critical operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl MemoryError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors that indicate a programming error by the caller.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
