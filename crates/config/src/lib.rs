//! Configuration loading, validation, and management for Tether.
//!
//! Loads configuration from `~/.tether/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tether/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Blob + reference index backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Reference store (externalization) settings
    #[serde(default)]
    pub references: ReferenceConfig,

    /// Small-content memory index backend
    #[serde(default)]
    pub memory_index: MemoryIndexConfig,

    /// Failure ledger settings
    #[serde(default)]
    pub failures: FailureConfig,

    /// Prompt cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Context assembly limits
    #[serde(default)]
    pub assembler: AssemblerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "file" or "memory"
    #[serde(default = "default_file_backend")]
    pub backend: String,

    /// Root directory for the file backend (default `~/.tether/store`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

fn default_file_backend() -> String {
    "file".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_file_backend(),
            root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Content longer than this many characters is stored externally
    #[serde(default = "default_externalize_threshold")]
    pub externalize_threshold: usize,

    /// Maximum summary length in characters (before the ellipsis)
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,

    /// Artifacts older than this are removed by `purge`
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_externalize_threshold() -> usize {
    500
}
fn default_summary_max_chars() -> usize {
    150
}
fn default_retention_days() -> u32 {
    30
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            externalize_threshold: default_externalize_threshold(),
            summary_max_chars: default_summary_max_chars(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryIndexConfig {
    /// "file", "memory" or "none"
    #[serde(default = "default_file_backend")]
    pub backend: String,

    /// JSONL path for the file backend (default `~/.tether/memory/memories.jsonl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for MemoryIndexConfig {
    fn default() -> Self {
        Self {
            backend: default_file_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureConfig {
    /// How many stored failures are scanned for dedup and ranking
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// How many lessons are injected per turn
    #[serde(default = "default_relevant_limit")]
    pub relevant_limit: usize,

    /// Character ceiling for the failure-lessons section
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,
}

fn default_scan_limit() -> usize {
    50
}
fn default_relevant_limit() -> usize {
    3
}
fn default_prompt_char_budget() -> usize {
    800
}

impl Default for FailureConfig {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
            relevant_limit: default_relevant_limit(),
            prompt_char_budget: default_prompt_char_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time-to-live for cached prompts
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    #[serde(default = "default_window")]
    pub working_memory_window: usize,

    #[serde(default = "default_window")]
    pub max_memories: usize,

    #[serde(default = "default_summary_max_chars")]
    pub memory_snippet_chars: usize,

    #[serde(default = "default_recitation_max_lines")]
    pub recitation_max_lines: usize,

    #[serde(default = "default_recitation_min_chars")]
    pub recitation_min_chars: usize,

    #[serde(default = "default_recitation_fallback_chars")]
    pub recitation_fallback_chars: usize,
}

fn default_window() -> usize {
    5
}
fn default_recitation_max_lines() -> usize {
    20
}
fn default_recitation_min_chars() -> usize {
    100
}
fn default_recitation_fallback_chars() -> usize {
    500
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            working_memory_window: default_window(),
            max_memories: default_window(),
            memory_snippet_chars: default_summary_max_chars(),
            recitation_max_lines: default_recitation_max_lines(),
            recitation_min_chars: default_recitation_min_chars(),
            recitation_fallback_chars: default_recitation_fallback_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (`~/.tether/config.toml`).
    ///
    /// Environment overrides:
    /// - `TETHER_CONFIG` — explicit config file path
    /// - `TETHER_STORE_DIR` — storage root
    /// - `TETHER_CACHE_TTL` — cache TTL in seconds
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("TETHER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"));
        let mut config = Self::load_from(&config_path)?;

        if let Ok(root) = std::env::var("TETHER_STORE_DIR") {
            config.storage.root = Some(PathBuf::from(root));
        }

        if let Ok(ttl) = std::env::var("TETHER_CACHE_TTL") {
            config.cache.ttl_secs = ttl.parse().map_err(|_| {
                ConfigError::ValidationError(format!("TETHER_CACHE_TTL is not a number: {ttl}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path (`$TETHER_HOME` or `~/.tether`).
    pub fn config_dir() -> PathBuf {
        std::env::var("TETHER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_home().join(".tether"))
    }

    /// Root directory of the file storage backend.
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("store"))
    }

    /// Path of the JSONL memory index.
    pub fn memory_index_path(&self) -> PathBuf {
        self.memory_index
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory").join("memories.jsonl"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.storage.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}' (expected file or memory)",
                self.storage.backend
            )));
        }

        if !matches!(self.memory_index.backend.as_str(), "file" | "memory" | "none") {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory_index backend '{}' (expected file, memory or none)",
                self.memory_index.backend
            )));
        }

        if self.references.externalize_threshold == 0 || self.references.summary_max_chars == 0 {
            return Err(ConfigError::ValidationError(
                "externalize_threshold and summary_max_chars must be > 0".into(),
            ));
        }

        if self.failures.scan_limit == 0 || self.failures.prompt_char_budget == 0 {
            return Err(ConfigError::ValidationError(
                "failures.scan_limit and failures.prompt_char_budget must be > 0".into(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError("cache.ttl_secs must be > 0".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
