pub mod failures;
pub mod init;
pub mod prompt;
pub mod refs;
pub mod task;

use std::sync::Arc;
use tether_config::{AppConfig, ConfigError};
use tether_core::{Error, Result};
use tether_context::{ContextAssembler, PromptCache};
use tether_memory::{FailureLedger, MemoryCompressor, ReferenceStore, TaskStore};
use tracing::debug;

/// Components wired from the loaded config, shared by every command.
pub struct Runtime {
    pub config: AppConfig,
    pub references: Arc<ReferenceStore>,
    pub compressor: MemoryCompressor,
    pub ledger: Arc<FailureLedger>,
    pub tasks: Arc<TaskStore>,
    pub assembler: ContextAssembler,
}

impl Runtime {
    pub fn load() -> Result<Self> {
        let config = AppConfig::load().map_err(config_error)?;
        Self::from_config(config)
    }

    pub fn from_config(config: AppConfig) -> Result<Self> {
        let storage = tether_memory::create_storage(&config)?;
        let index = tether_memory::create_memory_index(&config)?;

        let references = Arc::new(ReferenceStore::with_config(
            storage.clone(),
            &config.references,
        ));
        let compressor =
            MemoryCompressor::new(references.clone(), config.references.externalize_threshold);
        let ledger = Arc::new(FailureLedger::with_config(index, &config.failures));
        let tasks = Arc::new(TaskStore::new(storage));
        let assembler = ContextAssembler::with_config(
            ledger.clone(),
            tasks.clone(),
            Arc::new(PromptCache::new()),
            &config,
        );

        debug!(
            storage = %config.storage.backend,
            memory_index = %config.memory_index.backend,
            "Runtime wired"
        );
        Ok(Self {
            config,
            references,
            compressor,
            ledger,
            tasks,
            assembler,
        })
    }
}

pub fn config_error(e: ConfigError) -> Error {
    Error::Config {
        message: e.to_string(),
    }
}
