//! Context assembly for Tether.
//!
//! [`ContextAssembler`] composes the static prefix, project instructions,
//! recent conversation, memories, failure lessons, user input and the task
//! recitation into one prompt. [`PromptCache`] keeps rendered prompts for a
//! TTL, keyed on the static prefix and the user.

pub mod assembler;
pub mod prompt_cache;
pub mod recitation;
pub mod stats;
pub mod token;

pub use assembler::{
    AssemblyRequest, CacheInfo, CacheSource, ContextAssembler, SECTION_SEPARATOR,
    STATIC_SYSTEM_PREFIX, extract_meta_instructions,
};
pub use prompt_cache::{CacheEntry, CacheStats, PromptCache};
pub use recitation::{RECITATION_HEADER, RecitationLimits};
pub use stats::{PromptStats, analyze};
pub use token::estimate_tokens;
