//! Shape statistics for an assembled prompt.

use serde::Serialize;

use crate::assembler::SECTION_SEPARATOR;
use crate::recitation::RECITATION_HEADER;
use crate::token::estimate_tokens;

/// Below this share of static prefix, caching gains little.
const LOW_PREFIX_RATIO: f64 = 0.5;
/// Prompts longer than this should offload content to references.
const LARGE_PROMPT_CHARS: usize = 8000;
const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptStats {
    pub total_chars: usize,
    pub total_lines: usize,
    pub section_count: usize,
    /// First line of each section, cut to 50 chars.
    pub section_titles: Vec<String>,
    pub has_task_recitation: bool,
    /// Share of the prompt taken by the static prefix, in `[0, 1]`.
    pub static_prefix_ratio: f64,
    pub estimated_tokens: usize,
    pub hints: Vec<String>,
}

/// Measure `prompt`, given the static prefix it was built with.
pub fn analyze(prompt: &str, static_prefix: &str) -> PromptStats {
    let total_chars = prompt.chars().count();

    let sections: Vec<&str> = if prompt.is_empty() {
        Vec::new()
    } else {
        prompt.split(SECTION_SEPARATOR).collect()
    };
    let section_titles = sections
        .iter()
        .map(|s| {
            let first = s.lines().next().unwrap_or_default();
            first.chars().take(TITLE_CHARS).collect()
        })
        .collect();

    let static_prefix_ratio = if total_chars == 0 {
        0.0
    } else {
        (static_prefix.chars().count() as f64 / total_chars as f64).min(1.0)
    };

    let mut hints = Vec::new();
    if static_prefix_ratio < LOW_PREFIX_RATIO {
        hints.push("low static prefix ratio".to_string());
    }
    if total_chars > LARGE_PROMPT_CHARS {
        hints.push("consider externalizing large content".to_string());
    }

    PromptStats {
        total_chars,
        total_lines: prompt.lines().count(),
        section_count: sections.len(),
        section_titles,
        has_task_recitation: prompt.contains(RECITATION_HEADER),
        static_prefix_ratio,
        estimated_tokens: estimate_tokens(prompt),
        hints,
    }
}
