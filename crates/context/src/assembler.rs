//! Context assembly: the ordered text blob handed to the agent each turn.
//!
//! Sections, from most static to most dynamic:
//!
//! 1. **Static prefix** — constant instructions, identical on every call
//! 2. **Project Instructions** — only when requested and supplied
//! 3. **Recent Conversation** — the last few dialogue entries, numbered
//! 4. **Relevant Memories** — retrieved items, markers reduced to summaries
//! 5. **Past Failures** — relevant ledger entries under a char budget
//! 6. **User Input** — verbatim
//! 7. **Task recitation** — the current goal, last so it is attended to most
//!
//! Absent sections are omitted; the rest are joined by [`SECTION_SEPARATOR`].
//! Apart from the task recitation and the failure ledger, assembly is a
//! pure function of the request.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tether_config::{AppConfig, AssemblerConfig, FailureConfig};
use tether_core::memory::MemoryItem;
use tether_memory::ids::take_chars;
use tether_memory::{
    DEFAULT_TASK_ID, FailureLedger, TaskStore, extract_blocks, format_for_prompt, strip_markers,
};
use tracing::{debug, info};

use crate::prompt_cache::{CacheStats, PromptCache};
use crate::recitation::{self, RecitationLimits};

// ── Constants ─────────────────────────────────────────────────────────────

/// Joins sections: a line of 50 `=` between newlines.
pub const SECTION_SEPARATOR: &str =
    "\n==================================================\n";

/// Constant instructions at the head of every prompt. Never contains
/// per-call data, so the rendered prefix is identical across calls.
pub const STATIC_SYSTEM_PREFIX: &str = "\
[System Instructions - coding assistant]

You are a software development assistant working inside a long-running
session. You are strong at:
- systems programming and API design
- debugging build, test and runtime failures
- keeping changes small, reviewed and tested

Response rules:
1. Keep answers concise, direct and technically precise.
2. Use fenced code blocks with the correct language tag.
3. Record important decisions in a `-- memory` block.
4. When something fails, analyse the cause and record the lesson in a
   `-- lesson` block.
5. When the task state changes, record it in a `-- task_update` block.

Lesson format (append at the end of the reply):

-- lesson
One sentence: what caused the failure and what to do instead.
--

Example:
-- lesson
The pool had no connection cap and ran dry; set max_connections and a timeout.
--";

const META_HEADING: &str = "## Initial Prompt";
const TASK_UPDATE_TAG: &str = "task_update";

// ── Types ─────────────────────────────────────────────────────────────────

/// Inputs for one assembly.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyRequest<'a> {
    pub user_id: &'a str,
    pub user_input: &'a str,
    /// Retrieved memory items, most relevant first.
    pub memories: &'a [MemoryItem],
    /// Recent dialogue entries, oldest first.
    pub working_memory: &'a [String],
    /// Inject project instructions (first turn of a session).
    pub include_meta: bool,
    /// Project instruction document.
    pub meta_content: Option<&'a str>,
}

impl<'a> AssemblyRequest<'a> {
    pub fn new(user_id: &'a str, user_input: &'a str) -> Self {
        Self {
            user_id,
            user_input,
            memories: &[],
            working_memory: &[],
            include_meta: false,
            meta_content: None,
        }
    }

    pub fn with_memories(mut self, memories: &'a [MemoryItem]) -> Self {
        self.memories = memories;
        self
    }

    pub fn with_working_memory(mut self, working_memory: &'a [String]) -> Self {
        self.working_memory = working_memory;
        self
    }

    pub fn with_meta(mut self, meta_content: &'a str) -> Self {
        self.include_meta = true;
        self.meta_content = Some(meta_content);
        self
    }
}

/// Where a cached build came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSource {
    PromptCache,
    NewGeneration,
}

/// Reported by [`ContextAssembler::build_with_cache`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub cache_hit: bool,
    pub cache_key: String,
    pub source: CacheSource,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds prompts and owns the per-session task pointer.
pub struct ContextAssembler {
    ledger: Arc<FailureLedger>,
    tasks: Arc<TaskStore>,
    cache: Arc<PromptCache>,
    config: AssemblerConfig,
    failures: FailureConfig,
    session_tasks: RwLock<HashMap<String, String>>,
}

impl ContextAssembler {
    pub fn new(ledger: Arc<FailureLedger>, tasks: Arc<TaskStore>, cache: Arc<PromptCache>) -> Self {
        Self::with_config(ledger, tasks, cache, &AppConfig::default())
    }

    pub fn with_config(
        ledger: Arc<FailureLedger>,
        tasks: Arc<TaskStore>,
        cache: Arc<PromptCache>,
        config: &AppConfig,
    ) -> Self {
        Self {
            ledger,
            tasks,
            cache,
            config: config.assembler.clone(),
            failures: config.failures.clone(),
            session_tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &Arc<FailureLedger> {
        &self.ledger
    }

    pub fn tasks(&self) -> &Arc<TaskStore> {
        &self.tasks
    }

    pub fn cache(&self) -> &Arc<PromptCache> {
        &self.cache
    }

    /// Assemble the prompt without consulting the cache.
    pub fn build(&self, request: &AssemblyRequest<'_>) -> String {
        let mut sections: Vec<String> = vec![STATIC_SYSTEM_PREFIX.to_string()];

        if request.include_meta
            && let Some(meta) = request.meta_content.and_then(extract_meta_instructions)
        {
            sections.push(format!("[Project Instructions]\n{meta}"));
        }

        sections.extend(self.render_working_memory(request.working_memory));
        sections.extend(self.render_memories(request.memories));
        sections.extend(self.render_failures(request.user_id, request.user_input));
        sections.push(format!("[User Input]\n{}", request.user_input));
        sections.extend(self.render_recitation(request.user_id));

        debug!(
            user_id = %request.user_id,
            sections = sections.len(),
            "Assembled prompt"
        );
        sections.join(SECTION_SEPARATOR)
    }

    /// Assemble through the prompt cache.
    ///
    /// The key covers only the static prefix and the user, so a hit returns
    /// the text rendered for an earlier request of the same user. Task writes
    /// invalidate that user's entries.
    pub fn build_with_cache(
        &self,
        request: &AssemblyRequest<'_>,
        ttl: Duration,
    ) -> (String, CacheInfo) {
        let cache_key = PromptCache::key(STATIC_SYSTEM_PREFIX, request.user_id);

        if let Some(text) = self.cache.get(&cache_key) {
            debug!(user_id = %request.user_id, cache_key = %cache_key, "Prompt cache hit");
            return (
                text,
                CacheInfo {
                    cache_hit: true,
                    cache_key,
                    source: CacheSource::PromptCache,
                },
            );
        }

        let text = self.build(request);
        self.cache.put(
            &cache_key,
            &text,
            STATIC_SYSTEM_PREFIX,
            request.user_id,
            ttl,
        );
        (
            text,
            CacheInfo {
                cache_hit: false,
                cache_key,
                source: CacheSource::NewGeneration,
            },
        )
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // ── Task lifecycle ────────────────────────────────────────────────────

    /// Point the user's session at `task_id`.
    pub fn set_task_id(&self, user_id: &str, task_id: &str) {
        self.session_tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id.to_string(), task_id.to_string());
    }

    /// The session's current task, [`DEFAULT_TASK_ID`] if none was set.
    pub fn current_task_id(&self, user_id: &str) -> String {
        self.session_tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| DEFAULT_TASK_ID.to_string())
    }

    /// Write a fresh task document for `goal` and make it current.
    /// Returns the task id (`task_<unix secs>` when none is given).
    pub fn create_task(&self, user_id: &str, goal: &str, task_id: Option<&str>) -> String {
        let now = chrono::Local::now();
        let task_id = task_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("task_{}", now.timestamp()));

        let document = format!(
            "# Current Task\n\n\
             ## Main Goal\n{goal}\n\n\
             ## Done\n- [ ]\n\n\
             ## Todo\n\
             - [ ] Analyze the requirements\n\
             - [ ] Design the approach\n\
             - [ ] Implement\n\
             - [ ] Test and verify\n\n\
             ## Key Decisions\n[to be recorded]\n\n\
             ## Notes\n[to be recorded]\n\n\
             ---\n\
             Task ID: {task_id}\n\
             Created: {}\n",
            now.format("%Y-%m-%d %H:%M")
        );

        self.set_task_id(user_id, &task_id);
        self.tasks.update(user_id, &document, &task_id, false);
        self.cache.invalidate_user(user_id);
        info!(user_id = %user_id, task_id = %task_id, "Created task");
        task_id
    }

    /// Replace or append to a task document (the current one by default).
    pub fn update_task(
        &self,
        user_id: &str,
        content: &str,
        task_id: Option<&str>,
        append: bool,
    ) -> bool {
        let task_id = task_id
            .map(str::to_string)
            .unwrap_or_else(|| self.current_task_id(user_id));
        let written = self.tasks.update(user_id, content, &task_id, append);
        self.cache.invalidate_user(user_id);
        written
    }

    /// Append every `-- task_update` block of an agent response to the
    /// current task. `false` when there is none or the write failed.
    pub fn apply_task_updates(&self, user_id: &str, response: &str) -> bool {
        let updates = extract_blocks(response, TASK_UPDATE_TAG);
        if updates.is_empty() {
            return false;
        }
        self.update_task(user_id, &updates.join("\n\n"), None, true)
    }

    // ── Section renderers ─────────────────────────────────────────────────

    fn render_working_memory(&self, entries: &[String]) -> Option<String> {
        if entries.is_empty() {
            return None;
        }
        let skip = entries.len().saturating_sub(self.config.working_memory_window);
        let lines: Vec<String> = entries[skip..]
            .iter()
            .enumerate()
            .map(|(i, entry)| format!("{}. {entry}", i + 1))
            .collect();
        Some(format!("[Recent Conversation]\n{}", lines.join("\n")))
    }

    fn render_memories(&self, memories: &[MemoryItem]) -> Option<String> {
        let lines: Vec<String> = memories
            .iter()
            .take(self.config.max_memories)
            .map(|item| {
                let summary = strip_markers(&item.content);
                format!(
                    "- {}",
                    take_chars(summary.trim(), self.config.memory_snippet_chars)
                )
            })
            .collect();
        if lines.is_empty() {
            return None;
        }
        Some(format!("[Relevant Memories]\n{}", lines.join("\n")))
    }

    fn render_failures(&self, user_id: &str, user_input: &str) -> Option<String> {
        let records = self
            .ledger
            .relevant(user_id, user_input, self.failures.relevant_limit);
        if records.is_empty() {
            return None;
        }
        let text = format_for_prompt(&records, self.failures.prompt_char_budget);
        (!text.is_empty()).then_some(text)
    }

    fn render_recitation(&self, user_id: &str) -> Option<String> {
        let task_id = self.current_task_id(user_id);
        let document = self.tasks.get(user_id, &task_id)?;
        if document.content.trim().is_empty() {
            return None;
        }
        Some(recitation::format_recitation(
            &document.content,
            RecitationLimits::from(&self.config),
        ))
    }
}

/// The `## Initial Prompt` section of a project document, or the whole
/// trimmed document when it has none. `None` if the result is empty.
pub fn extract_meta_instructions(document: &str) -> Option<String> {
    let mut lines = document.lines();
    let section = if lines.by_ref().any(|l| l.trim() == META_HEADING) {
        lines
            .take_while(|l| !l.starts_with("## "))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        document.to_string()
    };

    let section = section.trim();
    (!section.is_empty()).then(|| section.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::memory::Metadata;
    use tether_memory::{InMemoryIndex, InMemoryStorage};

    fn assembler() -> ContextAssembler {
        let storage = Arc::new(InMemoryStorage::new());
        ContextAssembler::new(
            Arc::new(FailureLedger::new(Arc::new(InMemoryIndex::new()))),
            Arc::new(TaskStore::new(storage)),
            Arc::new(PromptCache::new()),
        )
    }

    fn item(content: &str) -> MemoryItem {
        MemoryItem::new("u1", content, "note", Metadata::new())
    }

    #[test]
    fn minimal_prompt_has_prefix_and_input() {
        let a = assembler();
        let prompt = a.build(&AssemblyRequest::new("u1", "hello"));
        let sections: Vec<&str> = prompt.split(SECTION_SEPARATOR).collect();
        assert_eq!(sections, vec![STATIC_SYSTEM_PREFIX, "[User Input]\nhello"]);
    }

    #[test]
    fn separator_is_fifty_equals() {
        assert_eq!(SECTION_SEPARATOR, format!("\n{}\n", "=".repeat(50)));
    }

    #[test]
    fn sections_follow_fixed_order() {
        let a = assembler();
        a.ledger().record("u1", "run tests", "assertion failed", "", "check fixtures");
        a.create_task("u1", "Make the suite green", Some("t1"));

        let memories = vec![item("a fact")];
        let turns = vec!["hi".to_string(), "hello".to_string()];
        let prompt = a.build(
            &AssemblyRequest::new("u1", "run tests")
                .with_memories(&memories)
                .with_working_memory(&turns)
                .with_meta("Use cargo nextest."),
        );

        let order = [
            "[System Instructions",
            "[Project Instructions]",
            "[Recent Conversation]",
            "[Relevant Memories]",
            tether_memory::failure::PROMPT_HEADER,
            "[User Input]",
            recitation::RECITATION_HEADER,
        ];
        let sections: Vec<&str> = prompt.split(SECTION_SEPARATOR).collect();
        assert_eq!(sections.len(), order.len());
        for (section, header) in sections.iter().zip(order) {
            assert!(section.starts_with(header), "{section:?} should start with {header:?}");
        }
        assert!(sections[6].contains("Make the suite green"));
    }

    #[test]
    fn meta_needs_flag_and_content() {
        let a = assembler();
        let mut request = AssemblyRequest::new("u1", "x");
        request.meta_content = Some("instructions");
        assert!(!a.build(&request).contains("[Project Instructions]"));

        request.include_meta = true;
        request.meta_content = None;
        assert!(!a.build(&request).contains("[Project Instructions]"));
    }

    #[test]
    fn meta_prefers_initial_prompt_section() {
        let doc = "# Project\nintro\n\n## Initial Prompt\nAlways use tabs.\nNo unsafe.\n\n## Other\nignored";
        assert_eq!(
            extract_meta_instructions(doc).as_deref(),
            Some("Always use tabs.\nNo unsafe.")
        );
        assert_eq!(
            extract_meta_instructions("  whole doc  \n").as_deref(),
            Some("whole doc")
        );
        assert_eq!(extract_meta_instructions("   "), None);
    }

    #[test]
    fn working_memory_keeps_last_five_numbered_from_one() {
        let a = assembler();
        let turns: Vec<String> = (1..=8).map(|n| format!("turn {n}")).collect();
        let prompt = a.build(&AssemblyRequest::new("u1", "x").with_working_memory(&turns));
        assert!(prompt.contains("[Recent Conversation]\n1. turn 4\n2. turn 5\n3. turn 6\n4. turn 7\n5. turn 8"));
        assert!(!prompt.contains("turn 3"));
    }

    #[test]
    fn memories_are_capped_truncated_and_unmarked() {
        let a = assembler();
        let mut memories: Vec<MemoryItem> = (0..7).map(|n| item(&format!("memory {n}"))).collect();
        memories[0] = item("[code] Parser module - tokenizer (see: refs/u1/code/a.md)");
        memories[1] = item(&"m".repeat(400));

        let prompt = a.build(&AssemblyRequest::new("u1", "x").with_memories(&memories));
        assert!(prompt.contains("- [code] Parser module - tokenizer\n"));
        assert!(!prompt.contains("(see:"));
        assert!(prompt.contains(&format!("- {}\n", "m".repeat(150))));
        assert!(prompt.contains("memory 4"));
        assert!(!prompt.contains("memory 5"));
    }

    #[test]
    fn missing_task_omits_recitation() {
        let a = assembler();
        let prompt = a.build(&AssemblyRequest::new("u1", "x"));
        assert!(!prompt.contains(recitation::RECITATION_HEADER));
    }

    #[test]
    fn task_pointer_defaults_and_switches() {
        let a = assembler();
        assert_eq!(a.current_task_id("u1"), DEFAULT_TASK_ID);
        let id = a.create_task("u1", "goal", None);
        assert!(id.starts_with("task_"));
        assert_eq!(a.current_task_id("u1"), id);
        assert_eq!(a.current_task_id("u2"), DEFAULT_TASK_ID);
    }

    #[test]
    fn cached_build_reports_hits_and_task_writes_invalidate() {
        let a = assembler();
        let request = AssemblyRequest::new("u1", "first");
        let ttl = Duration::from_secs(60);

        let (fresh, info) = a.build_with_cache(&request, ttl);
        assert!(!info.cache_hit);
        assert_eq!(info.source, CacheSource::NewGeneration);

        let (cached, info) = a.build_with_cache(&AssemblyRequest::new("u1", "second"), ttl);
        assert!(info.cache_hit);
        assert_eq!(info.source, CacheSource::PromptCache);
        assert_eq!(cached, fresh);

        a.update_task("u1", "## Main Goal\nnew goal", None, false);
        let (_, info) = a.build_with_cache(&request, ttl);
        assert!(!info.cache_hit);

        let stats = a.cache_stats();
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 2);
    }

    #[test]
    fn cache_info_serializes_snake_case() {
        let a = assembler();
        let (_, info) = a.build_with_cache(&AssemblyRequest::new("u1", "x"), Duration::from_secs(60));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["source"], "new_generation");
        assert_eq!(json["cache_hit"], false);
        assert_eq!(json["cache_key"], PromptCache::key(STATIC_SYSTEM_PREFIX, "u1"));
    }

    #[test]
    fn cache_keys_are_per_user() {
        let a = assembler();
        let ttl = Duration::from_secs(60);
        let (_, one) = a.build_with_cache(&AssemblyRequest::new("u1", "x"), ttl);
        let (_, two) = a.build_with_cache(&AssemblyRequest::new("u2", "x"), ttl);
        assert_ne!(one.cache_key, two.cache_key);
        assert!(!two.cache_hit);
    }

    #[test]
    fn task_updates_from_response_are_appended() {
        let a = assembler();
        a.create_task("u1", "goal", Some("t1"));
        let response = "Done.\n-- task_update\n- [x] parser\n--\n-- task_update\n- [ ] codec\n--";
        assert!(a.apply_task_updates("u1", response));
        assert!(!a.apply_task_updates("u1", "nothing to see"));

        let doc = a.tasks().get("u1", "t1").unwrap().content;
        assert!(doc.contains("*Updated: "));
        assert!(doc.ends_with("- [x] parser\n\n- [ ] codec"));
    }
}
