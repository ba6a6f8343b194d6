//! `tether prompt` — Assemble a prompt and print it with its statistics.

use std::path::Path;
use std::time::Duration;

use super::Runtime;
use tether_core::Result;
use tether_context::{AssemblyRequest, STATIC_SYSTEM_PREFIX, analyze};
use tether_core::memory::{MemoryItem, Metadata};

pub fn run(
    user: &str,
    input: &str,
    memories: &[String],
    turns: &[String],
    meta: Option<&Path>,
) -> Result<()> {
    let rt = Runtime::load()?;
    rt.assembler
        .set_task_id(user, &super::task::latest_task(&rt, user));

    let memories: Vec<MemoryItem> = memories
        .iter()
        .map(|m| MemoryItem::new(user, m, "note", Metadata::new()))
        .collect();
    let meta = meta.map(std::fs::read_to_string).transpose()?;

    let mut request = AssemblyRequest::new(user, input)
        .with_memories(&memories)
        .with_working_memory(turns);
    if let Some(meta) = meta.as_deref() {
        request = request.with_meta(meta);
    }

    let ttl = Duration::from_secs(rt.config.cache.ttl_secs);
    let (prompt, cache) = rt.assembler.build_with_cache(&request, ttl);
    let stats = analyze(&prompt, STATIC_SYSTEM_PREFIX);

    println!("{prompt}");
    println!();
    println!("📏 Prompt Statistics");
    println!("====================");
    println!("  Chars:      {}", stats.total_chars);
    println!("  Lines:      {}", stats.total_lines);
    println!("  Tokens:     ~{}", stats.estimated_tokens);
    println!("  Sections:   {}", stats.section_count);
    for title in &stats.section_titles {
        println!("    - {title}");
    }
    println!("  Recitation: {}", stats.has_task_recitation);
    println!("  Prefix:     {:.1}%", stats.static_prefix_ratio * 100.0);
    println!("  Cache:      {}", serde_json::to_string(&cache)?);
    for hint in &stats.hints {
        println!("  💡 {hint}");
    }

    Ok(())
}
