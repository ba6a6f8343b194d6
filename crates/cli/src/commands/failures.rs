//! `tether failures` — Failure ledger.

use super::Runtime;
use tether_core::{Error, MemoryError, Result};

pub fn list(user: &str, resolved_only: bool, limit: usize) -> Result<()> {
    let rt = Runtime::load()?;
    let records = rt.ledger.get_user_failures(user, resolved_only, limit);

    if records.is_empty() {
        println!("   No failures recorded for {user}.");
        return Ok(());
    }
    for record in records {
        let status = if record.resolved { "✅" } else { "❌" };
        println!(
            "  {status} {}  [{}] {} (x{})",
            record.failure_id, record.error_type, record.action, record.recurrence_count
        );
        println!("      error:  {}", record.error_message);
        if !record.lesson.is_empty() {
            println!("      lesson: {}", record.lesson);
        }
    }

    Ok(())
}

pub fn record(
    user: &str,
    action: &str,
    error: &str,
    context: &str,
    lesson: &str,
) -> Result<()> {
    let rt = Runtime::load()?;
    let record = rt.ledger.record(user, action, error, context, lesson);

    println!(
        "📝 {} [{}] seen {} time(s)",
        record.failure_id, record.error_type, record.recurrence_count
    );

    Ok(())
}

pub fn resolve(user: &str, failure_id: &str) -> Result<()> {
    let rt = Runtime::load()?;
    if rt.ledger.mark_resolved(user, failure_id) {
        println!("✅ Marked {failure_id} resolved");
        Ok(())
    } else {
        Err(Error::Memory(MemoryError::not_found("failure", failure_id)))
    }
}

pub fn stats(user: &str) -> Result<()> {
    let rt = Runtime::load()?;
    let stats = rt.ledger.stats(user);

    println!("📊 Failure Statistics for {user}");
    println!("===============================");
    println!("  Unique:       {}", stats.total_unique);
    println!("  Resolved:     {}", stats.resolved);
    println!("  Unresolved:   {}", stats.unresolved);
    println!("  Occurrences:  {}", stats.total_occurrences);
    println!("  Avg repeats:  {:.2}", stats.avg_recurrence);
    for (kind, count) in &stats.by_type {
        println!("    {kind:<12} {count}");
    }

    Ok(())
}
