//! `tether refs` / `tether expand` — Externalized reference maintenance.

use super::Runtime;
use tether_core::Result;

pub fn stats(user: Option<&str>) -> Result<()> {
    let rt = Runtime::load()?;
    let stats = rt.references.stats(user)?;

    println!("📦 Reference Statistics");
    println!("=======================");
    if let Some(user) = user {
        println!("  User:   {user}");
    }
    println!("  Files:  {}", stats.total_files);
    println!("  Size:   {:.1} KB", stats.total_bytes as f64 / 1024.0);
    if !stats.by_type.is_empty() {
        println!("  By type:");
        for (content_type, count) in &stats.by_type {
            println!("    {content_type:<16} {count}");
        }
    }
    if user.is_none() && !stats.by_user.is_empty() {
        println!("  By user:");
        for (user_id, count) in &stats.by_user {
            println!("    {user_id:<16} {count}");
        }
    }

    Ok(())
}

pub fn list(user: &str) -> Result<()> {
    let rt = Runtime::load()?;
    let entries = rt.references.list(user)?;

    if entries.is_empty() {
        println!("   No references for {user}.");
        return Ok(());
    }
    for (ref_id, entry) in entries {
        println!(
            "  {ref_id}  {}  [{}]  {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.content_type,
            entry.storage_location
        );
    }

    Ok(())
}

pub fn show(ref_id: &str) -> Result<()> {
    let rt = Runtime::load()?;
    print!("{}", rt.references.retrieve(ref_id)?);
    Ok(())
}

pub fn purge(days: Option<u32>) -> Result<()> {
    let rt = Runtime::load()?;
    let days = days.unwrap_or(rt.config.references.retention_days);
    let report = rt
        .references
        .purge_older_than(chrono::Duration::days(i64::from(days)))?;

    println!(
        "🗑️  Purged {} reference(s) older than {days} day(s), freed {:.1} KB",
        report.deleted_files,
        report.deleted_bytes as f64 / 1024.0
    );

    Ok(())
}

pub fn check(repair: bool) -> Result<()> {
    let rt = Runtime::load()?;
    let report = if repair {
        rt.references.repair()?
    } else {
        rt.references.check_consistency()?
    };

    if report.is_clean() {
        println!("  ✅ Index and blobs are consistent");
        return Ok(());
    }

    for ref_id in &report.dangling_refs {
        println!("  ❌ Dangling index entry: {ref_id}");
    }
    for location in &report.orphan_blobs {
        println!("  ⚠️  Orphan blob: {location}");
    }
    if repair {
        println!(
            "\n  🔧 Repaired: {} dangling entries, {} orphan blobs.",
            report.dangling_refs.len(),
            report.orphan_blobs.len()
        );
    } else {
        println!("\n  Run `tether refs check --repair` to fix.");
    }

    Ok(())
}

pub fn expand(text: &str) -> Result<()> {
    let rt = Runtime::load()?;
    print!("{}", rt.compressor.expand_if_reference(text));
    Ok(())
}
