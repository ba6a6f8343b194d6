//! `tether task` — Task documents.

use super::Runtime;
use tether_core::{Error, Result};
use tether_memory::DEFAULT_TASK_ID;

pub fn create(user: &str, goal: &str, id: Option<&str>) -> Result<()> {
    let rt = Runtime::load()?;
    let task_id = rt.assembler.create_task(user, goal, id);

    if rt.tasks.get(user, &task_id).is_none() {
        return Err(Error::Internal(format!("Failed to write task document {task_id}")));
    }
    println!("✅ Created task {task_id}");
    println!("   {}", tether_memory::TaskStore::location(user, &task_id));

    Ok(())
}

pub fn show(user: &str, id: Option<&str>) -> Result<()> {
    let rt = Runtime::load()?;
    let task_id = match id {
        Some(id) => id.to_string(),
        None => latest_task(&rt, user),
    };

    match rt.tasks.get(user, &task_id) {
        Some(doc) => print!("{}", doc.content),
        None => println!("   No task document {task_id} for {user}."),
    }

    Ok(())
}

pub fn list(user: &str) -> Result<()> {
    let rt = Runtime::load()?;
    let tasks = rt.tasks.list(user);

    if tasks.is_empty() {
        println!("   No tasks for {user}.");
        return Ok(());
    }
    for task in tasks {
        println!(
            "  {:<24} {}  {:>6} B",
            task.task_id,
            task.modified_at.format("%Y-%m-%d %H:%M"),
            task.size_bytes
        );
    }

    Ok(())
}

/// The most recently modified task, falling back to the default id.
pub fn latest_task(rt: &Runtime, user: &str) -> String {
    rt.tasks
        .list(user)
        .into_iter()
        .next()
        .map(|t| t.task_id)
        .unwrap_or_else(|| DEFAULT_TASK_ID.to_string())
}
