//! Per-(user, task) goal documents used for recitation.
//!
//! Each task is one markdown document at
//! `tasks/<user>/<task>_todo.md` in the shared [`Storage`].

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tether_core::storage::Storage;
use tracing::{debug, warn};

use crate::ids::{sanitize_segment, user_segment};

/// Task used when a session never picked one.
pub const DEFAULT_TASK_ID: &str = "default";

const TASKS_PREFIX: &str = "tasks/";
const TODO_SUFFIX: &str = "_todo.md";

/// A task document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskDocument {
    pub user_id: String,
    pub task_id: String,
    pub content: String,
    pub modified_at: DateTime<Utc>,
}

/// Listing entry for one task document.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskSummary {
    pub task_id: String,
    pub location: String,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

pub struct TaskStore {
    storage: Arc<dyn Storage>,
    write_lock: Mutex<()>,
}

impl TaskStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Storage location of a task document.
    pub fn location(user_id: &str, task_id: &str) -> String {
        format!(
            "{TASKS_PREFIX}{}/{}{TODO_SUFFIX}",
            user_segment(user_id),
            sanitize_segment(task_id)
        )
    }

    /// The task document, or `None` when absent or unreadable.
    pub fn get(&self, user_id: &str, task_id: &str) -> Option<TaskDocument> {
        let location = Self::location(user_id, task_id);
        let content = match self.storage.get_blob(&location) {
            Ok(content) => content?,
            Err(e) => {
                warn!(user_id = %user_id, task_id = %task_id, error = %e, "Failed to read task document");
                return None;
            }
        };
        let modified_at = self
            .storage
            .stat_blob(&location)
            .ok()
            .flatten()
            .map(|m| m.modified_at)
            .unwrap_or_else(Utc::now);

        Some(TaskDocument {
            user_id: user_id.to_string(),
            task_id: task_id.to_string(),
            content,
            modified_at,
        })
    }

    /// Replace the document, or append to it under a timestamped separator.
    /// Appending to a missing document creates it. Returns `false` if the
    /// write failed.
    pub fn update(&self, user_id: &str, content: &str, task_id: &str, append: bool) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let location = Self::location(user_id, task_id);

        let document = if append {
            match self.storage.get_blob(&location) {
                Ok(Some(existing)) => format!(
                    "{existing}\n\n---\n*Updated: {}*\n\n{content}",
                    Local::now().format("%Y-%m-%d %H:%M")
                ),
                Ok(None) => content.to_string(),
                Err(e) => {
                    warn!(user_id = %user_id, task_id = %task_id, error = %e, "Failed to read task document for append");
                    return false;
                }
            }
        } else {
            content.to_string()
        };

        match self.storage.put_blob(&location, &document) {
            Ok(()) => {
                debug!(user_id = %user_id, task_id = %task_id, append, "Task document written");
                true
            }
            Err(e) => {
                warn!(user_id = %user_id, task_id = %task_id, error = %e, "Failed to write task document");
                false
            }
        }
    }

    /// The user's task documents, most recently modified first.
    pub fn list(&self, user_id: &str) -> Vec<TaskSummary> {
        let prefix = format!("{TASKS_PREFIX}{}/", user_segment(user_id));
        let blobs = match self.storage.list_blobs(&prefix) {
            Ok(blobs) => blobs,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to list task documents");
                return Vec::new();
            }
        };

        let mut tasks: Vec<TaskSummary> = blobs
            .into_iter()
            .filter_map(|blob| {
                let name = blob.location.strip_prefix(&prefix)?;
                let task_id = name.strip_suffix(TODO_SUFFIX)?;
                (!task_id.contains('/')).then(|| TaskSummary {
                    task_id: task_id.to_string(),
                    location: blob.location.clone(),
                    modified_at: blob.modified_at,
                    size_bytes: blob.size_bytes,
                })
            })
            .collect();
        tasks.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        tasks
    }
}
