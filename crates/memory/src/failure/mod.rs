//! Failure ledger — keeps past failures in context so the agent does not
//! repeat them.
//!
//! Failures are persisted through a [`MemoryIndex`] as items of type
//! [`FAILURE_ITEM_TYPE`]. A failure with the same normalized action and
//! error prefix as an existing record bumps that record's recurrence count
//! instead of creating a duplicate. Records are never deleted, only marked
//! resolved.
//!
//! Ledger bookkeeping never fails a turn: storage and parse problems are
//! logged and degraded to best-effort results.

pub mod classify;
pub mod codec;

pub use classify::{ErrorKind, classify};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tether_config::FailureConfig;
use tether_core::error::MemoryError;
use tether_core::memory::{MemoryIndex, MemoryItem, Metadata};
use tracing::{debug, info, warn};

use crate::blocks;
use crate::ids::{short_id, take_chars};
use codec::BlockFields;

/// Memory index item type for failure records.
pub const FAILURE_ITEM_TYPE: &str = "failure_lesson";

/// Header line of the prompt section produced by [`format_for_prompt`].
pub const PROMPT_HEADER: &str = "[Past Failures - avoid repeating these mistakes]";

/// Chars of the error message compared when deduplicating.
const SIGNATURE_ERROR_CHARS: usize = 100;

/// Chars of the error message shown in prompts.
const PROMPT_ERROR_CHARS: usize = 100;

/// A recorded failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureRecord {
    pub failure_id: String,
    pub user_id: String,
    pub action: String,
    pub error_message: String,
    pub error_type: ErrorKind,
    pub context: String,
    pub lesson: String,
    pub timestamp: DateTime<Utc>,
    pub recurrence_count: u32,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
}

impl FailureRecord {
    fn fields(&self) -> BlockFields {
        BlockFields {
            action: self.action.clone(),
            error_message: self.error_message.clone(),
            error_type: self.error_type,
            context: self.context.clone(),
            lesson: self.lesson.clone(),
            recurrence_count: self.recurrence_count,
        }
    }

    /// Metadata stored alongside the block in the memory index.
    fn index_metadata(&self) -> Metadata {
        let mut meta = Metadata::new();
        meta.insert("failure_id".into(), self.failure_id.clone().into());
        meta.insert("error_type".into(), self.error_type.as_str().into());
        meta.insert("action".into(), self.action.clone().into());
        meta.insert("recurrence_count".into(), self.recurrence_count.into());
        meta.insert("resolved".into(), self.resolved.into());
        if !self.metadata.is_empty() {
            meta.insert(
                "details".into(),
                serde_json::Value::Object(self.metadata.clone()),
            );
        }
        meta
    }

    fn from_item(item: &MemoryItem) -> Result<Self, MemoryError> {
        let fields = codec::decode(&item.content)?;
        let failure_id = item
            .meta_str("failure_id")
            .ok_or_else(|| MemoryError::Parse(format!("item {} has no failure_id", item.id)))?
            .to_string();

        Ok(Self {
            failure_id,
            user_id: item.user_id.clone(),
            action: fields.action,
            error_message: fields.error_message,
            error_type: fields.error_type,
            context: fields.context,
            lesson: fields.lesson,
            timestamp: item.timestamp,
            recurrence_count: fields.recurrence_count,
            resolved: item
                .metadata
                .get("resolved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            metadata: item
                .metadata
                .get("details")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn signature(&self) -> (String, String) {
        signature(&self.action, &self.error_message)
    }
}

/// Per-user ledger summary.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FailureStats {
    pub total_unique: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub by_type: BTreeMap<String, usize>,
    pub total_occurrences: u64,
    pub avg_recurrence: f64,
}

/// The failure ledger.
pub struct FailureLedger {
    index: Arc<dyn MemoryIndex>,
    scan_limit: usize,
    write_lock: Mutex<()>,
}

impl FailureLedger {
    pub fn new(index: Arc<dyn MemoryIndex>) -> Self {
        Self::with_config(index, &FailureConfig::default())
    }

    pub fn with_config(index: Arc<dyn MemoryIndex>, config: &FailureConfig) -> Self {
        Self {
            index,
            scan_limit: config.scan_limit,
            write_lock: Mutex::new(()),
        }
    }

    /// Record a failure, or bump the matching existing record.
    pub fn record(
        &self,
        user_id: &str,
        action: &str,
        error_message: &str,
        context: &str,
        lesson: &str,
    ) -> FailureRecord {
        self.record_with_metadata(user_id, action, error_message, context, lesson, Metadata::new())
    }

    /// [`record`](Self::record) with extra metadata attached to the record.
    pub fn record_with_metadata(
        &self,
        user_id: &str,
        action: &str,
        error_message: &str,
        context: &str,
        lesson: &str,
        metadata: Metadata,
    ) -> FailureRecord {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let wanted = signature(action, error_message);

        // Dedup covers the whole ledger; `scan_limit` bounds ranking only.
        let existing = self
            .load(user_id, usize::MAX)
            .into_iter()
            .find(|(_, record)| record.signature() == wanted);

        if let Some((item_id, mut record)) = existing {
            record.recurrence_count += 1;
            record.timestamp = Utc::now();
            if !context.trim().is_empty() {
                record.context = context.to_string();
            }
            if !lesson.trim().is_empty() {
                record.lesson = lesson.to_string();
            }
            record.metadata.extend(metadata);

            if let Err(e) = self.rewrite(user_id, &item_id, &record) {
                warn!(user_id = %user_id, failure_id = %record.failure_id, error = %e, "Failed to persist recurrence");
            }
            debug!(
                user_id = %user_id,
                failure_id = %record.failure_id,
                recurrence = record.recurrence_count,
                "Failure recurred"
            );
            return record;
        }

        let record = FailureRecord {
            failure_id: short_id(&[user_id, action, error_message]),
            user_id: user_id.to_string(),
            action: action.to_string(),
            error_message: error_message.to_string(),
            error_type: classify(error_message),
            context: context.to_string(),
            lesson: lesson.to_string(),
            timestamp: Utc::now(),
            recurrence_count: 1,
            resolved: false,
            metadata,
        };

        match self.index.add(
            user_id,
            &codec::encode(&record.fields()),
            FAILURE_ITEM_TYPE,
            record.index_metadata(),
        ) {
            Ok(_) => info!(
                user_id = %user_id,
                failure_id = %record.failure_id,
                error_type = %record.error_type,
                "Recorded failure"
            ),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to persist failure record")
            }
        }
        record
    }

    /// The `limit` records most relevant to `current_action`, best first.
    pub fn relevant(&self, user_id: &str, current_action: &str, limit: usize) -> Vec<FailureRecord> {
        let mut scored: Vec<(u64, FailureRecord)> = self
            .load(user_id, self.scan_limit)
            .into_iter()
            .map(|(_, record)| (relevance(current_action, &record), record))
            .collect();

        // Stable: equal scores keep ledger order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    /// Set the resolved flag in place. `false` if the id is unknown or the
    /// write failed.
    pub fn mark_resolved(&self, user_id: &str, failure_id: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let Some((item_id, mut record)) = self
            .load(user_id, usize::MAX)
            .into_iter()
            .find(|(_, r)| r.failure_id == failure_id)
        else {
            debug!(user_id = %user_id, failure_id = %failure_id, "No such failure");
            return false;
        };

        record.resolved = true;
        match self.rewrite(user_id, &item_id, &record) {
            Ok(replaced) => replaced,
            Err(e) => {
                warn!(user_id = %user_id, failure_id = %failure_id, error = %e, "Failed to mark failure resolved");
                false
            }
        }
    }

    /// The user's records in ledger order, optionally only resolved ones,
    /// keeping the most recent `limit`.
    pub fn get_user_failures(
        &self,
        user_id: &str,
        resolved_only: bool,
        limit: usize,
    ) -> Vec<FailureRecord> {
        let records: Vec<FailureRecord> = self
            .load(user_id, usize::MAX)
            .into_iter()
            .map(|(_, r)| r)
            .filter(|r| !resolved_only || r.resolved)
            .collect();
        let skip = records.len().saturating_sub(limit);
        records.into_iter().skip(skip).collect()
    }

    pub fn stats(&self, user_id: &str) -> FailureStats {
        let records = self.get_user_failures(user_id, false, usize::MAX);
        let mut stats = FailureStats {
            total_unique: records.len(),
            ..Default::default()
        };

        for record in &records {
            if record.resolved {
                stats.resolved += 1;
            }
            *stats
                .by_type
                .entry(record.error_type.as_str().to_string())
                .or_default() += 1;
            stats.total_occurrences += u64::from(record.recurrence_count);
        }
        stats.unresolved = stats.total_unique - stats.resolved;
        if stats.total_unique > 0 {
            stats.avg_recurrence = stats.total_occurrences as f64 / stats.total_unique as f64;
        }
        stats
    }

    /// See [`extract_lesson`].
    pub fn extract_lesson(&self, response: &str) -> Option<String> {
        extract_lesson(response)
    }

    fn load(&self, user_id: &str, limit: usize) -> Vec<(String, FailureRecord)> {
        let items = match self.index.get_by_type(user_id, FAILURE_ITEM_TYPE, limit) {
            Ok(items) => items,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to read failure ledger");
                return Vec::new();
            }
        };

        items
            .iter()
            .filter_map(|item| match FailureRecord::from_item(item) {
                Ok(record) => Some((item.id.clone(), record)),
                Err(e) => {
                    warn!(user_id = %user_id, item_id = %item.id, error = %e, "Skipping unreadable failure record");
                    None
                }
            })
            .collect()
    }

    fn rewrite(
        &self,
        user_id: &str,
        item_id: &str,
        record: &FailureRecord,
    ) -> Result<bool, MemoryError> {
        self.index.replace(
            user_id,
            item_id,
            &codec::encode(&record.fields()),
            record.index_metadata(),
        )
    }
}

/// Render records as a prompt section of at most `max_chars` chars.
///
/// Entries are added whole, in order, until the next one would not fit.
/// Returns an empty string when no entry fits.
pub fn format_for_prompt(records: &[FailureRecord], max_chars: usize) -> String {
    let mut out = format!("{PROMPT_HEADER}\n\n");
    let mut used = out.chars().count();
    let mut included = 0usize;

    for (i, record) in records.iter().enumerate() {
        let mut entry = format!(
            "{}. Operation: {}\n   Error: {}\n",
            i + 1,
            one_line(&record.action),
            one_line(take_chars(&record.error_message, PROMPT_ERROR_CHARS)),
        );
        if !record.lesson.trim().is_empty() {
            entry.push_str(&format!("   Lesson: {}\n", one_line(&record.lesson)));
        }
        if record.recurrence_count > 1 {
            entry.push_str(&format!("   (repeated {} times)\n", record.recurrence_count));
        }
        entry.push('\n');

        let len = entry.chars().count();
        if used + len > max_chars {
            break;
        }
        out.push_str(&entry);
        used += len;
        included += 1;
    }

    if included == 0 {
        return String::new();
    }
    out.truncate(out.trim_end().len());
    out
}

/// The body of the first well-formed `-- lesson` … `--` block.
pub fn extract_lesson(response: &str) -> Option<String> {
    blocks::extract_block(response, "lesson")
}

fn signature(action: &str, error_message: &str) -> (String, String) {
    let error = error_message.trim().to_lowercase();
    (
        action.trim().to_lowercase(),
        take_chars(&error, SIGNATURE_ERROR_CHARS).to_string(),
    )
}

fn relevance(current_action: &str, record: &FailureRecord) -> u64 {
    let current = current_action.to_lowercase();
    let past = record.action.to_lowercase();

    let base = if current == past {
        100
    } else if current.contains(&past) || past.contains(&current) {
        50
    } else {
        let current_words: HashSet<&str> = current.split_whitespace().collect();
        let past_words: HashSet<&str> = past.split_whitespace().collect();
        10 * current_words.intersection(&past_words).count() as u64
    };
    base + 5 * u64::from(record.recurrence_count)
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
