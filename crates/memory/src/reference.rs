//! Reference store — offloads large artifacts to blob storage and keeps a
//! compact index entry plus a short textual marker in their place.
//!
//! Every read-index → mutate → write-index sequence runs under one
//! process-wide mutex. Blobs are written before the index; a failed index
//! write removes the blob again so no orphan is left behind.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tether_config::ReferenceConfig;
use tether_core::error::MemoryError;
use tether_core::memory::Metadata;
use tether_core::storage::Storage;
use tracing::{debug, info, warn};

use crate::artifact::{self, ArtifactHeader};
use crate::ids::{sanitize_segment, short_id, take_chars, user_segment};

const INDEX_VERSION: &str = "1.0";

/// Blob prefix under which every artifact lives.
pub const REFS_PREFIX: &str = "refs/";

/// Shorter first lines are extended with the lines that follow.
const SHORT_LINE_CHARS: usize = 50;

/// Persisted per-reference index entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub user_id: String,
    pub storage_location: String,
    pub created_at: DateTime<Utc>,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexDocument {
    version: String,
    #[serde(default)]
    refs: BTreeMap<String, IndexEntry>,
}

impl Default for IndexDocument {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            refs: BTreeMap::new(),
        }
    }
}

/// Result of a successful [`ReferenceStore::store`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReferenceRecord {
    pub ref_id: String,
    pub content_type: String,
    pub storage_location: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub metadata: Metadata,
}

impl ReferenceRecord {
    /// The text that stands in for the artifact in prompts and memory:
    /// `[<type>] <summary> (see: <location>)`.
    pub fn to_marker(&self) -> String {
        format!(
            "[{}] {} (see: {})",
            self.content_type, self.summary, self.storage_location
        )
    }
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PurgeReport {
    pub deleted_files: usize,
    pub deleted_bytes: u64,
}

/// Aggregate usage of stored artifacts.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StorageStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_type: BTreeMap<String, usize>,
    pub by_user: BTreeMap<String, usize>,
}

/// Index entries without a blob, and blobs without an index entry.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ConsistencyReport {
    pub dangling_refs: Vec<String>,
    pub orphan_blobs: Vec<String>,
}

impl ConsistencyReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_refs.is_empty() && self.orphan_blobs.is_empty()
    }
}

/// Tiered store for large artifacts.
pub struct ReferenceStore {
    storage: Arc<dyn Storage>,
    summary_max_chars: usize,
    index_lock: Mutex<()>,
}

impl ReferenceStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, &ReferenceConfig::default())
    }

    pub fn with_config(storage: Arc<dyn Storage>, config: &ReferenceConfig) -> Self {
        Self {
            storage,
            summary_max_chars: config.summary_max_chars,
            index_lock: Mutex::new(()),
        }
    }

    /// The underlying blob storage.
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Persist `content` and return its record. The payload is stored
    /// byte-exact; only the emptiness check trims.
    pub fn store(
        &self,
        user_id: &str,
        content: &str,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<ReferenceRecord, MemoryError> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation(
                "cannot store empty content".into(),
            ));
        }

        let ref_id = short_id(&[user_id, content_type, take_chars(content, 100)]);
        let created_at = Utc::now();
        let storage_location = format!(
            "{REFS_PREFIX}{}/{}/{}_{}.md",
            user_segment(user_id),
            sanitize_segment(content_type),
            created_at.format("%Y%m%d_%H%M%S"),
            take_chars(&ref_id, 8),
        );

        let header = ArtifactHeader {
            ref_id: ref_id.clone(),
            user_id: user_id.to_string(),
            content_type: content_type.to_string(),
            created_at,
            metadata: metadata.clone(),
        };
        let blob = artifact::encode(&header, content);

        let _guard = self.lock();
        self.storage.put_blob(&storage_location, &blob)?;

        let indexed = self.load_index().and_then(|mut doc| {
            doc.refs.insert(
                ref_id.clone(),
                IndexEntry {
                    user_id: user_id.to_string(),
                    storage_location: storage_location.clone(),
                    created_at,
                    content_type: content_type.to_string(),
                },
            );
            self.save_index(&doc)
        });

        if let Err(e) = indexed {
            if let Err(cleanup) = self.storage.delete_blob(&storage_location) {
                warn!(location = %storage_location, error = %cleanup, "Failed to remove blob after index failure");
            }
            return Err(MemoryError::Storage(format!(
                "reference {ref_id} not indexed: {e}"
            )));
        }

        info!(
            user_id = %user_id,
            ref_id = %ref_id,
            content_type = %content_type,
            bytes = content.len(),
            "Stored reference"
        );

        Ok(ReferenceRecord {
            summary: summarize(content, self.summary_max_chars),
            ref_id,
            content_type: content_type.to_string(),
            storage_location,
            created_at,
            size_bytes: content.len() as u64,
            metadata,
        })
    }

    /// Fetch the original payload of a stored reference.
    pub fn retrieve(&self, ref_id: &str) -> Result<String, MemoryError> {
        let doc = self.load_index()?;
        let entry = doc
            .refs
            .get(ref_id)
            .ok_or_else(|| MemoryError::not_found("reference", ref_id))?;

        match self.storage.get_blob(&entry.storage_location)? {
            Some(raw) => Ok(artifact::decode(&raw)?.payload.to_string()),
            None => {
                warn!(
                    ref_id = %ref_id,
                    location = %entry.storage_location,
                    "Index entry points at a missing blob"
                );
                Err(MemoryError::not_found("reference", ref_id))
            }
        }
    }

    /// Fetch a payload by its storage location (as found in a marker).
    pub fn retrieve_by_location(&self, location: &str) -> Result<String, MemoryError> {
        let location = self.storage.resolve_location(location)?;
        let raw = self
            .storage
            .get_blob(&location)?
            .ok_or_else(|| MemoryError::not_found("blob", location.clone()))?;
        Ok(artifact::decode(&raw)?.payload.to_string())
    }

    /// Delete references created before `now - retention`.
    pub fn purge_older_than(&self, retention: Duration) -> Result<PurgeReport, MemoryError> {
        let _guard = self.lock();
        let mut doc = self.load_index()?;
        let cutoff = Utc::now() - retention;

        let expired: Vec<String> = doc
            .refs
            .iter()
            .filter(|(_, e)| e.created_at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        let mut report = PurgeReport::default();
        let mut dropped = 0usize;
        for ref_id in expired {
            let Some(entry) = doc.refs.get(&ref_id) else {
                continue;
            };
            match self.storage.delete_blob(&entry.storage_location) {
                Ok(Some(bytes)) => {
                    report.deleted_files += 1;
                    report.deleted_bytes += bytes;
                }
                Ok(None) => {
                    debug!(ref_id = %ref_id, "Expired reference had no blob");
                }
                Err(e) => {
                    warn!(ref_id = %ref_id, error = %e, "Failed to delete expired blob; keeping entry");
                    continue;
                }
            }
            doc.refs.remove(&ref_id);
            dropped += 1;
        }

        if dropped > 0 {
            self.save_index(&doc)?;
        }
        info!(
            files = report.deleted_files,
            bytes = report.deleted_bytes,
            "Purged expired references"
        );
        Ok(report)
    }

    /// Usage totals, optionally for one user. Entries whose blob is gone are
    /// not counted.
    pub fn stats(&self, user_id: Option<&str>) -> Result<StorageStats, MemoryError> {
        let doc = self.load_index()?;
        let mut stats = StorageStats::default();

        for entry in doc.refs.values() {
            if user_id.is_some_and(|u| u != entry.user_id) {
                continue;
            }
            let Some(meta) = self.storage.stat_blob(&entry.storage_location)? else {
                continue;
            };
            stats.total_files += 1;
            stats.total_bytes += meta.size_bytes;
            *stats.by_type.entry(entry.content_type.clone()).or_default() += 1;
            *stats.by_user.entry(entry.user_id.clone()).or_default() += 1;
        }
        Ok(stats)
    }

    /// Index entries of one user, newest first.
    pub fn list(&self, user_id: &str) -> Result<Vec<(String, IndexEntry)>, MemoryError> {
        let doc = self.load_index()?;
        let mut entries: Vec<(String, IndexEntry)> = doc
            .refs
            .into_iter()
            .filter(|(_, e)| e.user_id == user_id)
            .collect();
        entries.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        Ok(entries)
    }

    /// Compare the index against the blobs actually present.
    pub fn check_consistency(&self) -> Result<ConsistencyReport, MemoryError> {
        let doc = self.load_index()?;
        self.inspect(&doc)
    }

    /// Drop dangling index entries and delete orphan blobs.
    pub fn repair(&self) -> Result<ConsistencyReport, MemoryError> {
        let _guard = self.lock();
        let mut doc = self.load_index()?;
        let report = self.inspect(&doc)?;

        if !report.dangling_refs.is_empty() {
            for ref_id in &report.dangling_refs {
                doc.refs.remove(ref_id);
            }
            self.save_index(&doc)?;
        }
        for location in &report.orphan_blobs {
            self.storage.delete_blob(location)?;
        }

        if !report.is_clean() {
            info!(
                dangling = report.dangling_refs.len(),
                orphans = report.orphan_blobs.len(),
                "Repaired reference store"
            );
        }
        Ok(report)
    }

    fn inspect(&self, doc: &IndexDocument) -> Result<ConsistencyReport, MemoryError> {
        let mut report = ConsistencyReport::default();
        let mut indexed = BTreeSet::new();

        for (ref_id, entry) in &doc.refs {
            indexed.insert(entry.storage_location.as_str());
            if self.storage.stat_blob(&entry.storage_location)?.is_none() {
                report.dangling_refs.push(ref_id.clone());
            }
        }
        report.orphan_blobs = self
            .storage
            .list_blobs(REFS_PREFIX)?
            .into_iter()
            .filter(|b| !indexed.contains(b.location.as_str()))
            .map(|b| b.location)
            .collect();
        Ok(report)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.index_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_index(&self) -> Result<IndexDocument, MemoryError> {
        match self.storage.get_index()? {
            None => Ok(IndexDocument::default()),
            Some(raw) if raw.trim().is_empty() => Ok(IndexDocument::default()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| MemoryError::Parse(format!("reference index: {e}"))),
        }
    }

    fn save_index(&self, doc: &IndexDocument) -> Result<(), MemoryError> {
        let raw = serde_json::to_string_pretty(doc)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize index: {e}")))?;
        self.storage.put_index(&raw)
    }
}

/// Short human-readable summary of an artifact.
///
/// The first non-empty line, cut at `max_chars` with `...`. A first line
/// under 50 chars is extended with up to two following lines as
/// `first - second third`.
pub fn summarize(content: &str, max_chars: usize) -> String {
    let mut lines = content.lines().map(str::trim).filter(|l| !l.is_empty());
    let Some(first) = lines.next() else {
        return String::new();
    };

    let text = if first.chars().count() < SHORT_LINE_CHARS {
        let rest: Vec<&str> = lines.take(2).collect();
        if rest.is_empty() {
            first.to_string()
        } else {
            format!("{first} - {}", rest.join(" "))
        }
    } else {
        first.to_string()
    };

    if text.chars().count() > max_chars {
        format!("{}...", take_chars(&text, max_chars))
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_storage::FileStorage;
    use crate::mem_storage::InMemoryStorage;

    fn mem_store() -> ReferenceStore {
        ReferenceStore::new(Arc::new(InMemoryStorage::new()))
    }

    #[test]
    fn store_then_retrieve_is_byte_exact() {
        let store = mem_store();
        let content = "  leading spaces\n\nfn main() {\n    println!(\"hi\");\n}\n\n";
        let record = store.store("alice", content, "code", Metadata::new()).unwrap();

        assert_eq!(record.ref_id.len(), 16);
        assert_eq!(store.retrieve(&record.ref_id).unwrap(), content);
        assert_eq!(
            store.retrieve_by_location(&record.storage_location).unwrap(),
            content
        );
    }

    #[test]
    fn empty_content_is_rejected() {
        let store = mem_store();
        let err = store.store("alice", "   \n\t", "code", Metadata::new()).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn location_layout_is_namespaced() {
        let store = mem_store();
        let record = store.store("a/b@c", "payload", "tool output", Metadata::new()).unwrap();
        assert!(
            record
                .storage_location
                .starts_with(&format!("refs/{}/tool_output/", user_segment("a/b@c")))
        );
        assert!(record.storage_location.starts_with("refs/a_b_c-"));

        let lookalike = store.store("a_b_c", "payload", "tool output", Metadata::new()).unwrap();
        let dir = |loc: &str| loc.split('/').nth(1).map(str::to_string);
        assert_ne!(dir(&record.storage_location), dir(&lookalike.storage_location));
        assert!(record.storage_location.ends_with(&format!("_{}.md", &record.ref_id[..8])));
    }

    #[test]
    fn marker_format() {
        let store = mem_store();
        let record = store.store("alice", "Build log\nline two", "log", Metadata::new()).unwrap();
        assert_eq!(
            record.to_marker(),
            format!("[log] Build log - line two (see: {})", record.storage_location)
        );
    }

    #[test]
    fn unknown_ref_is_not_found() {
        let store = mem_store();
        let err = store.retrieve("deadbeefdeadbeef").unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { .. }));
    }

    #[test]
    fn dangling_entry_is_not_found_and_repairable() {
        let store = mem_store();
        let record = store.store("alice", "soon gone", "note", Metadata::new()).unwrap();
        store.storage().delete_blob(&record.storage_location).unwrap();

        assert!(matches!(
            store.retrieve(&record.ref_id).unwrap_err(),
            MemoryError::NotFound { .. }
        ));

        let report = store.check_consistency().unwrap();
        assert_eq!(report.dangling_refs, vec![record.ref_id.clone()]);

        store.repair().unwrap();
        assert!(store.check_consistency().unwrap().is_clean());
        assert!(store.list("alice").unwrap().is_empty());
    }

    #[test]
    fn orphan_blobs_are_reported_and_removed() {
        let store = mem_store();
        store.storage().put_blob("refs/alice/code/stray.md", "x").unwrap();

        let report = store.check_consistency().unwrap();
        assert_eq!(report.orphan_blobs, vec!["refs/alice/code/stray.md".to_string()]);

        store.repair().unwrap();
        assert!(store.storage().get_blob("refs/alice/code/stray.md").unwrap().is_none());
    }

    #[test]
    fn traversal_is_rejected() {
        let store = mem_store();
        let err = store.retrieve_by_location("refs/../../etc/passwd").unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn purge_removes_only_expired() {
        let store = mem_store();
        let record = store.store("alice", "keep me", "note", Metadata::new()).unwrap();

        let report = store.purge_older_than(Duration::days(30)).unwrap();
        assert_eq!(report, PurgeReport::default());
        assert!(store.retrieve(&record.ref_id).is_ok());

        let report = store.purge_older_than(Duration::seconds(-1)).unwrap();
        assert_eq!(report.deleted_files, 1);
        assert!(report.deleted_bytes > 0);
        assert!(store.retrieve(&record.ref_id).is_err());
        assert!(store.check_consistency().unwrap().is_clean());
    }

    #[test]
    fn concurrent_store_and_purge_stay_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));

        let purged = std::thread::scope(|scope| {
            for worker in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for n in 0..10 {
                        let content = format!("payload {worker}-{n}");
                        store.store("alice", &content, "log", Metadata::new()).unwrap();
                    }
                });
            }
            let store = &store;
            let purger = scope.spawn(move || {
                (0..10)
                    .map(|_| store.purge_older_than(Duration::seconds(-1)).unwrap().deleted_files)
                    .sum::<usize>()
            });
            purger.join().unwrap()
        });

        assert!(store.check_consistency().unwrap().is_clean());
        let remaining = store.stats(None).unwrap().total_files;
        assert_eq!(remaining + purged, 40);
    }

    #[test]
    fn stats_scope_by_user() {
        let store = mem_store();
        store.store("alice", "one", "code", Metadata::new()).unwrap();
        store.store("alice", "two", "log", Metadata::new()).unwrap();
        store.store("bob", "three", "code", Metadata::new()).unwrap();

        let all = store.stats(None).unwrap();
        assert_eq!(all.total_files, 3);
        assert_eq!(all.by_type.get("code"), Some(&2));
        assert_eq!(all.by_user.get("bob"), Some(&1));

        let alice = store.stats(Some("alice")).unwrap();
        assert_eq!(alice.total_files, 2);
        assert!(alice.total_bytes > 0);
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let ref_id = {
            let store = ReferenceStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));
            store.store("alice", "persisted", "note", Metadata::new()).unwrap().ref_id
        };

        let store = ReferenceStore::new(Arc::new(FileStorage::new(dir.path()).unwrap()));
        assert_eq!(store.retrieve(&ref_id).unwrap(), "persisted");

        let absolute = dir.path().join(&store.list("alice").unwrap()[0].1.storage_location);
        assert_eq!(
            store.retrieve_by_location(&absolute.to_string_lossy()).unwrap(),
            "persisted"
        );
    }

    #[test]
    fn summary_rules() {
        assert_eq!(summarize("\n\n  Title  \nsecond\nthird\nfourth", 150), "Title - second third");
        assert_eq!(summarize("only line", 150), "only line");

        let long = "x".repeat(200);
        let summary = summarize(&long, 150);
        assert_eq!(summary.chars().count(), 153);
        assert!(summary.ends_with("..."));

        let first = "y".repeat(60);
        assert_eq!(summarize(&format!("{first}\nmore"), 150), first);

        let joined = summarize(&format!("short\n{}\n{}", "a".repeat(100), "b".repeat(100)), 150);
        assert!(joined.ends_with("..."));
        assert_eq!(joined.chars().count(), 153);
    }
}
