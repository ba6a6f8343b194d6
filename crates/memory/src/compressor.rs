//! Swap large content for reference markers and back.

use std::sync::Arc;
use tether_core::error::MemoryError;
use tether_core::memory::{MemoryIndex, Metadata};
use tracing::{debug, warn};

use crate::reference::{ReferenceRecord, ReferenceStore};

const MARKER_OPEN: &str = "(see: ";

/// Default externalization threshold, in chars.
pub const DEFAULT_THRESHOLD: usize = 500;

/// Decides when content leaves the index and goes to the reference store.
pub struct MemoryCompressor {
    store: Arc<ReferenceStore>,
    threshold: usize,
}

impl MemoryCompressor {
    pub fn new(store: Arc<ReferenceStore>, threshold: usize) -> Self {
        Self { store, threshold }
    }

    pub fn store(&self) -> &Arc<ReferenceStore> {
        &self.store
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn should_externalize(&self, content: &str) -> bool {
        content.chars().count() > self.threshold
    }

    /// Return `content` unchanged when small, otherwise store it and return
    /// its marker together with the new record.
    pub fn compress_if_needed(
        &self,
        user_id: &str,
        content: &str,
        content_type: &str,
        metadata: Metadata,
    ) -> Result<(String, Option<ReferenceRecord>), MemoryError> {
        if !self.should_externalize(content) {
            return Ok((content.to_string(), None));
        }
        let record = self.store.store(user_id, content, content_type, metadata)?;
        debug!(user_id = %user_id, ref_id = %record.ref_id, "Externalized large content");
        Ok((record.to_marker(), Some(record)))
    }

    /// Compress if needed, then add the result to `index`. Externalized items
    /// carry `external_ref` and `storage_location` in their metadata.
    pub fn remember(
        &self,
        index: &dyn MemoryIndex,
        user_id: &str,
        content: &str,
        item_type: &str,
        metadata: Metadata,
    ) -> Result<String, MemoryError> {
        let (text, record) =
            self.compress_if_needed(user_id, content, item_type, metadata.clone())?;

        let mut metadata = metadata;
        if let Some(record) = record {
            metadata.insert("external_ref".into(), record.ref_id.into());
            metadata.insert("storage_location".into(), record.storage_location.into());
        }
        index.add(user_id, &text, item_type, metadata)
    }

    /// If `text` contains a marker, return the referenced payload. Anything
    /// that cannot be resolved is returned unchanged.
    pub fn expand_if_reference(&self, text: &str) -> String {
        let Some(location) = parse_marker(text) else {
            return text.to_string();
        };
        match self.store.retrieve_by_location(location) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(location = %location, error = %e, "Could not expand reference marker");
                text.to_string()
            }
        }
    }
}

/// Byte length of the marker group starting at `open` in `text`, up to and
/// including its closing `)`. A marker closes with the last `)` on its line,
/// so locations may themselves contain parentheses.
fn marker_len(text: &str, open: usize) -> Option<usize> {
    let line_end = text[open..].find('\n').map_or(text.len(), |n| open + n);
    let close = text[open + MARKER_OPEN.len()..line_end].rfind(')')?;
    Some(MARKER_OPEN.len() + close + 1)
}

/// The location inside the first `(see: …)` group of `text`.
pub fn parse_marker(text: &str) -> Option<&str> {
    let open = text.find(MARKER_OPEN)?;
    let len = marker_len(text, open)?;
    let location = text[open + MARKER_OPEN.len()..open + len - 1].trim();
    (!location.is_empty()).then_some(location)
}

/// Replace every `(see: …)` group with nothing, leaving the summary.
pub fn strip_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(MARKER_OPEN) {
        let Some(len) = marker_len(rest, open) else {
            break;
        };
        out.push_str(rest[..open].trim_end());
        rest = &rest[open + len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryIndex;
    use crate::mem_storage::InMemoryStorage;

    fn compressor() -> MemoryCompressor {
        let store = ReferenceStore::new(Arc::new(InMemoryStorage::new()));
        MemoryCompressor::new(Arc::new(store), DEFAULT_THRESHOLD)
    }

    #[test]
    fn threshold_is_exclusive() {
        let c = compressor();
        assert!(!c.should_externalize(&"a".repeat(500)));
        assert!(c.should_externalize(&"a".repeat(501)));
    }

    #[test]
    fn small_content_passes_through() {
        let c = compressor();
        let (text, record) = c.compress_if_needed("u1", "short", "note", Metadata::new()).unwrap();
        assert_eq!(text, "short");
        assert!(record.is_none());
    }

    #[test]
    fn large_content_becomes_marker_and_expands_back() {
        let c = compressor();
        let content = format!("fn big() {{\n{}\n}}", "    let x = 1;\n".repeat(100));
        let (marker, record) = c.compress_if_needed("u1", &content, "code", Metadata::new()).unwrap();

        let record = record.unwrap();
        assert!(marker.starts_with("[code] "));
        assert_eq!(parse_marker(&marker), Some(record.storage_location.as_str()));
        assert_eq!(c.expand_if_reference(&marker), content);
    }

    #[test]
    fn remember_tags_external_items() {
        let c = compressor();
        let index = InMemoryIndex::new();
        c.remember(&index, "u1", &"z".repeat(600), "note", Metadata::new()).unwrap();
        c.remember(&index, "u1", "tiny", "note", Metadata::new()).unwrap();

        let items = index.get_by_type("u1", "note", 10).unwrap();
        assert!(items[0].meta_str("external_ref").is_some());
        assert!(items[0].content.contains("(see: "));
        assert!(items[1].meta_str("external_ref").is_none());
        assert_eq!(items[1].content, "tiny");
    }

    #[test]
    fn unresolved_marker_is_left_alone() {
        let c = compressor();
        let text = "[code] gone (see: refs/u1/code/missing.md)";
        assert_eq!(c.expand_if_reference(text), text);
        assert_eq!(c.expand_if_reference("no marker here"), "no marker here");
    }

    #[test]
    fn parse_and_strip() {
        assert_eq!(parse_marker("x (see:  a/b.md )"), Some("a/b.md"));
        assert_eq!(parse_marker("x (see: a/b.md)"), Some("a/b.md"));
        assert_eq!(parse_marker("x (see: )"), None);
        assert_eq!(strip_markers("[log] Build failed (see: refs/u/log/a.md)"), "[log] Build failed");
        assert_eq!(strip_markers("plain"), "plain");
    }

    #[test]
    fn locations_may_contain_parentheses() {
        let text = "[log] Build failed (see: /tmp/run (2)/refs/u/log/a.md)";
        assert_eq!(parse_marker(text), Some("/tmp/run (2)/refs/u/log/a.md"));
        assert_eq!(strip_markers(text), "[log] Build failed");

        let lines = "- [log] one (see: a (1).md)\n- [code] two (see: b.md)";
        assert_eq!(parse_marker(lines), Some("a (1).md"));
        assert_eq!(strip_markers(lines), "- [log] one\n- [code] two");
        assert_eq!(parse_marker("x (see: unterminated\n)"), None);
    }

    #[test]
    fn expands_marker_whose_location_has_parentheses() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store (copy)");
        let storage = crate::fs_storage::FileStorage::new(root.clone()).unwrap();
        let store = Arc::new(ReferenceStore::new(Arc::new(storage)));
        let c = MemoryCompressor::new(store.clone(), 10);

        let record = store
            .store("u1", "payload with enough text", "log", Metadata::new())
            .unwrap();
        let absolute = root.join(&record.storage_location);
        let marker = format!("[log] payload (see: {})", absolute.display());
        assert_eq!(c.expand_if_reference(&marker), "payload with enough text");
    }
}
