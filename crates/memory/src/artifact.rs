//! On-disk format of an externalized artifact.
//!
//! ```text
//! ---
//! ref_id: 3f9a0c1d2e4b5a69
//! user_id: alice
//! content_type: code
//! created_at: 2026-10-19T12:03:01.123456Z
//! metadata: {"language":"rust"}
//! ---
//!
//! <payload, byte-exact>
//! ```
//!
//! Grammar: the artifact must start with `---\n`; each header line is
//! `key: value`; the header ends at the first `\n---\n`; exactly one blank
//! line separates the header from the payload. Unknown keys are ignored and
//! missing keys take defaults. A missing closing separator, a line without
//! `:` or an unparsable value is a [`MemoryError::Parse`].

use chrono::{DateTime, Utc};
use tether_core::error::MemoryError;
use tether_core::memory::Metadata;

const OPEN: &str = "---\n";
const CLOSE: &str = "\n---\n";

/// Header fields written in front of every artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactHeader {
    pub ref_id: String,
    pub user_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
    pub metadata: Metadata,
}

impl Default for ArtifactHeader {
    fn default() -> Self {
        Self {
            ref_id: String::new(),
            user_id: String::new(),
            content_type: String::new(),
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            metadata: Metadata::new(),
        }
    }
}

/// A decoded artifact. `header` is `None` for bodies the store did not write.
#[derive(Debug)]
pub struct Decoded<'a> {
    pub header: Option<ArtifactHeader>,
    pub payload: &'a str,
}

/// Render header + payload.
pub fn encode(header: &ArtifactHeader, payload: &str) -> String {
    let metadata = serde_json::Value::Object(header.metadata.clone()).to_string();
    format!(
        "{OPEN}ref_id: {}\nuser_id: {}\ncontent_type: {}\ncreated_at: {}\nmetadata: {}{CLOSE}\n{payload}",
        single_line(&header.ref_id),
        single_line(&header.user_id),
        single_line(&header.content_type),
        header.created_at.to_rfc3339(),
        metadata,
    )
}

/// Split an artifact into header and payload.
pub fn decode(raw: &str) -> Result<Decoded<'_>, MemoryError> {
    if !raw.starts_with("---") {
        return Ok(Decoded {
            header: None,
            payload: raw,
        });
    }

    let rest = raw
        .strip_prefix(OPEN)
        .ok_or_else(|| MemoryError::Parse("artifact header must start with '---' on its own line".into()))?;

    let (header_text, after) = if let Some(after) = rest.strip_prefix("---\n") {
        ("", after)
    } else {
        let end = rest
            .find(CLOSE)
            .ok_or_else(|| MemoryError::Parse("artifact header is not closed by '---'".into()))?;
        (&rest[..end], &rest[end + CLOSE.len()..])
    };

    let header = parse_header(header_text)?;
    let payload = after.strip_prefix('\n').unwrap_or(after);
    Ok(Decoded {
        header: Some(header),
        payload,
    })
}

fn parse_header(text: &str) -> Result<ArtifactHeader, MemoryError> {
    let mut header = ArtifactHeader::default();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| MemoryError::Parse(format!("malformed header line: {line:?}")))?;
        let value = value.strip_prefix(' ').unwrap_or(value);

        match key.trim() {
            "ref_id" => header.ref_id = value.to_string(),
            "user_id" => header.user_id = value.to_string(),
            "content_type" => header.content_type = value.to_string(),
            "created_at" => {
                header.created_at = DateTime::parse_from_rfc3339(value.trim())
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| MemoryError::Parse(format!("created_at: {e}")))?;
            }
            "metadata" => {
                header.metadata = match serde_json::from_str::<serde_json::Value>(value) {
                    Ok(serde_json::Value::Object(map)) => map,
                    Ok(other) => {
                        return Err(MemoryError::Parse(format!(
                            "metadata must be an object, got {other}"
                        )));
                    }
                    Err(e) => return Err(MemoryError::Parse(format!("metadata: {e}"))),
                };
            }
            _ => {}
        }
    }

    Ok(header)
}

fn single_line(value: &str) -> String {
    value.replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> ArtifactHeader {
        let mut metadata = Metadata::new();
        metadata.insert("language".into(), "rust".into());
        ArtifactHeader {
            ref_id: "abc123".into(),
            user_id: "alice".into(),
            content_type: "code".into(),
            created_at: Utc::now(),
            metadata,
        }
    }

    #[test]
    fn payload_survives_exactly() {
        let payload = "\n  fn main() {}\n---\nnot a header\n\n";
        let raw = encode(&header(), payload);
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.payload, payload);

        let h = decoded.header.unwrap();
        assert_eq!(h.ref_id, "abc123");
        assert_eq!(h.metadata.get("language").unwrap(), "rust");
    }

    #[test]
    fn foreign_bodies_pass_through() {
        let decoded = decode("plain notes\nno header").unwrap();
        assert!(decoded.header.is_none());
        assert_eq!(decoded.payload, "plain notes\nno header");
    }

    #[test]
    fn missing_fields_default() {
        let decoded = decode("---\nref_id: r1\n---\n\nbody").unwrap();
        let h = decoded.header.unwrap();
        assert_eq!(h.ref_id, "r1");
        assert!(h.user_id.is_empty());
        assert!(h.metadata.is_empty());
        assert_eq!(h.created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(decoded.payload, "body");
    }

    #[test]
    fn unclosed_header_is_parse_error() {
        let err = decode("---\nref_id: r1\nbody without close").unwrap_err();
        assert!(matches!(err, MemoryError::Parse(_)));
    }

    #[test]
    fn bad_metadata_is_parse_error() {
        let err = decode("---\nmetadata: [1, 2]\n---\n\nbody").unwrap_err();
        assert!(matches!(err, MemoryError::Parse(_)));
    }

    #[test]
    fn newlines_in_header_values_are_flattened() {
        let mut h = header();
        h.content_type = "multi\nline".into();
        let raw = encode(&h, "x");
        let decoded = decode(&raw).unwrap();
        assert_eq!(decoded.header.unwrap().content_type, "multi line");
        assert_eq!(decoded.payload, "x");
    }
}
