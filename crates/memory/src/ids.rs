//! Identifier and path-segment helpers shared by the stores.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-local counter mixed into generated ids so two calls within the
/// same clock tick never hash identical input.
static NONCE: AtomicU64 = AtomicU64::new(0);

/// Length of generated reference and failure ids (hex chars).
pub const SHORT_ID_LEN: usize = 16;

/// Derive a short unique id from `parts` plus a wall-clock nonce.
///
/// The nonce only prevents collisions between calls with identical inputs;
/// it is not a security measure.
pub fn short_id(parts: &[&str]) -> String {
    let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let counter = NONCE.fetch_add(1, Ordering::Relaxed);

    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b":");
    }
    hasher.update(nanos.to_le_bytes());
    hasher.update(counter.to_le_bytes());

    let mut id = hex::encode(hasher.finalize());
    id.truncate(SHORT_ID_LEN);
    id
}

/// First `n` characters of `s` (char-safe).
pub fn take_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Make a string safe to use as a single path segment.
///
/// Every char outside `[A-Za-z0-9_.-]` becomes `_`, the result is capped at
/// 50 chars, and dot-only names (`.`, `..`) are neutralized.
pub fn sanitize_segment(name: &str) -> String {
    let mut clean: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(50)
        .collect();

    if clean.is_empty() || clean.chars().all(|c| c == '.') {
        clean = clean.replace('.', "_");
        if clean.is_empty() {
            clean.push('_');
        }
    }
    clean
}

/// Hex chars of the id digest appended by [`user_segment`].
const USER_DIGEST_LEN: usize = 8;

/// Path segment for a user id: the sanitized id (at most 40 chars) plus a
/// digest of the raw id, so ids that sanitize alike stay apart.
pub fn user_segment(user_id: &str) -> String {
    let clean = sanitize_segment(user_id);
    let mut digest = hex::encode(Sha256::digest(user_id.as_bytes()));
    digest.truncate(USER_DIGEST_LEN);
    format!("{}-{digest}", take_chars(&clean, 40))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_unique_for_identical_input() {
        let a = short_id(&["u1", "code", "same prefix"]);
        let b = short_id(&["u1", "code", "same prefix"]);
        assert_eq!(a.len(), SHORT_ID_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn take_chars_respects_char_boundaries() {
        assert_eq!(take_chars("héllo", 2), "hé");
        assert_eq!(take_chars("abc", 10), "abc");
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_segment("alice@example.com"), "alice_example.com");
        assert_eq!(sanitize_segment("../etc"), ".._etc");
        assert_eq!(sanitize_segment(".."), "__");
        assert_eq!(sanitize_segment(""), "_");
        assert_eq!(sanitize_segment(&"x".repeat(80)).len(), 50);
    }

    #[test]
    fn user_segments_keep_lookalike_ids_apart() {
        let spaced = user_segment("alice smith");
        assert!(spaced.starts_with("alice_smith-"));
        assert_eq!(spaced, user_segment("alice smith"));
        assert_ne!(spaced, user_segment("alice_smith"));
        assert_ne!(user_segment("bob@x.io"), user_segment("bob_x.io"));

        let long_a = format!("{}a", "x".repeat(60));
        let long_b = format!("{}b", "x".repeat(60));
        assert_ne!(user_segment(&long_a), user_segment(&long_b));
        assert_eq!(user_segment(&long_a).len(), 40 + 1 + USER_DIGEST_LEN);
    }
}
