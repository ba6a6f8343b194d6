//! Task recitation: the goal restated at the very end of the prompt.
//!
//! From the task document we keep headings, the body of the "Main Goal"
//! and "Todo" sections, warning lines and checkbox lines, capped at a
//! fixed number of lines. If that leaves too little text, the start of the
//! raw document is used instead.

use tether_config::AssemblerConfig;
use tether_memory::ids::take_chars;

/// First line of the recitation section.
pub const RECITATION_HEADER: &str = "[CURRENT TASK GOAL - keep this in focus]";

const RECITATION_FOOTER: &str =
    "[REMINDER] Once the goal above is done, update the task state.";

/// Limits applied when extracting the recitation.
#[derive(Debug, Clone, Copy)]
pub struct RecitationLimits {
    pub max_lines: usize,
    pub min_chars: usize,
    pub fallback_chars: usize,
}

impl Default for RecitationLimits {
    fn default() -> Self {
        Self::from(&AssemblerConfig::default())
    }
}

impl From<&AssemblerConfig> for RecitationLimits {
    fn from(config: &AssemblerConfig) -> Self {
        Self {
            max_lines: config.recitation_max_lines,
            min_chars: config.recitation_min_chars,
            fallback_chars: config.recitation_fallback_chars,
        }
    }
}

/// The key lines of a task document.
pub fn extract(document: &str, limits: RecitationLimits) -> String {
    let mut kept = Vec::new();
    let mut in_key_section = false;

    for line in document.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let keep = if let Some(title) = heading_title(trimmed) {
            in_key_section = is_key_section(title);
            true
        } else {
            in_key_section || is_warning(trimmed) || is_checkbox(trimmed)
        };

        if keep {
            if kept.len() >= limits.max_lines {
                break;
            }
            kept.push(line.trim_end());
        }
    }

    let text = kept.join("\n");
    if text.chars().count() < limits.min_chars {
        take_chars(document, limits.fallback_chars).to_string()
    } else {
        text
    }
}

/// The full recitation section for a task document.
pub fn format_recitation(document: &str, limits: RecitationLimits) -> String {
    format!(
        "{RECITATION_HEADER}\n{}\n\n{RECITATION_FOOTER}",
        extract(document, limits).trim_end()
    )
}

fn heading_title(line: &str) -> Option<&str> {
    line.starts_with('#')
        .then(|| line.trim_start_matches('#').trim())
}

fn is_key_section(title: &str) -> bool {
    let title = title.to_lowercase();
    title.starts_with("main goal")
        || title == "goal"
        || title.starts_with("todo")
        || title.starts_with("to do")
        || title.starts_with("to-do")
}

fn is_warning(line: &str) -> bool {
    line.contains('⚠') || line.starts_with("WARNING") || line.contains("Warning:")
}

fn is_checkbox(line: &str) -> bool {
    ["- [ ]", "- [x]", "- [X]", "* [ ]", "* [x]"]
        .iter()
        .any(|p| line.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "# Current Task\n\n## Main Goal\nShip the reference store\nwith byte-exact retrieval\n\n## Done\n- [x] index format\n\n## Todo\n- [ ] purge\nremember the retention sweep\n\n## Notes\nplain note that is dropped\n⚠ never trim payloads\nWarning: index writes must be atomic\n";

    #[test]
    fn keeps_key_lines() {
        let text = extract(DOC, RecitationLimits::default());
        assert!(text.contains("## Main Goal\nShip the reference store\nwith byte-exact retrieval"));
        assert!(text.contains("- [x] index format"));
        assert!(text.contains("remember the retention sweep"));
        assert!(text.contains("⚠ never trim payloads"));
        assert!(text.contains("Warning: index writes must be atomic"));
        assert!(!text.contains("plain note that is dropped"));
    }

    #[test]
    fn caps_lines() {
        let doc = format!("# Big\n{}", "- [ ] item that is long enough\n".repeat(50));
        let limits = RecitationLimits::default();
        let text = extract(&doc, limits);
        assert_eq!(text.lines().count(), limits.max_lines);
    }

    #[test]
    fn short_extraction_falls_back_to_raw_prefix() {
        let doc = format!("free text without structure {}", "z".repeat(800));
        let text = extract(&doc, RecitationLimits::default());
        assert_eq!(text.chars().count(), 500);
        assert!(text.starts_with("free text"));

        let tiny = "just a line";
        assert_eq!(extract(tiny, RecitationLimits::default()), tiny);
    }

    #[test]
    fn section_is_wrapped() {
        let section = format_recitation(DOC, RecitationLimits::default());
        assert!(section.starts_with(RECITATION_HEADER));
        assert!(section.ends_with(RECITATION_FOOTER));
    }
}
