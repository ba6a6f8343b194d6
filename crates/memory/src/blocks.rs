//! Tagged blocks embedded in agent responses.
//!
//! ```text
//! -- lesson
//! Always run `cargo fmt` before committing.
//! --
//! ```
//!
//! A line whose trimmed text is `-- <tag>` opens a block and a line whose
//! trimmed text is exactly `--` closes it. Unterminated or empty blocks
//! yield nothing.

/// The first non-empty `tag` block in `text`.
pub fn extract_block(text: &str, tag: &str) -> Option<String> {
    Blocks::new(text, tag).next()
}

/// Every non-empty `tag` block in `text`, in order.
pub fn extract_blocks(text: &str, tag: &str) -> Vec<String> {
    Blocks::new(text, tag).collect()
}

struct Blocks<'a> {
    lines: std::str::Lines<'a>,
    opener: String,
}

impl<'a> Blocks<'a> {
    fn new(text: &'a str, tag: &str) -> Self {
        Self {
            lines: text.lines(),
            opener: format!("-- {}", tag.trim()),
        }
    }
}

impl Iterator for Blocks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            // Seek the opener.
            self.lines.by_ref().find(|l| l.trim() == self.opener)?;

            let mut body = Vec::new();
            let mut closed = false;
            for line in self.lines.by_ref() {
                if line.trim() == "--" {
                    closed = true;
                    break;
                }
                body.push(line);
            }
            if !closed {
                return None;
            }

            let body = body.join("\n").trim().to_string();
            if !body.is_empty() {
                return Some(body);
            }
        }
    }
}
