//! Text form of a failure record as stored in the memory index.
//!
//! ```text
//! failure record
//! action: compile C++ code
//! error: expected ';' but found '}'\nat line 3
//! type: syntax
//! context: main.cpp
//! lesson: run the formatter first
//! recurrence: 2x
//! ```
//!
//! Values escape `\` as `\\` and line breaks as `\n` / `\r`. The first line
//! must be `failure record`; missing fields take defaults.

use tether_core::error::MemoryError;

use super::classify::ErrorKind;

const BLOCK_HEADER: &str = "failure record";

/// The fields carried in the block body.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFields {
    pub action: String,
    pub error_message: String,
    pub error_type: ErrorKind,
    pub context: String,
    pub lesson: String,
    pub recurrence_count: u32,
}

impl Default for BlockFields {
    fn default() -> Self {
        Self {
            action: String::new(),
            error_message: String::new(),
            error_type: ErrorKind::Unknown,
            context: String::new(),
            lesson: String::new(),
            recurrence_count: 1,
        }
    }
}

pub fn encode(fields: &BlockFields) -> String {
    format!(
        "{BLOCK_HEADER}\naction: {}\nerror: {}\ntype: {}\ncontext: {}\nlesson: {}\nrecurrence: {}x\n",
        escape(&fields.action),
        escape(&fields.error_message),
        fields.error_type,
        escape(&fields.context),
        escape(&fields.lesson),
        fields.recurrence_count,
    )
}

pub fn decode(content: &str) -> Result<BlockFields, MemoryError> {
    let mut lines = content.lines();
    if lines.next().map(str::trim) != Some(BLOCK_HEADER) {
        return Err(MemoryError::Parse(format!(
            "failure block must start with '{BLOCK_HEADER}'"
        )));
    }

    let mut fields = BlockFields::default();
    for line in lines.filter(|l| !l.trim().is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| MemoryError::Parse(format!("malformed failure line: {line:?}")))?;
        let value = value.strip_prefix(' ').unwrap_or(value);

        match key.trim() {
            "action" => fields.action = unescape(value),
            "error" => fields.error_message = unescape(value),
            "type" => fields.error_type = value.parse().unwrap_or(ErrorKind::Unknown),
            "context" => fields.context = unescape(value),
            "lesson" => fields.lesson = unescape(value),
            "recurrence" => {
                let count = value.trim().trim_end_matches('x');
                fields.recurrence_count = count
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| MemoryError::Parse(format!("bad recurrence: {value:?}")))?;
            }
            _ => {}
        }
    }
    Ok(fields)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_values_survive() {
        let fields = BlockFields {
            action: "compile C++ code".into(),
            error_message: "error: expected ';'\n  --> main.cpp:3\\4".into(),
            error_type: ErrorKind::Syntax,
            context: "line one\r\nline two".into(),
            lesson: String::new(),
            recurrence_count: 3,
        };
        let text = encode(&fields);
        assert_eq!(text.lines().count(), 7);
        assert_eq!(decode(&text).unwrap(), fields);
    }

    #[test]
    fn missing_fields_default() {
        let fields = decode("failure record\naction: deploy\n").unwrap();
        assert_eq!(fields.action, "deploy");
        assert_eq!(fields.error_type, ErrorKind::Unknown);
        assert_eq!(fields.recurrence_count, 1);
        assert!(fields.lesson.is_empty());
    }

    #[test]
    fn wrong_header_is_parse_error() {
        let err = decode("something else\naction: x").unwrap_err();
        assert!(matches!(err, MemoryError::Parse(_)));
    }

    #[test]
    fn bad_lines_are_parse_errors() {
        assert!(decode("failure record\nno separator here").is_err());
        assert!(decode("failure record\nrecurrence: many").is_err());
        assert!(decode("failure record\nrecurrence: 0x").is_err());
    }
}
