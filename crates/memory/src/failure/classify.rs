//! Error classification by ordered pattern groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed taxonomy of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Syntax,
    Logic,
    Runtime,
    ApiUsage,
    Config,
    Permission,
    Network,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Logic => "logic",
            Self::Runtime => "runtime",
            Self::ApiUsage => "api_usage",
            Self::Config => "config",
            Self::Permission => "permission",
            Self::Network => "network",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to [`ErrorKind::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "syntax" => Self::Syntax,
            "logic" => Self::Logic,
            "runtime" => Self::Runtime,
            "api_usage" => Self::ApiUsage,
            "config" => Self::Config,
            "permission" => Self::Permission,
            "network" => Self::Network,
            _ => Self::Unknown,
        })
    }
}

/// Pattern groups, tested in order. Patterns are lowercase; `*` separates
/// fragments that must appear in that order.
const PATTERNS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::Syntax,
        &[
            "syntaxerror",
            "syntax error",
            "unexpected token",
            "invalid syntax",
            "expected*but found",
        ],
    ),
    (
        ErrorKind::Logic,
        &[
            "logicerror",
            "assertion failed",
            "wrong result",
            "incorrect output",
            "unexpected behavior",
        ],
    ),
    (
        ErrorKind::Runtime,
        &[
            "runtimeerror",
            "nullpointer",
            "undefined*reference",
            "segmentation fault",
            "memory leak",
        ],
    ),
    (
        ErrorKind::ApiUsage,
        &[
            "apierror",
            "bad request",
            "invalid parameter",
            "method not allowed",
            "not supported",
        ],
    ),
    (
        ErrorKind::Config,
        &[
            "configerror",
            "configuration",
            "missing config",
            "env variable",
            "setting not found",
        ],
    ),
    (
        ErrorKind::Permission,
        &[
            "permissionerror",
            "access denied",
            "unauthorized",
            "forbidden",
            "not allowed",
        ],
    ),
    (
        ErrorKind::Network,
        &[
            "networkerror",
            "connection refused",
            "timeout",
            "enotfound",
            "econnrefused",
        ],
    ),
];

/// Classify an error message; the first matching group wins.
pub fn classify(error_message: &str) -> ErrorKind {
    let message = error_message.to_lowercase();
    PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| matches(&message, p)))
        .map(|(kind, _)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

fn matches(haystack: &str, pattern: &str) -> bool {
    let mut rest = haystack;
    for fragment in pattern.split('*') {
        match rest.find(fragment) {
            Some(pos) => rest = &rest[pos + fragment.len()..],
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_kind() {
        assert_eq!(classify("SyntaxError: invalid syntax"), ErrorKind::Syntax);
        assert_eq!(classify("assertion failed: left == right"), ErrorKind::Logic);
        assert_eq!(classify("Segmentation fault (core dumped)"), ErrorKind::Runtime);
        assert_eq!(classify("400 Bad Request"), ErrorKind::ApiUsage);
        assert_eq!(classify("missing config key `token`"), ErrorKind::Config);
        assert_eq!(classify("EACCES: access denied"), ErrorKind::Permission);
        assert_eq!(classify("connect ECONNREFUSED 127.0.0.1:5432"), ErrorKind::Network);
        assert_eq!(classify("something odd happened"), ErrorKind::Unknown);
    }

    #[test]
    fn wildcard_fragments_must_appear_in_order() {
        assert_eq!(classify("expected `;` but found `}`"), ErrorKind::Syntax);
        assert_eq!(classify("found `}` but expected `;`"), ErrorKind::Unknown);
        assert_eq!(classify("undefined reference to `main`"), ErrorKind::Runtime);
    }

    #[test]
    fn earlier_groups_win() {
        // "method not allowed" (api usage) precedes "not allowed" (permission).
        assert_eq!(classify("405 Method Not Allowed"), ErrorKind::ApiUsage);
        assert_eq!(classify("operation not allowed"), ErrorKind::Permission);
    }

    #[test]
    fn names_roundtrip() {
        for kind in [
            ErrorKind::Syntax,
            ErrorKind::ApiUsage,
            ErrorKind::Network,
            ErrorKind::Unknown,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert_eq!("bogus".parse::<ErrorKind>().unwrap(), ErrorKind::Unknown);
        assert_eq!(
            serde_json::to_string(&ErrorKind::ApiUsage).unwrap(),
            "\"api_usage\""
        );
    }
}
