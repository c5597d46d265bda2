//! Sanitization of text that leaves the sandbox.
//!
//! Runtime failure messages partly echo program data, and internal errors
//! may mention host paths. Everything reported to a caller passes through
//! [`redact_message`] first.

use std::sync::LazyLock;

use regex::Regex;

/// Upper bound on the length of a reported message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const ELLIPSIS: &str = "...";

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"https?://[^\s'")\]}>]+"#).unwrap());

static UNIX_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(home|Users|etc|var|tmp|opt|usr|root|mnt|srv|proc|sys|dev|run|boot|snap|nix|target)(/[\w.\-]+)+")
        .unwrap()
});

static WINDOWS_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Z]:\\[\w.\\\-]+").unwrap());

/// Python and Rust backtrace lines.
static STACK_TRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(Traceback \(most recent call last\):.*|File ".*", line \d+.*|at\s+\S+:\d+.*|\d+:\s+0x[0-9a-f]+\s.*|stack backtrace:.*)$"#)
        .unwrap()
});

/// Strip paths, URLs, stack traces and control characters, then cap length.
///
/// Tabs and newlines survive; other control characters are dropped.
pub fn redact_message(message: &str) -> String {
    let mut msg = URL_RE.replace_all(message, "[url]").into_owned();
    msg = WINDOWS_PATH_RE.replace_all(&msg, "[path]").into_owned();
    msg = UNIX_PATH_RE.replace_all(&msg, "[path]").into_owned();
    msg = STACK_TRACE_RE.replace_all(&msg, "").into_owned();

    let cleaned: String = msg
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let lines: Vec<&str> = cleaned.lines().filter(|l| !l.trim().is_empty()).collect();
    truncate_chars(&lines.join("\n"), MAX_MESSAGE_CHARS)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some(_) => {
            let keep = max_chars.saturating_sub(ELLIPSIS.len());
            let cut = text.char_indices().nth(keep).map_or(text.len(), |(i, _)| i);
            format!("{}{ELLIPSIS}", &text[..cut])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_messages_pass_through() {
        assert_eq!(redact_message("division by zero"), "division by zero");
        assert_eq!(redact_message("'k'"), "'k'");
    }

    #[test]
    fn test_paths_are_redacted() {
        let msg = redact_message("cannot open /home/alice/secrets.txt for reading");
        assert_eq!(msg, "cannot open [path] for reading");
        let msg = redact_message(r"failed at C:\Users\bob\app.exe");
        assert!(!msg.contains("bob"));
        assert!(msg.contains("[path]"));
    }

    #[test]
    fn test_urls_are_redacted() {
        let msg = redact_message("fetch https://internal.example.com/api?key=1 failed");
        assert_eq!(msg, "fetch [url] failed");
    }

    #[test]
    fn test_stack_traces_are_removed() {
        let msg = "Traceback (most recent call last):\n  File \"x.py\", line 3, in <module>\nValueError: bad";
        assert_eq!(redact_message(msg), "ValueError: bad");
    }

    #[test]
    fn test_control_characters_are_removed() {
        assert_eq!(redact_message("a\u{1b}[31mb\u{0}c"), "a[31mbc");
    }

    #[test]
    fn test_length_is_capped() {
        let msg = redact_message(&"é".repeat(MAX_MESSAGE_CHARS * 2));
        assert_eq!(msg.chars().count(), MAX_MESSAGE_CHARS);
        assert!(msg.ends_with("..."));
        let exact = "x".repeat(MAX_MESSAGE_CHARS);
        assert_eq!(redact_message(&exact), exact);
    }
}
