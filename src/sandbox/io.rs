//! Output capture for sandboxed programs.

use std::fmt;

/// Appended once when output was cut at the cap.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]\n";

/// A bounded buffer collecting everything the program prints.
///
/// Writes past the cap are dropped; the buffer never grows beyond the
/// configured number of bytes plus the truncation marker.
#[derive(Clone, Debug)]
pub struct CapturedOutput {
    buffer: String,
    limit: usize,
    truncated: bool,
}

impl CapturedOutput {
    /// Create a buffer that keeps at most `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
            truncated: false,
        }
    }

    /// Append text, cutting at a character boundary when the cap is reached.
    pub fn push_str(&mut self, text: &str) {
        if self.truncated {
            return;
        }
        let room = self.limit - self.buffer.len();
        if text.len() <= room {
            self.buffer.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&text[..cut]);
        self.truncated = true;
    }

    /// The captured text so far, without the truncation marker.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Consume the buffer, appending the marker if anything was dropped.
    pub fn into_string(mut self) -> String {
        if self.truncated {
            self.buffer.push_str(TRUNCATION_MARKER);
        }
        self.buffer
    }
}

impl Default for CapturedOutput {
    fn default() -> Self {
        Self::with_limit(usize::MAX)
    }
}

impl fmt::Write for CapturedOutput {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write;

    #[test]
    fn test_captured_output() {
        let mut output = CapturedOutput::default();
        write!(output, "hello ").unwrap();
        output.push_str("world");
        assert_eq!(output.as_str(), "hello world");
        assert!(!output.is_truncated());
        assert_eq!(output.into_string(), "hello world");
    }

    #[test]
    fn test_output_is_capped() {
        let mut output = CapturedOutput::with_limit(8);
        output.push_str("12345");
        output.push_str("67890");
        output.push_str("more");
        assert_eq!(output.as_str(), "12345678");
        assert!(output.is_truncated());
        assert_eq!(output.into_string(), format!("12345678{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_cap_respects_char_boundaries() {
        let mut output = CapturedOutput::with_limit(4);
        output.push_str("ab€");
        assert_eq!(output.as_str(), "ab");
        assert!(output.is_truncated());
    }
}
