//! Cheap checks on raw source text before it reaches the parser.
//!
//! These bound the cost of analysis and give a fast rejection path for
//! degenerate input. They never modify the text.

use crate::error::{Result, SandboxError};

/// Validate source text that is already a Rust string.
pub fn validate_source(source: &str, max_chars: usize) -> Result<()> {
    // 1. Empty code
    if source.trim().is_empty() {
        return Err(SandboxError::InvalidInput("source text is empty".into()));
    }

    // 2. Size limit, counted in characters. The byte length is an upper
    // bound, so most inputs never need the full count.
    if source.len() > max_chars {
        let chars = source.chars().count();
        if chars > max_chars {
            return Err(SandboxError::InvalidInput(format!(
                "source text is {chars} characters, maximum is {max_chars}"
            )));
        }
    }

    // 3. Embedded NULs
    if source.contains('\0') {
        return Err(SandboxError::InvalidInput(
            "source text contains a NUL character".into(),
        ));
    }

    Ok(())
}

/// Validate raw bytes and decode them as UTF-8.
pub fn validate_source_bytes(bytes: &[u8], max_chars: usize) -> Result<&str> {
    let source = std::str::from_utf8(bytes).map_err(|e| {
        SandboxError::InvalidInput(format!(
            "source text is not valid UTF-8 (at byte {})",
            e.valid_up_to()
        ))
    })?;
    validate_source(source, max_chars)?;
    Ok(source)
}
