use once_cell::sync::Lazy;
use regex::RegexSet;

use super::ValidationError;

// Markup, script injection and SQL fragments, matched case-insensitively.
static DISALLOWED: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"[<>]",
        r"(?i)javascript:",
        r"(?i)\bon\w+\s*=",
        r"(?i)script",
        r"--",
        r"/\*",
        r"\*/",
        r"(?i)union\s+select",
        r"(?i)drop\s+table",
    ])
    .unwrap()
});

/// Check that `text` is a plausible resource identifier.
///
/// Rejects empty text, text longer than `max_length` characters, and text
/// containing markup, script or SQL injection fragments.
pub fn validate_identifier(text: &str, max_length: usize) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    if text.chars().count() > max_length {
        return Err(ValidationError::TooLong { max: max_length });
    }
    if DISALLOWED.is_match(text) {
        return Err(ValidationError::DisallowedPattern);
    }
    Ok(())
}
