//! PII redaction
//!
//! A pure, stateless transformation applied to every text field returned to
//! a caller. The contract is best-effort: commonly-shaped instances of the
//! known categories are masked, nothing more is promised.
//!
//! The backend sits behind the [`Redactor`] trait so a stronger
//! implementation can replace the regex one without touching callers.

use crate::config::PiiMode;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::Arc;

/// Strategy interface for text redaction.
pub trait Redactor: Send + Sync {
    /// Returns a copy of `text` with recognized sensitive spans masked.
    fn redact(&self, text: &str) -> String;
}

/// Pass-through backend used when the PII filter mode is off.
pub struct NoopRedactor;

impl Redactor for NoopRedactor {
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Pattern-based backend.
///
/// Patterns are applied in a fixed priority order as sequential full-string
/// passes; replacement tokens are shaped so later patterns never re-match
/// an already-replaced span.
pub struct RegexRedactor {
    patterns: Vec<(Regex, &'static str)>,
}

impl RegexRedactor {
    pub fn new() -> Result<Self> {
        // Priority order matters for overlapping matches; keep it fixed.
        let specs: [(&str, &str); 6] = [
            // Social Security Numbers (US)
            (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
            // Credit card numbers (13-19 digits, optional separators)
            (r"\b(?:\d{4}[- ]?){3,4}\d{1,4}\b", "[REDACTED-CC]"),
            // Bank account numbers in context (8-17 digits)
            (
                r"(?i)\b(?:account|acct)\.?\s*#?\s*\d{8,17}\b",
                "[REDACTED-ACCOUNT]",
            ),
            // Routing numbers in context (9 digits)
            (
                r"(?i)\b(?:routing|aba)\.?\s*#?\s*\d{9}\b",
                "[REDACTED-ROUTING]",
            ),
            // Passwords in context
            (
                r"(?i)\b(?:password|passwd|pwd|pin|passcode)[:\s]+\S+",
                "[REDACTED-PASSWORD]",
            ),
            // API keys / tokens in context
            (
                r"(?i)\b(?:api[_-]?key|token|secret|bearer)[:\s]+[A-Za-z0-9_\-]{20,}\b",
                "[REDACTED-KEY]",
            ),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (pattern, replacement) in specs {
            let re = Regex::new(pattern)
                .map_err(|e| Error::Config(format!("bad redaction pattern: {e}")))?;
            patterns.push((re, replacement));
        }
        Ok(Self { patterns })
    }
}

impl Redactor for RegexRedactor {
    fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();
        for (re, replacement) in &self.patterns {
            result = re.replace_all(&result, *replacement).into_owned();
        }
        result
    }
}

/// Build the redactor for the configured filter mode.
pub fn for_mode(mode: PiiMode) -> Result<Arc<dyn Redactor>> {
    match mode {
        PiiMode::Regex => Ok(Arc::new(RegexRedactor::new()?)),
        PiiMode::Off => Ok(Arc::new(NoopRedactor)),
    }
}

// Characters the upstream store embeds in text that should never reach
// callers: object replacement chars, null bytes, zero-width set, BOM.
const STRIP_CHARS: [char; 7] = [
    '\u{0000}', '\u{fffc}', '\u{fffd}', '\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}',
];

/// Remove invisible/replacement characters and trim.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !STRIP_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}
