//! API key verification
//!
//! Callers authenticate with a shared key. Verification is constant-time so
//! the comparison itself leaks nothing about the configured key. Startup
//! validation rejects placeholder and too-short keys outright; weak-but-legal
//! keys produce warnings only.

use crate::error::{Error, Result};

/// Placeholder values that block startup when used as the API key.
const BLOCKED_API_KEYS: &[&str] = &[
    "your-secret-api-key-here",
    "your-secret-api-key",
    "your-api-key",
    "your-key",
    "changeme",
    "change-me",
    "secret",
    "password",
    "test-key",
    "demo-key",
    "example",
];

const MIN_KEY_LEN: usize = 16;
const RECOMMENDED_KEY_LEN: usize = 32;

/// Constant-time byte comparison.
///
/// Length mismatch short-circuits; within equal lengths every byte is
/// visited regardless of where the first difference is.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify a presented API key against the configured one.
///
/// Returns `false` when the key is absent or wrong. When no key is
/// configured, nothing authenticates.
pub fn verify_api_key(presented: Option<&str>, expected: Option<&str>) -> bool {
    match (presented, expected) {
        (Some(p), Some(e)) => constant_time_eq(p.as_bytes(), e.as_bytes()),
        _ => false,
    }
}

/// Validation outcome for a configured API key.
#[derive(Debug, Default)]
pub struct KeyValidation {
    /// Problems that must block startup
    pub errors: Vec<String>,
    /// Problems worth logging but not fatal
    pub warnings: Vec<String>,
}

/// Validate API key strength.
pub fn validate_api_key(key: &str) -> KeyValidation {
    let mut v = KeyValidation::default();

    if BLOCKED_API_KEYS.contains(&key.to_lowercase().as_str()) {
        v.errors
            .push(format!("API key is a blocked placeholder value: '{key}'"));
    }

    if key.len() < MIN_KEY_LEN {
        v.errors.push(format!(
            "API key is too short ({} chars, minimum {MIN_KEY_LEN} required)",
            key.len()
        ));
    } else if key.len() < RECOMMENDED_KEY_LEN {
        v.warnings.push(format!(
            "API key is short ({} chars, recommend {RECOMMENDED_KEY_LEN}+)",
            key.len()
        ));
    }

    let has_upper = key.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = key.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = key.chars().any(|c| c.is_ascii_digit());
    let char_types = [has_upper, has_lower, has_digit]
        .iter()
        .filter(|&&b| b)
        .count();
    if char_types < 2 {
        v.warnings
            .push("API key lacks complexity (use mix of letters and numbers)".to_string());
    }

    v
}

/// Validate the configured key at startup, logging warnings and failing on
/// errors. A missing key is allowed (the deployment may not authenticate).
pub fn check_configured_key(key: Option<&str>) -> Result<()> {
    let Some(key) = key else {
        tracing::warn!("no API key configured; all callers are unauthenticated");
        return Ok(());
    };

    let validation = validate_api_key(key);
    for warning in &validation.warnings {
        tracing::warn!(%warning, "API key warning");
    }
    if let Some(first) = validation.errors.first() {
        for error in &validation.errors {
            tracing::error!(%error, "API key rejected");
        }
        return Err(Error::Config(first.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_exact_match() {
        assert!(verify_api_key(
            Some("Correct-Horse-Battery-42"),
            Some("Correct-Horse-Battery-42")
        ));
    }

    #[test]
    fn test_verify_rejects_mismatch_and_absence() {
        assert!(!verify_api_key(Some("a"), Some("b")));
        assert!(!verify_api_key(None, Some("configured")));
        assert!(!verify_api_key(Some("anything"), None));
        assert!(!verify_api_key(None, None));
    }

    #[test]
    fn test_placeholder_keys_are_errors() {
        let v = validate_api_key("changeme");
        assert!(!v.errors.is_empty());
        let v = validate_api_key("CHANGEME");
        assert!(!v.errors.is_empty());
    }

    #[test]
    fn test_short_key_is_error_medium_is_warning() {
        let v = validate_api_key("short1A");
        assert!(v.errors.iter().any(|e| e.contains("too short")));

        let v = validate_api_key("Abcdef1234567890xyz");
        assert!(v.errors.is_empty());
        assert!(v.warnings.iter().any(|w| w.contains("short")));
    }

    #[test]
    fn test_strong_key_passes_clean() {
        let v = validate_api_key("A1b2C3d4E5f6G7h8I9j0K1l2M3n4O5p6");
        assert!(v.errors.is_empty());
        assert!(v.warnings.is_empty());
    }
}
