//! Error types for agentgate-core

use thiserror::Error;

/// Main error type for the agentgate-core library
///
/// Policy-class errors (`PolicyForbidden`, `RateLimited`,
/// `NotAuthorizedRecipient`, `SandboxViolation`) are terminal: they are
/// surfaced to the caller immediately and nothing is retried. Upstream
/// failures carry a generic message only; full detail stays in server-side
/// logs.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation class is disabled by configuration
    #[error("capability '{0}' is disabled")]
    PolicyForbidden(&'static str),

    /// Rate budget exhausted for the named tier
    #[error("rate limited: {0} budget exhausted")]
    RateLimited(&'static str),

    /// Recipient rejected by the send allowlist
    #[error("recipient '{0}' is not permitted")]
    NotAuthorizedRecipient(String),

    /// Unknown thread, contact, or attachment
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed query, path, or date range
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Attachment path outside the sandbox root (or nonexistent; the two
    /// are deliberately indistinguishable to the caller)
    #[error("attachment path is not accessible")]
    SandboxViolation,

    /// Message store adapter failure or timeout (generic, caller-facing)
    #[error("message store error: {0}")]
    Upstream(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for agentgate-core
pub type Result<T> = std::result::Result<T, Error>;
