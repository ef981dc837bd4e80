//! Send authorization pipeline
//!
//! Per send/reply request:
//! `received -> capability -> rate limit -> allowlist -> known-recipient ->
//! dispatch`. The allowlist check runs strictly after rate accounting, so a
//! blocked-recipient attempt still costs the caller budget. The
//! known-recipient step only applies when `allow_unknown_recipients` is
//! off. `dry_run` exercises every check identically but never reaches the
//! store's send primitive.

use crate::contacts::normalize_identity;
use crate::error::{Error, Result};
use crate::source::{MessageQuery, OutboundMessage, SourceHandle};
use serde::Serialize;
use std::path::PathBuf;

/// How many recent messages to inspect when inferring a reply recipient.
const REPLY_PROBE_LIMIT: usize = 10;

/// A send request as received from a caller.
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// Recipient phone number, email, or handle
    pub to: String,
    pub text: Option<String>,
    /// Local files to attach; validated against the outbound allowed dirs
    pub files: Vec<PathBuf>,
    /// Transport hint, `None` lets the store choose
    pub service: Option<String>,
    /// Run every check, skip the dispatch
    pub dry_run: bool,
}

/// A reply request: explicit recipient, or a thread to infer one from.
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub thread_id: Option<i64>,
    pub recipient: Option<String>,
    pub text: String,
    pub dry_run: bool,
}

/// Outcome of an authorized send.
#[derive(Debug, Clone, Serialize)]
pub struct SendReceipt {
    pub to: String,
    /// True when the checks passed but dispatch was skipped
    pub dry_run: bool,
    /// True when the store's send primitive was invoked
    pub dispatched: bool,
}

/// Normalized send allowlist. Empty means every recipient is permitted.
pub(crate) struct Allowlist {
    entries: Vec<String>,
}

impl Allowlist {
    pub(crate) fn new(raw: &[String]) -> Self {
        let mut entries: Vec<String> = raw
            .iter()
            .map(|e| normalize_identity(e))
            .filter(|e| !e.is_empty())
            .collect();
        entries.sort();
        entries.dedup();
        Self { entries }
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Whether a recipient identity normalize-matches an entry.
    pub(crate) fn permits(&self, recipient: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let normalized = normalize_identity(recipient);
        self.entries.binary_search(&normalized).is_ok()
    }

    /// Check a recipient, naming only the offending recipient on failure
    /// (never the configured entries).
    pub(crate) fn check(&self, recipient: &str) -> Result<()> {
        if self.permits(recipient) {
            Ok(())
        } else {
            tracing::warn!(recipient, "recipient rejected by send allowlist");
            Err(Error::NotAuthorizedRecipient(recipient.to_string()))
        }
    }
}

/// Dispatch step: hand the message to the store unless this is a dry run.
/// Capability, rate, allowlist, and attachment checks have already passed.
pub(crate) async fn dispatch(handle: &SourceHandle, request: &SendRequest) -> Result<SendReceipt> {
    if request.text.as_deref().map_or(true, |t| t.trim().is_empty()) && request.files.is_empty() {
        return Err(Error::InvalidInput(
            "send needs text or at least one file".to_string(),
        ));
    }

    if request.dry_run {
        tracing::info!(to = %request.to, "dry-run send, dispatch skipped");
        return Ok(SendReceipt {
            to: request.to.clone(),
            dry_run: true,
            dispatched: false,
        });
    }

    handle
        .send(OutboundMessage {
            to: request.to.clone(),
            text: request.text.clone(),
            files: request.files.clone(),
            service: request.service.clone(),
        })
        .await?;
    tracing::info!(to = %request.to, files = request.files.len(), "message dispatched");
    Ok(SendReceipt {
        to: request.to.clone(),
        dry_run: false,
        dispatched: true,
    })
}

/// Infer the reply recipient for a thread: the most recent inbound sender,
/// falling back to the thread's first participant.
pub(crate) async fn resolve_reply_recipient(
    handle: &SourceHandle,
    thread_id: i64,
) -> Result<String> {
    let recent = handle
        .list_messages(MessageQuery::for_thread(thread_id, REPLY_PROBE_LIMIT))
        .await?;
    if let Some(sender) = recent
        .iter()
        .rev()
        .find(|m| !m.is_from_me)
        .and_then(|m| m.sender.clone())
    {
        return Ok(sender);
    }

    let thread = handle
        .get_thread(thread_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("thread {thread_id}")))?;
    thread
        .participants
        .first()
        .map(|p| p.handle.clone())
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "could not determine recipient for thread {thread_id}; send with an explicit recipient"
            ))
        })
}
