//! Core domain types for agentgate
//!
//! These types are the engine's view of the external message store and the
//! wire shapes returned to callers.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Thread** | A conversation grouping of messages with one or more participants |
//! | **Cursor** | A monotonically increasing message id used to track watch progress |
//! | **Scan horizon** | The bounded number of messages a search/extraction pass examines |
//! | **Allowlist** | The explicit set of permitted send recipients; empty means unrestricted |
//! | **Capability** | An independently toggleable permission gating one operation class |
//!
//! Messages are immutable upstream; the engine only reads them and redacts a
//! *copy* of the text for transmission. Threads are likewise immutable here
//! except for `last_message_at`, which advances as new messages appear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Threads
// ============================================

/// Participant in a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Phone number, email, or service handle
    pub handle: String,
    /// Display name, if the store knows one
    pub display_name: Option<String>,
}

/// A message thread (conversation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    /// Opaque store-assigned thread id
    pub id: i64,
    /// Display name, if any
    pub name: Option<String>,
    /// Canonical identity string for the thread
    pub identifier: Option<String>,
    /// Service tag (primary vs fallback transport)
    pub service: Option<String>,
    /// Timestamp of the most recent message; advances monotonically
    pub last_message_at: Option<DateTime<Utc>>,
    /// Ordered participant identities
    #[serde(default)]
    pub participants: Vec<Participant>,
}

// ============================================
// Messages
// ============================================

/// Attachment metadata carried on a message.
///
/// The `original_path` is upstream-provided and must lie under the fixed
/// attachment root before the engine will serve it (see the sandbox module).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentMeta {
    pub filename: Option<String>,
    /// Absolute path as reported by the store
    pub original_path: Option<String>,
    pub mime_type: Option<String>,
    pub total_bytes: Option<u64>,
    /// The upstream file could not be located at read time (files may be
    /// evicted/offloaded by the OS independently of this engine)
    #[serde(default)]
    pub missing: bool,
}

/// A single message.
///
/// `id` is monotonically increasing per store and doubles as the watch
/// cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// Owning thread id
    pub thread_id: i64,
    /// Store-assigned globally unique string
    pub guid: String,
    /// Sender handle; `None` for some system messages
    pub sender: Option<String>,
    /// Body text; redacted copy on the way out
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_from_me: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
}

// ============================================
// Contacts
// ============================================

/// A contact in the directory.
///
/// Invariant: at least one of `phone`, `email`, `handle` is set. Enforced
/// on upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Assigned on creation
    pub id: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or updating a contact.
///
/// Any one of phone/email/handle acts as a natural key for the merge: an
/// upsert matching an existing contact on one of them updates that record
/// instead of duplicating it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactUpsert {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub handle: Option<String>,
}

/// Outcome of contact resolution.
///
/// Ambiguity is a first-class result, not an error: callers must
/// disambiguate rather than have the engine pick one arbitrarily.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Found { contact: Contact },
    Ambiguous { candidates: Vec<Contact> },
    NotFound,
}

// ============================================
// Links
// ============================================

/// A URL extracted from message history, with surrounding context.
///
/// Derived on every request, never stored. Deduplication is by exact URL
/// string: tracking-parameter variants of the same destination are treated
/// as distinct links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRecord {
    pub url: String,
    pub message_id: i64,
    pub sender: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub is_from_me: bool,
    /// Bounded excerpt of the message text around the URL
    pub context: String,
}

// ============================================
// Time ranges
// ============================================

/// Half-open time window for scoping scans. `None` bounds are unbounded.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Unbounded range
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether a timestamp falls inside the range
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if ts > end {
                return false;
            }
        }
        true
    }

    /// Validates that start precedes end when both are given
    pub fn validate(&self) -> crate::error::Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(crate::error::Error::InvalidInput(format!(
                    "time range start {start} is after end {end}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_range_contains() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let range = TimeRange {
            start: Some(start),
            end: Some(end),
        };

        let inside = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

        assert!(range.contains(inside));
        assert!(!range.contains(before));
        assert!(!range.contains(after));
        assert!(TimeRange::all().contains(inside));
    }

    #[test]
    fn test_time_range_validate_rejects_inverted() {
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange {
            start: Some(start),
            end: Some(end),
        };
        assert!(range.validate().is_err());
    }

    #[test]
    fn test_resolution_serializes_with_status_tag() {
        let json = serde_json::to_string(&Resolution::NotFound).unwrap();
        assert!(json.contains("\"status\":\"not_found\""));
    }
}
