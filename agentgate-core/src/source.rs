//! Message source adapter
//!
//! The narrow interface onto the opaque external message store. The store
//! is an external collaborator (a subprocess or external API) and every
//! call to it is treated as blocking and potentially slow: the engine runs
//! each call on its own blocking worker with an upper-bound timeout so a
//! hang fails that one request, never the engine.
//!
//! Failure detail (stderr, exit status) stays in server-side logs; callers
//! only ever see a generic upstream message.

use crate::error::{Error, Result};
use crate::types::{Message, Thread, TimeRange};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Scope for message queries: a known thread or a recipient identity to
/// resolve into one.
#[derive(Debug, Clone)]
pub enum MessageScope {
    Thread(i64),
    Recipient(String),
}

/// Query parameters for listing messages from one thread.
#[derive(Debug, Clone)]
pub struct MessageQuery {
    pub thread_id: i64,
    /// Maximum messages the store may return
    pub limit: usize,
    pub range: TimeRange,
    /// Restrict to messages involving these participant identities
    pub participants: Vec<String>,
    pub include_attachments: bool,
    /// Only messages with id strictly greater than this cursor
    pub since_id: Option<i64>,
}

impl MessageQuery {
    pub fn for_thread(thread_id: i64, limit: usize) -> Self {
        Self {
            thread_id,
            limit,
            range: TimeRange::all(),
            participants: Vec::new(),
            include_attachments: false,
            since_id: None,
        }
    }
}

/// An outbound message handed to the store's send primitive.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub to: String,
    pub text: Option<String>,
    pub files: Vec<PathBuf>,
    /// Transport hint (primary vs fallback); `None` lets the store choose
    pub service: Option<String>,
}

/// Error reported by a message source implementation.
///
/// `detail` and `exit_code` are diagnostic-only and never surfaced to
/// callers.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
    pub detail: Option<String>,
    pub exit_code: Option<i32>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            exit_code: None,
        }
    }
}

/// The narrow read/send interface onto the external store.
///
/// Implementations are blocking; the engine offloads every call. Messages
/// come back oldest-first within the requested window, ids monotonically
/// increasing per store. Truncation to `limit` keeps the most recent
/// messages, except when `since_id` is set: a cursor query keeps the
/// *oldest* matching messages, so a consumer can page forward through a
/// backlog without gaps.
pub trait MessageSource: Send + Sync + 'static {
    fn list_threads(&self, limit: usize) -> std::result::Result<Vec<Thread>, SourceError>;
    fn get_thread(&self, thread_id: i64) -> std::result::Result<Option<Thread>, SourceError>;
    /// Find the thread containing this participant identity, if any
    fn lookup_thread(&self, identity: &str) -> std::result::Result<Option<Thread>, SourceError>;
    fn list_messages(&self, query: &MessageQuery) -> std::result::Result<Vec<Message>, SourceError>;
    fn send(&self, outbound: &OutboundMessage) -> std::result::Result<(), SourceError>;
}

/// Shared handle that offloads source calls to blocking workers and bounds
/// them with a timeout.
#[derive(Clone)]
pub struct SourceHandle {
    source: Arc<dyn MessageSource>,
    timeout: Duration,
}

impl SourceHandle {
    pub fn new(source: Arc<dyn MessageSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    async fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn MessageSource) -> std::result::Result<T, SourceError> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || f(source.as_ref()));
        match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                tracing::warn!(op, timeout_secs = self.timeout.as_secs(), "source call timed out");
                Err(Error::Upstream("message store call timed out".to_string()))
            }
            Ok(Err(join_err)) => {
                tracing::error!(op, error = %join_err, "source worker failed");
                Err(Error::Upstream("message store worker failed".to_string()))
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(
                    op,
                    error = %e.message,
                    detail = e.detail.as_deref().unwrap_or(""),
                    exit_code = e.exit_code,
                    "source call failed"
                );
                Err(Error::Upstream("message store command failed".to_string()))
            }
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    pub async fn list_threads(&self, limit: usize) -> Result<Vec<Thread>> {
        self.call("list_threads", move |s| s.list_threads(limit)).await
    }

    pub async fn get_thread(&self, thread_id: i64) -> Result<Option<Thread>> {
        self.call("get_thread", move |s| s.get_thread(thread_id)).await
    }

    pub async fn lookup_thread(&self, identity: String) -> Result<Option<Thread>> {
        self.call("lookup_thread", move |s| s.lookup_thread(&identity))
            .await
    }

    pub async fn list_messages(&self, query: MessageQuery) -> Result<Vec<Message>> {
        self.call("list_messages", move |s| s.list_messages(&query))
            .await
    }

    pub async fn send(&self, outbound: OutboundMessage) -> Result<()> {
        self.call("send", move |s| s.send(&outbound)).await
    }

    /// Resolve a query scope to a concrete thread id. `Ok(None)` means no
    /// thread exists for the recipient.
    pub async fn resolve_scope(&self, scope: &MessageScope) -> Result<Option<i64>> {
        match scope {
            MessageScope::Thread(id) => Ok(Some(*id)),
            MessageScope::Recipient(identity) => Ok(self
                .lookup_thread(identity.clone())
                .await?
                .map(|thread| thread.id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowSource;

    impl MessageSource for SlowSource {
        fn list_threads(&self, _limit: usize) -> std::result::Result<Vec<Thread>, SourceError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(Vec::new())
        }
        fn get_thread(&self, _id: i64) -> std::result::Result<Option<Thread>, SourceError> {
            Ok(None)
        }
        fn lookup_thread(&self, _id: &str) -> std::result::Result<Option<Thread>, SourceError> {
            Ok(None)
        }
        fn list_messages(
            &self,
            _query: &MessageQuery,
        ) -> std::result::Result<Vec<Message>, SourceError> {
            Err(SourceError {
                message: "boom".to_string(),
                detail: Some("stack trace here".to_string()),
                exit_code: Some(7),
            })
        }
        fn send(&self, _outbound: &OutboundMessage) -> std::result::Result<(), SourceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timeout_fails_the_request() {
        let handle = SourceHandle::new(Arc::new(SlowSource), Duration::from_millis(10));
        let err = handle.list_threads(5).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_source_error_is_generic_to_caller() {
        let handle = SourceHandle::new(Arc::new(SlowSource), Duration::from_secs(5));
        let err = handle
            .list_messages(MessageQuery::for_thread(1, 10))
            .await
            .unwrap_err();
        // Callers never see the upstream detail
        let rendered = err.to_string();
        assert!(!rendered.contains("stack trace"));
        assert!(!rendered.contains("boom"));
        assert!(matches!(err, Error::Upstream(_)));
    }
}
