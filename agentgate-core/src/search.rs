//! Bounded message search
//!
//! A deliberate scan horizon, not an exhaustive search: the engine examines
//! at most `scan_limit` messages and returns at most `result_limit`
//! matches, stopping as soon as either bound is hit. Searching further back
//! means asking again with a larger `scan_limit`.

use crate::error::{Error, Result};
use crate::redact::clean_text;
use crate::source::{MessageQuery, MessageScope, SourceHandle};
use crate::types::{Message, TimeRange};

/// Parameters for one search call.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Case-insensitive substring to match against body text
    pub query: String,
    pub scope: MessageScope,
    pub range: TimeRange,
    /// Maximum messages examined
    pub scan_limit: usize,
    /// Maximum matches returned
    pub result_limit: usize,
}

/// Run a bounded search. Matches come back most recent first, preserving
/// source ordering.
pub(crate) async fn scan(handle: &SourceHandle, params: &SearchParams) -> Result<Vec<Message>> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(Error::InvalidInput("search query must not be empty".to_string()));
    }
    params.range.validate()?;

    let Some(thread_id) = handle.resolve_scope(&params.scope).await? else {
        return Ok(Vec::new());
    };

    let fetched = handle
        .list_messages(MessageQuery {
            thread_id,
            limit: params.scan_limit,
            range: params.range,
            participants: Vec::new(),
            include_attachments: false,
            since_id: None,
        })
        .await?;

    let needle = query.to_lowercase();
    let mut matches = Vec::new();
    let mut examined = 0usize;

    // Store order is oldest-first; walk backwards for most-recent-first.
    for message in fetched.iter().rev() {
        if examined >= params.scan_limit || matches.len() >= params.result_limit {
            break;
        }
        examined += 1;

        let Some(text) = message.text.as_deref() else {
            continue;
        };
        if clean_text(text).to_lowercase().contains(&needle) {
            matches.push(message.clone());
        }
    }

    tracing::debug!(
        thread_id,
        examined,
        found = matches.len(),
        scan_limit = params.scan_limit,
        "search scan complete"
    );
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MessageSource, OutboundMessage, SourceError};
    use crate::types::Thread;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedSource {
        messages: Vec<Message>,
    }

    impl FixedSource {
        fn with_bodies(bodies: &[&str]) -> Self {
            let base = Utc::now() - ChronoDuration::hours(1);
            let messages = bodies
                .iter()
                .enumerate()
                .map(|(i, body)| Message {
                    id: i as i64 + 1,
                    thread_id: 7,
                    guid: format!("guid-{i}"),
                    sender: Some("+15550001".to_string()),
                    text: Some(body.to_string()),
                    created_at: base + ChronoDuration::seconds(i as i64),
                    is_from_me: false,
                    is_read: true,
                    attachments: Vec::new(),
                })
                .collect();
            Self { messages }
        }
    }

    impl MessageSource for FixedSource {
        fn list_threads(&self, _limit: usize) -> std::result::Result<Vec<Thread>, SourceError> {
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
            query: &MessageQuery,
        ) -> std::result::Result<Vec<Message>, SourceError> {
            // Window of the most recent `limit`, oldest-first like the store
            let skip = self.messages.len().saturating_sub(query.limit);
            Ok(self.messages[skip..].to_vec())
        }
        fn send(&self, _outbound: &OutboundMessage) -> std::result::Result<(), SourceError> {
            Ok(())
        }
    }

    fn handle(source: FixedSource) -> SourceHandle {
        SourceHandle::new(Arc::new(source), Duration::from_secs(5))
    }

    fn params(query: &str, scan_limit: usize, result_limit: usize) -> SearchParams {
        SearchParams {
            query: query.to_string(),
            scope: MessageScope::Thread(7),
            range: TimeRange::all(),
            scan_limit,
            result_limit,
        }
    }

    #[tokio::test]
    async fn test_case_insensitive_substring_match() {
        let handle = handle(FixedSource::with_bodies(&[
            "Pizza tonight?",
            "no thanks",
            "PIZZA tomorrow then",
        ]));
        let hits = scan(&handle, &params("pizza", 100, 100)).await.unwrap();
        assert_eq!(hits.len(), 2);
        // Most recent first
        assert_eq!(hits[0].id, 3);
        assert_eq!(hits[1].id, 1);
    }

    #[tokio::test]
    async fn test_result_limit_stops_early() {
        let handle = handle(FixedSource::with_bodies(&["hit", "hit", "hit", "hit"]));
        let hits = scan(&handle, &params("hit", 100, 2)).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 4);
    }

    #[tokio::test]
    async fn test_scan_limit_bounds_the_horizon() {
        // Only the newest 2 messages are inside the horizon; the old match
        // is missed by design.
        let handle = handle(FixedSource::with_bodies(&["needle", "chaff", "chaff"]));
        let hits = scan(&handle, &params("needle", 2, 10)).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let handle = handle(FixedSource::with_bodies(&["anything"]));
        let err = scan(&handle, &params("   ", 10, 10)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_unknown_recipient_returns_empty() {
        let handle = handle(FixedSource::with_bodies(&["anything"]));
        let mut p = params("any", 10, 10);
        p.scope = MessageScope::Recipient("nobody@example.com".to_string());
        let hits = scan(&handle, &p).await.unwrap();
        assert!(hits.is_empty());
    }
}
