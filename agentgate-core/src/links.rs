//! Bounded link extraction
//!
//! Scans message history most-recent-first, pulls well-formed HTTP/HTTPS
//! URLs out of body text, and returns each distinct URL once with a short
//! context excerpt. Deduplication is by exact URL string: tracking-parameter
//! variants of the same destination count as distinct links.

use crate::error::{Error, Result};
use crate::redact::clean_text;
use crate::source::{MessageQuery, MessageScope, SourceHandle};
use crate::types::{LinkRecord, TimeRange};
use regex::Regex;
use std::collections::HashSet;

const CONTEXT_PAD_CHARS: usize = 50;

/// Parameters for one extraction call.
#[derive(Debug, Clone)]
pub struct LinkParams {
    pub scope: MessageScope,
    pub range: TimeRange,
    /// `Some(true)` = only my links, `Some(false)` = only theirs,
    /// `None` = all
    pub from_me: Option<bool>,
    /// Maximum messages examined
    pub message_scan_limit: usize,
    /// Maximum distinct URLs returned
    pub unique_link_limit: usize,
}

/// URL extractor with a pre-compiled pattern.
pub struct LinkExtractor {
    url_pattern: Regex,
}

impl LinkExtractor {
    pub fn new() -> Result<Self> {
        // scheme, dotted domain, optional path up to whitespace/closers
        let url_pattern = Regex::new(r#"(?i)https?://(?:[\w-]+\.)+[\w-]+(?:/[^\s<>"')\]]*)?"#)
            .map_err(|e| Error::Config(format!("bad URL pattern: {e}")))?;
        Ok(Self { url_pattern })
    }

    /// Run a bounded extraction pass. Links come back most recent first.
    pub(crate) async fn extract(
        &self,
        handle: &SourceHandle,
        params: &LinkParams,
    ) -> Result<Vec<LinkRecord>> {
        params.range.validate()?;

        let Some(thread_id) = handle.resolve_scope(&params.scope).await? else {
            return Ok(Vec::new());
        };

        let fetched = handle
            .list_messages(MessageQuery {
                thread_id,
                limit: params.message_scan_limit,
                range: params.range,
                participants: Vec::new(),
                include_attachments: false,
                since_id: None,
            })
            .await?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut links = Vec::new();
        let mut examined = 0usize;

        for message in fetched.iter().rev() {
            if examined >= params.message_scan_limit || links.len() >= params.unique_link_limit {
                break;
            }
            examined += 1;

            match params.from_me {
                Some(true) if !message.is_from_me => continue,
                Some(false) if message.is_from_me => continue,
                _ => {}
            }
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            let cleaned = clean_text(text);

            for found in self.url_pattern.find_iter(&cleaned) {
                if links.len() >= params.unique_link_limit {
                    break;
                }
                let url = found.as_str().to_string();
                if !seen.insert(url.clone()) {
                    continue;
                }
                links.push(LinkRecord {
                    context: context_window(&cleaned, found.start(), found.end()),
                    url,
                    message_id: message.id,
                    sender: if message.is_from_me {
                        Some("me".to_string())
                    } else {
                        message.sender.clone()
                    },
                    sent_at: message.created_at,
                    is_from_me: message.is_from_me,
                });
            }
        }

        tracing::debug!(
            thread_id,
            examined,
            found = links.len(),
            "link extraction complete"
        );
        Ok(links)
    }
}

/// Excerpt around a URL match, padded by up to [`CONTEXT_PAD_CHARS`]
/// characters on each side and ellipsized where truncated. Boundaries are
/// snapped to char boundaries so multi-byte text never splits.
fn context_window(text: &str, match_start: usize, match_end: usize) -> String {
    let mut start = match_start;
    for _ in 0..CONTEXT_PAD_CHARS {
        if start == 0 {
            break;
        }
        start -= 1;
        while start > 0 && !text.is_char_boundary(start) {
            start -= 1;
        }
    }
    let mut end = match_end;
    for _ in 0..CONTEXT_PAD_CHARS {
        if end >= text.len() {
            break;
        }
        end += 1;
        while end < text.len() && !text.is_char_boundary(end) {
            end += 1;
        }
    }

    let mut context = text[start..end].to_string();
    if start > 0 {
        context = format!("...{context}");
    }
    if end < text.len() {
        context = format!("{context}...");
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MessageSource, OutboundMessage, SourceError};
    use crate::types::{Message, Thread};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedSource {
        messages: Vec<Message>,
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
            let skip = self.messages.len().saturating_sub(query.limit);
            Ok(self.messages[skip..].to_vec())
        }
        fn send(&self, _outbound: &OutboundMessage) -> std::result::Result<(), SourceError> {
            Ok(())
        }
    }

    fn message(id: i64, text: &str, is_from_me: bool) -> Message {
        Message {
            id,
            thread_id: 3,
            guid: format!("guid-{id}"),
            sender: Some("+15550001".to_string()),
            text: Some(text.to_string()),
            created_at: Utc::now() - ChronoDuration::minutes(100 - id),
            is_from_me,
            is_read: true,
            attachments: Vec::new(),
        }
    }

    fn handle(messages: Vec<Message>) -> SourceHandle {
        SourceHandle::new(Arc::new(FixedSource { messages }), Duration::from_secs(5))
    }

    fn params(limit: usize) -> LinkParams {
        LinkParams {
            scope: MessageScope::Thread(3),
            range: TimeRange::all(),
            from_me: None,
            message_scan_limit: 100,
            unique_link_limit: limit,
        }
    }

    #[tokio::test]
    async fn test_no_duplicate_urls() {
        let handle = handle(vec![
            message(1, "see https://example.com/a", false),
            message(2, "again https://example.com/a", false),
            message(3, "and https://example.com/b", false),
        ]);
        let links = LinkExtractor::new()
            .unwrap()
            .extract(&handle, &params(50))
            .await
            .unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/b", "https://example.com/a"]);
        // Duplicate URL carries the most recent message id
        assert_eq!(links[1].message_id, 2);
    }

    #[tokio::test]
    async fn test_tracking_variants_are_distinct() {
        let handle = handle(vec![message(
            1,
            "https://example.com/x?utm=a and https://example.com/x?utm=b",
            false,
        )]);
        let links = LinkExtractor::new()
            .unwrap()
            .extract(&handle, &params(50))
            .await
            .unwrap();
        assert_eq!(links.len(), 2);
    }

    #[tokio::test]
    async fn test_unique_link_limit() {
        let handle = handle(vec![
            message(1, "https://a.example.com", false),
            message(2, "https://b.example.com", false),
            message(3, "https://c.example.com", false),
        ]);
        let links = LinkExtractor::new()
            .unwrap()
            .extract(&handle, &params(2))
            .await
            .unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].url, "https://c.example.com");
    }

    #[tokio::test]
    async fn test_direction_filter() {
        let handle = handle(vec![
            message(1, "mine https://me.example.com", true),
            message(2, "theirs https://them.example.com", false),
        ]);
        let extractor = LinkExtractor::new().unwrap();

        let mut p = params(50);
        p.from_me = Some(false);
        let links = extractor.extract(&handle, &p).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://them.example.com");
        assert!(!links[0].is_from_me);

        p.from_me = Some(true);
        let links = extractor.extract(&handle, &p).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].sender.as_deref(), Some("me"));
    }

    #[tokio::test]
    async fn test_trailing_punctuation_excluded() {
        let handle = handle(vec![message(
            1,
            "look (https://example.com/path) now",
            false,
        )]);
        let links = LinkExtractor::new()
            .unwrap()
            .extract(&handle, &params(50))
            .await
            .unwrap();
        assert_eq!(links[0].url, "https://example.com/path");
    }

    #[test]
    fn test_context_window_ellipsis_and_boundaries() {
        let text = format!("{}https://example.com{}", "a".repeat(80), "b".repeat(80));
        let ctx = context_window(&text, 80, 80 + "https://example.com".len());
        assert!(ctx.starts_with("..."));
        assert!(ctx.ends_with("..."));
        assert!(ctx.contains("https://example.com"));

        // Multi-byte neighbors must not split
        let text = "héllo wörld https://example.com déjà vu";
        let start = text.find("https").unwrap();
        let ctx = context_window(text, start, start + "https://example.com".len());
        assert!(ctx.contains("https://example.com"));
    }
}
