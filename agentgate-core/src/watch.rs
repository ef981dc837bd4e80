//! Watch coordinator
//!
//! Poll-based emulation of a push stream: one lightweight task per active
//! subscription polls its thread for messages past the last-seen cursor and
//! emits them in ascending id order. The strictly-increasing cursor makes
//! delivery idempotent per subscription; no event is ever emitted twice.
//!
//! Cancellation is observable without relying on garbage collection:
//! dropping the subscription aborts the task, and a consumer that merely
//! stops reading closes the channel, which the task notices on the next
//! tick boundary and exits, releasing its polling timer.

use crate::redact::{clean_text, Redactor};
use crate::source::{MessageQuery, SourceHandle};
use crate::types::{Message, TimeRange};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Messages fetched per poll tick.
const POLL_BATCH_LIMIT: usize = 200;

/// Parameters for one watch subscription.
#[derive(Debug, Clone)]
pub struct WatchParams {
    pub thread_id: i64,
    /// Resume after this cursor; `None` starts at the thread's current tip
    pub since_id: Option<i64>,
    pub interval: Duration,
    pub include_attachments: bool,
}

/// Registry of active watch tasks.
pub struct WatchCoordinator {
    next_id: AtomicU64,
    active: Arc<Mutex<HashSet<u64>>>,
}

impl Default for WatchCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchCoordinator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Number of live subscriptions (for diagnostics).
    pub fn active_subscriptions(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Spawn a polling task for one subscription. Capability and rate
    /// checks happen at subscribe time, in the gateway, not here.
    pub(crate) fn subscribe(
        &self,
        handle: SourceHandle,
        redactor: Arc<dyn Redactor>,
        params: WatchParams,
    ) -> WatchSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.active);
        registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id);

        let (tx, rx) = mpsc::channel(64);
        let (started_tx, started_rx) = oneshot::channel();
        let task_registry = Arc::clone(&registry);
        let task = tokio::spawn(async move {
            run_watch(handle, redactor, params, tx, started_tx, id).await;
            task_registry
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&id);
            tracing::debug!(subscription = id, "watch task ended");
        });

        WatchSubscription {
            id,
            rx,
            task,
            registry,
            start: Some(started_rx),
        }
    }
}

async fn run_watch(
    handle: SourceHandle,
    redactor: Arc<dyn Redactor>,
    params: WatchParams,
    tx: mpsc::Sender<Message>,
    started: oneshot::Sender<i64>,
    id: u64,
) {
    let mut cursor = match params.since_id {
        Some(cursor) => cursor,
        None => initial_cursor(&handle, params.thread_id).await,
    };
    let _ = started.send(cursor);
    tracing::debug!(
        subscription = id,
        thread_id = params.thread_id,
        cursor,
        "watch started"
    );

    loop {
        tokio::select! {
            _ = tx.closed() => return,
            _ = tokio::time::sleep(params.interval) => {}
        }

        // Drain the backlog within one tick: a full batch means more
        // messages may remain past the cursor, so poll again immediately.
        loop {
            let query = MessageQuery {
                thread_id: params.thread_id,
                limit: POLL_BATCH_LIMIT,
                range: TimeRange::all(),
                participants: Vec::new(),
                include_attachments: params.include_attachments,
                since_id: Some(cursor),
            };
            let mut batch = match handle.list_messages(query).await {
                Ok(batch) => batch,
                Err(e) => {
                    // Detail is already in the logs; end the stream rather
                    // than spin against a failing store.
                    tracing::warn!(subscription = id, error = %e, "watch poll failed, closing stream");
                    return;
                }
            };

            let full = batch.len() >= POLL_BATCH_LIMIT;
            batch.retain(|m| m.id > cursor);
            batch.sort_by_key(|m| m.id);
            for mut message in batch {
                cursor = message.id;
                message.text = message
                    .text
                    .as_deref()
                    .map(|t| redactor.redact(&clean_text(t)));
                if tx.send(message).await.is_err() {
                    return;
                }
            }
            if !full {
                break;
            }
        }
    }
}

/// Current tip of the thread, so a fresh subscription only sees messages
/// that arrive after it.
async fn initial_cursor(handle: &SourceHandle, thread_id: i64) -> i64 {
    match handle
        .list_messages(MessageQuery::for_thread(thread_id, POLL_BATCH_LIMIT))
        .await
    {
        Ok(messages) => messages.iter().map(|m| m.id).max().unwrap_or(0),
        Err(e) => {
            tracing::warn!(thread_id, error = %e, "could not read thread tip, starting at 0");
            0
        }
    }
}

/// A live watch stream. Events arrive in strictly ascending message id
/// order. Dropping the subscription cancels the polling task.
pub struct WatchSubscription {
    id: u64,
    rx: mpsc::Receiver<Message>,
    task: JoinHandle<()>,
    registry: Arc<Mutex<HashSet<u64>>>,
    start: Option<oneshot::Receiver<i64>>,
}

impl WatchSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cursor the stream started from: the caller's `since_id`, or the
    /// thread tip resolved at subscribe time. Only new messages past this
    /// cursor are ever emitted. Returns `None` after the first call, or if
    /// the task ended before resolving.
    pub async fn start_cursor(&mut self) -> Option<i64> {
        match self.start.take() {
            Some(rx) => rx.await.ok(),
            None => None,
        }
    }

    /// Next event, or `None` when the stream has ended.
    pub async fn next_event(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

impl Drop for WatchSubscription {
    fn drop(&mut self) {
        self.task.abort();
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redact::NoopRedactor;
    use crate::source::{MessageSource, OutboundMessage, SourceError};
    use crate::types::Thread;
    use chrono::Utc;

    /// In-memory source whose message log can grow between polls.
    struct GrowingSource {
        messages: Mutex<Vec<Message>>,
    }

    impl GrowingSource {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                messages: Mutex::new(Vec::new()),
            })
        }

        fn append(&self, id: i64, text: &str) {
            self.messages.lock().unwrap().push(Message {
                id,
                thread_id: 1,
                guid: format!("guid-{id}"),
                sender: Some("+15550001".to_string()),
                text: Some(text.to_string()),
                created_at: Utc::now(),
                is_from_me: false,
                is_read: false,
                attachments: Vec::new(),
            });
        }
    }

    impl MessageSource for GrowingSource {
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
            let messages = self.messages.lock().unwrap();
            let mut matching: Vec<Message> = messages
                .iter()
                .filter(|m| query.since_id.map_or(true, |c| m.id > c))
                .cloned()
                .collect();
            matching.sort_by_key(|m| m.id);
            if query.since_id.is_some() {
                // Cursor queries keep the oldest matches when over the limit
                matching.truncate(query.limit);
            } else {
                let skip = matching.len().saturating_sub(query.limit);
                matching.drain(..skip);
            }
            Ok(matching)
        }
        fn send(&self, _outbound: &OutboundMessage) -> std::result::Result<(), SourceError> {
            Ok(())
        }
    }

    /// Receive the next event with a generous bound so a stuck stream
    /// fails the test instead of hanging it.
    async fn recv(sub: &mut WatchSubscription) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(2), sub.next_event())
            .await
            .expect("timed out waiting for watch event")
    }

    fn watch_params(since_id: Option<i64>) -> WatchParams {
        WatchParams {
            thread_id: 1,
            since_id,
            interval: Duration::from_millis(5),
            include_attachments: false,
        }
    }

    fn subscription(
        coordinator: &WatchCoordinator,
        source: &Arc<GrowingSource>,
        since_id: Option<i64>,
    ) -> WatchSubscription {
        let handle = SourceHandle::new(
            Arc::clone(source) as Arc<dyn MessageSource>,
            Duration::from_secs(5),
        );
        coordinator.subscribe(handle, Arc::new(NoopRedactor), watch_params(since_id))
    }

    #[tokio::test]
    async fn test_emits_new_messages_in_ascending_order() {
        let source = GrowingSource::new();
        let coordinator = WatchCoordinator::new();
        let mut sub = subscription(&coordinator, &source, Some(0));

        source.append(3, "third");
        source.append(1, "first");
        source.append(2, "second");

        let a = recv(&mut sub).await.unwrap();
        let b = recv(&mut sub).await.unwrap();
        let c = recv(&mut sub).await.unwrap();
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_cursor_advances_and_never_repeats() {
        let source = GrowingSource::new();
        let coordinator = WatchCoordinator::new();
        let mut sub = subscription(&coordinator, &source, Some(0));

        source.append(1, "one");
        assert_eq!(recv(&mut sub).await.unwrap().id, 1);

        // Nothing new: several poll ticks must produce no events
        let quiet = tokio::time::timeout(Duration::from_millis(50), sub.next_event()).await;
        assert!(quiet.is_err());

        source.append(2, "two");
        assert_eq!(recv(&mut sub).await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_fresh_subscription_starts_at_tip() {
        let source = GrowingSource::new();
        source.append(1, "old");
        source.append(2, "old");

        let coordinator = WatchCoordinator::new();
        let mut sub = subscription(&coordinator, &source, None);

        // Wait until the task has taken its tip snapshot before appending,
        // so the new message is unambiguously past the start cursor
        assert_eq!(sub.start_cursor().await, Some(2));

        // Backlog is skipped; only the new message arrives
        source.append(3, "new");
        let event = recv(&mut sub).await.unwrap();
        assert_eq!(event.id, 3);
    }

    #[tokio::test]
    async fn test_backlog_larger_than_poll_batch_fully_drained() {
        let source = GrowingSource::new();
        let backlog = POLL_BATCH_LIMIT as i64 + 50;
        for id in 1..=backlog {
            source.append(id, "queued");
        }

        let coordinator = WatchCoordinator::new();
        let mut sub = subscription(&coordinator, &source, Some(0));

        // Every message arrives exactly once in ascending order, even
        // though the backlog spans multiple poll batches
        for expected in 1..=backlog {
            assert_eq!(recv(&mut sub).await.unwrap().id, expected);
        }
    }

    #[tokio::test]
    async fn test_drop_cancels_and_deregisters() {
        let source = GrowingSource::new();
        let coordinator = WatchCoordinator::new();
        let sub = subscription(&coordinator, &source, Some(0));
        assert_eq!(coordinator.active_subscriptions(), 1);

        drop(sub);
        assert_eq!(coordinator.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_independent_subscriptions() {
        let source = GrowingSource::new();
        let coordinator = WatchCoordinator::new();
        let mut sub_a = subscription(&coordinator, &source, Some(0));
        let mut sub_b = subscription(&coordinator, &source, Some(0));
        assert_eq!(coordinator.active_subscriptions(), 2);

        source.append(1, "fanout");
        assert_eq!(recv(&mut sub_a).await.unwrap().id, 1);
        assert_eq!(recv(&mut sub_b).await.unwrap().id, 1);
    }
}
