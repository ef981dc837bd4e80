//! Gateway facade
//!
//! The request-time pipeline every inbound operation passes through:
//! capability check, rate accounting, the operation itself, then redaction
//! of any text payload on the way out. Watch subscriptions run the same
//! checks at subscribe time only.
//!
//! The facade is transport-agnostic; whatever HTTP/RPC layer sits in front
//! maps its requests onto these methods and its responses from their
//! results.

use crate::auth;
use crate::config::{Capability, CapabilityReport, Config};
use crate::contacts::ContactDirectory;
use crate::error::{Error, Result};
use crate::links::{LinkExtractor, LinkParams};
use crate::ratelimit::{OpClass, RateLimiter};
use crate::redact::{self, clean_text, Redactor};
use crate::sandbox::{check_outbound_files, AttachmentInfo, AttachmentSandbox};
use crate::search::{self, SearchParams};
use crate::send::{self, Allowlist, ReplyRequest, SendReceipt, SendRequest};
use crate::source::{MessageQuery, MessageScope, MessageSource, SourceHandle};
use crate::types::{Contact, ContactUpsert, LinkRecord, Message, Resolution, Thread, TimeRange};
use crate::watch::{WatchCoordinator, WatchParams, WatchSubscription};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Message access and authorization engine.
///
/// One instance per process; cheap to share behind an `Arc`. All shared
/// mutable state (rate counters, contact directory, watch registry) lives
/// behind its own lock, so concurrent requests only serialize where they
/// actually collide.
pub struct Gateway {
    config: Config,
    source: SourceHandle,
    limiter: RateLimiter,
    contacts: ContactDirectory,
    redactor: Arc<dyn Redactor>,
    allowlist: Allowlist,
    sandbox: AttachmentSandbox,
    extractor: LinkExtractor,
    watches: WatchCoordinator,
}

impl Gateway {
    /// Build the engine from a configuration snapshot and a message source.
    ///
    /// The capability set is fixed here; changing it requires a restart.
    /// Fails when the configured API key is a placeholder or too short.
    pub fn new(config: Config, source: Arc<dyn MessageSource>) -> Result<Self> {
        auth::check_configured_key(config.server.api_key.as_deref())?;

        let limiter = RateLimiter::new(
            config.limits.global_per_window,
            config.limits.send_per_window,
            Duration::from_secs(config.limits.window_secs),
        );
        let source = SourceHandle::new(
            source,
            Duration::from_secs(config.limits.upstream_timeout_secs),
        );
        let contacts = ContactDirectory::open(config.contacts.resolved_path());
        let redactor = redact::for_mode(config.pii.mode)?;
        let allowlist = Allowlist::new(&config.send.allowlist);
        let sandbox = AttachmentSandbox::new(config.attachments.resolved_root());
        let extractor = LinkExtractor::new()?;

        tracing::info!(
            allowlist_active = allowlist.is_active(),
            contacts = contacts.len(),
            "gateway ready"
        );

        Ok(Self {
            config,
            source,
            limiter,
            contacts,
            redactor,
            allowlist,
            sandbox,
            extractor,
            watches: WatchCoordinator::new(),
        })
    }

    /// Capability gate first, then rate accounting: a disabled capability
    /// never costs budget.
    fn authorize(&self, client: &str, capability: Capability, class: OpClass) -> Result<()> {
        if !self.config.capabilities.enabled(capability) {
            tracing::debug!(client, capability = capability.name(), "operation forbidden by policy");
            return Err(Error::PolicyForbidden(capability.name()));
        }
        self.limiter.check(client, class)
    }

    /// When configured to require known recipients, the recipient must
    /// carry an identity in the contact directory. Runs after the allowlist
    /// so both policies apply.
    fn ensure_known_recipient(&self, recipient: &str) -> Result<()> {
        if self.config.send.allow_unknown_recipients || self.contacts.contains_identity(recipient) {
            return Ok(());
        }
        tracing::warn!(recipient, "send to unknown recipient blocked");
        Err(Error::NotAuthorizedRecipient(recipient.to_string()))
    }

    fn redact_message(&self, mut message: Message) -> Message {
        message.text = message
            .text
            .as_deref()
            .map(|t| self.redactor.redact(&clean_text(t)));
        message
    }

    fn redact_messages(&self, messages: Vec<Message>) -> Vec<Message> {
        messages
            .into_iter()
            .map(|m| self.redact_message(m))
            .collect()
    }

    // ============================================
    // Discovery & auth
    // ============================================

    /// Whether a presented API key authenticates against the configured one.
    pub fn is_authenticated(&self, presented: Option<&str>) -> bool {
        auth::verify_api_key(presented, self.config.server.api_key.as_deref())
    }

    /// Capability discovery. Requires no capability itself; unauthenticated
    /// callers get the allowlist nulled out, never its entries.
    pub fn capabilities(&self, authenticated: bool) -> CapabilityReport {
        self.config.capability_report(authenticated)
    }

    // ============================================
    // Threads & history (read)
    // ============================================

    pub async fn list_threads(&self, client: &str, limit: usize) -> Result<Vec<Thread>> {
        self.authorize(client, Capability::Read, OpClass::Standard)?;
        self.source.list_threads(limit).await
    }

    pub async fn get_thread(&self, client: &str, thread_id: i64) -> Result<Thread> {
        self.authorize(client, Capability::Read, OpClass::Standard)?;
        self.source
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("thread {thread_id}")))
    }

    /// Find the thread for a recipient identity (phone, email, or handle).
    pub async fn lookup_thread(&self, client: &str, recipient: &str) -> Result<Thread> {
        self.authorize(client, Capability::Read, OpClass::Standard)?;
        self.source
            .lookup_thread(recipient.to_string())
            .await?
            .ok_or_else(|| Error::NotFound(format!("no thread for recipient {recipient}")))
    }

    /// Message history for a thread, oldest first, text redacted.
    pub async fn thread_messages(&self, client: &str, query: MessageQuery) -> Result<Vec<Message>> {
        self.authorize(client, Capability::Read, OpClass::Standard)?;
        query.range.validate()?;
        let messages = self.source.list_messages(query).await?;
        Ok(self.redact_messages(messages))
    }

    /// Message history with a recipient; empty when no thread matches.
    pub async fn history(
        &self,
        client: &str,
        recipient: &str,
        limit: usize,
        range: TimeRange,
        include_attachments: bool,
    ) -> Result<Vec<Message>> {
        self.authorize(client, Capability::Read, OpClass::Standard)?;
        range.validate()?;
        let scope = MessageScope::Recipient(recipient.to_string());
        let Some(thread_id) = self.source.resolve_scope(&scope).await? else {
            return Ok(Vec::new());
        };
        let messages = self
            .source
            .list_messages(MessageQuery {
                thread_id,
                limit,
                range,
                participants: Vec::new(),
                include_attachments,
                since_id: None,
            })
            .await?;
        Ok(self.redact_messages(messages))
    }

    // ============================================
    // Search & links
    // ============================================

    /// Bounded search; matches come back most recent first, redacted.
    pub async fn search(&self, client: &str, params: SearchParams) -> Result<Vec<Message>> {
        self.authorize(client, Capability::Search, OpClass::Standard)?;
        let matches = search::scan(&self.source, &params).await?;
        Ok(self.redact_messages(matches))
    }

    /// Bounded link extraction; contexts are redacted like any other text.
    pub async fn links(&self, client: &str, params: LinkParams) -> Result<Vec<LinkRecord>> {
        self.authorize(client, Capability::Search, OpClass::Standard)?;
        let mut links = self.extractor.extract(&self.source, &params).await?;
        for link in &mut links {
            link.context = self.redactor.redact(&link.context);
        }
        Ok(links)
    }

    // ============================================
    // Send & reply (sensitive tier)
    // ============================================

    /// Send a message through the authorization pipeline.
    pub async fn send(&self, client: &str, request: SendRequest) -> Result<SendReceipt> {
        self.authorize(client, Capability::Send, OpClass::Sensitive)?;
        check_outbound_files(&self.config.send.attachment_allowed_dirs, &request.files)?;
        self.allowlist.check(&request.to)?;
        self.ensure_known_recipient(&request.to)?;
        send::dispatch(&self.source, &request).await
    }

    /// Reply to a thread or recipient. With only a thread id, the recipient
    /// is inferred from the most recent inbound message and still checked
    /// against the allowlist.
    pub async fn reply(&self, client: &str, request: ReplyRequest) -> Result<SendReceipt> {
        self.authorize(client, Capability::Send, OpClass::Sensitive)?;
        let recipient = match request.recipient {
            Some(recipient) => recipient,
            None => {
                let thread_id = request.thread_id.ok_or_else(|| {
                    Error::InvalidInput(
                        "either thread_id or recipient must be provided".to_string(),
                    )
                })?;
                send::resolve_reply_recipient(&self.source, thread_id).await?
            }
        };
        self.allowlist.check(&recipient)?;
        self.ensure_known_recipient(&recipient)?;
        send::dispatch(
            &self.source,
            &SendRequest {
                to: recipient,
                text: Some(request.text),
                files: Vec::new(),
                service: None,
                dry_run: request.dry_run,
            },
        )
        .await
    }

    // ============================================
    // Attachments
    // ============================================

    pub fn attachment_info(&self, client: &str, path: &Path) -> Result<AttachmentInfo> {
        self.authorize(client, Capability::Attachments, OpClass::Standard)?;
        self.sandbox.info(path)
    }

    pub fn attachment_open(&self, client: &str, path: &Path) -> Result<std::fs::File> {
        self.authorize(client, Capability::Attachments, OpClass::Standard)?;
        self.sandbox.open(path)
    }

    // ============================================
    // Watch
    // ============================================

    /// Subscribe to new messages in a thread. Checks run here once; the
    /// polling task itself is not rate-accounted.
    pub fn watch(&self, client: &str, params: WatchParams) -> Result<WatchSubscription> {
        self.authorize(client, Capability::Watch, OpClass::Standard)?;
        Ok(self
            .watches
            .subscribe(self.source.clone(), Arc::clone(&self.redactor), params))
    }

    /// Live subscription count (for diagnostics).
    pub fn active_watches(&self) -> usize {
        self.watches.active_subscriptions()
    }

    // ============================================
    // Contacts
    // ============================================

    pub fn upsert_contact(&self, client: &str, data: ContactUpsert) -> Result<Contact> {
        self.authorize(client, Capability::Contacts, OpClass::Standard)?;
        self.contacts.upsert(data)
    }

    pub fn resolve_contact(
        &self,
        client: &str,
        phone: Option<&str>,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Result<Resolution> {
        self.authorize(client, Capability::Contacts, OpClass::Standard)?;
        if phone.is_none() && email.is_none() && name.is_none() {
            return Err(Error::InvalidInput(
                "at least one of phone, email, or name must be provided".to_string(),
            ));
        }
        Ok(self.contacts.resolve(phone, email, name))
    }

    pub fn search_contacts(&self, client: &str, query: &str, limit: usize) -> Result<Vec<Contact>> {
        self.authorize(client, Capability::Contacts, OpClass::Standard)?;
        self.contacts.search(query, limit)
    }

    pub fn list_contacts(&self, client: &str) -> Result<Vec<Contact>> {
        self.authorize(client, Capability::Contacts, OpClass::Standard)?;
        Ok(self.contacts.list())
    }

    pub fn delete_contact(&self, client: &str, contact_id: &str) -> Result<()> {
        self.authorize(client, Capability::Contacts, OpClass::Standard)?;
        self.contacts.delete(contact_id)
    }
}
