//! # agentgate-core
//!
//! Core library for agentgate - a message access and authorization engine
//! that sits between automated callers and a personal message store.
//!
//! This library provides:
//! - A capability and rate-limit authorization pipeline in front of every
//!   operation
//! - Bounded read, search, and link-extraction queries over message history
//! - A send path with recipient allowlisting, outbound file validation, and
//!   dry-run support
//! - PII redaction of all returned message text
//! - A local contact directory with durable JSON persistence
//! - Poll-based watch subscriptions over new messages
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! The engine never owns message data. A [`MessageSource`] implementation
//! adapts the external store; [`Gateway`] wraps it with policy:
//! - **Policy:** capability gate, then per-client rate accounting
//! - **Query:** bounded scans with redaction on every outgoing body
//! - **Mutation:** the send pipeline, the only path that writes upstream
//!
//! ## Example
//!
//! ```rust,no_run
//! use agentgate_core::{Config, Gateway, MessageSource};
//! use std::sync::Arc;
//!
//! # fn store() -> Arc<dyn MessageSource> { unimplemented!() }
//! // Load configuration and build the engine
//! let config = Config::load().expect("failed to load config");
//! let gateway = Gateway::new(config, store()).expect("failed to start gateway");
//! ```

// Re-export commonly used items at the crate root
pub use config::{Capability, CapabilityReport, Config};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use links::LinkParams;
pub use search::SearchParams;
pub use send::{ReplyRequest, SendReceipt, SendRequest};
pub use source::{MessageQuery, MessageScope, MessageSource, OutboundMessage, SourceError};
pub use types::*;
pub use watch::{WatchParams, WatchSubscription};

// Public modules
pub mod auth;
pub mod config;
pub mod contacts;
pub mod error;
pub mod gateway;
pub mod links;
pub mod logging;
pub mod ratelimit;
pub mod redact;
pub mod sandbox;
pub mod search;
pub mod send;
pub mod source;
pub mod types;
pub mod watch;
