//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/agentgate/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/agentgate/` (~/.config/agentgate/)
//! - Data: `$XDG_DATA_HOME/agentgate/` (~/.local/share/agentgate/)
//! - State/Logs: `$XDG_STATE_HOME/agentgate/` (~/.local/state/agentgate/)
//!
//! The capability set is resolved once from this file at startup and never
//! reloaded; changing capabilities requires a process restart.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Server and authentication settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Capability toggles (what operation classes are enabled)
    #[serde(default)]
    pub capabilities: CapabilityToggles,

    /// Send policy: allowlist and outbound attachment directories
    #[serde(default)]
    pub send: SendPolicyConfig,

    /// Rate budgets and upstream timeout
    #[serde(default)]
    pub limits: LimitsConfig,

    /// PII redaction mode
    #[serde(default)]
    pub pii: PiiConfig,

    /// Contact directory settings
    #[serde(default)]
    pub contacts: ContactsConfig,

    /// Attachment sandbox settings
    #[serde(default)]
    pub attachments: AttachmentConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server and authentication settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Bind host for whatever transport sits in front of the engine
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared API key; validated at startup (see the auth module)
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8123
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

// ============================================
// Capabilities
// ============================================

/// An independently toggleable permission gating one class of operation.
///
/// No cross-capability implication is assumed: `Search` being disabled says
/// nothing about `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Read,
    Search,
    Send,
    Watch,
    Contacts,
    Attachments,
    RemindersRead,
    RemindersWrite,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Search => "search",
            Capability::Send => "send",
            Capability::Watch => "watch",
            Capability::Contacts => "contacts",
            Capability::Attachments => "attachments",
            Capability::RemindersRead => "reminders_read",
            Capability::RemindersWrite => "reminders_write",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-capability boolean toggles, all enabled by default.
#[derive(Debug, Deserialize, Clone)]
pub struct CapabilityToggles {
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub search: bool,
    #[serde(default = "default_true")]
    pub send: bool,
    #[serde(default = "default_true")]
    pub watch: bool,
    #[serde(default = "default_true")]
    pub contacts: bool,
    #[serde(default = "default_true")]
    pub attachments: bool,
    #[serde(default = "default_true")]
    pub reminders_read: bool,
    #[serde(default = "default_true")]
    pub reminders_write: bool,
}

impl Default for CapabilityToggles {
    fn default() -> Self {
        Self {
            read: true,
            search: true,
            send: true,
            watch: true,
            contacts: true,
            attachments: true,
            reminders_read: true,
            reminders_write: true,
        }
    }
}

impl CapabilityToggles {
    /// Whether the given operation class is enabled.
    pub fn enabled(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.read,
            Capability::Search => self.search,
            Capability::Send => self.send,
            Capability::Watch => self.watch,
            Capability::Contacts => self.contacts,
            Capability::Attachments => self.attachments,
            Capability::RemindersRead => self.reminders_read,
            Capability::RemindersWrite => self.reminders_write,
        }
    }
}

/// Resolved capability set as returned by the discovery operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub messages: MessageCapabilities,
    pub reminders: ReminderCapabilities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCapabilities {
    pub read: bool,
    pub search: bool,
    pub send: bool,
    /// Configured allowlist entries. Nulled (not omitted) for
    /// unauthenticated callers.
    pub send_allowlist: Option<Vec<String>>,
    /// Whether an allowlist is configured; always visible
    pub send_allowlist_active: bool,
    pub watch: bool,
    pub contacts: bool,
    pub attachments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderCapabilities {
    pub read: bool,
    pub write: bool,
}

// ============================================
// Policy sections
// ============================================

/// Send policy configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SendPolicyConfig {
    /// Permitted recipients. Empty means unrestricted.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Directories outbound file attachments may come from. Empty means
    /// unrestricted.
    #[serde(default)]
    pub attachment_allowed_dirs: Vec<PathBuf>,
    /// When false, send recipients must resolve in the contact directory.
    #[serde(default = "default_true")]
    pub allow_unknown_recipients: bool,
}

impl Default for SendPolicyConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            attachment_allowed_dirs: Vec::new(),
            allow_unknown_recipients: true,
        }
    }
}

/// Rate budgets and upstream call bound
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Global tier: operations per rolling window, per client
    #[serde(default = "default_global_per_window")]
    pub global_per_window: u32,
    /// Sensitive tier: send/reply operations per rolling window, per client
    #[serde(default = "default_send_per_window")]
    pub send_per_window: u32,
    /// Rolling window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Upper bound for a single message store call, in seconds
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
}

fn default_global_per_window() -> u32 {
    100
}

fn default_send_per_window() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            global_per_window: default_global_per_window(),
            send_per_window: default_send_per_window(),
            window_secs: default_window_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

/// Redaction backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiMode {
    /// Pattern-based masking (default)
    Regex,
    /// No redaction
    Off,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PiiConfig {
    #[serde(default = "default_pii_mode")]
    pub mode: PiiMode,
}

fn default_pii_mode() -> PiiMode {
    PiiMode::Regex
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            mode: default_pii_mode(),
        }
    }
}

/// Contact directory configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ContactsConfig {
    /// Path to the JSON directory file; defaults to the XDG data dir
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl ContactsConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("contacts.json"))
    }
}

/// Attachment sandbox configuration
#[derive(Debug, Deserialize, Default, Clone)]
pub struct AttachmentConfig {
    /// Sandbox root; only files under this directory are ever served.
    /// Defaults to the platform message-attachment storage root.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl AttachmentConfig {
    pub fn resolved_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| home_dir().join("Library/Messages/Attachments"))
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ============================================
// Loading
// ============================================

impl Config {
    /// Returns the config directory path
    pub fn config_dir() -> PathBuf {
        xdg_config_home().join("agentgate")
    }

    /// Returns the data directory path (contact directory file)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("agentgate")
    }

    /// Returns the state directory path (logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("agentgate")
    }

    /// Returns the config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("agentgate.log")
    }

    /// Load configuration from the default location.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Sorted, deduplicated allowlist entries as configured (raw form).
    pub fn send_allowlist(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .send
            .allowlist
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        entries.sort();
        entries.dedup();
        entries
    }

    /// Resolved capability set for the discovery operation.
    ///
    /// Unauthenticated callers never see allowlist entries, only whether an
    /// allowlist is active.
    pub fn capability_report(&self, authenticated: bool) -> CapabilityReport {
        let allowlist = self.send_allowlist();
        let active = !allowlist.is_empty();
        CapabilityReport {
            messages: MessageCapabilities {
                read: self.capabilities.read,
                search: self.capabilities.search,
                send: self.capabilities.send,
                send_allowlist: if authenticated && active {
                    Some(allowlist)
                } else {
                    None
                },
                send_allowlist_active: active,
                watch: self.capabilities.watch,
                contacts: self.capabilities.contacts,
                attachments: self.capabilities.attachments,
            },
            reminders: ReminderCapabilities {
                read: self.capabilities.reminders_read,
                write: self.capabilities.reminders_write,
            },
        }
    }
}
