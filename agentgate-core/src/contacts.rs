//! Contact directory
//!
//! A small persisted key-value store mapping identity fragments (phone,
//! email, handle) to contact records, with fuzzy resolution. The directory
//! is rewritten to a JSON file on every mutation via write-new-then-rename
//! with owner-only permissions; a missing or corrupt file on load falls
//! back to an empty directory rather than failing startup.

use crate::error::{Error, Result};
use crate::types::{Contact, ContactUpsert, Resolution};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

// ============================================
// Identity normalization
// ============================================

/// Normalize a phone number for identity comparison.
///
/// Digits only: punctuation, spaces, and a leading `+` are all dropped, so
/// `+1 555-123-4567` and `15551234567` are the same identity.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize an arbitrary recipient identity.
///
/// Emails compare case-insensitively; anything containing a digit is
/// treated as a phone number; other handles compare case-insensitively.
pub fn normalize_identity(identity: &str) -> String {
    let trimmed = identity.trim();
    if trimmed.contains('@') {
        trimmed.to_lowercase()
    } else if trimmed.chars().any(|c| c.is_ascii_digit()) {
        normalize_phone(trimmed)
    } else {
        trimmed.to_lowercase()
    }
}

// ============================================
// Directory
// ============================================

struct Inner {
    contacts: HashMap<String, Contact>,
    /// normalized phone -> contact id
    phone_index: HashMap<String, String>,
    /// lowercased email -> contact id
    email_index: HashMap<String, String>,
    /// lowercased handle -> contact id
    handle_index: HashMap<String, String>,
}

impl Inner {
    fn empty() -> Self {
        Self {
            contacts: HashMap::new(),
            phone_index: HashMap::new(),
            email_index: HashMap::new(),
            handle_index: HashMap::new(),
        }
    }

    fn index(&mut self, contact: &Contact) {
        if let Some(phone) = &contact.phone {
            self.phone_index
                .insert(normalize_phone(phone), contact.id.clone());
        }
        if let Some(email) = &contact.email {
            self.email_index
                .insert(email.to_lowercase(), contact.id.clone());
        }
        if let Some(handle) = &contact.handle {
            self.handle_index
                .insert(handle.to_lowercase(), contact.id.clone());
        }
    }

    fn unindex(&mut self, contact: &Contact) {
        if let Some(phone) = &contact.phone {
            self.phone_index.remove(&normalize_phone(phone));
        }
        if let Some(email) = &contact.email {
            self.email_index.remove(&email.to_lowercase());
        }
        if let Some(handle) = &contact.handle {
            self.handle_index.remove(&handle.to_lowercase());
        }
    }
}

/// Persisted contact directory with mutex-guarded in-memory state.
pub struct ContactDirectory {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl ContactDirectory {
    /// Open the directory at `path`, loading any existing file.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = Self::load(&path);
        Self {
            path,
            inner: Mutex::new(inner),
        }
    }

    fn load(path: &Path) -> Inner {
        let mut inner = Inner::empty();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no contact file yet");
                return inner;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read contact file, starting empty");
                return inner;
            }
        };

        match serde_json::from_str::<Vec<Contact>>(&raw) {
            Ok(contacts) => {
                for contact in contacts {
                    inner.index(&contact);
                    inner.contacts.insert(contact.id.clone(), contact);
                }
                tracing::info!(path = %path.display(), count = inner.contacts.len(), "loaded contacts");
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "corrupt contact file, starting empty");
            }
        }
        inner
    }

    /// Persist the directory atomically: write a sibling temp file, fix its
    /// permissions, then rename over the target. Never truncates in place.
    fn save(&self, inner: &Inner) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut contacts: Vec<&Contact> = inner.contacts.values().collect();
        contacts.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_string_pretty(&contacts)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), count = inner.contacts.len(), "saved contacts");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or update a contact.
    ///
    /// Any matching natural key (normalized phone, email, handle) selects
    /// the existing record to update; otherwise a new contact is created.
    /// Last writer wins per matched record.
    pub fn upsert(&self, data: ContactUpsert) -> Result<Contact> {
        let has_key = [&data.phone, &data.email, &data.handle]
            .iter()
            .any(|f| f.as_deref().is_some_and(|s| !s.trim().is_empty()));
        if !has_key {
            return Err(Error::InvalidInput(
                "contact needs at least one of phone, email, or handle".to_string(),
            ));
        }

        let mut inner = self.lock();

        let existing_id = data
            .phone
            .as_deref()
            .and_then(|p| inner.phone_index.get(&normalize_phone(p)))
            .or_else(|| {
                data.email
                    .as_deref()
                    .and_then(|e| inner.email_index.get(&e.to_lowercase()))
            })
            .or_else(|| {
                data.handle
                    .as_deref()
                    .and_then(|h| inner.handle_index.get(&h.to_lowercase()))
            })
            .cloned();

        let contact = match existing_id.and_then(|id| inner.contacts.get(&id).cloned()) {
            Some(mut existing) => {
                inner.unindex(&existing);
                if data.name.is_some() {
                    existing.name = data.name;
                }
                if data.phone.is_some() {
                    existing.phone = data.phone;
                }
                if data.email.is_some() {
                    existing.email = data.email;
                }
                if data.handle.is_some() {
                    existing.handle = data.handle;
                }
                existing.updated_at = Utc::now();
                existing
            }
            None => {
                let now = Utc::now();
                Contact {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: data.name,
                    phone: data.phone,
                    email: data.email,
                    handle: data.handle,
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        inner.index(&contact);
        inner.contacts.insert(contact.id.clone(), contact.clone());
        self.save(&inner)?;
        Ok(contact)
    }

    /// Resolve a contact by phone, email, or name.
    ///
    /// Builds a candidate set (exact phone, exact email, then exact name
    /// falling back to substring name); exactly one candidate is `Found`,
    /// more than one is `Ambiguous` with all of them, zero is `NotFound`.
    /// The engine never picks among multiple matches.
    pub fn resolve(
        &self,
        phone: Option<&str>,
        email: Option<&str>,
        name: Option<&str>,
    ) -> Resolution {
        let inner = self.lock();
        let mut candidate_ids: Vec<String> = Vec::new();

        if let Some(phone) = phone {
            if let Some(id) = inner.phone_index.get(&normalize_phone(phone)) {
                candidate_ids.push(id.clone());
            }
        }
        if let Some(email) = email {
            if let Some(id) = inner.email_index.get(&email.to_lowercase()) {
                if !candidate_ids.contains(id) {
                    candidate_ids.push(id.clone());
                }
            }
        }

        if candidate_ids.is_empty() {
            if let Some(name) = name {
                let needle = name.to_lowercase();
                let exact: Vec<String> = inner
                    .contacts
                    .values()
                    .filter(|c| {
                        c.name
                            .as_deref()
                            .is_some_and(|n| n.to_lowercase() == needle)
                    })
                    .map(|c| c.id.clone())
                    .collect();
                if exact.is_empty() {
                    candidate_ids = inner
                        .contacts
                        .values()
                        .filter(|c| {
                            c.name
                                .as_deref()
                                .is_some_and(|n| n.to_lowercase().contains(&needle))
                        })
                        .map(|c| c.id.clone())
                        .collect();
                } else {
                    candidate_ids = exact;
                }
            }
        }

        let mut candidates: Vec<Contact> = candidate_ids
            .iter()
            .filter_map(|id| inner.contacts.get(id).cloned())
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        candidates.dedup_by(|a, b| a.id == b.id);

        match candidates.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Found {
                contact: candidates.remove(0),
            },
            _ => Resolution::Ambiguous { candidates },
        }
    }

    /// Substring search across name, phone, email, and handle.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<Contact>> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("empty contact query".to_string()));
        }
        let needle = query.to_lowercase();
        let inner = self.lock();
        let mut results: Vec<Contact> = inner
            .contacts
            .values()
            .filter(|c| {
                c.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&needle))
                    || c.phone.as_deref().is_some_and(|p| p.contains(query))
                    || c.email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&needle))
                    || c.handle
                        .as_deref()
                        .is_some_and(|h| h.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        results.sort_by(|a, b| a.id.cmp(&b.id));
        results.truncate(limit);
        Ok(results)
    }

    /// Whether any contact carries this identity as a phone, email, or
    /// handle, compared in normalized form.
    pub fn contains_identity(&self, identity: &str) -> bool {
        let key = normalize_identity(identity);
        if key.is_empty() {
            return false;
        }
        let inner = self.lock();
        inner.phone_index.contains_key(&key)
            || inner.email_index.contains_key(&key)
            || inner.handle_index.contains_key(&key)
    }

    /// All contacts, in stable id order.
    pub fn list(&self) -> Vec<Contact> {
        let inner = self.lock();
        let mut contacts: Vec<Contact> = inner.contacts.values().cloned().collect();
        contacts.sort_by(|a, b| a.id.cmp(&b.id));
        contacts
    }

    /// Delete a contact by id.
    pub fn delete(&self, contact_id: &str) -> Result<()> {
        let mut inner = self.lock();
        let Some(contact) = inner.contacts.remove(contact_id) else {
            return Err(Error::NotFound(format!("contact {contact_id}")));
        };
        inner.unindex(&contact);
        self.save(&inner)
    }

    /// Number of contacts currently stored.
    pub fn len(&self) -> usize {
        self.lock().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
