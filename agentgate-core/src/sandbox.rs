//! Attachment sandbox
//!
//! Path canonicalization and containment checks before any file is served
//! or attached. A requested path that canonicalizes outside the fixed root,
//! or that does not exist at all, is rejected with the same outcome so the
//! response leaks nothing about filesystem structure. Rejection happens
//! before any open or metadata read.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Metadata for a sandboxed attachment file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AttachmentInfo {
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: u64,
    pub mime_type: &'static str,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Containment check against a single fixed root directory.
pub struct AttachmentSandbox {
    root: PathBuf,
}

impl AttachmentSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Canonicalize `requested` (resolving symlinks and `..` segments) and
    /// verify containment in the root. Nonexistent and out-of-root paths
    /// fail identically.
    pub fn resolve(&self, requested: &Path) -> Result<PathBuf> {
        let root = self.root.canonicalize().map_err(|e| {
            tracing::warn!(root = %self.root.display(), error = %e, "sandbox root unavailable");
            Error::SandboxViolation
        })?;
        let resolved = requested.canonicalize().map_err(|_| {
            tracing::debug!(path = %requested.display(), "attachment path did not resolve");
            Error::SandboxViolation
        })?;
        if !resolved.starts_with(&root) {
            tracing::warn!(path = %requested.display(), "attachment path escapes sandbox root");
            return Err(Error::SandboxViolation);
        }
        if !resolved.is_file() {
            return Err(Error::SandboxViolation);
        }
        Ok(resolved)
    }

    /// Metadata for a sandboxed file, without serving its bytes.
    pub fn info(&self, requested: &Path) -> Result<AttachmentInfo> {
        let path = self.resolve(requested)?;
        let meta = std::fs::metadata(&path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified_at = meta
            .modified()
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(AttachmentInfo {
            mime_type: guess_mime(&path),
            filename,
            size_bytes: meta.len(),
            modified_at,
            path,
        })
    }

    /// Open a sandboxed file for reading.
    pub fn open(&self, requested: &Path) -> Result<File> {
        let path = self.resolve(requested)?;
        Ok(File::open(path)?)
    }
}

/// Validate outbound send attachments against the configured allowed
/// directories. An empty set means unrestricted; otherwise every file must
/// canonicalize into one of the allowed directories.
pub fn check_outbound_files(allowed_dirs: &[PathBuf], files: &[PathBuf]) -> Result<()> {
    if files.is_empty() || allowed_dirs.is_empty() {
        return Ok(());
    }
    let allowed: Vec<PathBuf> = allowed_dirs
        .iter()
        .filter_map(|d| d.canonicalize().ok())
        .collect();
    for file in files {
        let resolved = file.canonicalize().map_err(|_| {
            tracing::debug!(path = %file.display(), "outbound file did not resolve");
            Error::SandboxViolation
        })?;
        if !allowed.iter().any(|dir| resolved.starts_with(dir)) {
            tracing::warn!(path = %file.display(), "outbound file outside allowed directories");
            return Err(Error::SandboxViolation);
        }
    }
    Ok(())
}

/// Extension-based MIME guess with an octet-stream fallback.
pub(crate) fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "webp" => "image/webp",
        "mov" => "video/quicktime",
        "mp4" => "video/mp4",
        "m4a" => "audio/mp4",
        "caf" => "audio/x-caf",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "vcf" => "text/vcard",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
