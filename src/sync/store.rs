//! Attachment store: one directory per sender, original filenames inside.
//!
//! A file's presence at its artifact path means "downloaded". Files are
//! written once through a temp file and never overwritten.

use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ledger::ProcessedLedger;
use super::source::MailSource;
use super::types::{ArtifactKind, Attachment, Message};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Which index decides that an attachment needs no more work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// Return every qualifying artifact that is not ledgered yet; download
    /// only the ones missing on disk.
    #[default]
    Ledger,
    /// Skip a message once all its files exist; return only fresh downloads.
    /// An artifact stored but never ledgered is never picked up again.
    File,
}

/// Identity of an attachment: (sender, filename).
///
/// Two attachments with the same sender and filename are the same artifact,
/// whichever message carried them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactPath {
    sender: String,
    filename: String,
}

impl ArtifactPath {
    /// Reduces `filename` to its last path component. Control characters
    /// become `_` in both parts, so a key always fits on one ledger line.
    /// Returns None when nothing usable is left.
    pub fn new(sender: &str, filename: &str) -> Option<Self> {
        let unified = filename.replace('\\', "/");
        let base = replace_control(unified.rsplit('/').next().unwrap_or_default().trim());
        let sender = replace_control(sender);
        if base.is_empty() || base == "." || base == ".." || sender.is_empty() {
            return None;
        }
        Some(Self {
            sender,
            filename: base,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Ledger key, `sender/filename`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.sender, self.filename)
    }

    /// `<stem>.txt`, next to the binary.
    pub fn text_filename(&self) -> String {
        let stem = Path::new(&self.filename)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| self.filename.clone());
        format!("{}.txt", stem)
    }
}

fn replace_control(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect()
}

impl std::fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.sender, self.filename)
    }
}

/// An artifact present in the store and handed on for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub artifact: ArtifactPath,
    pub kind: ArtifactKind,
    /// Bytes were transferred during this call.
    pub downloaded: bool,
}

/// Outcome of materializing one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Materialization {
    pub items: Vec<Materialized>,
    /// Qualifying attachments whose download failed this time.
    pub failed: usize,
}

impl Materialization {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

enum Download {
    Written,
    AlreadyPresent,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
    policy: DedupPolicy,
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>, policy: DedupPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub fn binary_path(&self, artifact: &ArtifactPath) -> PathBuf {
        self.root.join(&artifact.sender).join(&artifact.filename)
    }

    pub fn text_path(&self, artifact: &ArtifactPath) -> PathBuf {
        self.root
            .join(&artifact.sender)
            .join(artifact.text_filename())
    }

    pub fn contains(&self, artifact: &ArtifactPath) -> bool {
        self.binary_path(artifact).exists()
    }

    /// Write bytes at the artifact path unless something is already there.
    ///
    /// Returns false when the file existed; its content is left untouched.
    pub fn write_new(&self, artifact: &ArtifactPath, bytes: &[u8]) -> Result<bool, StoreError> {
        let dest = self.binary_path(artifact);
        if dest.exists() {
            return Ok(false);
        }
        let dir = self.root.join(&artifact.sender);
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(&dest) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::Persist {
                path: dest,
                source: e.error,
            }),
        }
    }

    /// Write (or replace) the text extracted from an artifact.
    pub fn write_text(&self, artifact: &ArtifactPath, text: &str) -> Result<PathBuf, StoreError> {
        let dest = self.text_path(artifact);
        let dir = self.root.join(&artifact.sender);
        std::fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.persist(&dest).map_err(|e| StoreError::Persist {
            path: dest.clone(),
            source: e.error,
        })?;
        Ok(dest)
    }

    /// Ensure a message's qualifying attachments are on disk.
    ///
    /// What comes back depends on the dedup policy (see [`DedupPolicy`]). A
    /// failed download is logged, counted and left out; siblings still proceed.
    pub fn materialize<S: MailSource + ?Sized>(
        &self,
        message: &Message,
        source: &mut S,
        ledger: &ProcessedLedger,
    ) -> Materialization {
        let mut out = Materialization::default();
        let qualifying = qualifying_attachments(message);
        if qualifying.is_empty() {
            debug!("Message {}: no qualifying attachments", message.id);
            return out;
        }

        if self.policy == DedupPolicy::File
            && qualifying.iter().all(|(_, artifact, _)| self.contains(artifact))
        {
            debug!("Message {}: all attachments already stored", message.id);
            return out;
        }

        for (attachment, artifact, kind) in qualifying {
            let present = self.contains(&artifact);
            match self.policy {
                DedupPolicy::File if present => continue,
                DedupPolicy::Ledger if ledger.contains(&artifact) => continue,
                DedupPolicy::Ledger if present => {
                    debug!("{} already stored, not yet extracted", artifact);
                    out.items.push(Materialized {
                        artifact,
                        kind,
                        downloaded: false,
                    });
                    continue;
                }
                _ => {}
            }
            match self.download(source, attachment, &artifact) {
                Download::Written => out.items.push(Materialized {
                    artifact,
                    kind,
                    downloaded: true,
                }),
                Download::AlreadyPresent => {}
                Download::Failed => out.failed += 1,
            }
        }
        out
    }

    fn download<S: MailSource + ?Sized>(
        &self,
        source: &mut S,
        attachment: &Attachment,
        artifact: &ArtifactPath,
    ) -> Download {
        let bytes = match source.fetch_attachment(attachment) {
            Ok(b) => b,
            Err(e) => {
                warn!("Failed to fetch {}: {}", artifact, e);
                return Download::Failed;
            }
        };
        match self.write_new(artifact, &bytes) {
            Ok(true) => {
                info!("Downloaded: {}", self.binary_path(artifact).display());
                Download::Written
            }
            Ok(false) => {
                // Another writer got there first; the existing file stands.
                debug!("{} appeared before write, keeping existing file", artifact);
                Download::AlreadyPresent
            }
            Err(e) => {
                warn!("Failed to store {}: {}", artifact, e);
                Download::Failed
            }
        }
    }

    /// Sender directories currently in the store, sorted.
    pub fn senders(&self) -> std::io::Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}

/// Allow-listed attachments of a message with their artifact paths, in
/// message order. Duplicate filenames within one message collapse to one.
pub fn qualifying_attachments(message: &Message) -> Vec<(&Attachment, ArtifactPath, ArtifactKind)> {
    let mut out: Vec<(&Attachment, ArtifactPath, ArtifactKind)> = Vec::new();
    for attachment in &message.attachments {
        let Some(kind) = attachment.kind() else {
            continue;
        };
        let Some(artifact) = ArtifactPath::new(&message.sender, &attachment.filename) else {
            continue;
        };
        if out.iter().any(|(_, a, _)| *a == artifact) {
            continue;
        }
        out.push((attachment, artifact, kind));
    }
    out
}
