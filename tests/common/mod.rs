//! Shared test fixtures: an in-memory mailbox and a scripted extraction engine.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use mailtext::extract::{ExtractError, ExtractionEngine};
use mailtext::sync::coordinator::{CycleSettings, Sleeper, SyncCoordinator};
use mailtext::sync::sender::normalize_sender;
use mailtext::sync::source::{MailError, MailQuery, MailSource};
use mailtext::sync::store::{AttachmentStore, DedupPolicy};
use mailtext::sync::types::{ArtifactKind, Attachment, Message, MessageId};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub id: String,
    pub from: String,
    pub attachments: Vec<(String, Vec<u8>)>,
    pub unread: bool,
}

impl FakeMessage {
    pub fn to_message(&self) -> Message {
        let id = MessageId::new(self.id.clone());
        Message {
            id: id.clone(),
            sender: normalize_sender(&self.from),
            attachments: self
                .attachments
                .iter()
                .enumerate()
                .map(|(i, (name, _))| Attachment::new(id.clone(), (i + 2).to_string(), name.clone()))
                .collect(),
            unread: self.unread,
        }
    }

    pub fn new(id: &str, from: &str, attachments: &[(&str, &[u8])]) -> Self {
        Self {
            id: id.to_string(),
            from: from.to_string(),
            attachments: attachments
                .iter()
                .map(|(name, bytes)| (name.to_string(), bytes.to_vec()))
                .collect(),
            unread: true,
        }
    }
}

/// Mailbox kept in memory. Records every attachment fetch and mark-read.
#[derive(Debug, Default)]
pub struct FakeMailbox {
    pub messages: Vec<FakeMessage>,
    pub attachment_fetches: Vec<(String, String)>,
    pub marked_read: Vec<String>,
    /// (message id, filename) pairs whose download fails.
    pub failing_attachments: HashSet<(String, String)>,
    pub fail_list: bool,
    pub fail_mark_read: bool,
    pub list_calls: usize,
    pub released: Vec<String>,
}

impl FakeMailbox {
    pub fn with(messages: Vec<FakeMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn is_unread(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id && m.unread)
    }

    pub fn fetches_of(&self, filename: &str) -> usize {
        self.attachment_fetches
            .iter()
            .filter(|(_, f)| f == filename)
            .count()
    }
}

impl MailSource for FakeMailbox {
    fn list(&mut self, query: &MailQuery, max: usize) -> Result<Vec<MessageId>, MailError> {
        self.list_calls += 1;
        if self.fail_list {
            return Err(MailError::Unavailable("list failed".to_string()));
        }
        Ok(self
            .messages
            .iter()
            .map(|m| m.to_message())
            .filter(|m| query.matches(m))
            .take(max)
            .map(|m| m.id)
            .collect())
    }

    fn fetch(&mut self, id: &MessageId) -> Result<Message, MailError> {
        self.messages
            .iter()
            .find(|m| m.id == id.as_str())
            .map(|m| m.to_message())
            .ok_or_else(|| MailError::MessageNotFound(id.clone()))
    }

    fn fetch_attachment(&mut self, attachment: &Attachment) -> Result<Vec<u8>, MailError> {
        let msg_id = attachment.message_id.as_str().to_string();
        self.attachment_fetches
            .push((msg_id.clone(), attachment.filename.clone()));
        if self
            .failing_attachments
            .contains(&(msg_id.clone(), attachment.filename.clone()))
        {
            return Err(MailError::Unavailable("attachment download failed".to_string()));
        }
        let m = self
            .messages
            .iter()
            .find(|m| m.id == msg_id)
            .ok_or_else(|| MailError::MessageNotFound(attachment.message_id.clone()))?;
        m.attachments
            .iter()
            .find(|(name, _)| *name == attachment.filename)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| MailError::AttachmentNotFound {
                message: attachment.message_id.clone(),
                attachment: attachment.id.clone(),
            })
    }

    fn mark_read(&mut self, id: &MessageId) -> Result<(), MailError> {
        if self.fail_mark_read {
            return Err(MailError::Unavailable("modify failed".to_string()));
        }
        let m = self
            .messages
            .iter_mut()
            .find(|m| m.id == id.as_str())
            .ok_or_else(|| MailError::MessageNotFound(id.clone()))?;
        m.unread = false;
        self.marked_read.push(id.to_string());
        Ok(())
    }

    fn release(&mut self, id: &MessageId) {
        self.released.push(id.to_string());
    }
}

/// Extraction engine returning canned text; records each call.
#[derive(Debug, Default)]
pub struct FakeEngine {
    pub calls: Vec<(PathBuf, ArtifactKind)>,
    /// filename → text; anything else yields "text of <filename>".
    pub texts: HashMap<String, String>,
    pub failing: HashSet<String>,
}

impl FakeEngine {
    pub fn calls_for(&self, path: &Path) -> usize {
        self.calls.iter().filter(|(p, _)| p == path).count()
    }
}

impl ExtractionEngine for FakeEngine {
    fn extract(&mut self, path: &Path, kind: ArtifactKind) -> Result<String, ExtractError> {
        self.calls.push((path.to_path_buf(), kind));
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if self.failing.contains(&name) {
            return Err(ExtractError::MissingFile(path.to_path_buf()));
        }
        Ok(self
            .texts
            .get(&name)
            .cloned()
            .unwrap_or_else(|| format!("text of {}", name)))
    }
}

/// Sleeper that never blocks; raises `shutdown` after `stop_after` sleeps.
#[derive(Debug, Default)]
pub struct CountingSleeper {
    pub sleeps: Vec<Duration>,
    pub stop_after: usize,
}

impl Sleeper for CountingSleeper {
    fn sleep(&mut self, duration: Duration, shutdown: &AtomicBool) {
        self.sleeps.push(duration);
        if self.sleeps.len() >= self.stop_after {
            shutdown.store(true, Ordering::Relaxed);
        }
    }
}

pub type TestCoordinator = SyncCoordinator<FakeMailbox, FakeEngine>;

/// Temp workspace holding an attachment store and a ledger file.
pub struct Workspace {
    pub tmp: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            tmp: TempDir::new().expect("failed to create temp dir"),
        }
    }

    pub fn store_root(&self) -> PathBuf {
        self.tmp.path().join("attachments")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.tmp.path().join("processed.txt")
    }

    pub fn store(&self, policy: DedupPolicy) -> AttachmentStore {
        AttachmentStore::new(self.store_root(), policy)
    }

    pub fn coordinator(&self, mailbox: FakeMailbox, policy: DedupPolicy) -> TestCoordinator {
        self.coordinator_with(mailbox, FakeEngine::default(), policy)
    }

    pub fn coordinator_with(
        &self,
        mailbox: FakeMailbox,
        engine: FakeEngine,
        policy: DedupPolicy,
    ) -> TestCoordinator {
        SyncCoordinator::new(
            mailbox,
            engine,
            self.store(policy),
            self.ledger_path(),
            CycleSettings {
                query: MailQuery::default(),
                max_messages: 50,
                interval: Duration::from_secs(10),
            },
        )
    }

    pub fn file(&self, rel: &str) -> PathBuf {
        self.store_root().join(rel)
    }

    pub fn ledger_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.ledger_path())
            .unwrap_or_default()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }
}
