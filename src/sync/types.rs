//! Sync data types: Message, Attachment, ArtifactKind, CycleReport.

use std::fmt;

/// MIME types an attachment must map to (by filename extension) to qualify.
pub const ALLOWED_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

/// Opaque provider-assigned message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Pdf,
    Image,
}

impl ArtifactKind {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(ArtifactKind::Pdf),
            "image/jpeg" | "image/png" => Some(ArtifactKind::Image),
            _ => None,
        }
    }

    /// Kind for a filename whose extension maps to an allow-listed MIME type.
    pub fn from_filename(name: &str) -> Option<Self> {
        let mime = mime_guess::from_path(name).first()?;
        let essence = mime.essence_str();
        if !ALLOWED_MIME_TYPES.contains(&essence) {
            return None;
        }
        Self::from_mime(essence)
    }
}

/// Attachment metadata; bytes are fetched separately through the mail source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Provider attachment identifier (an IMAP part path such as `2` or `1.3`).
    pub id: String,
    pub filename: String,
    /// Guessed from the filename extension, never from the part's headers.
    pub mime_type: Option<String>,
    pub message_id: MessageId,
}

impl Attachment {
    pub fn new(message_id: MessageId, id: impl Into<String>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let mime_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.essence_str().to_string());
        Self {
            id: id.into(),
            filename,
            mime_type,
            message_id,
        }
    }

    /// Kind of artifact if the attachment is on the allow-list.
    pub fn kind(&self) -> Option<ArtifactKind> {
        let mime = self.mime_type.as_deref()?;
        if !ALLOWED_MIME_TYPES.contains(&mime) {
            return None;
        }
        ArtifactKind::from_mime(mime)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// Normalized sender identity (see `sync::sender`).
    pub sender: String,
    pub attachments: Vec<Attachment>,
    pub unread: bool,
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub candidates: usize,
    pub materialized: usize,
    pub downloaded: usize,
    pub extracted: usize,
    pub marked_read: usize,
    pub mark_read_failures: usize,
    pub errors: usize,
}

impl CycleReport {
    pub fn summary(&self) -> String {
        format!(
            "{} candidate(s), {} downloaded, {} extracted, {} marked read",
            self.candidates, self.downloaded, self.extracted, self.marked_read
        )
    }
}
