//! The mailbox seen from the sync engine: list, fetch, mark read.

use thiserror::Error;

use super::types::{Attachment, Message, MessageId};

#[derive(Debug, Error)]
pub enum MailError {
    #[error("IMAP error: {0}")]
    Imap(#[from] imap::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("failed to parse message {id}: {source}")]
    Parse {
        id: MessageId,
        #[source]
        source: mailparse::MailParseError,
    },
    #[error("message {0} not found")]
    MessageNotFound(MessageId),
    #[error("attachment {attachment} not found in message {message}")]
    AttachmentNotFound {
        message: MessageId,
        attachment: String,
    },
    #[error("mailbox unavailable: {0}")]
    Unavailable(String),
}

/// Candidate filter: unread messages carrying a PDF/JPEG/PNG attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub unread: bool,
    pub has_attachment: bool,
    pub extensions: Vec<String>,
}

impl Default for MailQuery {
    fn default() -> Self {
        Self {
            unread: true,
            has_attachment: true,
            extensions: ["pdf", "jpg", "jpeg", "png"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl MailQuery {
    /// Render as a Gmail search expression (used with IMAP `X-GM-RAW`).
    pub fn to_gmail_search(&self) -> String {
        let mut terms = Vec::new();
        if self.unread {
            terms.push("is:unread".to_string());
        }
        if self.has_attachment {
            terms.push("has:attachment".to_string());
        }
        if !self.extensions.is_empty() {
            let names: Vec<String> = self
                .extensions
                .iter()
                .map(|e| format!("filename:{}", e))
                .collect();
            terms.push(format!("({})", names.join(" OR ")));
        }
        terms.join(" ")
    }

    /// Whether a fetched message satisfies the query. Sources whose server
    /// search cannot express the attachment filter apply this before paging.
    pub fn matches(&self, message: &Message) -> bool {
        if self.unread && !message.unread {
            return false;
        }
        if self.extensions.is_empty() {
            return !self.has_attachment || !message.attachments.is_empty();
        }
        message
            .attachments
            .iter()
            .any(|a| a.kind().is_some() && self.allows_extension(&a.filename))
    }

    fn allows_extension(&self, filename: &str) -> bool {
        let Some((_, ext)) = filename.rsplit_once('.') else {
            return false;
        };
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Remote mailbox operations the coordinator depends on.
///
/// Every call reports failure explicitly; the coordinator decides whether a
/// failure is fatal (it never is inside a cycle).
pub trait MailSource {
    /// Identifiers of messages matching `query`, newest first, at most `max`.
    /// The filter applies before the cap, so non-matching unread mail never
    /// crowds out matching messages.
    fn list(&mut self, query: &MailQuery, max: usize) -> Result<Vec<MessageId>, MailError>;

    /// Sender and attachment metadata for one message. Must not clear the
    /// unread flag.
    fn fetch(&mut self, id: &MessageId) -> Result<Message, MailError>;

    /// Decoded bytes of one attachment.
    fn fetch_attachment(&mut self, attachment: &Attachment) -> Result<Vec<u8>, MailError>;

    /// Clear the unread flag.
    fn mark_read(&mut self, id: &MessageId) -> Result<(), MailError>;

    /// The coordinator is done with this message for the current cycle;
    /// drop anything cached for it.
    fn release(&mut self, _id: &MessageId) {}
}
