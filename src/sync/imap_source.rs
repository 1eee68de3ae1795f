//! IMAP-backed mail source: search unread, peek at messages, flag \Seen.

use imap::Session;
use mailparse::{MailHeaderMap, ParsedMail};
use native_tls::TlsStream;
use std::collections::{HashMap, HashSet};
use std::net::TcpStream;
use tracing::{debug, info, warn};

use super::sender::normalize_sender;
use super::source::{MailError, MailQuery, MailSource};
use super::types::{Attachment, Message, MessageId};
use crate::accounts::Account;

type ImapSession = Session<TlsStream<TcpStream>>;

/// Connect to IMAP server.
fn connect_imap(
    host: &str,
    port: u16,
    starttls: bool,
    user: &str,
    password: &str,
) -> Result<ImapSession, MailError> {
    let mut tls_builder = native_tls::TlsConnector::builder();

    if starttls || host == "127.0.0.1" || host == "localhost" {
        tls_builder.danger_accept_invalid_certs(true);
        tls_builder.danger_accept_invalid_hostnames(true);
    }

    let tls = tls_builder.build()?;

    let client = if starttls {
        imap::connect_starttls((host, port), host, &tls)?
    } else {
        imap::connect((host, port), host, &tls)?
    };

    let session = client.login(user, password).map_err(|e| e.0)?;
    Ok(session)
}

pub struct ImapMailSource {
    account: Account,
    password: String,
    session: Option<ImapSession>,
    /// Metadata of the messages returned by the last `list`.
    listed: HashMap<MessageId, Message>,
    /// Raw body of messages whose attachments are being downloaded; dropped
    /// on `release`.
    raw: HashMap<MessageId, Vec<u8>>,
    /// Unread UIDs seen to carry no allow-listed attachment. UIDs are only
    /// stable per session, so this is cleared on reconnect.
    unqualified: HashSet<u32>,
}

impl ImapMailSource {
    /// Log in and select the mailbox. Failing here is fatal for the caller.
    pub fn connect(account: Account, password: String) -> Result<Self, MailError> {
        let mut source = Self {
            account,
            password,
            session: None,
            listed: HashMap::new(),
            raw: HashMap::new(),
            unqualified: HashSet::new(),
        };
        source.session()?;
        Ok(source)
    }

    fn session(&mut self) -> Result<&mut ImapSession, MailError> {
        if self.session.is_none() {
            info!(
                "Connecting to {}:{} as {}",
                self.account.imap_host, self.account.imap_port, self.account.user
            );
            let mut session = connect_imap(
                &self.account.imap_host,
                self.account.imap_port,
                self.account.imap_starttls,
                &self.account.user,
                &self.password,
            )?;
            session.select(&self.account.mailbox)?;
            self.unqualified.clear();
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| MailError::Unavailable("no IMAP session".to_string()))
    }

    /// Drop the session after an IMAP error; the next call reconnects.
    fn reset_on_error<T>(&mut self, result: Result<T, MailError>) -> Result<T, MailError> {
        if let Err(MailError::Imap(ref e)) = result {
            warn!("IMAP session dropped after error: {}", e);
            if let Some(mut session) = self.session.take() {
                let _ = session.logout();
            }
        }
        result
    }

    fn search(&mut self, query: &MailQuery) -> Result<Vec<u32>, MailError> {
        let command = if self.account.is_gmail() {
            format!("X-GM-RAW \"{}\"", query.to_gmail_search())
        } else if query.unread {
            "UNSEEN".to_string()
        } else {
            "ALL".to_string()
        };
        let session = self.session()?;
        let uids = session.uid_search(command)?;
        Ok(uids.into_iter().collect())
    }

    fn download(&mut self, id: &MessageId) -> Result<Vec<u8>, MailError> {
        let session = self.session()?;
        // PEEK keeps the \Seen flag untouched.
        let fetches = session.uid_fetch(id.as_str(), "BODY.PEEK[]")?;
        fetches
            .iter()
            .find_map(|f| f.body())
            .map(|b| b.to_vec())
            .ok_or_else(|| MailError::MessageNotFound(id.clone()))
    }

    /// Walk candidate UIDs newest first, keeping messages that match the
    /// query until `max` are found.
    fn collect_matching(
        &mut self,
        query: &MailQuery,
        mut uids: Vec<u32>,
        max: usize,
    ) -> Result<Vec<MessageId>, MailError> {
        uids.sort_unstable_by(|a, b| b.cmp(a));
        let mut ids = Vec::new();
        for uid in uids {
            if ids.len() >= max {
                break;
            }
            if self.unqualified.contains(&uid) {
                continue;
            }
            let id = MessageId::new(uid.to_string());
            let raw = match self.download(&id) {
                Ok(raw) => raw,
                Err(MailError::MessageNotFound(_)) => {
                    // Expunged since the search.
                    debug!("Message {} vanished before fetch", id);
                    continue;
                }
                Err(e) => return self.reset_on_error(Err(e)),
            };
            match parse_message(&id, &raw) {
                Ok(message) if query.matches(&message) => {
                    self.listed.insert(id.clone(), message);
                    ids.push(id);
                }
                Ok(_) => {
                    debug!("Message {} has no qualifying attachment", id);
                    self.unqualified.insert(uid);
                }
                Err(e) => {
                    warn!("Skipping message {}: {}", id, e);
                    self.unqualified.insert(uid);
                }
            }
        }
        Ok(ids)
    }

    /// Log out (best-effort).
    pub fn logout(&mut self) {
        if let Some(mut session) = self.session.take() {
            let _ = session.logout();
        }
    }
}

impl MailSource for ImapMailSource {
    fn list(&mut self, query: &MailQuery, max: usize) -> Result<Vec<MessageId>, MailError> {
        self.listed.clear();
        self.raw.clear();
        let result = self.search(query);
        let uids = self.reset_on_error(result)?;
        // UNSEEN alone says nothing about attachments, so every candidate is
        // checked before the cap applies.
        self.collect_matching(query, uids, max)
    }

    fn fetch(&mut self, id: &MessageId) -> Result<Message, MailError> {
        if let Some(message) = self.listed.get(id) {
            return Ok(message.clone());
        }
        let result = self.download(id);
        let raw = self.reset_on_error(result)?;
        parse_message(id, &raw)
    }

    fn fetch_attachment(&mut self, attachment: &Attachment) -> Result<Vec<u8>, MailError> {
        let id = &attachment.message_id;
        if !self.raw.contains_key(id) {
            let result = self.download(id);
            let body = self.reset_on_error(result)?;
            self.raw.insert(id.clone(), body);
        }
        let raw = self
            .raw
            .get(id)
            .ok_or_else(|| MailError::MessageNotFound(id.clone()))?;
        let parsed = mailparse::parse_mail(raw).map_err(|source| MailError::Parse {
            id: attachment.message_id.clone(),
            source,
        })?;
        let part = find_part(&parsed, &attachment.id).ok_or_else(|| {
            MailError::AttachmentNotFound {
                message: attachment.message_id.clone(),
                attachment: attachment.id.clone(),
            }
        })?;
        part.get_body_raw().map_err(|source| MailError::Parse {
            id: attachment.message_id.clone(),
            source,
        })
    }

    fn mark_read(&mut self, id: &MessageId) -> Result<(), MailError> {
        let result = self
            .session()
            .and_then(|s| s.uid_store(id.as_str(), "+FLAGS (\\Seen)").map_err(MailError::from));
        self.reset_on_error(result)?;
        debug!("Flagged {} as \\Seen", id);
        Ok(())
    }

    fn release(&mut self, id: &MessageId) {
        self.listed.remove(id);
        self.raw.remove(id);
    }
}

/// Build a [`Message`] from raw RFC 822 bytes.
pub fn parse_message(id: &MessageId, raw: &[u8]) -> Result<Message, MailError> {
    let parsed = mailparse::parse_mail(raw).map_err(|source| MailError::Parse {
        id: id.clone(),
        source,
    })?;
    let from = parsed.headers.get_first_value("From").unwrap_or_default();
    let mut attachments = Vec::new();
    collect_attachments(&parsed, String::new(), id, &mut attachments);
    Ok(Message {
        id: id.clone(),
        sender: normalize_sender(&from),
        attachments,
        unread: true,
    })
}

/// Part path of child `index` (1-based) under `parent`.
fn child_path(parent: &str, index: usize) -> String {
    if parent.is_empty() {
        index.to_string()
    } else {
        format!("{}.{}", parent, index)
    }
}

fn collect_attachments(
    part: &ParsedMail,
    path: String,
    id: &MessageId,
    out: &mut Vec<Attachment>,
) {
    if part.subparts.is_empty() {
        if let Some(name) = part_filename(part) {
            let part_id = if path.is_empty() { "1".to_string() } else { path };
            out.push(Attachment::new(id.clone(), part_id, name));
        }
        return;
    }
    for (i, sub) in part.subparts.iter().enumerate() {
        collect_attachments(sub, child_path(&path, i + 1), id, out);
    }
}

/// Filename from Content-Disposition, else the Content-Type `name` parameter.
fn part_filename(part: &ParsedMail) -> Option<String> {
    let disposition = part.get_content_disposition();
    disposition
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
}

fn find_part<'a>(root: &'a ParsedMail<'a>, part_id: &str) -> Option<&'a ParsedMail<'a>> {
    if root.subparts.is_empty() {
        return (part_id == "1").then_some(root);
    }
    let mut current = root;
    for index in part_id.split('.') {
        let i: usize = index.parse().ok()?;
        current = current.subparts.get(i.checked_sub(1)?)?;
    }
    Some(current)
}
