//! Mailbox sync: download qualifying attachments once, extract text once.

pub mod coordinator;
pub mod imap_source;
pub mod ledger;
pub mod sender;
pub mod source;
pub mod store;
pub mod types;

use anyhow::{Context, Result};
use std::time::Duration;

use crate::accounts::resolve_password;
use crate::config::mailtext_config::{self, MailtextConfig};
use crate::extract::CommandExtractor;
use crate::resolve;

use self::coordinator::{CycleSettings, SyncCoordinator};
use self::imap_source::ImapMailSource;
use self::ledger::ProcessedLedger;
use self::source::MailQuery;
use self::store::AttachmentStore;

pub type MailboxCoordinator = SyncCoordinator<ImapMailSource, CommandExtractor>;

/// Cycle settings from config, with an optional interval override in seconds.
pub fn cycle_settings(config: &MailtextConfig, interval_override: Option<u64>) -> CycleSettings {
    CycleSettings {
        query: MailQuery::default(),
        max_messages: config.watch.max_messages,
        interval: Duration::from_secs(interval_override.unwrap_or(config.watch.poll_interval)),
    }
}

/// Connect to the mailbox and wire up store, ledger and extraction engine.
///
/// Failing to establish the IMAP session is the one fatal error.
pub fn build_coordinator(
    config: &MailtextConfig,
    interval_override: Option<u64>,
) -> Result<MailboxCoordinator> {
    let account = config.account.clone();
    let password = resolve_password(&account)?;
    let source = ImapMailSource::connect(account, password).with_context(|| {
        format!(
            "could not open a mailbox session on {}:{}",
            config.account.imap_host, config.account.imap_port
        )
    })?;
    let store = AttachmentStore::new(resolve::attachments_dir(), config.sync.dedup);
    Ok(SyncCoordinator::new(
        source,
        CommandExtractor::new(config.extract.clone()),
        store,
        resolve::ledger_file(),
        cycle_settings(config, interval_override),
    ))
}

/// mailtext sync: exactly one cycle.
pub fn run() -> Result<()> {
    let config = mailtext_config::load_config(None)?;
    let mut coordinator = build_coordinator(&config, None)?;
    let report = coordinator.run_cycle();
    coordinator.source_mut().logout();
    println!("\nSync complete: {}.", report.summary());
    Ok(())
}

/// mailtext status: ledger size and stored sender directories.
pub fn status() -> Result<()> {
    let dedup = mailtext_config::try_load_config(None)
        .map(|c| c.sync.dedup)
        .unwrap_or_default();
    let ledger = ProcessedLedger::load(&resolve::ledger_file());
    let store = AttachmentStore::new(resolve::attachments_dir(), dedup);

    println!("Data directory: {}", resolve::data_dir().display());
    println!("Dedup policy:   {:?}", store.policy());
    println!(
        "Ledger:         {} extracted artifact(s) in {}",
        ledger.len(),
        ledger.path().display()
    );
    let senders = store.senders()?;
    println!("Senders:        {}", senders.len());
    for sender in &senders {
        let files = std::fs::read_dir(store.root().join(sender))
            .map(|rd| rd.filter_map(|e| e.ok()).count())
            .unwrap_or(0);
        println!("  {:<40} {} file(s)", sender, files);
    }
    Ok(())
}
