//! The poll loop: decide per cycle what to download, extract, and mark read.
//!
//! State lives in three places that share no transaction: the unread flag
//! (remote), the attachment store and the ledger (local). Order of writes
//! within an artifact is store → text → ledger → unread flag, so a crash at
//! any point leaves work that the next cycle picks up again.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ledger::ProcessedLedger;
use super::source::{MailQuery, MailSource};
use super::store::{AttachmentStore, Materialized};
use super::types::{CycleReport, Message};
use crate::extract::{ExtractionEngine, failure_text};

/// Pause between cycles. Implementations should return early once
/// `shutdown` is set.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration, shutdown: &AtomicBool);
}

/// Blocks the current thread in short slices so Ctrl-C is honored quickly.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration, shutdown: &AtomicBool) {
        let slice = Duration::from_millis(200);
        let mut remaining = duration;
        while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub query: MailQuery,
    pub max_messages: usize,
    pub interval: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            query: MailQuery::default(),
            max_messages: 50,
            interval: Duration::from_secs(10),
        }
    }
}

pub struct SyncCoordinator<S, E> {
    source: S,
    engine: E,
    store: AttachmentStore,
    ledger_path: PathBuf,
    settings: CycleSettings,
}

impl<S: MailSource, E: ExtractionEngine> SyncCoordinator<S, E> {
    pub fn new(
        source: S,
        engine: E,
        store: AttachmentStore,
        ledger_path: impl Into<PathBuf>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            source,
            engine,
            store,
            ledger_path: ledger_path.into(),
            settings,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn store(&self) -> &AttachmentStore {
        &self.store
    }

    /// Run one poll-query-process pass. Never fails: every error is logged
    /// and counted, and the remote/local state it concerns stays untouched.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut ledger = ProcessedLedger::load(&self.ledger_path);

        let ids = match self
            .source
            .list(&self.settings.query, self.settings.max_messages)
        {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Mailbox query failed: {}", e);
                report.errors += 1;
                return report;
            }
        };
        report.candidates = ids.len();

        if ids.is_empty() {
            info!("No messages with valid attachments found.");
            return report;
        }
        info!("Found {} message(s) with valid attachments.", ids.len());

        for id in &ids {
            let message = match self.source.fetch(id) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Failed to fetch message {}: {}", id, e);
                    report.errors += 1;
                    continue;
                }
            };
            self.process_message(&message, &mut ledger, &mut report);
            self.source.release(id);
        }

        let added = ledger.merge_cycle();
        debug!("Ledger now holds {} entries ({} new)", ledger.len(), added);
        if report.extracted == 0 {
            info!("No new files to process. Waiting for new mail...");
        }
        report
    }

    fn process_message(
        &mut self,
        message: &Message,
        ledger: &mut ProcessedLedger,
        report: &mut CycleReport,
    ) {
        let materialized = self.store.materialize(message, &mut self.source, ledger);
        report.errors += materialized.failed;
        if materialized.is_empty() {
            // Nothing new for this message; leave its unread flag alone.
            return;
        }
        report.materialized += materialized.items.len();
        report.downloaded += materialized.items.iter().filter(|m| m.downloaded).count();

        let mut extracted_any = false;
        let mut incomplete = materialized.failed > 0;
        for item in &materialized.items {
            if ledger.contains(&item.artifact) {
                debug!("{} already extracted, skipping", item.artifact);
                continue;
            }
            if self.extract_one(item, ledger) {
                report.extracted += 1;
                extracted_any = true;
            } else {
                report.errors += 1;
                incomplete = true;
            }
        }

        if !extracted_any {
            // Every artifact was ledgered already; the message stays unread.
            return;
        }
        if incomplete {
            // Unread keeps the message in the next query so the failed
            // attachment gets another attempt.
            info!(
                "Message {} has attachments still pending, leaving it unread",
                message.id
            );
            return;
        }
        match self.source.mark_read(&message.id) {
            Ok(()) => {
                report.marked_read += 1;
                info!("Marked message {} as read", message.id);
            }
            Err(e) => {
                report.mark_read_failures += 1;
                warn!("Could not mark message {} as read: {}", message.id, e);
            }
        }
    }

    /// Extract, write the text artifact, then ledger. Returns false if the
    /// artifact was not ledgered; it stays eligible next cycle.
    fn extract_one(&mut self, item: &Materialized, ledger: &mut ProcessedLedger) -> bool {
        let binary = self.store.binary_path(&item.artifact);
        info!("Processing {}...", binary.display());
        let text = match self.engine.extract(&binary, item.kind) {
            Ok(text) => text,
            Err(e) => {
                warn!("Extraction failed for {}: {}", item.artifact, e);
                failure_text(&binary, &e)
            }
        };
        let text_path = match self.store.write_text(&item.artifact, &text) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to write text for {}: {}", item.artifact, e);
                return false;
            }
        };
        info!("Extracted text saved to {}", text_path.display());
        if let Err(e) = ledger.record(&item.artifact) {
            warn!(
                "Failed to record {} in ledger {}: {}",
                item.artifact,
                ledger.path().display(),
                e
            );
            return false;
        }
        true
    }

    /// Poll until `shutdown` is set, with a fixed delay between cycles.
    /// Returns the number of completed cycles.
    pub fn run(&mut self, sleeper: &mut dyn Sleeper, shutdown: &AtomicBool) -> usize {
        self.run_with(sleeper, shutdown, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_cycle` after every cycle.
    pub fn run_with<F>(&mut self, sleeper: &mut dyn Sleeper, shutdown: &AtomicBool, mut on_cycle: F) -> usize
    where
        F: FnMut(&CycleReport),
    {
        let mut cycles = 0;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            let report = self.run_cycle();
            cycles += 1;
            debug!("Cycle {}: {}", cycles, report.summary());
            on_cycle(&report);

            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            info!(
                "Waiting {} seconds before checking again...",
                self.settings.interval.as_secs()
            );
            sleeper.sleep(self.settings.interval, shutdown);
        }
        cycles
    }
}
