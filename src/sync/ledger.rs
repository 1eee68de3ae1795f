//! Append-only ledger of artifacts whose text has been extracted.
//!
//! On disk: one artifact key per line, UTF-8, never rewritten. In memory: the
//! snapshot loaded at cycle start plus the keys recorded during the cycle.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::store::ArtifactPath;

#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    snapshot: HashSet<String>,
    recorded: HashSet<String>,
    /// Last line on disk lacks its newline (torn append).
    torn_tail: bool,
}

impl ProcessedLedger {
    /// Load the ledger file. A missing file is an empty ledger; an unreadable
    /// one is logged and also treated as empty, which means reprocessing.
    pub fn load(path: &Path) -> Self {
        let mut ledger = Self {
            path: path.to_path_buf(),
            snapshot: HashSet::new(),
            recorded: HashSet::new(),
            torn_tail: false,
        };
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ledger,
            Err(e) => {
                warn!(
                    "Ledger {} unreadable ({}); every stored artifact is eligible again",
                    path.display(),
                    e
                );
                return ledger;
            }
        };

        ledger.torn_tail = !data.is_empty() && !data.ends_with(b"\n");
        let mut skipped = 0usize;
        for line in data.split(|b| *b == b'\n') {
            match std::str::from_utf8(line) {
                Ok(s) => {
                    let key = s.trim();
                    if !key.is_empty() {
                        ledger.snapshot.insert(key.to_string());
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} non-UTF-8 line(s) in ledger {}",
                skipped,
                path.display()
            );
        }
        debug!("Loaded {} ledger entries", ledger.snapshot.len());
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, artifact: &ArtifactPath) -> bool {
        self.contains_key(&artifact.key())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.snapshot.contains(key) || self.recorded.contains(key)
    }

    /// Durably append one artifact, then remember it for the rest of the cycle.
    ///
    /// The in-memory set only changes once the append has reached disk.
    pub fn record(&mut self, artifact: &ArtifactPath) -> std::io::Result<()> {
        let key = artifact.key();
        if self.contains_key(&key) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = String::with_capacity(key.len() + 2);
        if self.torn_tail {
            line.push('\n');
        }
        line.push_str(&key);
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        self.torn_tail = false;
        self.recorded.insert(key);
        Ok(())
    }

    /// Fold this cycle's records into the snapshot. Returns how many were added.
    pub fn merge_cycle(&mut self) -> usize {
        let added = self.recorded.len();
        self.snapshot.extend(self.recorded.drain());
        added
    }

    pub fn recorded_this_cycle(&self) -> usize {
        self.recorded.len()
    }

    pub fn len(&self) -> usize {
        self.snapshot.len() + self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
