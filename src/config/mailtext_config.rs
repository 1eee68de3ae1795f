//! Unified config type: parse mailtext.toml (account + watch + sync + extract).

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::accounts::{Account, WatchConfig, apply_preset};
use crate::resolve;
use crate::sync::store::DedupPolicy;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MailtextConfig {
    #[serde(default)]
    pub account: Account,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub dedup: DedupPolicy,
}

/// External programs used by the command-line extraction engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_pdftotext")]
    pub pdftotext: String,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: String,
    #[serde(default = "default_tesseract")]
    pub tesseract: String,
    #[serde(default = "default_languages")]
    pub languages: String,
}

fn default_pdftotext() -> String {
    "pdftotext".to_string()
}
fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}
fn default_tesseract() -> String {
    "tesseract".to_string()
}
fn default_languages() -> String {
    "spa+eng".to_string()
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            pdftotext: default_pdftotext(),
            pdftoppm: default_pdftoppm(),
            tesseract: default_tesseract(),
            languages: default_languages(),
        }
    }
}

/// Parse config text and apply provider presets.
pub fn parse_config(content: &str) -> Result<MailtextConfig> {
    let mut config: MailtextConfig = toml::from_str(content)?;
    apply_preset(&mut config.account);
    Ok(config)
}

/// Load mailtext.toml from a given path or the resolved location.
pub fn load_config(path: Option<&Path>) -> Result<MailtextConfig> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(resolve::config_file);
    if !path.exists() {
        bail!(
            "mailtext.toml not found at {}.\nCreate it with an [account] section (user, password or password_cmd).",
            path.display()
        );
    }
    let content = std::fs::read_to_string(&path)?;
    parse_config(&content)
}

/// Try loading config, returning None if the file doesn't exist or doesn't parse.
pub fn try_load_config(path: Option<&Path>) -> Option<MailtextConfig> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(resolve::config_file);
    if !path.exists() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    parse_config(&content).ok()
}
