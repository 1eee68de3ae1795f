//! Mailbox account settings with provider presets.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Provider presets for common IMAP configurations.
pub fn provider_presets() -> HashMap<&'static str, AccountDefaults> {
    let mut m = HashMap::new();
    m.insert(
        "gmail",
        AccountDefaults {
            imap_host: "imap.gmail.com",
            imap_port: 993,
            imap_starttls: false,
        },
    );
    m.insert(
        "protonmail-bridge",
        AccountDefaults {
            imap_host: "127.0.0.1",
            imap_port: 1143,
            imap_starttls: true,
        },
    );
    m
}

pub struct AccountDefaults {
    pub imap_host: &'static str,
    pub imap_port: u16,
    pub imap_starttls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_cmd: String,
    #[serde(default)]
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    #[serde(default)]
    pub imap_starttls: bool,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
}

fn default_provider() -> String {
    "imap".to_string()
}
fn default_imap_port() -> u16 {
    993
}
fn default_mailbox() -> String {
    "INBOX".to_string()
}

impl Default for Account {
    fn default() -> Self {
        Self {
            provider: "imap".to_string(),
            user: String::new(),
            password: String::new(),
            password_cmd: String::new(),
            imap_host: String::new(),
            imap_port: 993,
            imap_starttls: false,
            mailbox: "INBOX".to_string(),
        }
    }
}

impl Account {
    /// Gmail understands its own search syntax over IMAP (X-GM-RAW).
    pub fn is_gmail(&self) -> bool {
        self.provider == "gmail" || self.imap_host.eq_ignore_ascii_case("imap.gmail.com")
    }
}

/// Apply provider preset defaults. Account values win over preset.
pub fn apply_preset(account: &mut Account) {
    let presets = provider_presets();
    let Some(preset) = presets.get(account.provider.as_str()) else {
        return;
    };
    let defaults = Account::default();
    if account.imap_host == defaults.imap_host {
        account.imap_host = preset.imap_host.to_string();
    }
    if account.imap_port == defaults.imap_port {
        account.imap_port = preset.imap_port;
    }
    if account.imap_starttls == defaults.imap_starttls && preset.imap_starttls {
        account.imap_starttls = preset.imap_starttls;
    }
}

/// Resolve password: inline value if set, else run password_cmd.
pub fn resolve_password(account: &Account) -> Result<String> {
    if !account.password.is_empty() {
        return Ok(account.password.clone());
    }
    if !account.password_cmd.is_empty() {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(&account.password_cmd)
            .output()?;
        if !output.status.success() {
            bail!(
                "password_cmd failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }
    bail!("Account {:?} has no password or password_cmd", account.user)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    #[serde(default)]
    pub notify: bool,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_poll_interval() -> u64 {
    10
}
fn default_max_messages() -> usize {
    50
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: 10,
            notify: false,
            max_messages: 50,
        }
    }
}
