//! Path resolution for mailtext data and config files.
//!
//! Resolution order for data directory:
//!   1. mailtext/ in cwd (developer workflow)
//!   2. MAILTEXT_DATA environment variable
//!   3. ~/Documents/mailtext (general user default)

use std::path::PathBuf;

/// Return the data directory path.
pub fn data_dir() -> PathBuf {
    let local = PathBuf::from("mailtext");
    if local.is_dir() {
        return local;
    }
    if let Ok(env) = std::env::var("MAILTEXT_DATA") {
        if !env.is_empty() {
            return expand_tilde(&env);
        }
    }
    documents_dir().join("mailtext")
}

// --- Derived helpers ---

/// Root of the attachment store (one subdirectory per sender).
pub fn attachments_dir() -> PathBuf {
    data_dir().join("attachments")
}

/// Append-only ledger of extracted artifacts.
pub fn ledger_file() -> PathBuf {
    data_dir().join("processed.txt")
}

pub fn config_file() -> PathBuf {
    data_dir().join("mailtext.toml")
}

fn documents_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(PathBuf::from))
        .unwrap_or_else(|| home_dir().join("Documents"))
}

/// Get the user's home directory.
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Expand ~ to home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        home_dir().join(rest)
    } else if path == "~" {
        home_dir()
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/var/mail"), PathBuf::from("/var/mail"));
    }

    #[test]
    fn test_expand_tilde_home_prefix() {
        assert_eq!(expand_tilde("~/mail"), home_dir().join("mail"));
        assert_eq!(expand_tilde("~"), home_dir());
    }

    #[test]
    fn test_derived_paths_share_data_dir() {
        let data = data_dir();
        assert_eq!(ledger_file(), data.join("processed.txt"));
        assert_eq!(attachments_dir(), data.join("attachments"));
        assert_eq!(config_file(), data.join("mailtext.toml"));
    }
}
