//! Message-to-sender resolution: turn a `From` header into a directory name.

use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]*)>").unwrap());

/// Directory used when a message carries no usable sender.
pub const UNKNOWN_SENDER: &str = "unknown";

/// Normalize a free-text `From` header into a sender identity.
///
/// Keeps the display name (text before `<`), drops quotes, and joins words
/// with `_`: `"Jane Doe" <jane@x.com>` becomes `Jane_Doe`. A header with no
/// display name falls back to the bracketed address.
pub fn normalize_sender(from: &str) -> String {
    let display = from.split('<').next().unwrap_or_default();
    let name = clean(display);
    if !name.is_empty() {
        return name;
    }
    let address = ADDRESS_RE
        .captures(from)
        .map(|cap| clean(&cap[1]))
        .unwrap_or_default();
    if address.is_empty() {
        UNKNOWN_SENDER.to_string()
    } else {
        address
    }
}

fn clean(text: &str) -> String {
    let unquoted: String = text
        .chars()
        .filter(|c| *c != '"' && *c != '\'')
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let joined = WHITESPACE_RE.replace_all(unquoted.trim(), "_");
    joined.trim_matches(|c| c == '_' || c == '.').to_string()
}
