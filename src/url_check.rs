//! Validation and normalization of user-supplied URLs.
//!
//! Runs before any network or storage activity: a rejected URL never
//! creates a session.

use url::Url;

/// True iff `input` parses as a URL with an `http` or `https` scheme.
/// Never panics; parse failures and other schemes yield `false`.
pub fn is_valid(input: &str) -> bool {
    match Url::parse(input.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Trims whitespace, strips trailing slashes, and prepends `https://` when
/// no scheme prefix is present. Idempotent: normalizing twice changes
/// nothing. Empty input is returned as-is (and fails [`is_valid`]).
pub fn normalize(input: &str) -> String {
    let mut out = input.trim().to_string();
    if out.is_empty() {
        return out;
    }
    while out.ends_with('/') {
        out.pop();
    }
    if !out.starts_with("http://") && !out.starts_with("https://") {
        out = format!("https://{out}");
    }
    out
}
