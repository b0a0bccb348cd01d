//! Deduplication keys for probe jobs
//!
//! Monitors that point at the same endpoint with the same interval share a
//! single recurring probe. The key for that sharing is the pair of the
//! normalized URL and the interval, used directly as a map key.
//!
//! ## Normalization
//!
//! - scheme defaults to `https://` when the input does not start with one
//! - only `http` and `https` are accepted
//! - host is lowercased
//! - trailing `/` is stripped from any non-root path
//! - fragment is dropped
//! - query string is kept exactly as written, without percent-encoding

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// A leading `scheme://`, as opposed to one embedded later in the URL
static SCHEME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("scheme pattern is valid")
});

/// Errors produced while normalizing a monitor URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The input could not be parsed as a URL
    Invalid(String),

    /// The URL parsed but has no host
    MissingHost(String),

    /// The scheme is something other than http or https
    UnsupportedScheme(String),
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::Invalid(msg) => write!(f, "invalid url: {}", msg),
            UrlError::MissingHost(url) => write!(f, "url has no host: {}", url),
            UrlError::UnsupportedScheme(scheme) => {
                write!(f, "unsupported url scheme: {}", scheme)
            }
        }
    }
}

impl std::error::Error for UrlError {}

/// Normalize a monitor URL so trivially different spellings compare equal
///
/// ```
/// use uptime_monitoring::dedup::normalize_url;
///
/// assert_eq!(normalize_url("X.COM/path/").unwrap(), "https://x.com/path");
/// assert_eq!(normalize_url("x.com/").unwrap(), "https://x.com/");
/// ```
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    let candidate = if SCHEME_PREFIX.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|e| UrlError::Invalid(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::MissingHost(raw.to_string()));
    }

    url.set_fragment(None);
    let has_query = url.query().is_some();
    url.set_query(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let stripped = path.trim_end_matches('/');
        url.set_path(if stripped.is_empty() { "/" } else { stripped });
    }

    let mut normalized = url.to_string();
    if has_query {
        normalized.push('?');
        normalized.push_str(&raw_query(&candidate));
    }

    Ok(normalized)
}

/// The query text as typed: between the first `?` and the fragment
///
/// Tabs and newlines are dropped the same way the URL parser drops them.
fn raw_query(candidate: &str) -> String {
    let before_fragment = candidate.split('#').next().unwrap_or_default();
    before_fragment
        .split_once('?')
        .map(|(_, query)| query)
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

/// Composite key identifying one shared probe job
///
/// Two monitors with equal keys are probed by the same job: one network
/// request per firing, fanned out to both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey {
    url: String,
    interval_secs: u32,
}

impl DedupKey {
    /// Build a key from a raw URL, normalizing it first
    pub fn new(url: &str, interval_secs: u32) -> Result<Self, UrlError> {
        Ok(Self {
            url: normalize_url(url)?,
            interval_secs,
        })
    }

    /// Build a key from a URL that is already normalized (e.g. read back from storage)
    pub(crate) fn from_normalized(url: String, interval_secs: u32) -> Self {
        Self { url, interval_secs }
    }

    /// The normalized URL probed for this key
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    /// The probe period as a `Duration`
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.interval_secs as u64)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}s", self.url, self.interval_secs)
    }
}
