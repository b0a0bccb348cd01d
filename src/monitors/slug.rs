//! Slug allocation for new monitors
//!
//! A slug is the lowercase, dash-separated form of the monitor name. When the
//! base slug is taken the allocator appends the next free numeric suffix
//! (`my-site`, `my-site-2`, `my-site-3`, ...).

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

static NON_SLUG_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// Turn a display name into a base slug
///
/// Names without any ASCII letters or digits get a random placeholder.
///
/// ```
/// use uptime_monitoring::monitors::slug::slugify;
///
/// assert_eq!(slugify("My  Site!"), "my-site");
/// assert_eq!(slugify("--API v2--"), "api-v2");
/// ```
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase();
    let dashed = NON_SLUG_CHARS.replace_all(&lowered, "-");
    let slug = dashed.trim_matches('-');

    if slug.is_empty() {
        Uuid::new_v4().simple().to_string()
    } else {
        slug.to_string()
    }
}

/// Pick the first free slug for `base` given the slugs already in use
///
/// `taken` only needs to contain `base` itself and its `base-N` variants;
/// anything else is ignored.
pub fn next_available<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    if !taken.iter().any(|s| s.as_ref() == base) {
        return base.to_string();
    }

    let highest = taken
        .iter()
        .filter_map(|s| suffix_of(base, s.as_ref()))
        .max()
        .unwrap_or(1);

    format!("{base}-{}", highest.saturating_add(1).max(2))
}

/// Numeric suffix N if `slug` is exactly `base-N`
fn suffix_of(base: &str, slug: &str) -> Option<u64> {
    let digits = slug.strip_prefix(base)?.strip_prefix('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
