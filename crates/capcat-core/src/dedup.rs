use std::collections::HashSet;
use std::sync::Mutex;

use url::Url;

/// Tracking query parameters stripped before two URLs are compared, so
/// the same link shared with different campaign tags still collides.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
    "gclid",
    "mc_cid",
    "mc_eid",
];

/// Strip tracking params and the fragment so equivalent links normalize
/// to the same key.
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    let filtered: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if filtered.is_empty() {
        parsed.set_query(None);
    } else {
        let qs: Vec<String> = filtered.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parsed.set_query(Some(&qs.join("&")));
    }

    parsed.to_string()
}

/// Cross-source URL deduplicator, scoped to exactly one batch run (see
/// the Open Question resolution on dedup set scope: per-run, not a
/// process-global singleton). Construct one fresh instance per
/// invocation of the batch processor.
#[derive(Default)]
pub struct UrlDedupSet {
    seen: Mutex<HashSet<String>>,
}

impl UrlDedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check-and-insert. Returns `true` if this is the first
    /// time the (normalized) URL has been seen in this run, `false` if
    /// it is a duplicate that should be dropped.
    pub fn mark_if_new(&self, url: &str) -> bool {
        let key = normalize_url(url);
        let mut seen = self.seen.lock().expect("dedup set mutex poisoned");
        seen.insert(key)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("dedup set mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
