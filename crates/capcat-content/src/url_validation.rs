//! Scheme allow-listing for user- and feed-supplied URLs, grounded in
//! `url_utils.py`'s `URLValidator`. Only `http`/`https` are ever fetched;
//! `file`, `ftp`, `data`, `javascript`, and `mailto` are rejected outright
//! rather than silently stripped.

use url::Url;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRejected {
    pub url: String,
    pub reason: String,
}

impl std::fmt::Display for UrlRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rejected url {}: {}", self.url, self.reason)
    }
}

pub fn validate_article_url(url: &str) -> Result<(), UrlRejected> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(UrlRejected {
            url: url.to_string(),
            reason: "url cannot be empty".to_string(),
        });
    }

    let parsed = Url::parse(trimmed).map_err(|e| UrlRejected {
        url: url.to_string(),
        reason: format!("malformed url: {e}"),
    })?;

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(UrlRejected {
            url: url.to_string(),
            reason: format!("only {} urls supported", ALLOWED_SCHEMES.join("/")),
        });
    }

    if parsed.host_str().is_none() {
        return Err(UrlRejected {
            url: url.to_string(),
            reason: "url must include a domain name".to_string(),
        });
    }

    Ok(())
}

/// Resolve a possibly relative/protocol-relative media URL against a
/// base page URL, rejecting dangerous schemes outright instead of
/// resolving them.
pub fn normalize_media_url(candidate: &str, base: &Url) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    for blocked in ["data:", "javascript:", "mailto:", "file:"] {
        if candidate.starts_with(blocked) {
            return None;
        }
    }

    base.join(candidate).ok().map(|u| u.to_string())
}
