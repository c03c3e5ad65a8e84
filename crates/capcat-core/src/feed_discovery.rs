use std::time::Duration;

use url::Url;

use crate::error::{CapcatError, Result};

/// Fixed list of common feed paths tried after `<link rel=alternate>`
/// discovery comes up empty.
const COMMON_FEED_PATHS: &[&str] = &[
    "/feed",
    "/rss",
    "/atom",
    "/feed.xml",
    "/rss.xml",
    "/atom.xml",
    "/index.xml",
    "/feeds/posts/default",
    "/?feed=rss2",
    "/rss/",
    "/feed/",
];

/// From a site's homepage HTML, enumerate candidate feed URLs: first
/// any `<link rel="alternate" type="application/(rss|atom)+xml">`
/// hrefs, absolutized against `site_url`, then the fixed common-path
/// list appended and deduplicated.
pub async fn discover_feed_urls(
    client: &reqwest::Client,
    site_url: &str,
    timeout: Duration,
) -> Result<Vec<String>> {
    let base = Url::parse(site_url).map_err(|e| CapcatError::Validation {
        field: "base_url".to_string(),
        requirement: e.to_string(),
    })?;

    let mut candidates = Vec::new();

    let html = fetch_html(client, site_url, timeout).await.unwrap_or_default();
    for href in extract_alternate_links(&html) {
        if let Ok(absolute) = base.join(&href) {
            candidates.push(absolute.to_string());
        }
    }

    for suffix in COMMON_FEED_PATHS {
        if let Ok(absolute) = base.join(suffix) {
            candidates.push(absolute.to_string());
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|url| seen.insert(url.clone()));

    Ok(candidates)
}

async fn fetch_html(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<String> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| CapcatError::from_reqwest(url, timeout, e))?;
    response
        .text()
        .await
        .map_err(|e| CapcatError::from_reqwest(url, timeout, e))
}

/// Extract `href` attributes from `<link>` tags whose `type` attribute
/// names an RSS or Atom MIME type. Intentionally tolerant: a lightweight
/// scan rather than a full HTML parse, since the only input it needs is
/// `<link ... >` tags in the `<head>`.
fn extract_alternate_links(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    for link_tag in find_tags(html, "link") {
        let is_feed_type = link_tag
            .contains("application/rss+xml")
            || link_tag.contains("application/atom+xml")
            || link_tag.contains("type=\"application/xml\"");
        let is_alternate = link_tag.contains("rel=\"alternate\"") || link_tag.contains("rel='alternate'");
        if is_feed_type && is_alternate {
            if let Some(href) = extract_attr(&link_tag, "href") {
                out.push(href);
            }
        }
    }
    out
}

fn find_tags(html: &str, tag_name: &str) -> Vec<String> {
    let needle = format!("<{tag_name}");
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(&needle) {
        let after = &rest[start..];
        if let Some(end) = after.find('>') {
            out.push(after[..=end].to_string());
            rest = &after[end + 1..];
        } else {
            break;
        }
    }
    out
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let needle = format!("{attr}={quote}");
        if let Some(start) = tag.find(&needle) {
            let after = &tag[start + needle.len()..];
            if let Some(end) = after.find(quote) {
                return Some(after[..end].to_string());
            }
        }
    }
    None
}

/// Returns true if the bytes look like RSS or Atom at the root: cheap
/// validation used to short-circuit before a full feed parse.
pub fn validate_feed(bytes: &[u8]) -> bool {
    let text = String::from_utf8_lossy(bytes);
    let lower = text.to_lowercase();
    (lower.contains("<rss") && lower.contains("<channel"))
        || lower.contains("<feed")
        || lower.contains("<item")
        || lower.contains("<entry")
}
