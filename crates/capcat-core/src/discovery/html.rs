use std::collections::HashSet;
use std::time::Duration;

use tracing::debug;
use url::Url;

use super::skip_pattern_matches;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{CapcatError, Result};
use crate::models::{Article, DiscoverySpec, SourceDescriptor};
use crate::rate_limiter::RateLimiter;

/// HTML discovery strategy: fetch the index page once, then for each
/// CSS-like selector in `article_selectors` (in order), collect anchors
/// matching it. A selector that yields nothing, or whose extraction
/// logic panics-worthy input shows up as malformed, must not abort
/// discovery for the remaining selectors.
pub async fn discover_html(
    descriptor: &SourceDescriptor,
    count: u32,
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    should_skip: impl Fn(&str, &str) -> bool,
) -> Result<Vec<Article>> {
    let DiscoverySpec::Html {
        index_url,
        article_selectors,
    } = &descriptor.discovery
    else {
        unreachable!("discover_html called on a non-HTML descriptor");
    };

    let timeout = Duration::from_secs_f64(descriptor.timeout);
    let html = circuit_breaker
        .call(|| async {
            rate_limiter.acquire().await;
            let response = client
                .get(index_url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| CapcatError::from_reqwest(index_url.clone(), timeout, e))?;
            response
                .text()
                .await
                .map_err(|e| CapcatError::from_reqwest(index_url.clone(), timeout, e))
        })
        .await?;

    let base = Url::parse(index_url).map_err(|e| CapcatError::Parsing {
        url: index_url.clone(),
        reason: e.to_string(),
    })?;

    let mut processed = HashSet::new();
    let mut articles = Vec::new();

    for selector in article_selectors {
        let anchors = match extract_anchors_for_selector(&html, selector) {
            Ok(anchors) => anchors,
            Err(e) => {
                debug!(selector, error = %e, "selector extraction failed, trying next selector");
                continue;
            }
        };

        for (href, text) in anchors {
            if articles.len() >= count as usize {
                break;
            }
            let Ok(absolute) = base.join(&href) else {
                continue;
            };
            let url = absolute.to_string();
            if !processed.insert(url.clone()) {
                continue;
            }

            let title = if text.trim().is_empty() {
                "Untitled Article".to_string()
            } else {
                text
            };

            if skip_pattern_matches(&url, &descriptor.skip_patterns) || should_skip(&url, &title) {
                continue;
            }

            articles.push(Article::new(title, url));
        }
    }

    if articles.is_empty() {
        return Err(CapcatError::ArticleDiscoveryFailed {
            source_id: descriptor.source_id.clone(),
        });
    }

    Ok(articles)
}

/// Anchors matching a CSS-path-like selector. This performs a minimal,
/// tag-scoped scan rather than a full CSS engine, since the core's job
/// is resolving + filtering candidate URLs, not general HTML querying —
/// the `content_selectors` hints stay opaque and are handed to the
/// `ContentFetcher` collaborator unevaluated.
///
/// A selector is at most `ancestor anchor`: a leading ancestor token
/// (e.g. `article a`) scopes the scan to that tag's blocks so `nav a`
/// and `article a` pick up different anchors on the same page; a
/// trailing `.class`/`#id` on either token (`div.content a.headline`)
/// filters by that class/id. Unrecognized combinator syntax beyond this
/// (child `>`, attribute selectors, pseudo-classes) is not supported —
/// the token is matched literally and will simply yield no blocks.
fn extract_anchors_for_selector(
    html: &str,
    selector: &str,
) -> std::result::Result<Vec<(String, String)>, String> {
    let mut tokens: Vec<&str> = selector.split_whitespace().collect();
    let anchor_token = tokens.pop().unwrap_or("a");
    let ancestor_token = tokens.pop();

    let blocks: Vec<String> = match ancestor_token {
        Some(ancestor) => extract_tag_blocks(html, ancestor),
        None => vec![html.to_string()],
    };

    let (_, anchor_class, anchor_id) = parse_tag_selector(anchor_token);

    let mut out = Vec::new();
    for block in &blocks {
        for (tag, href, text) in scan_anchors(block) {
            if let Some(class) = &anchor_class {
                if !tag_has_class(&tag, class) {
                    continue;
                }
            }
            if let Some(id) = &anchor_id {
                if extract_attr(&tag, "id").as_deref() != Some(id.as_str()) {
                    continue;
                }
            }
            out.push((href, text));
        }
    }
    Ok(out)
}

/// Splits a single selector token into `(tag, class, id)`, e.g.
/// `"article"` -> `(Some("article"), None, None)`,
/// `"a.headline"` -> `(Some("a"), Some("headline"), None)`,
/// `"#main"` -> `(None, None, Some("main"))`.
fn parse_tag_selector(token: &str) -> (Option<String>, Option<String>, Option<String>) {
    let split_at = token.find(['.', '#']).unwrap_or(token.len());
    let (tag, rest) = token.split_at(split_at);
    let tag = (!tag.is_empty()).then(|| tag.to_string());

    if let Some(class) = rest.strip_prefix('.') {
        (tag, Some(class.to_string()), None)
    } else if let Some(id) = rest.strip_prefix('#') {
        (tag, None, Some(id.to_string()))
    } else {
        (tag, None, None)
    }
}

/// Inner HTML of every block whose opening tag matches `token`'s tag
/// name (defaulting to `div` when the token is a bare `.class`/`#id`)
/// and class/id. Matching is a flat first-close scan, not nesting-aware.
fn extract_tag_blocks(html: &str, token: &str) -> Vec<String> {
    let (tag, class, id) = parse_tag_selector(token);
    let tag_name = tag.unwrap_or_else(|| "div".to_string());
    let open_needle = format!("<{tag_name}");
    let close_needle = format!("</{tag_name}>");

    let mut out = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find(&open_needle) {
        let after = &rest[start..];
        let Some(tag_end) = after.find('>') else {
            break;
        };
        let open_tag = &after[..=tag_end];
        let matches = class.as_ref().map_or(true, |c| tag_has_class(open_tag, c))
            && id
                .as_ref()
                .map_or(true, |i| extract_attr(open_tag, "id").as_deref() == Some(i.as_str()));

        let body_start = tag_end + 1;
        let Some(close_rel) = after[body_start..].find(&close_needle) else {
            rest = &after[body_start..];
            continue;
        };
        if matches {
            out.push(after[body_start..body_start + close_rel].to_string());
        }
        rest = &after[body_start + close_rel + close_needle.len()..];
    }
    out
}

fn tag_has_class(tag: &str, class: &str) -> bool {
    extract_attr(tag, "class")
        .map(|c| c.split_whitespace().any(|w| w == class))
        .unwrap_or(false)
}

/// `(tag, href, text)` for every `<a href="...">...</a>` in `html`.
fn scan_anchors(html: &str) -> Vec<(String, String, String)> {
    let mut out = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find("<a ") {
        let after = &rest[start..];
        let Some(tag_end) = after.find('>') else {
            break;
        };
        let tag = &after[..=tag_end];
        let href = extract_attr(tag, "href");

        let body_start = tag_end + 1;
        let Some(close) = after[body_start..].find("</a>") else {
            rest = &after[body_start..];
            continue;
        };
        let text = strip_tags(&after[body_start..body_start + close]);

        if let Some(href) = href {
            out.push((tag.to_string(), href, text));
        }
        rest = &after[body_start + close + 4..];
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

fn strip_tags(s: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerSpec;
    use crate::models::RateLimitSpec;

    fn descriptor(index_url: &str) -> SourceDescriptor {
        SourceDescriptor {
            source_id: "ex".to_string(),
            display_name: "Example".to_string(),
            base_url: "https://example.com".to_string(),
            category: "tech".to_string(),
            timeout: 5.0,
            rate_limit: RateLimitSpec {
                requests_per_second: 100.0,
                burst: 10,
                min_delay_seconds: 0.0,
            },
            supports_comments: false,
            has_comments: false,
            kind: crate::models::SourceKind::Declarative,
            discovery: DiscoverySpec::Html {
                index_url: index_url.to_string(),
                article_selectors: vec!["article a".to_string()],
            },
            content_selectors: vec!["article".to_string()],
            skip_patterns: vec![],
        }
    }

    #[test]
    fn extracts_anchor_href_and_text() {
        let html = r#"<div><a href="/post/1">First Post</a></div>"#;
        let anchors = extract_anchors_for_selector(html, "a").unwrap();
        assert_eq!(anchors, vec![("/post/1".to_string(), "First Post".to_string())]);
    }

    #[tokio::test]
    async fn discovers_articles_from_index_page() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/");
                then.status(200).body(
                    r#"<html><body>
                    <nav><a href="/about">About</a></nav>
                    <article><a href="/post/1">Post One</a></article>
                    <article><a href="/post/2">Post Two</a></article>
                    </body></html>"#,
                );
            })
            .await;

        let descriptor = descriptor(&server.url("/"));
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_html(&descriptor, 5, &client, &rate_limiter, &circuit_breaker, |_, _| false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "Post One");
    }

    #[tokio::test]
    async fn duplicate_hrefs_deduped_within_call() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/");
                then.status(200).body(
                    r#"<article><a href="/post/1">One</a><a href="/post/1">One Again</a></article>"#,
                );
            })
            .await;

        let descriptor = descriptor(&server.url("/"));
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_html(&descriptor, 5, &client, &rate_limiter, &circuit_breaker, |_, _| false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 1);
    }

    #[test]
    fn selector_scopes_to_ancestor_tag() {
        let html = r#"
            <nav><a href="/about">About</a><a href="/contact">Contact</a></nav>
            <article><a href="/post/1">Post One</a></article>
        "#;

        let nav_only = extract_anchors_for_selector(html, "nav a").unwrap();
        assert_eq!(nav_only, vec![
            ("/about".to_string(), "About".to_string()),
            ("/contact".to_string(), "Contact".to_string()),
        ]);

        let article_only = extract_anchors_for_selector(html, "article a").unwrap();
        assert_eq!(article_only, vec![("/post/1".to_string(), "Post One".to_string())]);
    }

    #[test]
    fn selector_with_no_matching_ancestor_yields_nothing() {
        let html = r#"<div><a href="/post/1">Post One</a></div>"#;
        let anchors = extract_anchors_for_selector(html, "article a").unwrap();
        assert!(anchors.is_empty());
    }

    #[test]
    fn selector_filters_anchor_by_class() {
        let html = r#"
            <div>
                <a class="headline" href="/post/1">Headline</a>
                <a class="byline" href="/author/jane">Jane</a>
            </div>
        "#;
        let anchors = extract_anchors_for_selector(html, "a.headline").unwrap();
        assert_eq!(anchors, vec![("/post/1".to_string(), "Headline".to_string())]);
    }
}
