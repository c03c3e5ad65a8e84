use std::time::Duration;

use tracing::debug;

use super::skip_pattern_matches;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{CapcatError, Result};
use crate::feed_discovery::discover_feed_urls;
use crate::feed_parser::parse_feed;
use crate::models::{Article, DiscoverySpec, SourceDescriptor};
use crate::rate_limiter::RateLimiter;

/// RSS discovery strategy: try each URL in `[primary, ...fallbacks]` in
/// order, going through the rate limiter and circuit breaker for each
/// request. If every configured URL fails and `auto_discover` is set,
/// fall back to `FeedDiscovery` over the source's `base_url` and retry
/// the same loop over the discovered candidates.
pub async fn discover_rss(
    descriptor: &SourceDescriptor,
    count: u32,
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    should_skip: impl Fn(&str, &str) -> bool,
) -> Result<Vec<Article>> {
    let DiscoverySpec::Rss { auto_discover, .. } = &descriptor.discovery else {
        unreachable!("discover_rss called on a non-RSS descriptor");
    };

    let chain = descriptor.discovery.rss_url_chain();
    let timeout = Duration::from_secs_f64(descriptor.timeout);

    let (found, mut last_error) =
        try_url_chain(&chain, client, rate_limiter, circuit_breaker, timeout).await;
    if let Some(items) = found {
        return Ok(map_to_articles(items, descriptor, count, should_skip));
    }

    if *auto_discover {
        let candidates = discover_feed_urls(client, &descriptor.base_url, timeout).await?;
        let (found, auto_error) =
            try_url_chain(&candidates, client, rate_limiter, circuit_breaker, timeout).await;
        if let Some(items) = found {
            return Ok(map_to_articles(items, descriptor, count, should_skip));
        }
        if auto_error.is_some() {
            last_error = auto_error;
        }
    }

    // A chain that failed only because every URL parsed to zero items
    // (or the chain was empty) is a genuine discovery failure, not a
    // transient one: the retry/skip wrapper should not retry it. A
    // chain that failed because the last attempt hit a retryable
    // network/timeout error is surfaced as that error instead, so the
    // retry/skip wrapper (which retries the whole discovery call) gets
    // a chance to try again before giving up.
    match last_error {
        Some(e) if e.is_retryable() => Err(e),
        _ => Err(CapcatError::ArticleDiscoveryFailed {
            source_id: descriptor.source_id.clone(),
        }),
    }
}

/// Try each URL in order; the first that parses into at least one item
/// wins. A URL that 404s, times out, or parses to zero items is logged
/// at debug and the loop moves to the next one — discovery must
/// tolerate any single URL in the chain failing. Returns the last error
/// encountered (if any) alongside the items, so the caller can decide
/// whether the overall chain failure was transient.
async fn try_url_chain(
    urls: &[String],
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    timeout: Duration,
) -> (Option<Vec<crate::models::FeedItem>>, Option<CapcatError>) {
    let mut last_error = None;
    for url in urls {
        match fetch_and_parse(url, client, rate_limiter, circuit_breaker, timeout).await {
            Ok(items) if !items.is_empty() => return (Some(items), None),
            Ok(_) => {
                debug!(url, "feed URL parsed but yielded zero items");
                last_error = None;
            }
            Err(e) => {
                debug!(url, error = %e, "feed URL failed, trying next in chain");
                last_error = Some(e);
            }
        }
    }
    (None, last_error)
}

async fn fetch_and_parse(
    url: &str,
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    timeout: Duration,
) -> Result<Vec<crate::models::FeedItem>> {
    circuit_breaker
        .call(|| async {
            rate_limiter.acquire().await;
            let response = client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| CapcatError::from_reqwest(url, timeout, e))?;

            if response.status().is_server_error() {
                let e = response.error_for_status().unwrap_err();
                return Err(CapcatError::from_reqwest(url, timeout, e));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| CapcatError::from_reqwest(url, timeout, e))?;
            parse_feed(url, &bytes)
        })
        .await
}

fn map_to_articles(
    items: Vec<crate::models::FeedItem>,
    descriptor: &SourceDescriptor,
    count: u32,
    should_skip: impl Fn(&str, &str) -> bool,
) -> Vec<Article> {
    items
        .into_iter()
        .filter_map(|item| {
            let url = item.url?;
            let title = item.title.unwrap_or_default();

            if skip_pattern_matches(&url, &descriptor.skip_patterns) || should_skip(&url, &title) {
                return None;
            }

            let mut article = Article::new(title, url);
            article.summary = item.description;
            article.published_date = item.published_date;
            Some(article)
        })
        .take(count as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerSpec;
    use crate::models::{RateLimitSpec, RssUrls};

    fn descriptor(primary: &str, fallbacks: Vec<&str>) -> SourceDescriptor {
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
            discovery: DiscoverySpec::Rss {
                urls: RssUrls {
                    primary: primary.to_string(),
                    fallbacks: fallbacks.into_iter().map(String::from).collect(),
                },
                auto_discover: false,
            },
            content_selectors: vec![],
            skip_patterns: vec![],
        }
    }

    const RSS_3_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<item><title>A</title><link>https://example.com/a</link><pubDate>Wed, 03 Jan 2024 00:00:00 GMT</pubDate></item>
<item><title>B</title><link>https://example.com/b</link><pubDate>Tue, 02 Jan 2024 00:00:00 GMT</pubDate></item>
<item><title>C</title><link>https://example.com/c</link><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>
</channel></rss>"#;

    #[tokio::test]
    async fn happy_path_three_items() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed");
                then.status(200).body(RSS_3_ITEMS);
            })
            .await;

        let descriptor = descriptor(&server.url("/feed"), vec![]);
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_rss(&descriptor, 3, &client, &rate_limiter, &circuit_breaker, |_, _| false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 3);
        assert_eq!(articles[0].title, "A");
    }

    #[tokio::test]
    async fn primary_dead_fallback_alive() {
        let server = httpmock::MockServer::start_async().await;
        let _primary = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed");
                then.status(500);
            })
            .await;
        let _fallback = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/rss");
                then.status(200).body(RSS_3_ITEMS);
            })
            .await;

        let descriptor = descriptor(&server.url("/feed"), vec![&server.url("/rss")]);
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_rss(&descriptor, 2, &client, &rate_limiter, &circuit_breaker, |_, _| false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn all_urls_dead_without_autodiscover_fails() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed");
                then.status(500);
            })
            .await;

        let descriptor = descriptor(&server.url("/feed"), vec![]);
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        // A persistent HTTP 5xx is a retryable `NetworkError` (spec.md §7),
        // so `discover_rss` on its own propagates it rather than collapsing
        // straight to `ArticleDiscoveryFailed` — it's the retry/skip wrapper
        // around discovery that turns exhausted retries into a skip.
        let result =
            discover_rss(&descriptor, 3, &client, &rate_limiter, &circuit_breaker, |_, _| false).await;
        assert!(matches!(result, Err(e) if e.is_retryable()));

        let skip_tracker = crate::retry::SkipTracker::new();
        let outcome = crate::discovery::discover_with_retry_skip(
            &descriptor,
            3,
            2,
            &client,
            &rate_limiter,
            &circuit_breaker,
            &skip_tracker,
            |_, _| false,
        )
        .await;

        match outcome {
            crate::behavior::DiscoveryOutcome::Skipped(record) => {
                assert_eq!(record.error_kind, "network_error");
                assert_eq!(record.attempts, 2);
            }
            _ => panic!("expected a skip after retries were exhausted on a persistent 500"),
        }
    }

    #[tokio::test]
    async fn all_configured_urls_dead_autodiscover_finds_common_path() {
        let server = httpmock::MockServer::start_async().await;
        let _dead = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed");
                then.status(500);
            })
            .await;
        let _homepage = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/");
                then.status(200).body("<html><body>no feed links here</body></html>");
            })
            .await;
        let one_item = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<item><title>Only</title><link>https://example.com/only</link></item>
</channel></rss>"#;
        let _feed_xml = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed.xml");
                then.status(200).body(one_item);
            })
            .await;

        let mut descriptor = descriptor(&server.url("/feed"), vec![]);
        descriptor.base_url = server.base_url();
        descriptor.discovery = DiscoverySpec::Rss {
            urls: RssUrls {
                primary: server.url("/feed"),
                fallbacks: vec![],
            },
            auto_discover: true,
        };
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_rss(&descriptor, 1, &client, &rate_limiter, &circuit_breaker, |_, _| false)
            .await
            .unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "Only");
    }

    #[tokio::test]
    async fn skip_callback_filters_articles() {
        let server = httpmock::MockServer::start_async().await;
        let _mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/feed");
                then.status(200).body(RSS_3_ITEMS);
            })
            .await;

        let descriptor = descriptor(&server.url("/feed"), vec![]);
        let client = reqwest::Client::new();
        let rate_limiter = RateLimiter::new(descriptor.rate_limit);
        let circuit_breaker = CircuitBreaker::new("ex", CircuitBreakerSpec::default());

        let articles = discover_rss(&descriptor, 3, &client, &rate_limiter, &circuit_breaker, |url, _| {
            url.ends_with("/b")
        })
        .await
        .unwrap();

        assert_eq!(articles.len(), 2);
        assert!(articles.iter().all(|a| !a.url.ends_with("/b")));
    }
}
