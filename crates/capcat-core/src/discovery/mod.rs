mod html;
mod rss;

pub use html::discover_html;
pub use rss::discover_rss;

use crate::behavior::DiscoveryOutcome;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::Result;
use crate::models::{Article, DiscoverySpec, SourceDescriptor};
use crate::rate_limiter::RateLimiter;
use crate::retry::{Outcome, RetryExecutor, SkipTracker};

/// Dispatches to the RSS or HTML discovery strategy based on the
/// descriptor's discovery spec, then applies the retry/skip wrapper so
/// a source that exhausts its retries is skipped rather than failing
/// the whole run (§4.7 "retry/skip wrapper").
pub async fn discover_with_retry_skip(
    descriptor: &SourceDescriptor,
    count: u32,
    max_retries: u32,
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    skip_tracker: &SkipTracker,
    should_skip: impl Fn(&str, &str) -> bool + Copy,
) -> DiscoveryOutcome {
    let executor = RetryExecutor::default();

    let result: Result<Outcome<Vec<Article>>> = executor
        .execute(&descriptor.source_id, "discover_articles", max_retries, || async {
            run_discovery(descriptor, count, client, rate_limiter, circuit_breaker, should_skip).await
        })
        .await;

    match result {
        Ok(Outcome::Success(items)) => {
            if items.is_empty() {
                let record = crate::models::SkipRecord {
                    source_id: descriptor.source_id.clone(),
                    operation: "discover_articles".to_string(),
                    reason: "discovery yielded zero articles".to_string(),
                    attempts: 1,
                    error_kind: "article_discovery_failed".to_string(),
                    timestamp: chrono::Utc::now(),
                };
                skip_tracker.record(record.clone()).await;
                DiscoveryOutcome::Skipped(record)
            } else {
                DiscoveryOutcome::Items(items)
            }
        }
        Ok(Outcome::Skipped(record)) => {
            skip_tracker.record(record.clone()).await;
            DiscoveryOutcome::Skipped(record)
        }
        Err(e) => DiscoveryOutcome::Error(e.kind(), e.to_string()),
    }
}

async fn run_discovery(
    descriptor: &SourceDescriptor,
    count: u32,
    client: &reqwest::Client,
    rate_limiter: &RateLimiter,
    circuit_breaker: &CircuitBreaker,
    should_skip: impl Fn(&str, &str) -> bool,
) -> Result<Vec<Article>> {
    match &descriptor.discovery {
        DiscoverySpec::Rss { .. } => {
            discover_rss(descriptor, count, client, rate_limiter, circuit_breaker, should_skip).await
        }
        DiscoverySpec::Html { .. } => {
            discover_html(descriptor, count, client, rate_limiter, circuit_breaker, should_skip).await
        }
    }
}

fn matches_skip_pattern(url: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| url.contains(p.as_str()))
}

pub(crate) use matches_skip_pattern as skip_pattern_matches;

/// Binary file extensions a discovered link almost never points to
/// archivable article content. Used as the default `shouldSkip`
/// callback (§4.7) when a caller has no source-specific exclusions of
/// its own.
const BINARY_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".tar", ".gz", ".mp3", ".mp4", ".mov", ".avi", ".exe", ".dmg", ".apk",
];

/// Default `shouldSkip(url, title)` callback: rejects links whose path
/// ends in a known binary extension. Callers with source-specific
/// exclusions can supply their own closure instead.
pub fn default_should_skip(url: &str, _title: &str) -> bool {
    let lower = url.to_lowercase();
    BINARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod default_skip_tests {
    use super::default_should_skip;

    #[test]
    fn rejects_known_binary_extensions() {
        assert!(default_should_skip("https://example.com/file.pdf", ""));
        assert!(default_should_skip("https://example.com/archive.ZIP", ""));
    }

    #[test]
    fn accepts_ordinary_article_urls() {
        assert!(!default_should_skip("https://example.com/2024/01/a-post", ""));
    }
}
