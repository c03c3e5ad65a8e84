use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of source a descriptor describes, replacing the dynamic
/// dispatch over "source kind" in the original with a tagged variant
/// the batch processor can match on directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Declarative,
    Custom,
    Specialized,
}

/// The discovery mechanism for a source: either an RSS/Atom URL chain
/// or an HTML index page scraped with CSS selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DiscoverySpec {
    Rss {
        #[serde(rename = "rss_urls")]
        urls: RssUrls,
        #[serde(default)]
        auto_discover: bool,
    },
    Html {
        index_url: String,
        article_selectors: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RssUrls {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl DiscoverySpec {
    /// The ordered list of URLs discovery should try before giving up or
    /// falling back to autodiscovery, for the RSS strategy. Returns an
    /// empty vec for HTML specs.
    pub fn rss_url_chain(&self) -> Vec<String> {
        match self {
            DiscoverySpec::Rss { urls, .. } => {
                let mut chain = vec![urls.primary.clone()];
                chain.extend(urls.fallbacks.iter().cloned());
                chain
            }
            DiscoverySpec::Html { .. } => Vec::new(),
        }
    }
}

/// Per-source rate limit tuning: requests/sec, burst capacity, and a
/// floor on the wait between requests even when tokens are available.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitSpec {
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: f64,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_min_delay")]
    pub min_delay_seconds: f64,
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            min_delay_seconds: default_min_delay(),
        }
    }
}

fn default_rate_limit() -> f64 {
    2.0
}
fn default_burst() -> u32 {
    5
}
fn default_min_delay() -> f64 {
    0.0
}
fn default_timeout() -> f64 {
    10.0
}

/// The immutable description of one content source, loaded once at
/// registry startup and never mutated thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default)]
    pub rate_limit: RateLimitSpec,
    #[serde(default)]
    pub supports_comments: bool,
    #[serde(default)]
    pub has_comments: bool,
    #[serde(default = "default_kind")]
    pub kind: SourceKind,
    pub discovery: DiscoverySpec,
    #[serde(default)]
    pub content_selectors: Vec<String>,
    #[serde(default)]
    pub skip_patterns: Vec<String>,
}

fn default_category() -> String {
    "general".to_string()
}
fn default_kind() -> SourceKind {
    SourceKind::Declarative
}

impl SourceDescriptor {
    /// Field-level validation performed at registration time. A
    /// descriptor failing this is logged and omitted by the registry;
    /// it never aborts discovery of the rest of the set.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.source_id.is_empty()
            || !self
                .source_id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            errors.push(format!(
                "source_id '{}' must be lowercase alphanumeric+underscore",
                self.source_id
            ));
        }

        match url::Url::parse(&self.base_url) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => {}
            _ => errors.push(format!("base_url '{}' must be http(s)", self.base_url)),
        }

        if self.timeout <= 0.0 {
            errors.push("timeout must be > 0".to_string());
        }
        if self.rate_limit.requests_per_second <= 0.0 {
            errors.push("rate_limit must be > 0".to_string());
        }

        match &self.discovery {
            DiscoverySpec::Rss { urls, .. } => {
                if urls.primary.is_empty() && urls.fallbacks.is_empty() {
                    errors.push(
                        "rss discovery requires at least one of primary or fallbacks".to_string(),
                    );
                }
            }
            DiscoverySpec::Html {
                index_url,
                article_selectors,
            } => {
                if index_url.is_empty() {
                    errors.push("html discovery requires index_url".to_string());
                }
                if article_selectors.is_empty() {
                    errors.push("html discovery requires at least one article_selector".to_string());
                }
                if self.content_selectors.is_empty() {
                    errors.push("html discovery requires at least one content_selector".to_string());
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A discovered candidate for archival. Created by a discovery
/// strategy, consumed by the batch processor, then handed to the
/// content fetcher. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Article {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let title = title.into();
        let title = if title.trim().is_empty() {
            "Untitled Article".to_string()
        } else {
            title
        };
        Self {
            title,
            url: url.into(),
            comment_url: None,
            published_date: None,
            summary: None,
        }
    }
}

/// An intermediate record produced by the feed parser before it is
/// turned into an `Article`. Items lacking both a title and a url are
/// discarded before this type is ever constructed.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
}

/// Circuit breaker state machine values (see `circuit_breaker` module).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// One abandoned operation, recorded for the end-of-run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub source_id: String,
    pub operation: String,
    pub reason: String,
    pub attempts: u32,
    pub error_kind: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-source counts tracked across one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceSummary {
    pub discovered: u64,
    pub fetched: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// The aggregated result of one batch run, ordering-independent to
/// assemble: producers append to it from many concurrent tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub per_source: BTreeMap<String, SourceSummary>,
    pub skip_records: Vec<SkipRecord>,
    pub duplicates_elided: u64,
}

impl RunSummary {
    pub fn entry(&mut self, source_id: &str) -> &mut SourceSummary {
        self.per_source.entry(source_id.to_string()).or_default()
    }

    pub fn success_rate(&self, source_id: &str) -> f64 {
        match self.per_source.get(source_id) {
            Some(s) if s.fetched + s.failed > 0 => {
                (s.fetched as f64 / (s.fetched + s.failed) as f64) * 100.0
            }
            _ => 0.0,
        }
    }
}

/// A named set of source IDs, resolved by the external bundle store
/// collaborator. The core only ever consumes the resolved `sources`
/// list; file I/O for bundles lives outside the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_bundle_count")]
    pub default_count: u32,
    pub sources: Vec<String>,
}

fn default_bundle_count() -> u32 {
    5
}
