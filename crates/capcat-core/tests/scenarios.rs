//! End-to-end scenarios for the batch processor, run against a stubbed
//! `ContentFetcher` and local HTTP mocks rather than real sources.
//! These exercise the full discovery -> dedup -> fetch -> summary
//! pipeline the unit tests in `capcat-core::batch` only cover piecemeal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use capcat_core::config::CircuitBreakerSpec;
use capcat_core::{
    Article, BatchProcessor, BatchRequest, CapcatError, Config, ContentFetcher, DiscoverySpec,
    OutputLayout, RateLimitSpec, Result, Runtime, RssUrls, SourceDescriptor, SourceKind,
    SourceRegistry,
};

const TODAY: fn() -> NaiveDate = || NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();

/// Writes `article.md` containing the title; never fails, so these
/// scenarios isolate the core's discovery/dedup/fetch orchestration
/// from real network flakiness.
struct StubContentFetcher;

#[async_trait]
impl ContentFetcher for StubContentFetcher {
    async fn fetch_article(&self, article: &Article, out_dir: &Path) -> Result<(bool, PathBuf)> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "create article directory".to_string(),
                path: out_dir.to_path_buf(),
                source: e,
            })?;
        let path = out_dir.join("article.md");
        tokio::fs::write(&path, format!("# {}\n\nSource: {}\n", article.title, article.url))
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "write article".to_string(),
                path: path.clone(),
                source: e,
            })?;
        Ok((true, out_dir.to_path_buf()))
    }

    async fn fetch_comments(&self, _comment_url: &str, _title: &str, _article_folder: &Path) -> Result<()> {
        Ok(())
    }
}

fn rss_descriptor(id: &str, display_name: &str, primary: &str, fallbacks: Vec<String>) -> SourceDescriptor {
    SourceDescriptor {
        source_id: id.to_string(),
        display_name: display_name.to_string(),
        base_url: "https://example.com".to_string(),
        category: "tech".to_string(),
        timeout: 2.0,
        rate_limit: RateLimitSpec {
            requests_per_second: 100.0,
            burst: 20,
            min_delay_seconds: 0.0,
        },
        supports_comments: false,
        has_comments: false,
        kind: SourceKind::Declarative,
        discovery: DiscoverySpec::Rss {
            urls: RssUrls {
                primary: primary.to_string(),
                fallbacks,
            },
            auto_discover: false,
        },
        content_selectors: vec![],
        skip_patterns: vec![],
    }
}

fn rss_body(items: &[(&str, &str)]) -> String {
    let entries: String = items
        .iter()
        .map(|(title, url)| format!("<item><title>{title}</title><link>{url}</link></item>"))
        .collect();
    format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{entries}</channel></rss>"#)
}

async fn build_runtime(registry: SourceRegistry, root: &Path) -> Arc<Runtime> {
    let mut config = Config::default();
    config.output_dir = root.to_string_lossy().to_string();
    config.max_workers = 4;
    config.max_discovery_workers = 4;
    config.per_article_timeout_seconds = 5;
    // Fast, forgiving breaker so scenario timing doesn't flake.
    config
        .circuit_breaker_overrides
        .insert("default".to_string(), CircuitBreakerSpec::default());

    Arc::new(Runtime::new(config, registry, Box::new(StubContentFetcher)))
}

fn article_dir(root: &Path, display_name: &str, index: u32, title: &str) -> PathBuf {
    let source_dir = OutputLayout::batch_source_dir(&root.to_string_lossy(), display_name, TODAY());
    OutputLayout::batch_article_dir(&source_dir, index, title, 200)
}

/// S1 — happy RSS: one source returns 3 distinctly-titled items,
/// requested count=3. Expect three numbered article directories and a
/// summary with fetched=3, failed=0, skipped=0.
#[tokio::test]
async fn s1_happy_rss_three_articles() {
    let server = httpmock::MockServer::start_async().await;
    let _mock = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/feed");
            then.status(200).body(rss_body(&[
                ("A", "https://example.com/a"),
                ("B", "https://example.com/b"),
                ("C", "https://example.com/c"),
            ]));
        })
        .await;

    let mut registry = SourceRegistry::new(None);
    registry.register_descriptor(rss_descriptor("ex", "Ex", &server.url("/feed"), vec![]));

    let root = tempfile::tempdir().unwrap();
    let runtime = build_runtime(registry, root.path()).await;
    let processor = BatchProcessor::new(runtime);

    let request = BatchRequest {
        source_ids: vec!["ex".to_string()],
        count_per_source: 3,
        output_root: root.path().to_string_lossy().to_string(),
        download_media: false,
        update_mode: false,
        quiet: true,
        verbose: false,
    };

    let summary = processor.run(request, TODAY(), None).await;

    let stats = summary.per_source.get("ex").unwrap();
    assert_eq!(stats.discovered, 3);
    assert_eq!(stats.fetched, 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skipped, 0);
    assert_eq!(summary.duplicates_elided, 0);

    for (i, title) in ["A", "B", "C"].iter().enumerate() {
        let dir = article_dir(root.path(), "Ex", (i + 1) as u32, title);
        assert!(dir.join("article.md").exists(), "missing {}", dir.display());
    }
}

/// S2 — RSS primary dead, fallback alive: expect 2 articles fetched,
/// zero skipped, with the feed served entirely from the fallback URL.
#[tokio::test]
async fn s2_primary_dead_fallback_alive() {
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
            then.status(200).body(rss_body(&[
                ("X", "https://example.com/x"),
                ("Y", "https://example.com/y"),
            ]));
        })
        .await;

    let mut registry = SourceRegistry::new(None);
    registry.register_descriptor(rss_descriptor(
        "ex",
        "Ex",
        &server.url("/feed"),
        vec![server.url("/rss")],
    ));

    let root = tempfile::tempdir().unwrap();
    let runtime = build_runtime(registry, root.path()).await;
    let processor = BatchProcessor::new(runtime);

    let request = BatchRequest {
        source_ids: vec!["ex".to_string()],
        count_per_source: 2,
        output_root: root.path().to_string_lossy().to_string(),
        download_media: false,
        update_mode: false,
        quiet: true,
        verbose: false,
    };

    let summary = processor.run(request, TODAY(), None).await;

    let stats = summary.per_source.get("ex").unwrap();
    assert_eq!(stats.fetched, 2);
    assert_eq!(stats.skipped, 0);
}

/// S4 — source times out repeatedly on every configured URL: the
/// source contributes zero articles, no directory is created for it,
/// and the run summary records a SkipRecord. Other sources in the same
/// run complete normally regardless.
#[tokio::test]
async fn s4_source_times_out_is_skipped_others_unaffected() {
    let dead_server = httpmock::MockServer::start_async().await;
    let _mock = dead_server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/feed");
            then.status(200).delay(std::time::Duration::from_millis(300));
        })
        .await;

    let healthy_server = httpmock::MockServer::start_async().await;
    let _healthy = healthy_server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/feed");
            then.status(200)
                .body(rss_body(&[("Healthy", "https://example.com/healthy")]));
        })
        .await;

    let mut registry = SourceRegistry::new(None);
    let mut dying = rss_descriptor("dying", "Dying", &dead_server.url("/feed"), vec![]);
    dying.timeout = 0.05;
    registry.register_descriptor(dying);
    registry.register_descriptor(rss_descriptor("healthy", "Healthy", &healthy_server.url("/feed"), vec![]));

    let root = tempfile::tempdir().unwrap();
    let runtime = build_runtime(registry, root.path()).await;
    let processor = BatchProcessor::new(runtime);

    let request = BatchRequest {
        source_ids: vec!["dying".to_string(), "healthy".to_string()],
        count_per_source: 3,
        output_root: root.path().to_string_lossy().to_string(),
        download_media: false,
        update_mode: false,
        quiet: true,
        verbose: false,
    };

    let summary = processor.run(request, TODAY(), None).await;

    assert_eq!(summary.per_source.get("dying").unwrap().fetched, 0);
    assert!(!summary.skip_records.is_empty(), "expected at least one SkipRecord for 'dying'");
    assert!(summary.skip_records.iter().any(|r| r.source_id == "dying"));

    let dying_source_dir =
        OutputLayout::batch_source_dir(&root.path().to_string_lossy(), "Dying", TODAY());
    assert!(!dying_source_dir.exists(), "a skipped source must produce zero on-disk artifacts");

    assert_eq!(summary.per_source.get("healthy").unwrap().fetched, 1);
    let healthy_dir = article_dir(root.path(), "Healthy", 1, "Healthy");
    assert!(healthy_dir.join("article.md").exists());
}

/// S5 — cross-source duplicate: two sources both discover the same
/// URL; it is fetched exactly once, under whichever source sorts first
/// lexicographically, and the duplicate is counted, not fetched.
#[tokio::test]
async fn s5_cross_source_duplicate_fetched_once() {
    let server = httpmock::MockServer::start_async().await;
    let _a = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/a/feed");
            then.status(200).body(rss_body(&[
                ("Shared", "https://shared.example/post"),
                ("UniqueToA", "https://a.example/unique"),
            ]));
        })
        .await;
    let _b = server
        .mock_async(|when, then| {
            when.method(httpmock::Method::GET).path("/b/feed");
            then.status(200)
                .body(rss_body(&[("Shared", "https://shared.example/post")]));
        })
        .await;

    let mut registry = SourceRegistry::new(None);
    registry.register_descriptor(rss_descriptor("a", "A", &server.url("/a/feed"), vec![]));
    registry.register_descriptor(rss_descriptor("b", "B", &server.url("/b/feed"), vec![]));

    let root = tempfile::tempdir().unwrap();
    let runtime = build_runtime(registry, root.path()).await;
    let processor = BatchProcessor::new(runtime);

    let request = BatchRequest {
        source_ids: vec!["a".to_string(), "b".to_string()],
        count_per_source: 5,
        output_root: root.path().to_string_lossy().to_string(),
        download_media: false,
        update_mode: false,
        quiet: true,
        verbose: false,
    };

    let summary = processor.run(request, TODAY(), None).await;

    assert_eq!(summary.duplicates_elided, 1);
    // "a" sorts before "b" lexicographically, so it keeps the shared
    // article plus its own unique one; "b" contributed nothing unique.
    assert_eq!(summary.per_source.get("a").unwrap().fetched, 2);
    assert!(summary.per_source.get("b").map(|s| s.fetched).unwrap_or(0) == 0);

    let b_source_dir = OutputLayout::batch_source_dir(&root.path().to_string_lossy(), "B", TODAY());
    assert!(!b_source_dir.exists(), "source contributing only duplicates gets no directory");
}
