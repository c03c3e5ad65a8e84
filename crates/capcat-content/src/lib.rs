//! The default `ContentFetcher` and a handful of `SpecializedHandler`
//! implementations for `capcat-core`. Kept deliberately lightweight —
//! a capped GET, a regex-based text/image extraction, an atomic
//! markdown write — rather than a full headless-browser pipeline.

pub mod comments;
pub mod extract;
pub mod placeholder;
pub mod url_validation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use capcat_core::{Article, CapcatError, ContentFetcher, Result};

pub use placeholder::VideoSocialPlaceholder;

/// Bounded-read HTML article fetcher: validates the URL scheme, fetches
/// with a capped byte read, extracts body text and an `og:image`, and
/// writes `article.md` atomically (temp file + rename), so a cancelled
/// fetch task never leaves a partially-written file behind.
pub struct DefaultContentFetcher {
    client: reqwest::Client,
}

impl DefaultContentFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_bounded(&self, url: &str, timeout: Duration, cap: usize) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| CapcatError::from_reqwest(url, timeout, e))?;

        if !response.status().is_success() {
            return Err(CapcatError::ContentFetch {
                url: url.to_string(),
                reason: format!("unexpected status {}", response.status()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CapcatError::from_reqwest(url, timeout, e))?;
        let capped = &bytes[..bytes.len().min(cap)];
        Ok(String::from_utf8_lossy(capped).into_owned())
    }
}

#[async_trait]
impl ContentFetcher for DefaultContentFetcher {
    async fn fetch_article(&self, article: &Article, out_dir: &Path) -> Result<(bool, PathBuf)> {
        if let Err(rejected) = url_validation::validate_article_url(&article.url) {
            warn!(url = %article.url, reason = %rejected.reason, "rejected article url");
            return Ok((false, out_dir.to_path_buf()));
        }

        let html = self
            .fetch_bounded(&article.url, Duration::from_secs(15), extract::ARTICLE_BYTE_CAP)
            .await?;

        let body_text = extract::extract_article_text(&html);
        if body_text.is_empty() {
            debug!(url = %article.url, "no extractable body text");
        }
        let og_image = extract::extract_og_image(&html[..html.len().min(extract::OG_IMAGE_BYTE_CAP)]);

        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "create article directory".to_string(),
                path: out_dir.to_path_buf(),
                source: e,
            })?;

        let mut markdown = format!("# {}\n\nSource: {}\n\n", article.title, article.url);
        if let Some(image) = &og_image {
            markdown.push_str(&format!("![]({image})\n\n"));
        }
        if let Some(summary) = &article.summary {
            markdown.push_str(&format!("> {summary}\n\n"));
        }
        markdown.push_str(&body_text);
        markdown.push('\n');

        let article_md = out_dir.join("article.md");
        let tmp_path = out_dir.join("article.md.tmp");
        tokio::fs::write(&tmp_path, markdown.as_bytes())
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "write article".to_string(),
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &article_md)
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "rename article".to_string(),
                path: article_md.clone(),
                source: e,
            })?;

        Ok((true, out_dir.to_path_buf()))
    }

    async fn fetch_comments(&self, comment_url: &str, _title: &str, article_folder: &Path) -> Result<()> {
        let html = self
            .fetch_bounded(comment_url, Duration::from_secs(15), extract::ARTICLE_BYTE_CAP)
            .await?;

        let flattened = comments::flatten_comments(&html);
        if flattened.is_empty() {
            debug!(url = comment_url, "no comments extracted");
            return Ok(());
        }

        let mut markdown = String::from("# Comments\n\n");
        for comment in &flattened {
            markdown.push_str("---\n\n");
            markdown.push_str(&comment.text);
            markdown.push_str("\n\n");
        }

        let comments_md = article_folder.join("comments.md");
        let tmp_path = article_folder.join("comments.md.tmp");
        tokio::fs::write(&tmp_path, markdown.as_bytes())
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "write comments".to_string(),
                path: tmp_path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &comments_md)
            .await
            .map_err(|e| CapcatError::FileSystem {
                operation: "rename comments".to_string(),
                path: comments_md,
                source: e,
            })
    }
}
