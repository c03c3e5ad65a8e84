use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::models::{Article, SkipRecord};

/// The result of one discovery attempt, replacing the exception-based
/// control flow (`ArticleDiscoveryError`, skip sentinels) the original
/// source used for the same decision.
pub enum DiscoveryOutcome {
    Items(Vec<Article>),
    Skipped(SkipRecord),
    Error(ErrorKind, String),
}

/// The flattened replacement for the original's deep `BaseSource`
/// inheritance hierarchy: two operations, nothing else. Declarative
/// sources get a shared implementation parametrized by their
/// `SourceDescriptor`; custom sources implement this trait directly —
/// there is no legacy "scraping function by name" escape hatch (see
/// DESIGN.md's Open Question resolution on custom sources).
#[async_trait]
pub trait SourceBehavior: Send + Sync {
    async fn discover(&self, count: u32) -> DiscoveryOutcome;

    async fn fetch_article(
        &self,
        article: &Article,
        out_dir: &Path,
    ) -> crate::error::Result<(bool, PathBuf)>;
}
