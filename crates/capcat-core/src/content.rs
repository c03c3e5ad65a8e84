use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Article;

/// Narrow interface to the collaborator that turns a discovered
/// `Article` into on-disk content. The core never converts HTML to
/// Markdown or downloads media itself; it only knows the contract:
/// given a title/URL/output directory, get back whether the fetch
/// succeeded and where it was written.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetch `article`'s primary content into a subdirectory of
    /// `out_dir`, writing `article.md` (and any media) atomically —
    /// write to a temp path, then rename, so a cancelled task never
    /// leaves a partial `article.md` behind.
    async fn fetch_article(&self, article: &Article, out_dir: &Path) -> Result<(bool, PathBuf)>;

    /// Fetch and flatten comments for an article that has a
    /// `comment_url` and whose source supports comments. Failures here
    /// must not fail the article itself; callers log and continue.
    async fn fetch_comments(
        &self,
        comment_url: &str,
        title: &str,
        article_folder: &Path,
    ) -> Result<()>;
}

/// Narrow interface to a URL-matching collaborator for video/social
/// placeholder sources, consulted by the per-article dispatcher before
/// the normal fetch path.
pub trait SpecializedHandler: Send + Sync {
    fn can_handle(&self, url: &str) -> bool;

    /// Write a placeholder article directory for a URL this handler
    /// claims, without fetching the underlying page.
    fn write_placeholder(&self, article: &Article, out_dir: &Path) -> Result<PathBuf>;
}

/// A registry of specialized handlers, consulted in registration order.
/// The first handler whose `can_handle` returns true wins.
#[derive(Default)]
pub struct SpecializedHandlerRegistry {
    handlers: Vec<Box<dyn SpecializedHandler>>,
}

impl SpecializedHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Box<dyn SpecializedHandler>) {
        self.handlers.push(handler);
    }

    pub fn find_handler(&self, url: &str) -> Option<&dyn SpecializedHandler> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(url))
            .map(|h| h.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct YoutubeStub;
    impl SpecializedHandler for YoutubeStub {
        fn can_handle(&self, url: &str) -> bool {
            url.contains("youtube.com") || url.contains("youtu.be")
        }
        fn write_placeholder(&self, article: &Article, out_dir: &Path) -> Result<PathBuf> {
            Ok(out_dir.join(&article.title))
        }
    }

    #[test]
    fn registry_finds_matching_handler() {
        let mut registry = SpecializedHandlerRegistry::new();
        registry.register(Box::new(YoutubeStub));
        assert!(registry.find_handler("https://youtube.com/watch?v=x").is_some());
        assert!(registry.find_handler("https://example.com/article").is_none());
    }
}
