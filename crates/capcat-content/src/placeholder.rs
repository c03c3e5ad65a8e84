use std::path::{Path, PathBuf};

use capcat_core::{Article, CapcatError, Result, SpecializedHandler};

/// Writes a placeholder `article.md` for video/social URLs the default
/// fetcher would gain nothing from scraping (the underlying page is
/// JS-rendered or walled). Matches by host substring, in registration
/// order, consulted by the batch processor before the normal fetch path.
pub struct VideoSocialPlaceholder {
    host_markers: Vec<&'static str>,
    platform: &'static str,
}

impl VideoSocialPlaceholder {
    pub fn youtube() -> Self {
        Self {
            host_markers: vec!["youtube.com", "youtu.be"],
            platform: "YouTube",
        }
    }

    pub fn twitter() -> Self {
        Self {
            host_markers: vec!["twitter.com", "x.com"],
            platform: "X/Twitter",
        }
    }

    pub fn tiktok() -> Self {
        Self {
            host_markers: vec!["tiktok.com"],
            platform: "TikTok",
        }
    }
}

impl SpecializedHandler for VideoSocialPlaceholder {
    fn can_handle(&self, url: &str) -> bool {
        self.host_markers.iter().any(|m| url.contains(m))
    }

    fn write_placeholder(&self, article: &Article, out_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(out_dir).map_err(|e| CapcatError::FileSystem {
            operation: "create placeholder directory".to_string(),
            path: out_dir.to_path_buf(),
            source: e,
        })?;

        let body = format!(
            "# {title}\n\n[{platform} link]({url})\n\nThis is a {platform} link; content is not scraped, only archived as a reference.\n",
            title = article.title,
            platform = self.platform,
            url = article.url,
        );

        let article_md = out_dir.join("article.md");
        let tmp_path = out_dir.join("article.md.tmp");
        std::fs::write(&tmp_path, body).map_err(|e| CapcatError::FileSystem {
            operation: "write placeholder".to_string(),
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &article_md).map_err(|e| CapcatError::FileSystem {
            operation: "rename placeholder".to_string(),
            path: article_md.clone(),
            source: e,
        })?;

        Ok(article_md)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_youtube_hosts() {
        let handler = VideoSocialPlaceholder::youtube();
        assert!(handler.can_handle("https://youtube.com/watch?v=abc"));
        assert!(handler.can_handle("https://youtu.be/abc"));
        assert!(!handler.can_handle("https://example.com/article"));
    }

    #[test]
    fn writes_placeholder_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let handler = VideoSocialPlaceholder::youtube();
        let article = Article::new("A Cool Video", "https://youtube.com/watch?v=xyz");
        let path = handler.write_placeholder(&article, dir.path()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("A Cool Video"));
        assert!(contents.contains("YouTube"));
    }
}
