//! Flattened comment extraction, adapted from
//! `streamlined_comment_processor.py`'s `StreamlinedCommentProcessor`:
//! no nested reply-tree reconstruction, a hard cap on comment and
//! per-comment link counts, and commenter identities anonymized rather
//! than carried through.

use regex::Regex;
use std::sync::OnceLock;

pub const MAX_COMMENTS: usize = 100;
pub const MAX_LINKS_PER_COMMENT: usize = 5;

fn comment_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<(?:div|td|li)[^>]*class="[^"]*comment[^"]*"[^>]*>(.*?)</(?:div|td|li)>"#)
            .unwrap()
    })
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<a[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

const CONTROL_LINK_TEXT: &[&str] = &["reply", "permalink", "parent", "flag", "unflag"];

/// One flattened comment: anonymized author placeholder, body text with
/// inline links rewritten as markdown, no nesting level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatComment {
    pub text: String,
}

/// Flatten a comments page's HTML into up to [`MAX_COMMENTS`] comment
/// bodies. This is a best-effort heuristic scan for comment-like blocks,
/// not a page-specific scraper — sources with a distinctive comment
/// markup that this misses simply contribute no comments rather than an
/// error, matching the "best effort, failures don't fail the article"
/// contract.
pub fn flatten_comments(html: &str) -> Vec<FlatComment> {
    let mut out = Vec::new();
    for cap in comment_block_re().captures_iter(html) {
        if out.len() >= MAX_COMMENTS {
            break;
        }
        let Some(block) = cap.get(1) else { continue };
        let text = process_comment_text(block.as_str());
        if !text.is_empty() {
            out.push(FlatComment { text });
        }
    }
    out
}

fn process_comment_text(block: &str) -> String {
    let mut links_processed = 0usize;
    let mut last_end = 0usize;
    let mut rewritten = String::new();

    for cap in anchor_re().captures_iter(block) {
        let whole = cap.get(0).unwrap();
        rewritten.push_str(&block[last_end..whole.start()]);
        last_end = whole.end();

        let href = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let link_text = tag_re().replace_all(cap.get(2).map(|m| m.as_str()).unwrap_or(""), "");
        let link_text = link_text.trim();

        let is_control = CONTROL_LINK_TEXT
            .iter()
            .any(|c| link_text.eq_ignore_ascii_case(c));

        if href.is_empty() || link_text.is_empty() || is_control {
            continue;
        }
        if links_processed >= MAX_LINKS_PER_COMMENT {
            continue;
        }

        rewritten.push_str(&format!("[{link_text}]({href})"));
        links_processed += 1;
    }
    rewritten.push_str(&block[last_end..]);

    let plain = tag_re().replace_all(&rewritten, "");
    plain
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}
