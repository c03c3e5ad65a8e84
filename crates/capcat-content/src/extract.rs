//! Bounded, regex-based HTML → text/og-image extraction: no headless
//! browser, no full DOM, just a capped byte read and a handful of
//! tag-scoped regexes. Good enough for archival purposes, not a
//! general scraper.

use std::sync::OnceLock;

const ARTICLE_TEXT_CAP: usize = 3000;
pub const ARTICLE_BYTE_CAP: usize = 256 * 1024;
pub const OG_IMAGE_BYTE_CAP: usize = 64 * 1024;

fn script_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap())
}

fn style_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap())
}

fn content_tag_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"(?is)<(?:p|h[1-6]|li)[^>]*>(.*?)</(?:p|h[1-6]|li)>").unwrap()
    })
}

fn html_tag_re() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"<[^>]+>").unwrap())
}

fn og_image_res() -> &'static [regex::Regex; 2] {
    static RE: OnceLock<[regex::Regex; 2]> = OnceLock::new();
    RE.get_or_init(|| {
        [
            regex::Regex::new(
                r#"<meta[^>]+property\s*=\s*["']og:image["'][^>]+content\s*=\s*["']([^"']+)["']"#,
            )
            .unwrap(),
            regex::Regex::new(
                r#"<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]+property\s*=\s*["']og:image["']"#,
            )
            .unwrap(),
        ]
    })
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Pull readable body text out of `p`/`h1-h6`/`li` tags, stripped of
/// markup and entity-decoded, capped at [`ARTICLE_TEXT_CAP`] chars.
pub fn extract_article_text(html: &str) -> String {
    let cleaned = script_re().replace_all(html, "");
    let cleaned = style_re().replace_all(&cleaned, "");

    let mut texts = Vec::new();
    let mut total_len = 0;
    for cap in content_tag_re().captures_iter(&cleaned) {
        let inner = cap.get(1).map(|m| m.as_str()).unwrap_or("");
        let text = html_tag_re().replace_all(inner, "");
        let text = text.trim();
        if text.len() < 5 {
            continue;
        }
        let decoded = decode_entities(text).trim().to_string();
        if decoded.is_empty() {
            continue;
        }
        total_len += decoded.len();
        texts.push(decoded);
        if total_len >= ARTICLE_TEXT_CAP {
            break;
        }
    }

    let mut result = texts.join("\n");
    if result.len() > ARTICLE_TEXT_CAP {
        let mut end = ARTICLE_TEXT_CAP;
        while end > 0 && !result.is_char_boundary(end) {
            end -= 1;
        }
        result.truncate(end);
    }
    result
}

/// Extract an `og:image` URL, tolerating either attribute order and
/// either quote style. Only absolute `http(s)` URLs are returned.
pub fn extract_og_image(html: &str) -> Option<String> {
    for re in og_image_res() {
        if let Some(caps) = re.captures(html) {
            if let Some(m) = caps.get(1) {
                let candidate = m.as_str().trim();
                if candidate.starts_with("http") {
                    return Some(candidate.to_string());
                }
            }
        }
    }
    None
}
