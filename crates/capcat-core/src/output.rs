use std::path::PathBuf;

use chrono::NaiveDate;
use regex::Regex;

const DEFAULT_MAX_LENGTH: usize = 200;
const SEPARATORS: &[&str] = &[" - ", " | ", " – ", " — ", ": "];

/// Pure functions computing on-disk paths from source identity, title,
/// index, and calendar date. No I/O; same inputs always produce the
/// same path (invariant 10).
pub struct OutputLayout;

impl OutputLayout {
    /// `<root>/News/News_<DD-MM-YYYY>/<DisplayName>_<DD-MM-YYYY>/`
    pub fn batch_source_dir(root: &str, display_name: &str, date: NaiveDate) -> PathBuf {
        let stamp = date.format("%d-%m-%Y").to_string();
        PathBuf::from(root)
            .join("News")
            .join(format!("News_{stamp}"))
            .join(format!("{display_name}_{stamp}"))
    }

    /// `<NN>_<SanitizedTitle>/` joined onto a batch source directory.
    pub fn batch_article_dir(source_dir: &PathBuf, index: u32, title: &str, max_length: usize) -> PathBuf {
        let sanitized = sanitize_filename(title, Some(max_length));
        source_dir.join(format!("{index:02}_{sanitized}"))
    }

    /// `<root>/Capcats/cc_<DD-MM-YYYY>-<SanitizedTitle>/`
    pub fn single_article_dir(root: &str, title: &str, date: NaiveDate, max_length: usize) -> PathBuf {
        let stamp = date.format("%d-%m-%Y").to_string();
        let sanitized = sanitize_filename(title, Some(max_length));
        PathBuf::from(root)
            .join("Capcats")
            .join(format!("cc_{stamp}-{sanitized}"))
    }
}

/// Remove disallowed filename characters, trim dots/spaces, and fall
/// back to `"untitled"` for an empty result. Intelligently truncates
/// overlong titles first when `max_length` is given. Idempotent:
/// `sanitize_filename(sanitize_filename(t)) == sanitize_filename(t)`.
pub fn sanitize_filename(title: &str, max_length: Option<usize>) -> String {
    let max_length = max_length.unwrap_or(DEFAULT_MAX_LENGTH);

    let mut title = title.to_string();
    if title.chars().count() > max_length {
        title = truncate_title_intelligently(&title, max_length);
    }

    let disallowed = Regex::new(r#"[<>:"/\\|?*\x00-\x1F!@#$%^&()+=\[\]{}~`]"#).unwrap();
    let mut safe = disallowed.replace_all(&title, "").to_string();
    safe = safe.trim_matches(|c: char| c == '.' || c == ' ').to_string();

    if safe.chars().count() > max_length {
        safe = safe.chars().take(max_length).collect();
        safe = safe.trim_end_matches(|c: char| c == '.' || c == ' ').to_string();
    }

    if safe.is_empty() {
        "untitled".to_string()
    } else {
        safe
    }
}

/// Intelligently truncates an overlong title: strips a leading
/// `"GitHub - user/repo:"`-style prefix, strips parenthesized and
/// standalone URLs, then splits on the first separator run found (in
/// priority order) and keeps the longest segment over 15 characters
/// (falling back to the longest segment overall); finally caps at
/// `max_length` by sentence boundary, then word boundary.
fn truncate_title_intelligently(title: &str, max_length: usize) -> String {
    let mut t = title.to_string();

    let github_prefix = Regex::new(r"(?i)^GitHub\s*-\s*[\w.\-]+/[\w.\-]+\s*:\s*").unwrap();
    t = github_prefix.replace(&t, "").to_string();

    let paren_url = Regex::new(r"\(\s*https?://[^)]*\)").unwrap();
    t = paren_url.replace_all(&t, "").to_string();

    let bare_url = Regex::new(r"https?://\S+").unwrap();
    t = bare_url.replace_all(&t, "").to_string();

    t = t.trim().to_string();

    if t.chars().count() <= max_length {
        return finish_truncation(&t, max_length);
    }

    let mut best_separator_split: Option<Vec<String>> = None;
    for sep in SEPARATORS {
        if t.contains(sep) {
            best_separator_split = Some(t.split(sep).map(|s| s.to_string()).collect());
            break;
        }
    }

    if let Some(parts) = best_separator_split {
        let meaningful: Vec<&String> = parts.iter().filter(|p| p.trim().chars().count() > 15).collect();
        let chosen = if !meaningful.is_empty() {
            meaningful
                .into_iter()
                .max_by_key(|p| p.trim().chars().count())
                .unwrap()
                .trim()
                .to_string()
        } else {
            parts
                .iter()
                .max_by_key(|p| p.trim().chars().count())
                .unwrap()
                .trim()
                .to_string()
        };
        t = chosen;
    }

    let trailing_noise = Regex::new(r"(?i)\s*(or\s+\S+\s+(ready|available)\b.*)$").unwrap();
    t = trailing_noise.replace(&t, "").trim().to_string();

    finish_truncation(&t, max_length)
}

fn finish_truncation(t: &str, max_length: usize) -> String {
    if t.chars().count() <= max_length {
        return t.trim_end_matches(|c: char| c == ' ' || c == '.' || c == '-').to_string();
    }

    let truncated: String = t.chars().take(max_length).collect();

    if let Some(idx) = truncated.rfind(['.', '!', '?']) {
        if idx > max_length / 2 {
            return truncated[..=idx - 1].trim_end_matches(|c: char| c == ' ' || c == '.' || c == '-').to_string();
        }
    }

    let word_boundary = truncated.rfind(' ').unwrap_or(truncated.len());
    let result = truncated[..word_boundary].trim_end_matches(|c: char| c == ' ' || c == '.' || c == '-');

    if result.is_empty() {
        "Article".to_string()
    } else {
        result.to_string()
    }
}
