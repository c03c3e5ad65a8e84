use chrono::{DateTime, Utc};

use crate::error::{CapcatError, Result};
use crate::models::FeedItem;

/// Parse raw feed bytes (RSS 2.0 or Atom) into `FeedItem`s, sorted
/// newest-first. Undated items keep their original parser-input order
/// and sort to the end. Format detection and XML/Atom namespace
/// variance is delegated to `feed_rs`, which already unifies both
/// formats behind one model; this function is the projection from that
/// model into the core's own `FeedItem` plus the ordering guarantee
/// invariant 4 requires.
pub fn parse_feed(url: &str, bytes: &[u8]) -> Result<Vec<FeedItem>> {
    let parsed = feed_rs::parser::parse(bytes).map_err(|e| CapcatError::InvalidFeed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.entries.is_empty() {
        return Err(CapcatError::InvalidFeed {
            url: url.to_string(),
            reason: "feed contains no entries".to_string(),
        });
    }

    let mut items: Vec<FeedItem> = parsed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.map(|t| t.content);
            let link = entry
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("alternate"))
                .or_else(|| entry.links.first())
                .map(|l| l.href.clone());

            if title.is_none() && link.is_none() {
                return None;
            }

            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            let published_date: Option<DateTime<Utc>> = entry.published.or(entry.updated);

            Some(FeedItem {
                title,
                url: link,
                description,
                published_date,
            })
        })
        .collect();

    if items.is_empty() {
        return Err(CapcatError::InvalidFeed {
            url: url.to_string(),
            reason: "no entry had a title or a link".to_string(),
        });
    }

    sort_newest_first(&mut items);
    Ok(items)
}

/// Stable sort, newest `published_date` first; items with no date
/// retain their relative parser-input order and land after every dated
/// item.
fn sort_newest_first(items: &mut [FeedItem]) {
    items.sort_by(|a, b| match (a.published_date, b.published_date) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}
