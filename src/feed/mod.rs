pub mod dates;
pub mod encoding;
pub mod entry_id;
pub mod sanitize;
pub mod url_resolve;

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::{Error, Result};

/// Canonical, Atom-shaped feed metadata (spec §4.4).
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub title: String,
    pub link: String,
    pub updated: Option<DateTime<Utc>>,
}

/// Canonical, Atom-shaped entry (spec §4.4). All text fields have already
/// passed through sanitization/escaping by the time they reach here.
#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub entry_id: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub summary: String,
    pub content: String,
    pub content_type: String,
}

/// Detects format (RSS 1.0/2.0, Atom 1.0, JSON Feed) and parses `bytes` into
/// the canonical model. Malformed input that the underlying reader can't
/// recover from fails with `Error::Parse`; per-entry defects are dropped
/// individually (logged) without failing the whole feed.
pub fn parse(bytes: &[u8], feed_url: &Url, fetch_time: DateTime<Utc>) -> Result<(ParsedFeed, Vec<ParsedEntry>)> {
    let recovered = encoding::recover_utf8(bytes);

    let raw_feed = feed_rs::parser::parse(recovered.as_bytes())
        .map_err(|e| Error::Parse(format!("feed could not be parsed: {e}")))?;

    let feed_title = raw_feed
        .title
        .as_ref()
        .map(|t| sanitize::escape_text(&t.content))
        .unwrap_or_default();

    let feed_link_url = raw_feed
        .links
        .iter()
        .find_map(|l| url_resolve::resolve(feed_url, &l.href))
        .unwrap_or_else(|| feed_url.clone());

    let feed_updated = raw_feed.updated;

    let mut entries = Vec::with_capacity(raw_feed.entries.len());
    for raw_entry in raw_feed.entries {
        let entry_id_hint = raw_entry.id.clone();
        match canonicalize_entry(raw_entry, &feed_link_url, feed_updated, fetch_time) {
            Some(entry) => entries.push(entry),
            None => {
                tracing::warn!(feed = %feed_url, entry_id = %entry_id_hint, "dropping malformed entry");
            }
        }
    }

    Ok((
        ParsedFeed {
            title: feed_title,
            link: feed_link_url.to_string(),
            updated: feed_updated,
        },
        entries,
    ))
}

fn canonicalize_entry(
    raw: feed_rs::model::Entry,
    base: &Url,
    feed_updated: Option<DateTime<Utc>>,
    fetch_time: DateTime<Utc>,
) -> Option<ParsedEntry> {
    let permalink = raw
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| raw.links.first())
        .and_then(|l| url_resolve::resolve(base, &l.href));

    let title_raw = raw.title.as_ref().map(|t| t.content.as_str()).unwrap_or("");
    let title = sanitize::escape_text(title_raw);

    let (content_raw, content_type) = match &raw.content {
        Some(content) => (
            content.body.clone().unwrap_or_default(),
            content.content_type.essence_str().to_string(),
        ),
        None => (String::new(), "text/plain".to_string()),
    };

    let summary_raw = raw.summary.as_ref().map(|s| s.content.as_str()).unwrap_or("");

    if title.is_empty() && content_raw.trim().is_empty() && summary_raw.trim().is_empty() {
        return None;
    }

    let is_html = content_type.contains("html") || content_type.is_empty();
    let sanitized_content = if is_html {
        sanitize::sanitize_html(&content_raw, Some(base))
    } else {
        sanitize::escape_text(&content_raw)
    };
    let sanitized_summary = sanitize::sanitize_html(summary_raw, Some(base));

    let author = raw
        .authors
        .first()
        .map(|p| sanitize::escape_text(&p.name))
        .unwrap_or_default();

    let entry_id = entry_id::synthesize(
        Some(&raw.id).filter(|s| !s.is_empty()),
        permalink.as_ref().map(|u| u.as_str()),
        &title,
        &sanitized_content,
    );

    let published = dates::resolve_entry_date(raw.published, feed_updated, fetch_time);
    let updated = dates::resolve_entry_date(raw.updated.or(raw.published), feed_updated, fetch_time);

    Some(ParsedEntry {
        entry_id,
        title,
        link: permalink.map(|u| u.to_string()).unwrap_or_default(),
        author,
        published,
        updated,
        summary: sanitized_summary,
        content: sanitized_content,
        content_type,
    })
}
