use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Persistent feed row (spec §3). `url` is rewritten on 301; `etag`/
/// `last_modified` are cleared whenever that happens since they belonged to
/// the old URL.
#[derive(Debug, Clone, FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub link: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
    pub fetch_error: Option<String>,
    pub fetch_error_count: i64,
    pub next_fetch: Option<DateTime<Utc>>,
    pub fetch_interval: i64,
    pub active: bool,
}

/// Persistent entry row (spec §3). `first_seen` is immutable after the
/// first insert for a given (feed_id, entry_id) pair. `feed_title`/`feed_link`
/// are not columns on `entries` — they're joined in from the owning `feeds`
/// row so `get_recent_entries` can satisfy the external query contract of
/// spec §6 ("each Entry carries its Feed's title/link") without the renderer
/// issuing a second query per entry.
#[derive(Debug, Clone, FromRow)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub entry_id: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub summary: String,
    pub content: String,
    pub content_type: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub feed_title: String,
    pub feed_link: String,
}

/// Fields needed to persist a freshly parsed entry. `feed_id` is supplied by
/// the caller, not the parser.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub feed_id: i64,
    pub entry_id: String,
    pub title: String,
    pub link: String,
    pub author: String,
    pub summary: String,
    pub content: String,
    pub content_type: String,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
