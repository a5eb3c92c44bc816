use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

use super::models::{Entry, NewEntry};
use super::{DbPool, FILTER_SORT_ALLOW_LIST};

/// Joins in the owning feed's `title`/`link` so callers get the external
/// query contract of spec §6 ("each Entry carries its Feed's title/link")
/// directly, without a second round-trip per entry. Both `entries` and
/// `feeds` have their own `title`/`link` columns, so every selected column
/// is explicitly qualified (teacher's `db::github::list_github_feeds_with_stats`
/// joins and aliases the same way, `f.title as feed_title`).
const SELECT_ENTRY: &str = r#"
    SELECT e.id, e.feed_id, e.entry_id, e.title, e.link, e.author, e.summary,
           e.content, e.content_type, e.published, e.updated, e.first_seen,
           f.title AS feed_title, f.link AS feed_link
    FROM entries e
    JOIN feeds f ON f.id = e.feed_id
"#;

/// Upserts an entry keyed on (feed_id, entry_id). `first_seen` is set once,
/// on insert, from `now`; on conflict every mutable field is updated except
/// `first_seen` and the row id (spec §3, §8 testable property 1).
pub async fn upsert_entry(pool: &DbPool, entry: &NewEntry, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO entries
            (feed_id, entry_id, title, link, author, summary, content, content_type,
             published, updated, first_seen)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT (feed_id, entry_id) DO UPDATE SET
            title = excluded.title,
            link = excluded.link,
            author = excluded.author,
            summary = excluded.summary,
            content = excluded.content,
            content_type = excluded.content_type,
            published = excluded.published,
            updated = excluded.updated
        "#,
    )
    .bind(entry.feed_id)
    .bind(&entry.entry_id)
    .bind(&entry.title)
    .bind(&entry.link)
    .bind(&entry.author)
    .bind(&entry.summary)
    .bind(&entry.content)
    .bind(&entry.content_type)
    .bind(entry.published)
    .bind(entry.updated)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

fn validate_axis(value: &str) -> Result<&'static str> {
    FILTER_SORT_ALLOW_LIST
        .iter()
        .find(|candidate| **candidate == value)
        .copied()
        .ok_or_else(|| {
            Error::Validation(format!(
                "'{value}' is not a valid filter/sort axis, expected one of {FILTER_SORT_ALLOW_LIST:?}"
            ))
        })
}

/// The renderer's primary query (spec §4.5, §6). `filter_by`/`sort_by` are
/// validated against the two-element allow-list *before* being interpolated
/// as column names — they are identifiers, never bind parameters — so no
/// other value ever reaches SQL (spec §8 testable property 5). Falls back to
/// the 50 most recent rows, ignoring the time window, if the filtered query
/// is empty (keeps a freshly-initialized aggregator non-empty).
pub async fn get_recent_entries(
    pool: &DbPool,
    days: i64,
    filter_by: &str,
    sort_by: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Entry>> {
    let filter_column = validate_axis(filter_by)?;
    let sort_column = validate_axis(sort_by)?;

    let cutoff = now - chrono::Duration::days(days);

    let sql = format!("{SELECT_ENTRY} WHERE e.{filter_column} >= ?1 ORDER BY e.{sort_column} DESC");
    let rows = sqlx::query_as::<_, Entry>(&sql)
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

    if !rows.is_empty() {
        return Ok(rows);
    }

    let fallback_sql = format!("{SELECT_ENTRY} ORDER BY e.{sort_column} DESC LIMIT 50");
    let fallback = sqlx::query_as::<_, Entry>(&fallback_sql).fetch_all(pool).await?;
    Ok(fallback)
}

/// Deletes entries whose filter field is older than `now - days`. Uses the
/// same allow-list validation as `get_recent_entries`.
pub async fn prune_entries(pool: &DbPool, days: i64, filter_by: &str, now: DateTime<Utc>) -> Result<u64> {
    let filter_column = validate_axis(filter_by)?;
    let cutoff = now - chrono::Duration::days(days);

    let sql = format!("DELETE FROM entries WHERE {filter_column} < ?1");
    let result = sqlx::query(&sql).bind(cutoff).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn get_entry_count_for_feed(pool: &DbPool, feed_id: i64) -> Result<i64> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entries WHERE feed_id = ?1")
        .bind(feed_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
