use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

use super::models::Feed;
use super::DbPool;

const SELECT_FEED: &str = r#"
    SELECT id, url, title, link, etag, last_modified, last_fetched,
           fetch_error, fetch_error_count, next_fetch, fetch_interval, active
    FROM feeds
"#;

/// Inserts a new feed at `url`. Fails with `Error::DuplicateUrl` if the URL
/// already exists (feeds are unique by URL, spec §3 invariants).
pub async fn add_feed(pool: &DbPool, url: &str, title: &str) -> Result<i64> {
    if get_feed_by_url(pool, url).await.is_ok() {
        return Err(Error::DuplicateUrl(url.to_string()));
    }

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO feeds (url, title, link, fetch_error_count, fetch_interval, active)
        VALUES (?1, ?2, '', 0, 3600, 1)
        RETURNING id
        "#,
    )
    .bind(url)
    .bind(title)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Deletes a feed; its entries cascade via the foreign key (spec §3, §8
/// testable property 6).
pub async fn remove_feed(pool: &DbPool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM feeds WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("feed {id}")));
    }
    Ok(())
}

/// Rewrites a feed's URL after a permanent redirect. Clears `etag`/
/// `last_modified` since they belonged to the old URL (spec §4.5).
pub async fn update_feed_url(pool: &DbPool, old_url: &str, new_url: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE feeds
        SET url = ?1, etag = NULL, last_modified = NULL
        WHERE url = ?2
        "#,
    )
    .bind(new_url)
    .bind(old_url)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("feed with url {old_url}")));
    }
    Ok(())
}

pub async fn update_feed_metadata(
    pool: &DbPool,
    id: i64,
    title: &str,
    link: &str,
) -> Result<()> {
    sqlx::query("UPDATE feeds SET title = ?1, link = ?2 WHERE id = ?3")
        .bind(title)
        .bind(link)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Byte-exact cache header write (spec §3 invariant: never fabricated).
pub async fn update_feed_cache(
    pool: &DbPool,
    id: i64,
    etag: Option<&str>,
    last_modified: Option<&str>,
    last_fetched: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE feeds
        SET etag = ?1, last_modified = ?2, last_fetched = ?3
        WHERE id = ?4
        "#,
    )
    .bind(etag)
    .bind(last_modified)
    .bind(last_fetched)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_feed_error(pool: &DbPool, id: i64, err: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE feeds
        SET fetch_error = ?1, fetch_error_count = fetch_error_count + 1
        WHERE id = ?2
        "#,
    )
    .bind(err)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_feed_error(pool: &DbPool, id: i64) -> Result<()> {
    sqlx::query("UPDATE feeds SET fetch_error = NULL, fetch_error_count = 0 WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_feeds(pool: &DbPool, active_only: bool) -> Result<Vec<Feed>> {
    let sql = if active_only {
        format!("{SELECT_FEED} WHERE active = 1 ORDER BY id")
    } else {
        format!("{SELECT_FEED} ORDER BY id")
    };
    let feeds = sqlx::query_as::<_, Feed>(&sql).fetch_all(pool).await?;
    Ok(feeds)
}

pub async fn get_feed_by_url(pool: &DbPool, url: &str) -> Result<Feed> {
    let sql = format!("{SELECT_FEED} WHERE url = ?1");
    sqlx::query_as::<_, Feed>(&sql)
        .bind(url)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("feed with url {url}")))
}

pub async fn get_feed_by_id(pool: &DbPool, id: i64) -> Result<Feed> {
    let sql = format!("{SELECT_FEED} WHERE id = ?1");
    sqlx::query_as::<_, Feed>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("feed {id}")))
}

pub async fn set_feed_active(pool: &DbPool, id: i64, active: bool) -> Result<()> {
    sqlx::query("UPDATE feeds SET active = ?1 WHERE id = ?2")
        .bind(active)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
