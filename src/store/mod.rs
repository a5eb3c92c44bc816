pub mod entries;
pub mod feeds;
pub mod models;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::Result;

pub type DbPool = SqlitePool;

/// The only two column identifiers `get_recent_entries` is allowed to
/// interpolate into SQL (spec §4.5, testable property 5). Any other value is
/// rejected before a query is issued.
pub const FILTER_SORT_ALLOW_LIST: &[&str] = &["published", "first_seen"];

/// Opens (creating if absent) the SQLite database in WAL mode with foreign
/// keys enforced, generalizing the teacher's `db::init_pool`.
pub async fn init_pool(database_path: &str) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_path)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    // A single connection: the orchestrator already serializes all Store
    // calls through its own mutex (spec §5), and a single connection keeps
    // an in-memory database (used in tests) from silently fragmenting across
    // pooled connections that would each see an empty database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Idempotent schema init plus the mandatory `first_seen` backfill
/// (spec §4.5, §4.7).
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
