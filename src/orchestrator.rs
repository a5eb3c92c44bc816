use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::config::Settings;
use crate::error::Error;
use crate::feed;
use crate::http::{FeedCache, HttpClient};
use crate::ratelimit::RateLimiter;
use crate::store::models::NewEntry;
use crate::store::{entries, feeds, DbPool};

/// Counts reported by one `fetch_all` cycle (spec §4.6).
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub fetched: usize,
    pub not_modified: usize,
    pub failed: usize,
    pub redirected: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.fetched + self.not_modified + self.failed
    }

    /// Exit-code rule (spec §6): non-zero only if every feed failed and none
    /// succeeded. An empty feed set is success.
    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.failed == self.total()
    }
}

/// Binds the rate limiter, HTTP client, parser, and store into the bounded
/// concurrent fetch pipeline (spec §4.6). The store is the only shared
/// mutable resource among tasks: HTTP I/O and parsing happen with no lock
/// held, and `store_lock` wraps only the brief critical section that follows
/// a fetch. Serializing the whole task body behind the lock is the
/// documented 10x regression this design avoids.
pub struct Orchestrator {
    pool: DbPool,
    http: HttpClient,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    store_lock: Mutex<()>,
    auto_update_redirects: bool,
}

impl Orchestrator {
    pub fn new(pool: DbPool, settings: &Settings, clock: Arc<dyn Clock>) -> crate::error::Result<Self> {
        let http = HttpClient::new(settings, clock.clone())?;
        let rate_limiter = RateLimiter::new(settings.requests_per_minute, settings.rate_limit_burst);
        Ok(Self {
            pool,
            http,
            rate_limiter,
            clock,
            store_lock: Mutex::new(()),
            auto_update_redirects: settings.auto_update_redirects,
        })
    }

    /// Same as `new`, but builds its `HttpClient` with the SSRF gate bypassed
    /// (see `HttpClient::new_for_tests`) so integration tests can point a
    /// full fetch cycle at a local mock server.
    #[cfg(any(test, feature = "test-util"))]
    pub fn new_for_tests(pool: DbPool, settings: &Settings, clock: Arc<dyn Clock>) -> crate::error::Result<Self> {
        let http = HttpClient::new_for_tests(settings, clock.clone())?;
        let rate_limiter = RateLimiter::new(settings.requests_per_minute, settings.rate_limit_burst);
        Ok(Self {
            pool,
            http,
            rate_limiter,
            clock,
            store_lock: Mutex::new(()),
            auto_update_redirects: settings.auto_update_redirects,
        })
    }

    /// Runs one poll cycle across all active feeds, bounded to `concurrency`
    /// in-flight fetches at a time (clamped 1..=50 by the caller via
    /// `Settings::validate`). Takes `self` behind an `Arc` so each feed's
    /// task can be a genuine `tokio::spawn`ed task rather than a future
    /// merely polled concurrently on one task — real OS-thread parallelism
    /// on the multi-thread runtime, matching spec §5's scheduling model.
    pub async fn fetch_all(
        self: &Arc<Self>,
        concurrency: usize,
        cancel: &CancelFlag,
    ) -> crate::error::Result<Summary> {
        let active_feeds = feeds::get_feeds(&self.pool, true).await?;
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

        let mut joins = Vec::with_capacity(active_feeds.len());
        for feed in active_feeds {
            let orchestrator = self.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            joins.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok()?;

                if cancel.is_cancelled() {
                    return None;
                }

                Some(orchestrator.fetch_one(&feed, &cancel).await)
            }));
        }

        let mut summary = Summary::default();
        for join in joins {
            match join.await {
                Ok(Some(FeedOutcome::Fetched { redirected })) => {
                    summary.fetched += 1;
                    if redirected {
                        summary.redirected += 1;
                    }
                }
                Ok(Some(FeedOutcome::NotModified)) => summary.not_modified += 1,
                Ok(Some(FeedOutcome::Failed)) => summary.failed += 1,
                Ok(None) | Err(_) => {}
            }
        }

        Ok(summary)
    }

    async fn fetch_one(&self, feed: &crate::store::models::Feed, cancel: &CancelFlag) -> FeedOutcome {
        if self.rate_limiter.wait(&feed.url, cancel).await.is_err() {
            return FeedOutcome::Failed;
        }

        let cache = FeedCache {
            etag: feed.etag.clone(),
            last_modified: feed.last_modified.clone(),
        };

        let response = match self.http.fetch_with_retry(&feed.url, &cache, cancel).await {
            Ok(response) => response,
            Err(err) => {
                self.record_error(feed.id, &err).await;
                return FeedOutcome::Failed;
            }
        };

        if response.not_modified {
            let guard = self.store_lock.lock().await;
            let _ = feeds::update_feed_cache(
                &self.pool,
                feed.id,
                response.new_cache.etag.as_deref(),
                response.new_cache.last_modified.as_deref(),
                response.fetch_time,
            )
            .await;
            let _ = feeds::clear_feed_error(&self.pool, feed.id).await;
            drop(guard);
            return FeedOutcome::NotModified;
        }

        let feed_url = match url::Url::parse(&response.final_url) {
            Ok(url) => url,
            Err(_) => {
                self.record_error(feed.id, &Error::Parse("invalid final URL".to_string())).await;
                return FeedOutcome::Failed;
            }
        };

        let parsed = feed::parse(&response.body, &feed_url, response.fetch_time);
        let (parsed_feed, parsed_entries) = match parsed {
            Ok(result) => result,
            Err(err) => {
                self.record_error(feed.id, &err).await;
                return FeedOutcome::Failed;
            }
        };

        let redirected = response.permanent_redirect && response.final_url != feed.url;

        let guard = self.store_lock.lock().await;
        if redirected && self.auto_update_redirects {
            if feeds::update_feed_url(&self.pool, &feed.url, &response.final_url).await.is_ok() {
                tracing::info!(old = %feed.url, new = %response.final_url, "rewrote feed URL after permanent redirect");
            }
        } else if redirected {
            tracing::info!(old = %feed.url, new = %response.final_url, "permanent redirect observed, not rewriting (auto_update_redirects=false)");
        }

        let _ = feeds::update_feed_metadata(&self.pool, feed.id, &parsed_feed.title, &parsed_feed.link).await;
        let _ = feeds::update_feed_cache(
            &self.pool,
            feed.id,
            response.new_cache.etag.as_deref(),
            response.new_cache.last_modified.as_deref(),
            response.fetch_time,
        )
        .await;

        let now = self.clock.now();
        for entry in parsed_entries {
            let new_entry = NewEntry {
                feed_id: feed.id,
                entry_id: entry.entry_id,
                title: entry.title,
                link: entry.link,
                author: entry.author,
                summary: entry.summary,
                content: entry.content,
                content_type: entry.content_type,
                published: entry.published,
                updated: entry.updated,
            };
            let _ = entries::upsert_entry(&self.pool, &new_entry, now).await;
        }

        let _ = feeds::clear_feed_error(&self.pool, feed.id).await;
        drop(guard);

        FeedOutcome::Fetched { redirected }
    }

    async fn record_error(&self, feed_id: i64, err: &Error) {
        let guard = self.store_lock.lock().await;
        let _ = feeds::update_feed_error(&self.pool, feed_id, &err.to_string()).await;
        drop(guard);
    }
}

enum FeedOutcome {
    Fetched { redirected: bool },
    NotModified,
    Failed,
}
