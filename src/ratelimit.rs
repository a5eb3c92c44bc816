use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::cancel::CancelFlag;
use crate::error::{Error, Result};

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_second: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_per_second: u32) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_second: refill_per_second as f64,
            last_refill: std::time::Instant::now(),
        }
    }

    /// Refills based on elapsed wall time, then returns how long the caller
    /// must sleep before a token is available (zero if one already is).
    fn take(&mut self) -> Duration {
        let now = std::time::Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Duration::ZERO
        } else {
            let deficit = 1.0 - self.tokens;
            let wait = deficit / self.refill_per_second;
            self.tokens = 0.0;
            Duration::from_secs_f64(wait.max(0.0))
        }
    }
}

/// Per-domain token bucket rate limiter (spec §4.2). A read lock serves the
/// common case of an existing bucket; a write lock is taken only to insert a
/// new one, re-checking under the write lock to avoid a duplicate insert when
/// two tasks race to admit the same host's first request.
pub struct RateLimiter {
    buckets: RwLock<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    burst: u32,
    rps: u32,
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, burst: u32) -> Self {
        let rps = (requests_per_minute / 60).max(1);
        Self {
            buckets: RwLock::new(HashMap::new()),
            burst,
            rps,
        }
    }

    fn host_of(url: &str) -> Result<String> {
        let parsed = Url::parse(url)?;
        parsed
            .host_str()
            .map(|h| h.to_lowercase())
            .ok_or_else(|| Error::Validation(format!("URL has no host: {url}")))
    }

    async fn bucket_for(&self, host: &str) -> Arc<Mutex<TokenBucket>> {
        if let Some(bucket) = self.buckets.read().await.get(host) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.burst, self.rps))))
            .clone()
    }

    /// Waits until a token is available for `url`'s host, or returns
    /// `Error::Cancelled` if `cancel` fires first.
    pub async fn wait(&self, url: &str, cancel: &CancelFlag) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let host = Self::host_of(url)?;
        let bucket = self.bucket_for(&host).await;
        let delay = {
            let mut guard = bucket.lock().await;
            guard.take()
        };
        if delay > Duration::ZERO {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.wait() => return Err(Error::Cancelled),
            }
        }
        Ok(())
    }
}
