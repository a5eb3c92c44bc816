pub mod validation;

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{redirect, Client, StatusCode};

use crate::cancel::CancelFlag;
use crate::clock::Clock;
use crate::config::Settings;
use crate::error::{Error, Result};

/// 10 MiB response body cap (spec §4.3 point 8).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

/// Opaque per-feed HTTP cache state, read before each fetch and rewritten
/// from response headers after each non-transport-error fetch.
#[derive(Debug, Clone, Default)]
pub struct FeedCache {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

#[derive(Debug)]
pub struct FetchResponse {
    pub body: Vec<u8>,
    pub status: u16,
    pub not_modified: bool,
    pub new_cache: FeedCache,
    pub final_url: String,
    pub permanent_redirect: bool,
    pub cache_control_max_age: Option<u64>,
    pub fetch_time: DateTime<Utc>,
}

pub struct HttpClient {
    client: Client,
    user_agent: String,
    max_retries: u32,
    clock: std::sync::Arc<dyn Clock>,
    /// Only ever set by `new_for_tests`, which only exists behind the
    /// `test-util` feature (always on under `cargo test`, never on in a
    /// release build) — so the SSRF gate in `fetch` is unconditional outside
    /// test builds. Exists because tests exercise the redirect/retry/
    /// conditional-request machinery against a local mock server, which is
    /// itself a loopback address the gate would otherwise reject.
    #[cfg(any(test, feature = "test-util"))]
    skip_ssrf_for_tests: bool,
}

impl HttpClient {
    pub fn new(settings: &Settings, clock: std::sync::Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(settings.http_timeout_seconds))
            .connect_timeout(Duration::from_secs(settings.dial_timeout_seconds))
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            client,
            user_agent: settings.user_agent.clone(),
            max_retries: settings.max_retries,
            clock,
            #[cfg(any(test, feature = "test-util"))]
            skip_ssrf_for_tests: false,
        })
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn new_for_tests(settings: &Settings, clock: std::sync::Arc<dyn Clock>) -> Result<Self> {
        let mut client = Self::new(settings, clock)?;
        client.skip_ssrf_for_tests = true;
        Ok(client)
    }

    /// Full SSRF validation: scheme/blocked-hostname/IP-literal checks plus
    /// DNS-resolved-address checks. Always active, in every build — this is
    /// what every redirect hop inside `fetch` is re-run against, regardless
    /// of test mode, since a malicious redirect target must be caught even
    /// when the caller's *entry* URL is a trusted local test server.
    async fn check_ssrf(&self, url: &str) -> Result<reqwest::Url> {
        let parsed = validation::validate_url(url)?;
        validation::validate_resolved(&parsed).await?;
        Ok(parsed)
    }

    /// Validates the *entry* URL a caller asked to fetch. Identical to
    /// `check_ssrf` in a release build. Under `test-util`/unit tests, with
    /// `skip_ssrf_for_tests` set, the entry URL is trusted unchecked — it's
    /// the mock server a test deliberately pointed the client at, itself a
    /// loopback address the gate would otherwise reject. Every redirect hop
    /// past that entry point still goes through `check_ssrf` unconditionally.
    #[cfg(any(test, feature = "test-util"))]
    async fn check_ssrf_entry(&self, url: &str) -> Result<reqwest::Url> {
        if self.skip_ssrf_for_tests {
            return reqwest::Url::parse(url).map_err(Error::InvalidUrl);
        }
        self.check_ssrf(url).await
    }

    #[cfg(not(any(test, feature = "test-util")))]
    async fn check_ssrf_entry(&self, url: &str) -> Result<reqwest::Url> {
        self.check_ssrf(url).await
    }

    /// Validates a redirect hop. A hop landing on the SAME origin as the
    /// already-trusted entry URL is exempt under `skip_ssrf_for_tests` — a
    /// test server redirecting to a relative path on itself isn't a new trust
    /// boundary. A hop to any OTHER origin, including another loopback
    /// address, always goes through full `check_ssrf`: that's the actual
    /// attack this gate exists to catch (spec §4.3.1, §8 testable property 4).
    #[cfg(any(test, feature = "test-util"))]
    async fn check_ssrf_redirect(&self, next: reqwest::Url, entry_origin: &url::Origin) -> Result<reqwest::Url> {
        if self.skip_ssrf_for_tests && &next.origin() == entry_origin {
            return Ok(next);
        }
        self.check_ssrf(next.as_str()).await
    }

    #[cfg(not(any(test, feature = "test-util")))]
    async fn check_ssrf_redirect(&self, next: reqwest::Url, _entry_origin: &url::Origin) -> Result<reqwest::Url> {
        self.check_ssrf(next.as_str()).await
    }

    /// Single attempt: validate, build request with conditional headers,
    /// follow redirects by hand so each hop is re-validated and 301/308 hops
    /// are tracked, enforce the body cap, and classify the response.
    pub async fn fetch(&self, url: &str, cache: &FeedCache, cancel: &CancelFlag) -> Result<FetchResponse> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut current = self.check_ssrf_entry(url).await?;
        let entry_origin = current.origin();

        let mut permanent_redirect = false;

        for _ in 0..=MAX_REDIRECTS {
            let mut headers = HeaderMap::new();
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_str(&self.user_agent)
                    .map_err(|_| Error::Config("invalid user agent string".to_string()))?,
            );
            headers.insert(
                reqwest::header::ACCEPT_ENCODING,
                HeaderValue::from_static("gzip, deflate"),
            );
            if let Some(etag) = &cache.etag {
                if let Ok(value) = HeaderValue::from_str(etag) {
                    headers.insert(reqwest::header::IF_NONE_MATCH, value);
                }
            }
            if let Some(last_modified) = &cache.last_modified {
                if let Ok(value) = HeaderValue::from_str(last_modified) {
                    headers.insert(reqwest::header::IF_MODIFIED_SINCE, value);
                }
            }

            let response = tokio::select! {
                result = self.client.get(current.clone()).headers(headers).send() => result.map_err(Error::Transport)?,
                _ = cancel.wait() => return Err(Error::Cancelled),
            };

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| Error::Http {
                        status: status.as_u16(),
                        url: current.to_string(),
                    })?;

                let next = current
                    .join(location)
                    .map_err(|_| Error::Validation(format!("invalid redirect target '{location}'")))?;

                let next = self.check_ssrf_redirect(next, &entry_origin).await?;

                if status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::PERMANENT_REDIRECT {
                    permanent_redirect = true;
                }

                current = next;
                continue;
            }

            if status == StatusCode::NOT_MODIFIED {
                return Ok(FetchResponse {
                    body: Vec::new(),
                    status: status.as_u16(),
                    not_modified: true,
                    new_cache: cache.clone(),
                    final_url: current.to_string(),
                    permanent_redirect,
                    cache_control_max_age: None,
                    fetch_time: self.clock.now(),
                });
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
                let retry_after = parse_retry_after(response.headers(), self.clock.now())
                    .unwrap_or(Duration::from_secs(60));
                return Err(Error::RateLimited { retry_after });
            }

            if !status.is_success() {
                return Err(Error::Http {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }

            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let last_modified = response
                .headers()
                .get(reqwest::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let cache_control_max_age = response
                .headers()
                .get(reqwest::header::CACHE_CONTROL)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_max_age);

            let final_url = current.to_string();
            let body = read_capped_body(response, cancel).await?;

            return Ok(FetchResponse {
                body,
                status: status.as_u16(),
                not_modified: false,
                new_cache: FeedCache {
                    etag,
                    last_modified,
                },
                final_url,
                permanent_redirect,
                cache_control_max_age,
                fetch_time: self.clock.now(),
            });
        }

        Err(Error::Http {
            status: StatusCode::LOOP_DETECTED.as_u16(),
            url: current.to_string(),
        })
    }

    /// Retries transport failures and 5xx with exponential backoff plus
    /// jitter (`2^(n-1)s ± 10%`); on 429/503 honors the parsed `Retry-After`
    /// instead. Never retries other 4xx. Consumes one attempt per try,
    /// including the rate-limited sleep, up to `max_retries`.
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        cache: &FeedCache,
        cancel: &CancelFlag,
    ) -> Result<FetchResponse> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch(url, cache, cancel).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt >= self.max_retries => return Err(err),
                Err(Error::RateLimited { retry_after }) => {
                    sleep_cancellable(retry_after, cancel).await?;
                }
                Err(err) if err.is_retryable() => {
                    let backoff = exponential_backoff_with_jitter(attempt);
                    sleep_cancellable(backoff, cancel).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

async fn sleep_cancellable(duration: Duration, cancel: &CancelFlag) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = cancel.wait() => Err(Error::Cancelled),
    }
}

fn exponential_backoff_with_jitter(attempt: u32) -> Duration {
    let base = 2f64.powi(attempt as i32 - 1);
    let jitter_fraction = rand::thread_rng().gen_range(-0.1..=0.1);
    let seconds = (base * (1.0 + jitter_fraction)).max(0.0);
    Duration::from_secs_f64(seconds)
}

async fn read_capped_body(response: reqwest::Response, cancel: &CancelFlag) -> Result<Vec<u8>> {
    if let Some(len) = response.content_length() {
        if len as usize > MAX_BODY_BYTES {
            return Err(Error::BodyTooLarge { limit: MAX_BODY_BYTES });
        }
    }

    let mut buffer = Vec::new();
    let mut stream = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            next = stream.next() => next,
            _ = cancel.wait() => return Err(Error::Cancelled),
        };
        match chunk {
            Some(Ok(bytes)) => {
                if buffer.len() + bytes.len() > MAX_BODY_BYTES {
                    return Err(Error::BodyTooLarge { limit: MAX_BODY_BYTES });
                }
                buffer.extend_from_slice(&bytes);
            }
            Some(Err(e)) => return Err(Error::Transport(e)),
            None => break,
        }
    }

    Ok(buffer)
}

fn parse_max_age(cache_control: &str) -> Option<u64> {
    cache_control
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|value| value.parse::<u64>().ok())
}

/// Parses `Retry-After` in either delta-seconds or HTTP-date form. `now` is
/// the injected clock's reading, not `Utc::now()`, so HTTP-date deltas stay
/// test-pinnable like the rest of the time surface.
fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let target = DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    let delta = target.with_timezone(&Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(
            parse_retry_after(&headers, Utc::now()),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn parses_retry_after_http_date_in_the_future() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let future = now + chrono::Duration::seconds(30);
        let http_date = future.to_rfc2822();
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            HeaderValue::from_str(&http_date).unwrap(),
        );
        let parsed = parse_retry_after(&headers, now).unwrap();
        assert_eq!(parsed.as_secs(), 30);
    }

    #[test]
    fn parses_cache_control_max_age() {
        assert_eq!(parse_max_age("max-age=3600, public"), Some(3600));
        assert_eq!(parse_max_age("no-cache"), None);
    }

    #[test]
    fn backoff_grows_exponentially_with_jitter_bounded() {
        for attempt in 1..=5 {
            let d = exponential_backoff_with_jitter(attempt);
            let base = 2f64.powi(attempt as i32 - 1);
            assert!(d.as_secs_f64() >= base * 0.85);
            assert!(d.as_secs_f64() <= base * 1.15);
        }
    }
}
