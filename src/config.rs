use crate::error::{Error, Result};

/// Flat configuration surface (spec §6). Loaded from environment variables,
/// matching the teacher's verbose `from_env` + `validate` pattern rather than
/// a derive-based config crate, so every default and parse failure is
/// explicit and traceable to one line.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Days window for `get_recent_entries`.
    pub days: i64,
    /// When true, `filter_by` axis is `first_seen`; otherwise `published`.
    pub filter_by_first_seen: bool,
    /// `"published"` or `"first_seen"`.
    pub sort_by: String,
    /// Orchestrator semaphore size, clamped to 1..=50.
    pub concurrent_fetches: usize,
    /// Overrides the default product `User-Agent` string.
    pub user_agent: String,
    pub http_timeout_seconds: u64,
    pub dial_timeout_seconds: u64,
    pub tls_handshake_timeout_seconds: u64,
    pub response_header_timeout_seconds: u64,
    pub requests_per_minute: u32,
    pub rate_limit_burst: u32,
    pub max_retries: u32,
    pub database_path: String,
    pub output_dir: String,
    /// If false, 301s are logged but the feed's URL is not rewritten.
    pub auto_update_redirects: bool,
}

const DEFAULT_USER_AGENT: &str = "feedriver/0.1 (+https://example.invalid/feedriver)";

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            days: parse_env("FEEDRIVER_DAYS", 7)?,
            filter_by_first_seen: parse_bool_env("FEEDRIVER_FILTER_BY_FIRST_SEEN", true)?,
            sort_by: std::env::var("FEEDRIVER_SORT_BY").unwrap_or_else(|_| "first_seen".into()),
            concurrent_fetches: parse_env("FEEDRIVER_CONCURRENT_FETCHES", 5usize)?,
            user_agent: std::env::var("FEEDRIVER_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout_seconds: parse_env("FEEDRIVER_HTTP_TIMEOUT_SECONDS", 30)?,
            dial_timeout_seconds: parse_env("FEEDRIVER_DIAL_TIMEOUT_SECONDS", 10)?,
            tls_handshake_timeout_seconds: parse_env("FEEDRIVER_TLS_HANDSHAKE_TIMEOUT_SECONDS", 10)?,
            response_header_timeout_seconds: parse_env(
                "FEEDRIVER_RESPONSE_HEADER_TIMEOUT_SECONDS",
                10,
            )?,
            requests_per_minute: parse_env("FEEDRIVER_REQUESTS_PER_MINUTE", 60)?,
            rate_limit_burst: parse_env("FEEDRIVER_RATE_LIMIT_BURST", 10)?,
            max_retries: parse_env("FEEDRIVER_MAX_RETRIES", 3)?,
            database_path: std::env::var("FEEDRIVER_DATABASE_PATH")
                .unwrap_or_else(|_| "feedriver.db".to_string()),
            output_dir: std::env::var("FEEDRIVER_OUTPUT_DIR").unwrap_or_else(|_| "output".to_string()),
            auto_update_redirects: parse_bool_env("FEEDRIVER_AUTO_UPDATE_REDIRECTS", true)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrent_fetches == 0 || self.concurrent_fetches > 50 {
            return Err(Error::Config(format!(
                "concurrent_fetches must be between 1 and 50, got {}",
                self.concurrent_fetches
            )));
        }
        if self.sort_by != "published" && self.sort_by != "first_seen" {
            return Err(Error::Config(format!(
                "sort_by must be 'published' or 'first_seen', got '{}'",
                self.sort_by
            )));
        }
        if self.days <= 0 {
            return Err(Error::Config(format!(
                "days must be positive, got {}",
                self.days
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        if self.database_path.is_empty() {
            return Err(Error::Config("database_path must not be empty".to_string()));
        }
        Ok(())
    }

    /// The axis `get_recent_entries` filters on, derived from `filter_by_first_seen`.
    pub fn filter_by(&self) -> &'static str {
        if self.filter_by_first_seen {
            "first_seen"
        } else {
            "published"
        }
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| Error::Config(format!("invalid value for {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(Error::Config(format!(
                "invalid boolean value for {key}: '{other}'"
            ))),
        },
        Err(_) => Ok(default),
    }
}
