//! Server wait hints carried on throttled responses.
//!
//! A 429 (or a 503 from an overloaded backend) often tells the client how long
//! to back off. When rate-limit handling is enabled the retry delay is
//! stretched to at least that hint, capped by [`RateLimitConfig::max_wait`].

use http::HeaderMap;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wait hints parsed from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// From `X-RateLimit-Reset` or `RateLimit-Reset` (Unix seconds).
    pub reset_at: Option<SystemTime>,
    /// From `Retry-After` (delta-seconds or HTTP date).
    pub retry_after: Option<Duration>,
    /// From `X-RateLimit-Remaining`.
    pub remaining: Option<u64>,
}

impl RateLimitInfo {
    /// Reads the known throttling headers.
    ///
    /// Returns `None` when none of them carries a usable hint.
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "7".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers).unwrap();
    /// assert_eq!(info.retry_after, Some(Duration::from_secs(7)));
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let info = Self {
            reset_at: header_str(headers, "x-ratelimit-reset")
                .or_else(|| header_str(headers, "ratelimit-reset"))
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| UNIX_EPOCH + Duration::from_secs(secs)),
            retry_after: header_str(headers, "retry-after").and_then(parse_retry_after),
            remaining: header_str(headers, "x-ratelimit-remaining").and_then(|v| v.parse().ok()),
        };

        (info.retry_after.is_some() || info.reset_at.is_some() || info.remaining == Some(0))
            .then_some(info)
    }

    /// How long the server asked us to wait, capped at `max_wait`.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        if let Some(retry_after) = self.retry_after {
            return Some(retry_after.min(max_wait));
        }
        self.reset_at
            .and_then(|reset| reset.duration_since(SystemTime::now()).ok())
            .map(|until| until.min(max_wait))
    }
}

/// Whether and how far to honor server wait hints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Longest wait the client will accept from a hint.
    #[serde(with = "crate::config::millis", rename = "max_wait_ms")]
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_wait: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Ignore server hints; use the computed backoff only.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Honor hints up to `max_wait`.
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self {
            enabled: true,
            max_wait,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok()
}

fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    httpdate::parse_http_date(value)
        .ok()?
        .duration_since(SystemTime::now())
        .ok()
}
