//! Plain, deserializable client configuration.
//!
//! Host applications usually keep these settings next to the rest of their
//! configuration (JSON or TOML). [`ClientConfig`] mirrors the knobs of
//! [`ClientBuilder`](crate::ClientBuilder); every field has a default, so a
//! config only needs to name what it changes.

use crate::auth::PublicRoutes;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Settings applied by [`ClientBuilder::from_config`](crate::ClientBuilder::from_config).
///
/// # Examples
///
/// ```
/// use steadfast::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{
///     "base_url": "https://api.example.com",
///     "retry": { "max_attempts": 5 },
///     "public_routes": ["/", "/events/*"]
/// }"#).unwrap();
///
/// assert_eq!(config.retry.max_attempts, 5);
/// assert_eq!(config.retry.base_delay_ms, 1000);
/// assert_eq!(config.login_path, "/login");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    /// Per-attempt transport timeout.
    pub timeout_ms: Option<u64>,
    /// Prefix identifying API paths (for gateway-fault detection).
    pub api_prefix: String,
    pub retry: RetrySettings,
    pub rate_limit: RateLimitConfig,
    /// Path prefixes whose GET requests are coalesced while in flight.
    pub dedup_prefixes: Vec<String>,
    /// Paths on which a 401 never triggers a refresh.
    pub auth_exempt_paths: Vec<String>,
    /// UI routes reachable without a session (`*` suffix for prefixes).
    pub public_routes: Vec<String>,
    pub login_path: String,
    /// Capacity of the notification channel.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: None,
            api_prefix: "/api".to_string(),
            retry: RetrySettings::default(),
            rate_limit: RateLimitConfig::default(),
            dedup_prefixes: default_dedup_prefixes(),
            auth_exempt_paths: default_auth_exempt_paths(),
            public_routes: default_public_routes(),
            login_path: "/login".to_string(),
            event_buffer: 64,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// The public-route allow-list, for [`Navigator`](crate::Navigator)
    /// implementations.
    pub fn public_routes(&self) -> PublicRoutes {
        PublicRoutes::new(&self.public_routes)
    }
}

/// Retry knobs in config-file units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_ratio: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            multiplier: 2.0,
            jitter_ratio: 0.1,
            max_delay_ms: 30_000,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy::default()
            .max_attempts(settings.max_attempts)
            .base_delay(Duration::from_millis(settings.base_delay_ms))
            .multiplier(settings.multiplier)
            .jitter_ratio(settings.jitter_ratio)
            .max_delay(Duration::from_millis(settings.max_delay_ms))
    }
}

pub(crate) fn default_dedup_prefixes() -> Vec<String> {
    ["/api/admin/stats", "/api/admin/summary", "/api/analytics", "/api/stats"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub(crate) fn default_auth_exempt_paths() -> Vec<String> {
    ["/auth/login", "/auth/register", "/auth/refresh", "/auth/me"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub(crate) fn default_public_routes() -> Vec<String> {
    [
        "/",
        "/events*",
        "/search*",
        "/vendors*",
        "/categories*",
        "/about",
        "/contact",
        "/faq",
        "/terms",
        "/privacy",
        "/register",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// `Duration` as integer milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.retry, RetrySettings::default());
        assert!(config.rate_limit.enabled);
        assert_eq!(config.event_buffer, 64);
        assert!(config.timeout().is_none());
        assert!(config.public_routes().matches("/events/123"));
        assert!(!config.public_routes().matches("/checkout"));
    }

    #[test]
    fn test_retry_settings_convert() {
        let settings = RetrySettings {
            max_attempts: 4,
            base_delay_ms: 200,
            multiplier: 3.0,
            jitter_ratio: 0.0,
            max_delay_ms: 10_000,
        };
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.attempt_budget(), 4);
        assert_eq!(policy.base_delay_for_attempt(3), Duration::from_millis(1800));
    }

    #[test]
    fn test_rate_limit_section() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"rate_limit": {"enabled": false, "max_wait_ms": 500}}"#)
                .unwrap();
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.max_wait, Duration::from_millis(500));
    }
}
