//! Classification of failed attempts.
//!
//! Every failed transport attempt is mapped onto one [`ErrorKind`]; the kind
//! alone decides whether the client refreshes the session, retries, or gives
//! up and tells the UI.

use crate::error::{Error, TransportFailure};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Taxonomy of attempt failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No HTTP response: refused, unreachable, timed out.
    ConnectionUnavailable,
    /// HTTP 401.
    AuthenticationExpired,
    /// HTTP 503 on an API-prefixed path; a proxy/deployment fault.
    GatewayMisconfiguration,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx other than a gateway misconfiguration.
    ServerError,
    /// Any other HTTP 4xx.
    ClientError,
}

impl ErrorKind {
    /// Stable kebab-case name, as used in notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionUnavailable => "connection-unavailable",
            ErrorKind::AuthenticationExpired => "authentication-expired",
            ErrorKind::GatewayMisconfiguration => "gateway-misconfiguration",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::ServerError => "server-error",
            ErrorKind::ClientError => "client-error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of classifying one failed attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub status: Option<StatusCode>,
    pub message: String,
    pub retryable: bool,
    pub requires_reauth: bool,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            retryable: matches!(kind, ErrorKind::RateLimited | ErrorKind::ServerError),
            requires_reauth: kind == ErrorKind::AuthenticationExpired,
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.kind, status.as_u16(), self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

/// Assigns an [`ErrorKind`] to failed attempts.
///
/// The only configuration is the API path prefix used to tell a gateway
/// misconfiguration (503 on an API path) apart from an ordinary 5xx.
#[derive(Debug, Clone)]
pub struct Classifier {
    api_prefix: String,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new("/api")
    }
}

impl Classifier {
    /// Creates a classifier for the given API prefix (e.g. `/api`).
    pub fn new(api_prefix: impl Into<String>) -> Self {
        Self {
            api_prefix: api_prefix.into(),
        }
    }

    /// Returns the configured API prefix.
    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    /// Classifies a failed attempt against `path`.
    ///
    /// Returns `None` for errors that are not attempt failures (configuration,
    /// serialization, deserialization, or already-terminal errors).
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast::{Classifier, Error, ErrorKind};
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = Error::HttpError {
    ///     status: StatusCode::SERVICE_UNAVAILABLE,
    ///     raw_response: String::new(),
    ///     headers: HeaderMap::new(),
    ///     rate_limit_info: None,
    /// };
    ///
    /// let classifier = Classifier::new("/api");
    /// let on_api = classifier.classify(&err, "/api/orders").unwrap();
    /// assert_eq!(on_api.kind, ErrorKind::GatewayMisconfiguration);
    /// assert!(!on_api.retryable);
    ///
    /// let elsewhere = classifier.classify(&err, "/health").unwrap();
    /// assert_eq!(elsewhere.kind, ErrorKind::ServerError);
    /// ```
    pub fn classify(&self, error: &Error, path: &str) -> Option<ClassifiedError> {
        match error {
            Error::Transport { failure, message } => {
                let text = match failure {
                    TransportFailure::Timeout => {
                        "Request timed out; the service may be cold-starting".to_string()
                    }
                    TransportFailure::ConnectionRefused => {
                        format!("Unable to connect to the service: {message}")
                    }
                    TransportFailure::Network => format!("Network failure: {message}"),
                };
                Some(ClassifiedError::new(
                    ErrorKind::ConnectionUnavailable,
                    None,
                    text,
                ))
            }
            Error::HttpError {
                status,
                raw_response,
                ..
            } => Some(self.classify_status(*status, raw_response, path)),
            _ => None,
        }
    }

    fn classify_status(&self, status: StatusCode, body: &str, path: &str) -> ClassifiedError {
        let kind = if status == StatusCode::UNAUTHORIZED {
            ErrorKind::AuthenticationExpired
        } else if status == StatusCode::SERVICE_UNAVAILABLE && self.is_api_path(path) {
            ErrorKind::GatewayMisconfiguration
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            ErrorKind::RateLimited
        } else if status.is_server_error() {
            ErrorKind::ServerError
        } else {
            ErrorKind::ClientError
        };

        let message = match kind {
            ErrorKind::AuthenticationExpired => "Authentication expired".to_string(),
            ErrorKind::GatewayMisconfiguration => format!(
                "Service unavailable on {path}; the API gateway or proxy is likely misconfigured"
            ),
            ErrorKind::RateLimited => "Too many requests".to_string(),
            _ if body.is_empty() => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
            _ => body.to_string(),
        };

        ClassifiedError::new(kind, Some(status), message)
    }

    fn is_api_path(&self, path: &str) -> bool {
        let prefix = self.api_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    fn http(status: u16) -> Error {
        Error::HttpError {
            status: StatusCode::from_u16(status).unwrap(),
            raw_response: String::new(),
            headers: HeaderMap::new(),
            rate_limit_info: None,
        }
    }

    fn kind_of(status: u16, path: &str) -> ErrorKind {
        Classifier::default().classify(&http(status), path).unwrap().kind
    }

    #[test]
    fn test_status_priority() {
        assert_eq!(kind_of(401, "/api/me"), ErrorKind::AuthenticationExpired);
        assert_eq!(kind_of(503, "/api/orders"), ErrorKind::GatewayMisconfiguration);
        assert_eq!(kind_of(503, "/static/app.js"), ErrorKind::ServerError);
        assert_eq!(kind_of(429, "/api/search"), ErrorKind::RateLimited);
        assert_eq!(kind_of(500, "/api/orders"), ErrorKind::ServerError);
        assert_eq!(kind_of(502, "/api/orders"), ErrorKind::ServerError);
        assert_eq!(kind_of(404, "/api/orders"), ErrorKind::ClientError);
        assert_eq!(kind_of(422, "/api/orders"), ErrorKind::ClientError);
    }

    #[test]
    fn test_prefix_must_match_a_segment() {
        assert_eq!(kind_of(503, "/apiary"), ErrorKind::ServerError);
        assert_eq!(kind_of(503, "/api"), ErrorKind::GatewayMisconfiguration);
    }

    #[test]
    fn test_flags() {
        let c = Classifier::default();
        let auth = c.classify(&http(401), "/api/me").unwrap();
        assert!(auth.requires_reauth);
        assert!(!auth.retryable);

        let rate = c.classify(&http(429), "/api/me").unwrap();
        assert!(rate.retryable);
        assert!(!rate.requires_reauth);

        let client = c.classify(&http(400), "/api/me").unwrap();
        assert!(!client.retryable);
    }

    #[test]
    fn test_transport_failures_distinguish_timeout() {
        let c = Classifier::default();
        let timeout = Error::Transport {
            failure: TransportFailure::Timeout,
            message: "operation timed out".into(),
        };
        let refused = Error::Transport {
            failure: TransportFailure::ConnectionRefused,
            message: "connection refused".into(),
        };

        let t = c.classify(&timeout, "/api/me").unwrap();
        let r = c.classify(&refused, "/api/me").unwrap();
        assert_eq!(t.kind, ErrorKind::ConnectionUnavailable);
        assert_eq!(r.kind, ErrorKind::ConnectionUnavailable);
        assert!(!t.retryable);
        assert!(t.message.contains("cold-starting"));
        assert!(r.message.contains("connection refused"));
        assert_eq!(t.status, None);
    }

    #[test]
    fn test_non_attempt_errors_are_unclassified() {
        let c = Classifier::default();
        assert!(c
            .classify(&Error::ConfigurationError("x".into()), "/api")
            .is_none());
    }
}
