//! Per-request description.

use crate::key::RequestKey;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

/// Everything the client needs to know about one logical call, apart from
/// its body.
///
/// Query parameters keep the order they were added in for the wire; the
/// coalescing key ignores that order.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub method: Method,

    /// Joined onto the base URL; also matched against the API prefix,
    /// dedup prefixes and auth exemptions.
    pub path: String,

    /// Per-call headers; the bearer credential is added per attempt.
    pub headers: HeaderMap,

    /// Sent in insertion order.
    pub query_params: Vec<(String, String)>,

    /// Attach the current credential and take part in session refresh.
    pub requires_auth: bool,

    /// Explicit idempotency marker; `None` falls back to the method's semantics.
    pub idempotent: Option<bool>,

    /// `false` opts this call out of retries entirely.
    pub retry: bool,
}

impl RequestMetadata {
    /// An authenticated, retry-eligible (by method) call.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            requires_auth: true,
            idempotent: None,
            retry: true,
        }
    }

    /// Adds a per-call header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| crate::Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends one query parameter.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    pub fn with_query_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query_params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sends the request without a credential (public endpoints).
    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Marks the call as safe to repeat, making mutating methods eligible
    /// for retry.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = Some(idempotent);
        self
    }

    /// Never retry this call.
    pub fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }

    /// Whether transient failures of this call may be retried.
    ///
    /// Safe methods (GET, HEAD, OPTIONS) are eligible by default; anything
    /// else needs an explicit idempotency marker.
    pub fn is_retry_eligible(&self) -> bool {
        if !self.retry {
            return false;
        }
        self.idempotent.unwrap_or_else(|| self.method.is_safe())
    }

    /// The coalescing key for this request; authenticated and anonymous
    /// calls never share a key.
    pub fn key(&self) -> RequestKey {
        let key =
            RequestKey::new(&self.method, &self.path, self.query_params.iter().map(|(k, v)| (k, v)));
        if self.requires_auth {
            key
        } else {
            key.unauthenticated()
        }
    }
}

impl Default for RequestMetadata {
    fn default() -> Self {
        Self::new(Method::GET, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_eligibility_by_method() {
        assert!(RequestMetadata::new(Method::GET, "/a").is_retry_eligible());
        assert!(RequestMetadata::new(Method::HEAD, "/a").is_retry_eligible());
        assert!(!RequestMetadata::new(Method::POST, "/a").is_retry_eligible());
        assert!(!RequestMetadata::new(Method::DELETE, "/a").is_retry_eligible());
        assert!(RequestMetadata::new(Method::POST, "/a")
            .idempotent(true)
            .is_retry_eligible());
        assert!(!RequestMetadata::new(Method::GET, "/a")
            .no_retry()
            .is_retry_eligible());
        assert!(!RequestMetadata::new(Method::GET, "/a")
            .idempotent(false)
            .is_retry_eligible());
    }

    #[test]
    fn test_key_ignores_param_order() {
        let a = RequestMetadata::new(Method::GET, "/api/stats")
            .with_query_param("from", "1")
            .with_query_param("to", "2");
        let b = RequestMetadata::new(Method::GET, "/api/stats")
            .with_query_params([("to", "2"), ("from", "1")]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_separates_anonymous_calls() {
        let signed_in = RequestMetadata::new(Method::GET, "/api/stats");
        let anonymous = RequestMetadata::new(Method::GET, "/api/stats").without_auth();
        assert_ne!(signed_in.key(), anonymous.key());
        assert_eq!(anonymous.key(), anonymous.clone().key());
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let result = RequestMetadata::new(Method::GET, "/a").with_header("bad header", "x");
        assert!(matches!(result, Err(crate::Error::ConfigurationError(_))));
    }
}
