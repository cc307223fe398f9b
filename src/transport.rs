//! The transport seam.
//!
//! The resilience layer only needs "send this request, give me the status,
//! headers and body, or tell me why there was no response". [`Transport`]
//! captures exactly that; [`ReqwestTransport`] is the production
//! implementation.

use crate::{Error, Result};
use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use url::Url;

/// One file (or field) of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPart {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl UploadPart {
    pub fn file(
        field: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            data: data.into(),
        }
    }

    pub fn text(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            file_name: None,
            content_type: None,
            data: value.into().into_bytes(),
        }
    }
}

/// Request body. Kept as owned data so it can be re-sent on retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<UploadPart>),
}

/// A fully resolved attempt, credential headers included.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// What came back, whatever the status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends one attempt.
///
/// Implementations return `Ok` for any HTTP response (including 4xx/5xx) and
/// `Err(Error::Transport { .. })` only when no response was received.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse>;
}

/// [`Transport`] over a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
    base_url: Url,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: Url, default_headers: HeaderMap, timeout: Option<Duration>) -> Result<Self> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;
        Ok(Self {
            http_client,
            base_url,
            default_headers,
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, path: &str, query: &[(String, String)]) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse> {
        let url = self.url_for(&request.path, &request.query);

        tracing::debug!(method = %request.method, url = %url, "Sending HTTP request");

        let mut builder = self.http_client.request(request.method, url);

        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder.json(&json),
            RequestBody::Multipart(parts) => builder.multipart(multipart_form(parts)?),
        };

        let response = builder.send().await.map_err(Error::from_reqwest)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(Error::from_reqwest)?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn multipart_form(parts: Vec<UploadPart>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut piece = reqwest::multipart::Part::bytes(part.data);
        if let Some(file_name) = part.file_name {
            piece = piece.file_name(file_name);
        }
        if let Some(content_type) = part.content_type {
            piece = piece.mime_str(&content_type).map_err(|e| {
                Error::ConfigurationError(format!("Invalid content type {content_type}: {e}"))
            })?;
        }
        form = form.part(part.field, piece);
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_path_and_query() {
        let transport = ReqwestTransport::new(
            Url::parse("https://example.com/v1/").unwrap(),
            HeaderMap::new(),
            None,
        )
        .unwrap();

        let url = transport.url_for(
            "/api/events",
            &[("q".to_string(), "jazz night".to_string())],
        );
        assert_eq!(url.as_str(), "https://example.com/v1/api/events?q=jazz+night");

        let bare = transport.url_for("api/events", &[]);
        assert_eq!(bare.as_str(), "https://example.com/v1/api/events");
    }

    #[test]
    fn test_multipart_rejects_bad_content_type() {
        let parts = vec![UploadPart::file("file", "a.png", "not a mime", vec![1, 2])];
        assert!(matches!(
            multipart_form(parts),
            Err(Error::ConfigurationError(_))
        ));
    }
}
