//! The client every call goes through.
//!
//! [`Client`] ties the pieces together. For each logical call it:
//!
//! 1. coalesces the call with an identical pending one when the dedup policy
//!    allows it;
//! 2. sends the attempt with the latest credential;
//! 3. classifies a failure and either refreshes the session and replays the
//!    call once, retries it after a backoff, or rejects it;
//! 4. publishes notifications for retries and connection problems.
//!
//! Use [`ClientBuilder`] to configure and create clients.

use crate::auth::{AuthPolicy, Credential, Navigator, RefreshCoordinator, TokenStore};
use crate::classify::{ClassifiedError, Classifier, ErrorKind};
use crate::config::ClientConfig;
use crate::events::{
    ClientEvent, ConnectionErrorEvent, EventKind, EventSubscription, Notifier, RetryAttemptedEvent,
};
use crate::inflight::InFlightRegistry;
use crate::key::{DedupPolicy, RequestKey};
use crate::metadata::RequestMetadata;
use crate::rate_limit::{RateLimitConfig, RateLimitInfo};
use crate::retry::RetryPolicy;
use crate::transport::{
    RawResponse, ReqwestTransport, RequestBody, Transport, TransportRequest, UploadPart,
};
use crate::{Error, Response, Result};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use url::Url;

/// A resilient API client.
///
/// Cheap to clone; clones share the transport, the in-flight registry, the
/// refresh coordinator and the notification channel.
///
/// # Examples
///
/// ```no_run
/// use steadfast::{Client, RetryPolicy};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct NewBooking {
///     event_id: u64,
///     seats: u32,
/// }
///
/// #[derive(Deserialize)]
/// struct Booking {
///     id: u64,
/// }
///
/// # async fn example() -> Result<(), steadfast::Error> {
/// let client = Client::builder()
///     .base_url("https://marketplace.example.com")?
///     .timeout(Duration::from_secs(15))
///     .retry_policy(RetryPolicy::default().max_attempts(4))
///     .build()?;
///
/// let booking: steadfast::Response<Booking> = client
///     .post("/api/bookings", &NewBooking { event_id: 12, seats: 2 })
///     .await?;
/// println!("Booked #{}", booking.id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
    rate_limit_config: RateLimitConfig,
    classifier: Classifier,
    dedup: DedupPolicy,
    in_flight: InFlightRegistry<RequestKey, Result<Outcome>>,
    auth: Option<RefreshCoordinator>,
    notifier: Notifier,
}

/// A settled logical call before decoding.
#[derive(Debug, Clone)]
struct Outcome {
    response: RawResponse,
    attempts: usize,
    latency: Duration,
}

impl Client {
    /// Shorthand for [`ClientBuilder::new`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Makes a typed request with an optional JSON body.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use steadfast::{Client, metadata::RequestMetadata};
    /// use http::Method;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Summary { revenue: f64 }
    ///
    /// # async fn example() -> Result<(), steadfast::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://marketplace.example.com")?
    ///     .build()?;
    ///
    /// let metadata = RequestMetadata::new(Method::GET, "/api/admin/summary")
    ///     .with_query_param("range", "30d");
    ///
    /// let summary = client.call::<(), Summary>(metadata, None).await?;
    /// println!("Revenue: {}", summary.data.revenue);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call<Req, Res>(
        &self,
        metadata: RequestMetadata,
        body: Option<&Req>,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let body = match body {
            Some(body) => RequestBody::Json(
                serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?,
            ),
            None => RequestBody::Empty,
        };
        self.send(metadata, body).await
    }

    /// Makes a typed request with an already-built body.
    pub async fn send<Res>(&self, metadata: RequestMetadata, body: RequestBody) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let (outcome, coalesced) = self.dispatch(metadata, body).await?;
        parse_response(outcome, coalesced)
    }

    /// GET `path`. Coalesced with identical pending calls when the dedup
    /// policy covers the path.
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::GET, path);
        self.send(metadata, RequestBody::Empty).await
    }

    /// POST a JSON body. Not retried unless sent through [`Client::call`]
    /// with an idempotency marker.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::POST, path);
        self.call(metadata, Some(body)).await
    }

    /// PUT a JSON body.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::PUT, path);
        self.call(metadata, Some(body)).await
    }

    /// PATCH a JSON body.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::PATCH, path);
        self.call(metadata, Some(body)).await
    }

    /// DELETE `path`; use `()` as `Res` for empty replies.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::DELETE, path);
        self.send(metadata, RequestBody::Empty).await
    }

    /// Uploads files as `multipart/form-data` with a POST request.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use steadfast::{Client, UploadPart};
    ///
    /// # async fn example(image: Vec<u8>) -> Result<(), steadfast::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://marketplace.example.com")?
    ///     .build()?;
    ///
    /// let parts = vec![
    ///     UploadPart::file("image", "cover.png", "image/png", image),
    ///     UploadPart::text("alt", "Event cover"),
    /// ];
    /// let stored: steadfast::Response<serde_json::Value> =
    ///     client.upload("/api/events/12/cover", parts).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload<Res>(
        &self,
        path: impl Into<String>,
        parts: Vec<UploadPart>,
    ) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let metadata = RequestMetadata::new(Method::POST, path);
        self.send(metadata, RequestBody::Multipart(parts)).await
    }

    /// Subscribe to every notification.
    pub fn subscribe(&self) -> EventSubscription {
        self.inner.notifier.subscribe()
    }

    /// Subscribe to one notification stream by name.
    pub fn subscribe_to(&self, kind: EventKind) -> EventSubscription {
        self.inner.notifier.subscribe_to(kind)
    }

    /// Number of coalescable requests currently in flight.
    pub fn in_flight_requests(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Routes a call through the in-flight registry when it qualifies.
    async fn dispatch(&self, metadata: RequestMetadata, body: RequestBody) -> Result<(Outcome, bool)> {
        if !self.inner.dedup.applies_to(&metadata.method, &metadata.path) {
            return self.execute(metadata, body).await.map(|o| (o, false));
        }

        let key = metadata.key();
        let client = self.clone();
        let settled = self
            .inner
            .in_flight
            .coalesce(key, move || async move { client.execute(metadata, body).await })
            .await;

        if settled.joined {
            tracing::debug!("Joined an identical in-flight request");
        }
        settled.value.map(|o| (o, settled.joined))
    }

    /// Runs one logical call to completion: attempts, refresh, retries.
    async fn execute(&self, metadata: RequestMetadata, body: RequestBody) -> Result<Outcome> {
        let start_time = Instant::now();
        let policy = &self.inner.retry_policy;
        let retry_eligible = metadata.is_retry_eligible();
        let mut state = policy.start();
        let mut attempts = 0;
        let mut replayed = false;

        loop {
            attempts += 1;

            // Read per attempt so a retry never reuses a replaced credential.
            let credential = self.credential_for(&metadata);
            let request = build_request(&metadata, &body, credential.as_ref())?;

            tracing::debug!(
                method = %metadata.method,
                path = %metadata.path,
                attempt = attempts,
                "Executing HTTP request"
            );

            let error = match self.inner.transport.send(request).await {
                Ok(response) if response.status.is_success() => {
                    let latency = start_time.elapsed();
                    tracing::info!(
                        status = response.status.as_u16(),
                        latency_ms = latency.as_millis(),
                        attempts = attempts,
                        "Received HTTP response"
                    );
                    return Ok(Outcome {
                        response,
                        attempts,
                        latency,
                    });
                }
                Ok(response) => self.http_error(response),
                Err(e) => e,
            };

            let Some(classified) = self.inner.classifier.classify(&error, &metadata.path) else {
                return Err(error);
            };

            tracing::warn!(
                error = %error,
                kind = %classified.kind,
                attempt = attempts,
                method = %metadata.method,
                path = %metadata.path,
                "Request failed"
            );

            match classified.kind {
                ErrorKind::AuthenticationExpired => {
                    if let Some(auth) = self.refreshable(&metadata, replayed) {
                        let failed_token = credential.as_ref().map(|c| c.access_token.as_str());
                        auth.recover(failed_token).await?;
                        replayed = true;
                        tracing::info!(path = %metadata.path, "Replaying request with refreshed credential");
                        continue;
                    }
                    return Err(rejected(classified, attempts, error));
                }
                ErrorKind::ConnectionUnavailable | ErrorKind::GatewayMisconfiguration => {
                    self.inner
                        .notifier
                        .emit(ClientEvent::ConnectionError(ConnectionErrorEvent {
                            kind: classified.kind,
                            message: classified.message.clone(),
                            timestamp: SystemTime::now(),
                            path: metadata.path.clone(),
                        }));
                    return Err(rejected(classified, attempts, error));
                }
                _ => {}
            }

            if !retry_eligible {
                return Err(rejected(classified, attempts, error));
            }

            let decision = policy
                .should_retry(&classified, &state)
                .honoring(self.rate_limit_hint(&error));

            if decision.retry {
                tracing::info!(
                    delay_ms = decision.delay.as_millis(),
                    attempt = state.attempt(),
                    max_attempts = state.max_attempts(),
                    "Retrying request after delay"
                );
                self.inner
                    .notifier
                    .emit(ClientEvent::RetryAttempted(RetryAttemptedEvent {
                        attempt: state.attempt(),
                        max_attempts: state.max_attempts(),
                        delay: decision.delay,
                        path: metadata.path.clone(),
                        status: classified.status.map(|s| s.as_u16()),
                        method: metadata.method.to_string(),
                    }));
                tokio::time::sleep(decision.delay).await;
                state = state.next();
                continue;
            }

            if classified.retryable {
                return Err(Error::MaxRetriesExceeded {
                    attempts,
                    classified,
                    last_error: Box::new(error),
                });
            }
            return Err(rejected(classified, attempts, error));
        }
    }

    fn credential_for(&self, metadata: &RequestMetadata) -> Option<Credential> {
        if !metadata.requires_auth {
            return None;
        }
        self.inner.auth.as_ref()?.store().credential()
    }

    fn refreshable(&self, metadata: &RequestMetadata, replayed: bool) -> Option<&RefreshCoordinator> {
        let auth = self.inner.auth.as_ref()?;
        let eligible =
            metadata.requires_auth && !replayed && !auth.policy().is_exempt(&metadata.path);
        eligible.then_some(auth)
    }

    fn http_error(&self, response: RawResponse) -> Error {
        let status = response.status;
        let rate_limit_info = if self.inner.rate_limit_config.enabled {
            RateLimitInfo::from_headers(&response.headers)
        } else {
            None
        };

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                response = %response.body,
                "Client error (4xx)"
            );
        } else if status.is_server_error() {
            tracing::warn!(
                status = status.as_u16(),
                response = %response.body,
                "Server error (5xx)"
            );
        }

        Error::HttpError {
            status,
            raw_response: response.body,
            headers: response.headers,
            rate_limit_info,
        }
    }

    fn rate_limit_hint(&self, error: &Error) -> Option<Duration> {
        let config = &self.inner.rate_limit_config;
        if !config.enabled {
            return None;
        }
        error.rate_limit_delay(config.max_wait)
    }
}

fn rejected(classified: ClassifiedError, attempts: usize, error: Error) -> Error {
    Error::Rejected {
        classified,
        attempts,
        source: Box::new(error),
    }
}

fn build_request(
    metadata: &RequestMetadata,
    body: &RequestBody,
    credential: Option<&Credential>,
) -> Result<TransportRequest> {
    let mut headers = metadata.headers.clone();
    if let Some(credential) = credential {
        let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|_| {
            Error::ConfigurationError("Access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    Ok(TransportRequest {
        method: metadata.method.clone(),
        path: metadata.path.clone(),
        query: metadata.query_params.clone(),
        headers,
        body: body.clone(),
    })
}

fn parse_response<Res>(outcome: Outcome, coalesced: bool) -> Result<Response<Res>>
where
    Res: DeserializeOwned,
{
    let Outcome {
        response,
        attempts,
        latency,
    } = outcome;

    // An empty body (204 and friends) decodes as JSON null.
    let text = if response.body.trim().is_empty() {
        "null"
    } else {
        response.body.as_str()
    };

    match serde_json::from_str::<Res>(text) {
        Ok(data) => Ok(Response {
            data,
            raw_body: response.body,
            status: response.status,
            headers: response.headers,
            latency,
            attempts,
            coalesced,
        }),
        Err(e) => {
            tracing::error!(
                error = %e,
                raw_response = %response.body,
                "Failed to deserialize response"
            );

            Err(Error::DeserializationFailed {
                raw_response: response.body,
                serde_error: e.to_string(),
                status: response.status,
            })
        }
    }
}

/// Fluent configuration for a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use steadfast::{ClientBuilder, RetryPolicy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), steadfast::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://marketplace.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry_policy(RetryPolicy::default().base_delay(Duration::from_millis(500)))
///     .api_prefix("/api")
///     .dedup_prefixes(["/api/admin/stats", "/api/analytics"])
///     .default_header("X-Client", "web/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retry_policy: RetryPolicy,
    rate_limit_config: RateLimitConfig,
    classifier: Classifier,
    dedup: DedupPolicy,
    auth_policy: AuthPolicy,
    token_store: Option<Arc<dyn TokenStore>>,
    navigator: Option<Arc<dyn Navigator>>,
    transport: Option<Arc<dyn Transport>>,
    event_buffer: usize,
}

impl ClientBuilder {
    /// Defaults: 3 attempts, rate-limit hints honored, `/api` prefix, the
    /// standard report prefixes coalesced, no session.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            retry_policy: RetryPolicy::default(),
            rate_limit_config: RateLimitConfig::default(),
            classifier: Classifier::default(),
            dedup: DedupPolicy::new(crate::config::default_dedup_prefixes()),
            auth_policy: AuthPolicy::default(),
            token_store: None,
            navigator: None,
            transport: None,
            event_buffer: 64,
        }
    }

    /// Creates a builder from deserialized settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured base URL is invalid.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = Self::new()
            .retry_policy(RetryPolicy::from(&config.retry))
            .rate_limit_config(config.rate_limit.clone())
            .api_prefix(config.api_prefix.clone())
            .dedup_prefixes(config.dedup_prefixes.iter().cloned())
            .auth_policy(AuthPolicy::new(
                config.auth_exempt_paths.iter().cloned(),
                config.login_path.clone(),
            ))
            .event_buffer(config.event_buffer);

        if let Some(url) = &config.base_url {
            builder = builder.base_url(url)?;
        }
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder)
    }

    /// Origin (and optional base path) that request paths are joined onto.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Header sent with every attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn rate_limit_config(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit_config = config;
        self
    }

    /// Prefix of API paths; a 503 under it is a gateway misconfiguration.
    pub fn api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.classifier = Classifier::new(prefix);
        self
    }

    /// Path prefixes whose GET requests are coalesced while in flight.
    pub fn dedup_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dedup = DedupPolicy::new(prefixes);
        self
    }

    pub fn dedup_policy(mut self, policy: DedupPolicy) -> Self {
        self.dedup = policy;
        self
    }

    pub fn auth_policy(mut self, policy: AuthPolicy) -> Self {
        self.auth_policy = policy;
        self
    }

    /// Source of credentials; without one, requests go out unauthenticated
    /// and a 401 is final.
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    /// Routing hooks used when a failed refresh ends the session.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Replaces the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Capacity of the notification channel.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Finishes configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no transport and no base URL were provided, or if
    /// the HTTP client cannot be built.
    pub fn build(self) -> Result<Client> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                let base_url = self
                    .base_url
                    .ok_or_else(|| Error::ConfigurationError("Base URL is required".to_string()))?;
                Arc::new(ReqwestTransport::new(
                    base_url,
                    self.default_headers,
                    self.timeout,
                )?)
            }
        };

        let auth = self
            .token_store
            .map(|store| RefreshCoordinator::new(store, self.navigator, self.auth_policy));

        Ok(Client {
            inner: Arc::new(ClientInner {
                transport,
                retry_policy: self.retry_policy,
                rate_limit_config: self.rate_limit_config,
                classifier: self.classifier,
                dedup: self.dedup,
                in_flight: InFlightRegistry::new(),
                auth,
                notifier: Notifier::new(self.event_buffer),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
