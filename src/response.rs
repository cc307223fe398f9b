//! Successful call results.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A successful response: the decoded data plus what it took to get it.
///
/// # Examples
///
/// ```no_run
/// use steadfast::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Stats {
///     bookings: u64,
/// }
///
/// # async fn example() -> Result<(), steadfast::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let stats = client.get::<Stats>("/api/admin/stats").await?;
/// println!("{} bookings in {:?}", stats.bookings, stats.latency);
/// if stats.coalesced {
///     println!("shared with a concurrent caller");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub data: T,

    /// Body text as received; kept for logging and diagnostics.
    pub raw_body: String,

    pub status: StatusCode,

    pub headers: HeaderMap,

    /// Time from the first attempt until the final response, retries and
    /// refresh included. Joined callers see the latency of the shared call.
    pub latency: Duration,

    /// Transport attempts made, counting a post-refresh replay.
    pub attempts: usize,

    /// `true` if this caller joined a request another caller had issued.
    pub coalesced: bool,
}

impl<T> Response<T> {
    /// Converts the payload, keeping status, headers and call statistics.
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
            coalesced: self.coalesced,
        }
    }

    /// Drops everything but the payload.
    pub fn into_data(self) -> T {
        self.data
    }

    /// `true` when transient failures were retried before this succeeded.
    ///
    /// A post-refresh replay also counts as an extra attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Header lookup; `None` when absent or not valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}
