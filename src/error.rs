//! Error types for calls made through the client.
//!
//! Errors come in two layers. Attempt-level errors ([`Error::Transport`],
//! [`Error::HttpError`]) describe what happened to a single transport attempt.
//! Terminal errors ([`Error::Rejected`], [`Error::MaxRetriesExceeded`],
//! [`Error::SessionExpired`]) are what a caller receives once the client has
//! finished classifying, retrying, or refreshing, and they carry the
//! [`ClassifiedError`] that drove the decision.
//!
//! `Error` is `Clone` so that every caller coalesced onto one in-flight request
//! observes the same outcome.

use crate::classify::ClassifiedError;
use crate::rate_limit::RateLimitInfo;
use http::{HeaderMap, StatusCode};

/// Why a transport attempt produced no HTTP response at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The connection was refused or the host could not be reached.
    ConnectionRefused,
    /// Any other network-level failure (DNS, TLS, reset mid-body, ...).
    Network,
}

/// The main error type for calls made through the client.
///
/// # Examples
///
/// ```no_run
/// use steadfast::{Client, Error, ErrorKind};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get::<serde_json::Value>("/api/orders").await {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::MaxRetriesExceeded { attempts, last_error, .. }) => {
///         eprintln!("gave up after {attempts} attempts: {last_error}");
///     }
///     Err(e) if e.kind() == Some(ErrorKind::ConnectionUnavailable) => {
///         eprintln!("service unavailable: {e}");
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    /// The transport failed before any HTTP response was received.
    #[error("Transport error ({failure:?}): {message}")]
    Transport {
        /// What kind of transport failure occurred
        failure: TransportFailure,
        /// Description from the underlying HTTP client
        message: String,
    },

    /// The server returned a non-2xx HTTP status code.
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
        /// Rate limit information parsed from headers
        rate_limit_info: Option<RateLimitInfo>,
    },

    /// Failed to deserialize the response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The call failed with a classification that is not recovered locally.
    ///
    /// Connection, gateway and client errors land here on their first
    /// attempt, as does a 401 that cannot be (or already was) replayed.
    #[error("{classified} (after {attempts} attempt(s))")]
    Rejected {
        /// Classification of the final failed attempt
        classified: ClassifiedError,
        /// Number of transport attempts made
        attempts: usize,
        /// The attempt-level error
        source: Box<Error>,
    },

    /// The retry budget was exhausted on a retryable failure.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// The number of attempts made
        attempts: usize,
        /// Classification of the last failed attempt
        classified: ClassifiedError,
        /// The last error encountered
        last_error: Box<Error>,
    },

    /// The credential could not be refreshed and the session was logged out.
    #[error("Session expired: {message}")]
    SessionExpired {
        /// Why the refresh failed
        message: String,
        /// Login path the user was redirected to, if a redirect happened
        redirected_to: Option<String>,
    },
}

impl Error {
    /// Returns `true` if the underlying attempt failure is one the retry
    /// engine may recover from (429 and 5xx other than gateway faults).
    ///
    /// Terminal errors report the retryability of the failure they wrap.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Rejected { classified, .. } | Error::MaxRetriesExceeded { classified, .. } => {
                classified.retryable
            }
            Error::HttpError { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Rejected { source, .. } => source.status(),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            Error::Rejected { source, .. } => source.raw_response(),
            Error::MaxRetriesExceeded { last_error, .. } => last_error.raw_response(),
            _ => None,
        }
    }

    /// Returns the classification carried by a terminal error.
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Error::Rejected { classified, .. } | Error::MaxRetriesExceeded { classified, .. } => {
                Some(classified)
            }
            _ => None,
        }
    }

    /// Shorthand for `self.classified().map(|c| c.kind)`.
    pub fn kind(&self) -> Option<crate::ErrorKind> {
        self.classified().map(|c| c.kind)
    }

    /// Returns rate limit information if available.
    pub fn rate_limit_info(&self) -> Option<&RateLimitInfo> {
        match self {
            Error::HttpError {
                rate_limit_info, ..
            } => rate_limit_info.as_ref(),
            _ => None,
        }
    }

    /// Returns the recommended delay from rate limit information, capped by
    /// `max_wait`.
    pub fn rate_limit_delay(&self, max_wait: std::time::Duration) -> Option<std::time::Duration> {
        self.rate_limit_info()?.delay(max_wait)
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        let failure = if err.is_timeout() {
            TransportFailure::Timeout
        } else if err.is_connect() {
            TransportFailure::ConnectionRefused
        } else {
            TransportFailure::Network
        };
        Error::Transport {
            failure,
            message: err.to_string(),
        }
    }
}

/// A specialized `Result` type for calls made through the client.
pub type Result<T> = std::result::Result<T, Error>;
