//! # Steadfast - a resilient API client layer
//!
//! Steadfast is the single HTTP access layer an application's pages and forms
//! funnel through. It sits on top of `reqwest` and owns the parts of talking
//! to a backend that every call needs and no call should reimplement:
//!
//! - **Session refresh** - a 401 triggers one shared credential refresh, the
//!   call is replayed once, and a failed refresh logs out and (off public
//!   pages) redirects to the login page.
//! - **Retries** - rate-limited and server errors are retried with
//!   exponential backoff plus jitter, within a fixed attempt budget.
//! - **Coalescing** - concurrent identical read-only calls to reporting-style
//!   endpoints share one request.
//! - **Classification** - every failure gets a kind
//!   ([`ErrorKind`]) that decides what happens next.
//! - **Notifications** - retry attempts and connection problems are
//!   published for the UI to render.
//!
//! ## Quick Start
//!
//! ```no_run
//! use steadfast::{Client, RetryPolicy};
//! use serde::Deserialize;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Event {
//!     id: u64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), steadfast::Error> {
//!     let client = Client::builder()
//!         .base_url("https://marketplace.example.com")?
//!         .timeout(Duration::from_secs(15))
//!         .retry_policy(RetryPolicy::default())
//!         .build()?;
//!
//!     let event = client.get::<Event>("/api/events/42").await?;
//!     println!("{} (took {:?}, {} attempt(s))", event.title, event.latency, event.attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Sessions
//!
//! Plug in the application's credential owner as a [`TokenStore`] and its
//! router as a [`Navigator`]:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use steadfast::auth::{Credential, Navigator, PublicRoutes, RefreshError, TokenStore};
//! use steadfast::Client;
//! use std::sync::{Arc, RwLock};
//!
//! struct Session {
//!     current: RwLock<Option<Credential>>,
//! }
//!
//! #[async_trait]
//! impl TokenStore for Session {
//!     fn credential(&self) -> Option<Credential> {
//!         self.current.read().unwrap().clone()
//!     }
//!
//!     async fn refresh(&self) -> Result<Credential, RefreshError> {
//!         // call the refresh endpoint, store and return the new pair
//!         # Err(RefreshError::NoRefreshToken)
//!     }
//!
//!     async fn logout(&self) {
//!         *self.current.write().unwrap() = None;
//!     }
//! }
//!
//! struct Router {
//!     public: PublicRoutes,
//! }
//!
//! impl Navigator for Router {
//!     fn current_path(&self) -> String {
//!         "/checkout".to_string()
//!     }
//!
//!     fn is_public_route(&self, path: &str) -> bool {
//!         self.public.matches(path)
//!     }
//!
//!     fn redirect(&self, to: &str) {
//!         println!("navigate to {to}");
//!     }
//! }
//!
//! # fn main() -> Result<(), steadfast::Error> {
//! let client = Client::builder()
//!     .base_url("https://marketplace.example.com")?
//!     .token_store(Arc::new(Session { current: RwLock::new(None) }))
//!     .navigator(Arc::new(Router { public: PublicRoutes::new(["/", "/events*"]) }))
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Notifications
//!
//! ```no_run
//! use steadfast::{Client, ClientEvent, EventKind};
//!
//! # async fn example(client: Client) {
//! let mut retries = client.subscribe_to(EventKind::RetryAttempted);
//! while let Some(ClientEvent::RetryAttempted(event)) = retries.recv().await {
//!     println!("retrying {} ({}/{})", event.path, event.attempt, event.max_attempts);
//! }
//! # }
//! ```

pub mod auth;
pub mod classify;
mod client;
pub mod config;
mod error;
pub mod events;
pub mod inflight;
pub mod key;
pub mod metadata;
pub mod rate_limit;
mod response;
pub mod retry;
pub mod transport;

pub use auth::{Credential, Navigator, TokenStore};
pub use classify::{ClassifiedError, Classifier, ErrorKind};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, Result, TransportFailure};
pub use events::{ClientEvent, EventKind, EventSubscription};
pub use key::{DedupPolicy, RequestKey};
pub use response::Response;
pub use retry::{RetryDecision, RetryPolicy, RetryState};
pub use transport::{RequestBody, Transport, UploadPart};
