//! Session handling: credentials, refresh and logout.
//!
//! The client never stores credentials itself. It reads the current pair from
//! a [`TokenStore`] on every attempt and, when a request comes back 401, asks
//! the [`RefreshCoordinator`] for a fresh one. The coordinator makes sure that
//! however many requests fail at once, the store's `refresh()` runs once.
//! If the refresh fails the session is logged out and, unless the user is on
//! a public page, the [`Navigator`] sends them to the login page.

use crate::inflight::InFlightRegistry;
use crate::key::RequestKey;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// The access/refresh pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Why a [`TokenStore::refresh`] failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    NoRefreshToken,

    #[error("refresh rejected: {0}")]
    Rejected(String),

    #[error("refresh request failed: {0}")]
    Unavailable(String),
}

/// Owner of the credential pair.
///
/// `credential()` must return a consistent snapshot: either the pair before a
/// refresh or the pair after it, never a mix. `refresh()` replaces the stored
/// pair before returning the new one.
#[async_trait]
pub trait TokenStore: Send + Sync {
    fn credential(&self) -> Option<Credential>;

    async fn refresh(&self) -> std::result::Result<Credential, RefreshError>;

    /// Clears the pair and any session state kept by the application.
    async fn logout(&self);
}

/// The routing layer, as seen from the client.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn is_public_route(&self, path: &str) -> bool;

    fn redirect(&self, to: &str);
}

/// Allow-list of routes reachable without a session.
///
/// Patterns are exact paths, or prefixes when they end in `*`
/// (`/events*` matches `/events` and `/events/123`). Query strings and
/// fragments are ignored when matching.
///
/// # Examples
///
/// ```
/// use steadfast::auth::PublicRoutes;
///
/// let routes = PublicRoutes::new(["/", "/events*", "/about"]);
/// assert!(routes.matches("/"));
/// assert!(routes.matches("/events/123?ref=home"));
/// assert!(!routes.matches("/checkout"));
/// assert!(!routes.matches("/about/team"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl PublicRoutes {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut routes = Self::default();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_suffix('*') {
                Some(prefix) => routes
                    .prefixes
                    .push(prefix.trim_end_matches('/').to_string()),
                None => routes.exact.push(normalize(pattern).to_string()),
            }
        }
        routes
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|prefix| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
    }
}

fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

/// Which requests take part in session refresh, and where logins happen.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    exempt_paths: Vec<String>,
    login_path: String,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self::new(crate::config::default_auth_exempt_paths(), "/login")
    }
}

impl AuthPolicy {
    pub fn new<I, S>(exempt_paths: I, login_path: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt_paths: exempt_paths.into_iter().map(Into::into).collect(),
            login_path: login_path.into(),
        }
    }

    /// `true` for the login, registration, refresh and session-probe calls.
    /// A 401 on these is final; refreshing would loop.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = normalize(path);
        self.exempt_paths
            .iter()
            .any(|exempt| path.ends_with(normalize(exempt)))
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    fn is_login_route(&self, path: &str) -> bool {
        let login = normalize(&self.login_path);
        let path = normalize(path);
        path == login || path.strip_prefix(login).is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Single-flight refresh shared by every call made through one client.
pub struct RefreshCoordinator {
    store: Arc<dyn TokenStore>,
    navigator: Option<Arc<dyn Navigator>>,
    policy: AuthPolicy,
    in_flight: InFlightRegistry<RequestKey, Result<Credential>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        navigator: Option<Arc<dyn Navigator>>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            navigator,
            policy,
            in_flight: InFlightRegistry::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// `true` while a refresh is running.
    pub fn is_refreshing(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Produces a credential to replay with after `failed_token` got a 401.
    ///
    /// Concurrent callers share one refresh. A caller whose token was
    /// already replaced by a refresh that finished in the meantime gets the
    /// new credential without another refresh.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionExpired`] when the refresh fails; by then the
    /// store has been logged out and any redirect has happened, once for all
    /// waiting callers.
    pub async fn recover(&self, failed_token: Option<&str>) -> Result<Credential> {
        let failed_token = failed_token.map(str::to_owned);
        let store = Arc::clone(&self.store);
        let navigator = self.navigator.clone();
        let policy = self.policy.clone();

        self.in_flight
            .coalesce(RequestKey::named("refresh"), move || async move {
                match (store.credential(), failed_token.as_deref()) {
                    (Some(current), failed) if failed != Some(current.access_token.as_str()) => {
                        return Ok(current);
                    }
                    // The session this request ran under already ended.
                    (None, Some(_)) => {
                        info!("Session already ended, skipping refresh");
                        return Err(Error::SessionExpired {
                            message: "session ended by an earlier failed refresh".to_string(),
                            redirected_to: None,
                        });
                    }
                    _ => {}
                }

                match store.refresh().await {
                    Ok(credential) => {
                        info!("Session credential refreshed");
                        Ok(credential)
                    }
                    Err(e) => {
                        warn!(error = %e, "Session refresh failed, logging out");
                        store.logout().await;
                        let redirected_to = redirect_to_login(navigator.as_deref(), &policy);
                        Err(Error::SessionExpired {
                            message: e.to_string(),
                            redirected_to,
                        })
                    }
                }
            })
            .await
            .value
    }
}

fn redirect_to_login(navigator: Option<&dyn Navigator>, policy: &AuthPolicy) -> Option<String> {
    let navigator = navigator?;
    let current = navigator.current_path();
    if navigator.is_public_route(&current) || policy.is_login_route(&current) {
        info!(path = %current, "Session ended on a public page, staying put");
        return None;
    }
    info!(from = %current, to = %policy.login_path, "Redirecting to login");
    navigator.redirect(&policy.login_path);
    Some(policy.login_path.clone())
}
