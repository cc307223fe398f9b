//! Test doubles shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use steadfast::auth::{Credential, Navigator, PublicRoutes, RefreshError, TokenStore};
use tracing_subscriber::EnvFilter;

/// Routes client logs to the test harness; set `RUST_LOG=steadfast=debug`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory token store whose refresh either rotates to `new-token` or fails.
pub struct MemoryStore {
    current: RwLock<Option<Credential>>,
    pub refreshes: AtomicUsize,
    pub logouts: AtomicUsize,
    refresh_succeeds: bool,
    refresh_delay: Duration,
}

impl MemoryStore {
    pub fn new(refresh_succeeds: bool) -> Arc<Self> {
        Self::with_delay(refresh_succeeds, Duration::from_millis(20))
    }

    pub fn with_delay(refresh_succeeds: bool, refresh_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            current: RwLock::new(Some(Credential::new("old-token", "refresh-1"))),
            refreshes: AtomicUsize::new(0),
            logouts: AtomicUsize::new(0),
            refresh_succeeds,
            refresh_delay,
        })
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    fn credential(&self) -> Option<Credential> {
        self.current.read().unwrap().clone()
    }

    async fn refresh(&self) -> Result<Credential, RefreshError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.refresh_delay).await;
        if !self.refresh_succeeds {
            return Err(RefreshError::Rejected("refresh token revoked".into()));
        }
        let next = Credential::new("new-token", "refresh-2");
        *self.current.write().unwrap() = Some(next.clone());
        Ok(next)
    }

    async fn logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        *self.current.write().unwrap() = None;
    }
}

/// Router stand-in pinned to one location.
pub struct StaticNavigator {
    location: String,
    public: PublicRoutes,
    pub redirects: Mutex<Vec<String>>,
}

impl StaticNavigator {
    pub fn at(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: location.to_string(),
            public: PublicRoutes::new(["/", "/events*", "/search*", "/about"]),
            redirects: Mutex::new(Vec::new()),
        })
    }

    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().unwrap().clone()
    }
}

impl Navigator for StaticNavigator {
    fn current_path(&self) -> String {
        self.location.clone()
    }

    fn is_public_route(&self, path: &str) -> bool {
        self.public.matches(path)
    }

    fn redirect(&self, to: &str) {
        self.redirects.lock().unwrap().push(to.to_string());
    }
}
