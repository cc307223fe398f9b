//! Request identity for in-flight coalescing.

use http::Method;
use std::fmt;

/// Stable identity of a request: method, path and the parameter *set*.
///
/// Parameters are sorted before the key is built, so two requests that only
/// differ in parameter order share a key. Every component is length-prefixed,
/// which keeps values containing separators from colliding with other keys.
///
/// # Examples
///
/// ```
/// use steadfast::RequestKey;
/// use http::Method;
///
/// let a = RequestKey::new(&Method::GET, "/api/admin/stats", [("range", "7d"), ("tz", "UTC")]);
/// let b = RequestKey::new(&Method::GET, "/api/admin/stats", [("tz", "UTC"), ("range", "7d")]);
/// assert_eq!(a, b);
///
/// let c = RequestKey::new(&Method::GET, "/api/admin/stats", [("range", "30d"), ("tz", "UTC")]);
/// assert_ne!(a, c);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new<I, K, V>(method: &Method, path: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut pairs: Vec<(String, String)> = params
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        pairs.sort();

        let mut key = String::with_capacity(path.len() + 16 * (pairs.len() + 1));
        push_component(&mut key, method.as_str());
        push_component(&mut key, path);
        for (name, value) in &pairs {
            push_component(&mut key, name);
            push_component(&mut key, value);
        }
        Self(key)
    }

    /// A key with no request behind it, for single-flight operations such as
    /// a token refresh.
    pub fn named(name: &str) -> Self {
        let mut key = String::new();
        push_component(&mut key, name);
        Self(key)
    }

    /// Marks the key as belonging to a request sent without a credential, so
    /// it never shares a call with an authenticated one.
    pub fn unauthenticated(mut self) -> Self {
        // A length prefix never starts with '!', so this cannot collide.
        self.0.push('!');
        self
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn push_component(key: &mut String, component: &str) {
    key.push_str(&component.len().to_string());
    key.push(':');
    key.push_str(component);
}

/// Which requests may be coalesced.
///
/// Only side-effect-free requests (GET/HEAD) whose path falls under one of the
/// configured prefixes qualify: administrative summaries, analytics, stat
/// counters and the like.
#[derive(Debug, Clone, Default)]
pub struct DedupPolicy {
    prefixes: Vec<String>,
}

impl DedupPolicy {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// A policy that never coalesces.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn applies_to(&self, method: &Method, path: &str) -> bool {
        if *method != Method::GET && *method != Method::HEAD {
            return false;
        }
        self.prefixes.iter().any(|prefix| {
            let prefix = prefix.trim_end_matches('/');
            path.strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}
