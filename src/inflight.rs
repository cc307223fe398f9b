//! Coalescing of identical in-flight work.
//!
//! The registry maps a key to the shared future of the one call currently
//! running for it. Late callers join that future instead of starting their
//! own. An entry lives exactly as long as its call: it is removed the moment
//! the call settles, before any caller sees the result, so a caller arriving
//! afterwards always starts fresh. This is coalescing, not caching.

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type SharedCall<V> = Shared<BoxFuture<'static, V>>;

/// Result of [`InFlightRegistry::coalesce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<V> {
    pub value: V,
    /// `true` if this caller joined a call another caller had started.
    pub joined: bool,
}

/// Registry of pending calls keyed by `K`, each producing a `V`.
///
/// `V` must be `Clone`: every caller attached to a call receives its own copy
/// of the same outcome, errors included.
///
/// Cloning the registry yields a handle to the same set of entries.
pub struct InFlightRegistry<K, V> {
    state: Arc<Mutex<RegistryState<K, V>>>,
}

struct RegistryState<K, V> {
    entries: HashMap<K, Entry<V>>,
    next_generation: u64,
}

struct Entry<V> {
    generation: u64,
    call: WeakShared<BoxFuture<'static, V>>,
    subscribers: Arc<AtomicUsize>,
}

impl<K, V> Clone for InFlightRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> Default for InFlightRegistry<K, V> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                entries: HashMap::new(),
                next_generation: 0,
            })),
        }
    }
}

impl<K, V> InFlightRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `executor` for `key`, or joins the call already running for it.
    ///
    /// `executor` is only invoked when no call for `key` is pending; it
    /// should just build the future, the work happens when it is awaited.
    /// It runs without the registry lock held, so it may inspect the registry.
    /// The call keeps running as long as at least one caller is still
    /// awaiting it; if every caller gives up, the entry is dropped too.
    ///
    /// # Examples
    ///
    /// ```
    /// use steadfast::inflight::InFlightRegistry;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let registry: InFlightRegistry<&'static str, u32> = InFlightRegistry::new();
    ///
    /// let (a, b) = tokio::join!(
    ///     registry.coalesce("stats", || async {
    ///         tokio::task::yield_now().await;
    ///         42
    ///     }),
    ///     registry.coalesce("stats", || async { 0 }),
    /// );
    ///
    /// assert_eq!((a.value, b.value), (42, 42));
    /// assert!(!a.joined && b.joined);
    /// assert!(registry.is_empty());
    /// # }
    /// ```
    pub async fn coalesce<F, Fut>(&self, key: K, executor: F) -> Settled<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (call, subscribers, joined) = self.attach(key, executor);
        let _subscription = Subscription(subscribers);
        let value = call.await;
        Settled { value, joined }
    }

    /// Number of calls currently in flight.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of callers currently awaiting the call for `key`.
    pub fn subscriber_count(&self, key: &K) -> usize {
        self.lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers.load(Ordering::SeqCst))
    }

    fn attach<F, Fut>(&self, key: K, executor: F) -> (SharedCall<V>, Arc<AtomicUsize>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        if let Some(joined) = join_pending(&self.lock(), &key) {
            return joined;
        }

        let work = executor();

        let mut state = self.lock();
        // Another caller may have registered the key while `executor` ran;
        // `work` is then dropped unpolled.
        if let Some(joined) = join_pending(&state, &key) {
            return joined;
        }

        let generation = state.next_generation;
        state.next_generation = state.next_generation.wrapping_add(1);

        let release = Release {
            registry: Arc::downgrade(&self.state),
            key: key.clone(),
            generation,
        };
        let call = async move {
            let value = work.await;
            drop(release);
            value
        }
        .boxed()
        .shared();

        let subscribers = Arc::new(AtomicUsize::new(1));
        if let Some(weak) = call.downgrade() {
            state.entries.insert(
                key,
                Entry {
                    generation,
                    call: weak,
                    subscribers: Arc::clone(&subscribers),
                },
            );
        }

        (call, subscribers, false)
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn join_pending<K, V>(
    state: &RegistryState<K, V>,
    key: &K,
) -> Option<(SharedCall<V>, Arc<AtomicUsize>, bool)>
where
    K: Eq + Hash,
    V: Clone,
{
    let entry = state.entries.get(key)?;
    let call = entry.call.upgrade()?;
    entry.subscribers.fetch_add(1, Ordering::SeqCst);
    Some((call, Arc::clone(&entry.subscribers), true))
}

/// Removes its entry when the call settles or is abandoned.
struct Release<K: Eq + Hash, V> {
    registry: Weak<Mutex<RegistryState<K, V>>>,
    key: K,
    generation: u64,
}

impl<K: Eq + Hash, V> Drop for Release<K, V> {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut state = registry.lock().unwrap_or_else(PoisonError::into_inner);
        if state
            .entries
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            state.entries.remove(&self.key);
        }
    }
}

struct Subscription(Arc<AtomicUsize>);

impl Drop for Subscription {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let registry: InFlightRegistry<String, Result<u32, String>> = InFlightRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let run = |registry: InFlightRegistry<String, Result<u32, String>>| {
            let calls = Arc::clone(&calls);
            async move {
                registry
                    .coalesce("k".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(7)
                    })
                    .await
            }
        };

        let results = futures::future::join_all((0..5).map(|_| run(registry.clone()))).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.value == Ok(7)));
        assert_eq!(results.iter().filter(|r| !r.joined).count(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_entry_removed() {
        let registry: InFlightRegistry<&'static str, Result<u32, String>> =
            InFlightRegistry::new();

        let (a, b) = tokio::join!(
            registry.coalesce("k", || async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Err("boom".to_string())
            }),
            registry.coalesce("k", || async { Ok(1) }),
        );

        assert_eq!(a.value, Err("boom".to_string()));
        assert_eq!(b.value, Err("boom".to_string()));
        assert!(registry.is_empty());

        // A caller arriving after settlement starts over.
        let fresh = registry.coalesce("k", || async { Ok(2) }).await;
        assert_eq!(fresh.value, Ok(2));
        assert!(!fresh.joined);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let registry: InFlightRegistry<u8, u8> = InFlightRegistry::new();
        let (a, b) = tokio::join!(
            registry.coalesce(1, || async { 1 }),
            registry.coalesce(2, || async { 2 }),
        );
        assert_eq!((a.value, b.value), (1, 2));
        assert!(!a.joined && !b.joined);
    }

    #[tokio::test]
    async fn test_subscriber_count_and_abandonment() {
        let registry: InFlightRegistry<u8, u8> = InFlightRegistry::new();

        let mut first = Box::pin(registry.coalesce(1, std::future::pending::<u8>));
        let mut second = Box::pin(registry.coalesce(1, || async { 0 }));

        // Poll each once so both attach.
        assert!(futures::poll!(first.as_mut()).is_pending());
        assert!(futures::poll!(second.as_mut()).is_pending());
        assert_eq!(registry.subscriber_count(&1), 2);

        drop(first);
        assert_eq!(registry.subscriber_count(&1), 1);
        assert_eq!(registry.len(), 1);

        drop(second);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_executor_may_inspect_the_registry() {
        let registry: InFlightRegistry<u8, usize> = InFlightRegistry::new();
        let inner = registry.clone();

        let settled = registry
            .coalesce(1, move || {
                let pending = inner.len();
                async move { pending }
            })
            .await;

        assert_eq!(settled.value, 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_yielding_call_is_joined() {
        let registry: InFlightRegistry<&'static str, u32> = InFlightRegistry::new();
        let (a, b) = tokio::join!(
            registry.coalesce("stats", || async {
                tokio::task::yield_now().await;
                42
            }),
            registry.coalesce("stats", || async { 0 }),
        );
        assert_eq!((a.value, b.value), (42, 42));
        assert!(!a.joined && b.joined);
    }
}
