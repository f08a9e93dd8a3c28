//! In-memory [`CacheStore`] with TTL on the Tokio clock.

use readmodels_core::cache::{CacheError, CacheFuture, CacheStore};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, (String, Instant)>,
    failures: VecDeque<String>,
}

/// Cache fake honouring TTLs.
///
/// Expiry uses [`tokio::time::Instant`], so `#[tokio::test(start_paused = true)]`
/// together with `tokio::time::advance` can expire entries without sleeping.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCacheStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryCacheStore {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `get` or `set_ex` fail with a backend error.
    pub fn fail_next(&self, reason: &str) {
        self.lock().failures.push_back(reason.to_string());
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .entries
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }

    /// Whether no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn injected(inner: &mut Inner) -> Result<(), CacheError> {
        inner.failures.pop_front().map_or(Ok(()), |reason| Err(CacheError::Backend(reason)))
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get(&self, key: &str) -> CacheFuture<'_, Option<String>> {
        let result = {
            let mut inner = self.lock();
            Self::injected(&mut inner).map(|()| {
                let now = Instant::now();
                match inner.entries.get(key) {
                    Some((value, expires)) if *expires > now => Some(value.clone()),
                    Some(_) => {
                        inner.entries.remove(key);
                        None
                    }
                    None => None,
                }
            })
        };
        Box::pin(std::future::ready(result))
    }

    fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheFuture<'_, ()> {
        let result = {
            let mut inner = self.lock();
            Self::injected(&mut inner).map(|()| {
                inner
                    .entries
                    .insert(key.to_string(), (value, Instant::now() + ttl));
            })
        };
        Box::pin(std::future::ready(result))
    }
}
