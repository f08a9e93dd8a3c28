//! Cache-aside pagination.
//!
//! List reads check the cache first and fall back to the store on a miss,
//! populating the cache with the fresh page. Entries are keyed by the full
//! request shape, so the same logical page requested with two different limits
//! is two entries:
//!
//! ```text
//! {kind}:{entity_id}:{cursor}:{limit}      e.g. likes:p1::12
//! ```
//!
//! The value is the page JSON (`{"items": [...], "nextCursor": ...}`) stored
//! with a fixed TTL. Writes never invalidate entries; a list may lag a
//! mutating event by up to one TTL.

use readmodels_core::store::Result;
use readmodels_core::{CacheStore, Cursor, Page};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// TTL used when none is configured.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Query kind tags, the first segment of every cache key.
pub mod kinds {
    /// Comments of a post
    pub const COMMENTS: &str = "comments";
    /// Likes of a post
    pub const LIKES: &str = "likes";
    /// Superlikes of a post
    pub const SUPERLIKES: &str = "superlikes";
}

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<T> {
    /// The exact page and continuation cursor that were stored.
    Hit(Page<T>),
    /// Nothing usable was cached; the store must be queried.
    Miss,
}

impl<T> CacheLookup<T> {
    /// Whether this lookup was served from the cache.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Page cache over a shared [`CacheStore`].
#[derive(Clone)]
pub struct PageCache {
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl PageCache {
    /// Cache pages with [`DEFAULT_TTL`].
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>) -> Self {
        Self {
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the entry TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Configured entry TTL.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for one request shape. The first page uses an empty cursor segment.
    #[must_use]
    pub fn key(kind: &str, entity_id: &str, cursor: Option<&Cursor>, limit: usize) -> String {
        let cursor = cursor.map(Cursor::encode).unwrap_or_default();
        format!("{kind}:{entity_id}:{cursor}:{limit}")
    }

    /// Look up a cached page.
    ///
    /// Backend and decode failures are logged and reported as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        entity_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> CacheLookup<T> {
        let key = Self::key(kind, entity_id, cursor, limit);

        let lookup = match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Page<T>>(&raw) {
                Ok(page) => CacheLookup::Hit(page),
                Err(e) => {
                    tracing::warn!(cache_key = %key, error = %e, "Discarding undecodable cached page");
                    CacheLookup::Miss
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(e) => {
                tracing::warn!(cache_key = %key, error = %e, "Cache read failed, falling back to store");
                CacheLookup::Miss
            }
        };

        if lookup.is_hit() {
            tracing::debug!(cache_key = %key, "Cache hit");
            metrics::counter!("readmodels_cache_hits_total", "kind" => kind).increment(1);
        } else {
            tracing::debug!(cache_key = %key, "Cache miss");
            metrics::counter!("readmodels_cache_misses_total", "kind" => kind).increment(1);
        }
        lookup
    }

    /// Store a page under the request shape it answers.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn set<T: Serialize>(
        &self,
        kind: &'static str,
        entity_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
        page: &Page<T>,
    ) {
        let key = Self::key(kind, entity_id, cursor, limit);
        let value = match serde_json::to_string(page) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(cache_key = %key, error = %e, "Failed to encode page for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(&key, value, self.ttl).await {
            tracing::error!(cache_key = %key, error = %e, "Failed to populate cache");
        }
    }

    /// Cache-aside read: serve from the cache, or run `load` and cache its page.
    ///
    /// # Errors
    ///
    /// Returns the error of `load`; nothing is cached in that case.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        kind: &'static str,
        entity_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
        load: F,
    ) -> Result<Page<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        if let CacheLookup::Hit(page) = self.get(kind, entity_id, cursor, limit).await {
            return Ok(page);
        }
        let page = load().await?;
        self.set(kind, entity_id, cursor, limit, &page).await;
        Ok(page)
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}
