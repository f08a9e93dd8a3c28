//! Key-value cache contract with TTL.
//!
//! The read side only needs string keys, string values and per-entry expiry.
//! Typed page caching lives on top of this in the projections crate.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Errors from cache backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend unreachable or command failed.
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Cached value could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(String),
}

/// Boxed future returned by [`CacheStore`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// A shared, concurrent-safe key-value cache with per-entry TTL.
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry; expired or absent entries yield `None`.
    fn get(&self, key: &str) -> CacheFuture<'_, Option<String>>;

    /// Store `value` under `key` for `ttl`, replacing any existing entry.
    fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheFuture<'_, ()>;
}
