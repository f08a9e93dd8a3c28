//! `Redis` cache store.
//!
//! Page entries are plain strings written with `SETEX`, so expiry is enforced
//! by the server. The [`ConnectionManager`] reconnects transparently and is
//! cheap to clone per command.

use readmodels_core::cache::{CacheError, CacheFuture, CacheStore};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// `Redis`-backed [`CacheStore`].
#[derive(Clone)]
pub struct RedisCacheStore {
    conn_manager: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to `redis_url` (e.g. `redis://127.0.0.1:6379`).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Backend`] if the URL is malformed or the server is unreachable.
    pub async fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = Client::open(redis_url)
            .map_err(|e| CacheError::Backend(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Backend(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisCacheStore initialized successfully");

        Ok(Self { conn_manager })
    }
}

// SETEX rejects a zero expiry.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl CacheStore for RedisCacheStore {
    fn get(&self, key: &str) -> CacheFuture<'_, Option<String>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(&key)
                .await
                .map_err(|e| CacheError::Backend(format!("Failed to get {key}: {e}")))
        })
    }

    fn set_ex(&self, key: &str, value: String, ttl: Duration) -> CacheFuture<'_, ()> {
        let key = key.to_string();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set_ex(&key, value, ttl_seconds(ttl))
                .await
                .map_err(|e| CacheError::Backend(format!("Failed to set {key}: {e}")))?;
            Ok(())
        })
    }
}
