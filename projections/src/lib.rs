//! Read-model projections.
//!
//! # Overview
//!
//! This crate turns domain events into denormalized read models and serves
//! paginated reads of them:
//!
//! ```text
//! payload ─► TypedHandler<E> ─► repository ─► AggregateStore (write)
//!
//! read ─► repository ─► PageCache (check) ─► AggregateStore (on miss) ─► PageCache (populate)
//! ```
//!
//! - [`events`]: typed event payloads
//! - [`handlers`]: one handler per event type and [`handlers::projection_router`]
//! - [`repositories`]: user profile, post metadata, comment and reaction repositories
//! - [`pagination`]: cache-aside page cache
//! - [`models`] / [`tables`]: records and their storage schema
//! - [`postgres`] / [`redis_cache`]: production store and cache backends
//!
//! # Wiring
//!
//! ```ignore
//! use readmodels_projections::{PageCache, Repositories, projection_router};
//!
//! let repositories = Repositories::new(store, PageCache::new(cache));
//! let router = Arc::new(projection_router(&repositories));
//! ```

pub mod events;
pub mod handlers;
pub mod models;
pub mod pagination;
pub mod postgres;
pub mod redis_cache;
pub mod repositories;
pub mod tables;
pub mod timestamp;

pub use handlers::projection_router;
pub use pagination::{CacheLookup, PageCache};
pub use postgres::PostgresAggregateStore;
pub use redis_cache::RedisCacheStore;
pub use repositories::{
    CommentRepository, PostMetadataRepository, ProfileChanges, ReactionRepository, Repositories,
    UserProfileRepository,
};
