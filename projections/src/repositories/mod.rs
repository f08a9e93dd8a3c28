//! Projection repositories.
//!
//! Thin mappers from domain operations to [`AggregateStore`] calls. Every write
//! logs one line naming the affected entity (`info` on success, `error` on
//! failure) and returns the [`StoreError`](readmodels_core::StoreError) so the
//! calling handler can report it as a drop reason.
//!
//! Writes that pair a detail row with an aggregate counter always issue the
//! detail operation first and the counter operation second, as two separate
//! store calls.

mod comment;
mod post_metadata;
mod reaction;
mod user_profile;

pub use comment::CommentRepository;
pub use post_metadata::PostMetadataRepository;
pub use reaction::ReactionRepository;
pub use user_profile::{ProfileChanges, UserProfileRepository};

use crate::pagination::PageCache;
use readmodels_core::AggregateStore;
use std::sync::Arc;

/// Every repository, sharing one store and one page cache.
#[derive(Clone)]
pub struct Repositories {
    /// User profiles
    pub users: UserProfileRepository,
    /// Post metadata
    pub posts: PostMetadataRepository,
    /// Comments
    pub comments: CommentRepository,
    /// Likes, superlikes and reviews
    pub reactions: ReactionRepository,
}

impl Repositories {
    /// Build all repositories over shared clients.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, cache: PageCache) -> Self {
        Self {
            users: UserProfileRepository::new(Arc::clone(&store)),
            posts: PostMetadataRepository::new(Arc::clone(&store)),
            comments: CommentRepository::new(Arc::clone(&store), cache.clone()),
            reactions: ReactionRepository::new(store, cache),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
