use crate::models::{PostLike, PostMetadata, PostSuperlike, Review, UserProfile, reaction_key};
use crate::pagination::{PageCache, kinds};
use crate::tables::{POST_LIKES, POST_METADATA, POST_SUPERLIKES, REACTIONS_BY_POST, REVIEWS_BY_POST, counters};
use readmodels_core::store::Result;
use readmodels_core::{AggregateStore, AggregateStoreExt, Cursor, Page, Table};
use std::sync::Arc;

/// Repository for likes, superlikes and reviews of posts.
#[derive(Clone)]
pub struct ReactionRepository {
    store: Arc<dyn AggregateStore>,
    cache: PageCache,
}

impl ReactionRepository {
    /// Create a repository over `store`, caching list pages in `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, cache: PageCache) -> Self {
        Self { store, cache }
    }

    /// Record a like, snapshotting the liker's display name, then bump the
    /// post's `likes` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed. A missing liker
    /// profile fails before anything is written.
    pub async fn like_post(&self, username: &str, post_id: &str) -> Result<()> {
        let result = async {
            let name = self.display_name(username).await?;
            let like = PostLike {
                post_id: post_id.to_string(),
                username: username.to_string(),
                name,
            };
            self.store
                .insert_and_increment_counter(
                    &like,
                    POST_METADATA,
                    &PostMetadata::key_for(post_id),
                    counters::LIKES,
                )
                .await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(post_id, username, "Post liked"),
            Err(e) => tracing::error!(post_id, username, error = %e, "Failed to like post"),
        }
        result
    }

    /// Remove a like, then decrease the post's `likes` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn unlike_post(&self, username: &str, post_id: &str) -> Result<()> {
        let result = self
            .remove_reaction(POST_LIKES, username, post_id, counters::LIKES)
            .await;

        match &result {
            Ok(()) => tracing::info!(post_id, username, "Post unliked"),
            Err(e) => tracing::error!(post_id, username, error = %e, "Failed to unlike post"),
        }
        result
    }

    /// Record a superlike. Same discipline as [`Self::like_post`].
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn superlike_post(&self, username: &str, post_id: &str) -> Result<()> {
        let result = async {
            let name = self.display_name(username).await?;
            let superlike = PostSuperlike {
                post_id: post_id.to_string(),
                username: username.to_string(),
                name,
            };
            self.store
                .insert_and_increment_counter(
                    &superlike,
                    POST_METADATA,
                    &PostMetadata::key_for(post_id),
                    counters::SUPERLIKES,
                )
                .await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(post_id, username, "Post superliked"),
            Err(e) => tracing::error!(post_id, username, error = %e, "Failed to superlike post"),
        }
        result
    }

    /// Remove a superlike, then decrease the post's `superlikes` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn unsuperlike_post(&self, username: &str, post_id: &str) -> Result<()> {
        let result = self
            .remove_reaction(POST_SUPERLIKES, username, post_id, counters::SUPERLIKES)
            .await;

        match &result {
            Ok(()) => tracing::info!(post_id, username, "Post unsuperliked"),
            Err(e) => tracing::error!(post_id, username, error = %e, "Failed to unsuperlike post"),
        }
        result
    }

    /// Write a review, then bump the post's `reviews` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn create_review(&self, review: &Review) -> Result<()> {
        let result = self
            .store
            .insert_and_increment_counter(
                review,
                POST_METADATA,
                &PostMetadata::key_for(&review.post_id),
                counters::REVIEWS,
            )
            .await;

        match &result {
            Ok(()) => tracing::info!(review_id = %review.review_id, post_id = %review.post_id, "Review created"),
            Err(e) => tracing::error!(
                review_id = %review.review_id,
                post_id = %review.post_id,
                error = %e,
                "Failed to create review"
            ),
        }
        result
    }

    /// Likes of a post ordered by username, through the page cache.
    ///
    /// # Errors
    ///
    /// Returns the store error on a cache miss whose query fails.
    pub async fn list_post_likes(
        &self,
        post_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<PostLike>> {
        self.cache
            .get_or_load(kinds::LIKES, post_id, cursor, limit, || {
                self.store
                    .query_records(REACTIONS_BY_POST, post_id, cursor, limit)
            })
            .await
    }

    /// Superlikes of a post ordered by username, through the page cache.
    ///
    /// # Errors
    ///
    /// Returns the store error on a cache miss whose query fails.
    pub async fn list_post_superlikes(
        &self,
        post_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<PostSuperlike>> {
        self.cache
            .get_or_load(kinds::SUPERLIKES, post_id, cursor, limit, || {
                self.store
                    .query_records(REACTIONS_BY_POST, post_id, cursor, limit)
            })
            .await
    }

    /// Reviews of a post, oldest first. Not cached.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn list_post_reviews(
        &self,
        post_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<Review>> {
        self.store
            .query_records(REVIEWS_BY_POST, post_id, cursor, limit)
            .await
    }

    async fn display_name(&self, username: &str) -> Result<String> {
        let profile: UserProfile = self.store.get_record(&UserProfile::key_for(username)).await?;
        Ok(profile.name)
    }

    async fn remove_reaction(
        &self,
        detail: Table,
        username: &str,
        post_id: &str,
        counter: &str,
    ) -> Result<()> {
        self.store
            .remove_and_decrement_counter(
                detail,
                &reaction_key(post_id, username),
                POST_METADATA,
                &PostMetadata::key_for(post_id),
                counter,
            )
            .await
    }
}
