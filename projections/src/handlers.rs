//! Event handlers: one per event type, each issuing exactly one repository call.
//!
//! Every handler follows the same shape:
//!
//! 1. Decode the payload into its typed event. A payload that does not match
//!    is logged as `Invalid event data` and dropped before any store call.
//! 2. Parse derived fields (timestamps). A bad layout is logged and dropped.
//! 3. Call one repository method. The repository logs its own outcome; a
//!    failure becomes [`DropReason::Projection`].
//!
//! Nothing is retried and nothing is dead-lettered.

use crate::events::{
    CommentWasCreated, CommentWasDeleted, CommentWasUpdated, PostReaction, PostWasCreated,
    PostsWereDeleted, ReviewWasCreated, UserAFollowedUserB, UserAUnfollowedUserB, UserLikedPost,
    UserProfileUpdated, UserSuperlikedPost, UserUnlikedPost, UserUnsuperlikedPost,
    UserWasRegistered,
};
use crate::models::{Comment, PostMetadata, Review, UserProfile};
use crate::repositories::{ProfileChanges, Repositories};
use crate::timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use readmodels_core::{DropReason, Event, EventHandler, EventRouter};
use std::marker::PhantomData;
use std::sync::Arc;

/// Projection of one typed event onto the repositories.
#[async_trait]
pub trait Project: Event {
    /// Apply this event.
    ///
    /// # Errors
    ///
    /// Returns the [`DropReason`] if a derived field is invalid or the
    /// repository call fails.
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason>;
}

/// Adapts a [`Project`] event type to the untyped [`EventHandler`] contract.
pub struct TypedHandler<E> {
    repositories: Repositories,
    _event: PhantomData<fn() -> E>,
}

impl<E: Project> TypedHandler<E> {
    /// Handler for `E` over `repositories`.
    #[must_use]
    pub fn new(repositories: Repositories) -> Self {
        Self {
            repositories,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Project> EventHandler for TypedHandler<E> {
    async fn handle(&self, payload: &[u8]) -> Result<(), DropReason> {
        let event = E::from_bytes(payload).map_err(|e| {
            tracing::warn!(event_type = E::EVENT_TYPE, error = %e, "Invalid event data");
            DropReason::InvalidEventData(e.to_string())
        })?;
        event.project(&self.repositories).await
    }
}

/// Build the complete event-type table over `repositories`.
#[must_use]
pub fn projection_router(repositories: &Repositories) -> EventRouter {
    fn handler<E: Project>(repositories: &Repositories) -> Arc<dyn EventHandler> {
        Arc::new(TypedHandler::<E>::new(repositories.clone()))
    }

    EventRouter::builder()
        .route(UserWasRegistered::EVENT_TYPE, handler::<UserWasRegistered>(repositories))
        .route(UserProfileUpdated::EVENT_TYPE, handler::<UserProfileUpdated>(repositories))
        .route(UserAFollowedUserB::EVENT_TYPE, handler::<UserAFollowedUserB>(repositories))
        .route(UserAUnfollowedUserB::EVENT_TYPE, handler::<UserAUnfollowedUserB>(repositories))
        .route(PostWasCreated::EVENT_TYPE, handler::<PostWasCreated>(repositories))
        .route(PostsWereDeleted::EVENT_TYPE, handler::<PostsWereDeleted>(repositories))
        .route(CommentWasCreated::EVENT_TYPE, handler::<CommentWasCreated>(repositories))
        .route(CommentWasUpdated::EVENT_TYPE, handler::<CommentWasUpdated>(repositories))
        .route(CommentWasDeleted::EVENT_TYPE, handler::<CommentWasDeleted>(repositories))
        .route(UserLikedPost::EVENT_TYPE, handler::<UserLikedPost>(repositories))
        .route(UserUnlikedPost::EVENT_TYPE, handler::<UserUnlikedPost>(repositories))
        .route(UserSuperlikedPost::EVENT_TYPE, handler::<UserSuperlikedPost>(repositories))
        .route(UserUnsuperlikedPost::EVENT_TYPE, handler::<UserUnsuperlikedPost>(repositories))
        .route(ReviewWasCreated::EVENT_TYPE, handler::<ReviewWasCreated>(repositories))
        .build()
}

fn parse_timestamp(event_type: &str, field: &'static str, value: &str) -> Result<DateTime<Utc>, DropReason> {
    timestamp::parse(field, value).inspect_err(|_| {
        tracing::warn!(event_type, field, value, "Invalid timestamp");
    })
}

#[async_trait]
impl Project for UserWasRegistered {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let profile = UserProfile {
            username: self.username,
            name: self.name,
            bio: self.bio.unwrap_or_default(),
            link: self.link.unwrap_or_default(),
            followers: 0,
            followees: 0,
            posts: 0,
        };
        Ok(repositories.users.create_user_profile(&profile).await?)
    }
}

#[async_trait]
impl Project for UserProfileUpdated {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let changes = ProfileChanges {
            name: self.name,
            bio: self.bio,
            link: self.link,
        };
        Ok(repositories
            .users
            .update_user_profile(&self.username, &changes)
            .await?)
    }
}

#[async_trait]
impl Project for UserAFollowedUserB {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        Ok(repositories.users.follow(&self.user_a, &self.user_b).await?)
    }
}

#[async_trait]
impl Project for UserAUnfollowedUserB {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        Ok(repositories.users.unfollow(&self.user_a, &self.user_b).await?)
    }
}

#[async_trait]
impl Project for PostWasCreated {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let metadata = self.metadata;
        let created_at = parse_timestamp(Self::EVENT_TYPE, "createdAt", &metadata.created_at)?;
        let last_updated = parse_timestamp(Self::EVENT_TYPE, "lastUpdated", &metadata.last_updated)?;
        let post = PostMetadata {
            post_id: self.post_id,
            username: metadata.username,
            kind: metadata.kind,
            title: metadata.title,
            description: metadata.description,
            likes: 0,
            superlikes: 0,
            comments: 0,
            reviews: 0,
            created_at,
            last_updated,
        };
        Ok(repositories.posts.create_post_metadata(&post).await?)
    }
}

#[async_trait]
impl Project for PostsWereDeleted {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        Ok(repositories
            .posts
            .delete_posts(&self.username, &self.post_ids)
            .await?)
    }
}

#[async_trait]
impl Project for CommentWasCreated {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let created_at = parse_timestamp(Self::EVENT_TYPE, "createdAt", &self.created_at)?;
        let comment = Comment {
            comment_id: self.comment_id,
            post_id: self.post_id,
            username: self.username,
            content: self.content,
            created_at,
            updated_at: None,
        };
        Ok(repositories.comments.create_comment(&comment).await?)
    }
}

#[async_trait]
impl Project for CommentWasUpdated {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let updated_at = parse_timestamp(Self::EVENT_TYPE, "updatedAt", &self.updated_at)?;
        Ok(repositories
            .comments
            .update_comment(&self.comment_id, &self.content, updated_at)
            .await?)
    }
}

#[async_trait]
impl Project for CommentWasDeleted {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        Ok(repositories
            .comments
            .delete_comment(&self.comment_id, &self.post_id)
            .await?)
    }
}

#[async_trait]
impl Project for UserLikedPost {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let PostReaction { username, post_id } = self.0;
        Ok(repositories.reactions.like_post(&username, &post_id).await?)
    }
}

#[async_trait]
impl Project for UserUnlikedPost {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let PostReaction { username, post_id } = self.0;
        Ok(repositories.reactions.unlike_post(&username, &post_id).await?)
    }
}

#[async_trait]
impl Project for UserSuperlikedPost {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let PostReaction { username, post_id } = self.0;
        Ok(repositories
            .reactions
            .superlike_post(&username, &post_id)
            .await?)
    }
}

#[async_trait]
impl Project for UserUnsuperlikedPost {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let PostReaction { username, post_id } = self.0;
        Ok(repositories
            .reactions
            .unsuperlike_post(&username, &post_id)
            .await?)
    }
}

#[async_trait]
impl Project for ReviewWasCreated {
    async fn project(self, repositories: &Repositories) -> Result<(), DropReason> {
        let created_at = parse_timestamp(Self::EVENT_TYPE, "createdAt", &self.created_at)?;
        let review = Review {
            review_id: self.review_id,
            post_id: self.post_id,
            username: self.username,
            content: self.content,
            rating: self.rating,
            created_at,
        };
        Ok(repositories.reactions.create_review(&review).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::PageCache;
    use readmodels_testing::{InMemoryAggregateStore, InMemoryCacheStore};

    fn repositories(store: Arc<InMemoryAggregateStore>) -> Repositories {
        Repositories::new(store, PageCache::new(Arc::new(InMemoryCacheStore::new())))
    }

    #[test]
    fn router_covers_every_event_type() {
        let router = projection_router(&repositories(Arc::new(InMemoryAggregateStore::new())));
        assert_eq!(
            router.event_types(),
            vec![
                "CommentWasCreated",
                "CommentWasDeleted",
                "CommentWasUpdated",
                "PostWasCreated",
                "PostsWereDeleted",
                "ReviewWasCreated",
                "UserAFollowedUserB",
                "UserAUnfollowedUserB",
                "UserLikedPost",
                "UserProfileUpdated",
                "UserSuperlikedPost",
                "UserUnlikedPost",
                "UserUnsuperlikedPost",
                "UserWasRegistered",
            ]
        );
    }

    #[tokio::test]
    async fn bad_timestamp_is_dropped_before_the_store() {
        let store = Arc::new(InMemoryAggregateStore::new());
        let handler = TypedHandler::<CommentWasCreated>::new(repositories(store.clone()));

        let outcome = handler
            .handle(
                br#"{"commentId": "c1", "postId": "p1", "username": "u1", "content": "hi",
                    "createdAt": "2024-01-01"}"#,
            )
            .await;

        assert_eq!(
            outcome,
            Err(DropReason::InvalidTimestamp {
                field: "createdAt",
                value: "2024-01-01".to_string()
            })
        );
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn repository_failure_becomes_projection_drop() {
        let store = Arc::new(InMemoryAggregateStore::new());
        let handler = TypedHandler::<UserLikedPost>::new(repositories(store.clone()));

        let outcome = handler.handle(br#"{"username": "u1", "postId": "p1"}"#).await;

        assert!(matches!(outcome, Err(DropReason::Projection(e)) if e.is_not_found()));
    }
}
