use crate::models::{PostMetadata, UserProfile};
use crate::tables::{POST_METADATA, POSTS_BY_USER, USER_PROFILE, counters};
use readmodels_core::store::Result;
use readmodels_core::{AggregateStore, AggregateStoreExt, Cursor, Page};
use std::sync::Arc;

/// Repository for [`PostMetadata`] aggregates.
#[derive(Clone)]
pub struct PostMetadataRepository {
    store: Arc<dyn AggregateStore>,
}

impl PostMetadataRepository {
    /// Create a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self { store }
    }

    /// Write a new post, then bump its owner's `posts` counter.
    ///
    /// The post row alone makes the event applied: an owner without a
    /// projected profile only skips the counter, with a warning.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed. If the counter step
    /// fails the post row is already written.
    pub async fn create_post_metadata(&self, post: &PostMetadata) -> Result<()> {
        let result = async {
            self.store.insert_record(post).await?;
            match self
                .store
                .increment_counter(
                    USER_PROFILE,
                    &UserProfile::key_for(&post.username),
                    counters::POSTS,
                    1,
                )
                .await
            {
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        post_id = %post.post_id,
                        username = %post.username,
                        "Post owner has no profile, posts counter not updated"
                    );
                    Ok(())
                }
                other => other,
            }
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(post_id = %post.post_id, username = %post.username, "Post metadata created"),
            Err(e) => tracing::error!(
                post_id = %post.post_id,
                username = %post.username,
                error = %e,
                "Failed to create post metadata"
            ),
        }
        result
    }

    /// Delete several posts of `username`, then decrease their owner's `posts`
    /// counter by the number of ids.
    ///
    /// Only the metadata rows are removed; comments, reactions and reviews of
    /// those posts stay in place.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn delete_posts(&self, username: &str, post_ids: &[String]) -> Result<()> {
        if post_ids.is_empty() {
            tracing::debug!(username, "No posts to delete");
            return Ok(());
        }
        let keys: Vec<_> = post_ids.iter().map(|id| PostMetadata::key_for(id)).collect();
        let removed = i64::try_from(post_ids.len()).unwrap_or(i64::MAX);

        let result = async {
            self.store.remove_batch(POST_METADATA, &keys).await?;
            self.store
                .increment_counter(
                    USER_PROFILE,
                    &UserProfile::key_for(username),
                    counters::POSTS,
                    -removed,
                )
                .await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(username, post_ids = ?post_ids, "Posts deleted"),
            Err(e) => tracing::error!(username, post_ids = ?post_ids, error = %e, "Failed to delete posts"),
        }
        result
    }

    /// Fetch a post.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the post does not exist, or the store error.
    pub async fn get_post_metadata(&self, post_id: &str) -> Result<PostMetadata> {
        self.store.get_record(&PostMetadata::key_for(post_id)).await
    }

    /// Posts of `username`, oldest first. Not cached.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn list_user_posts(
        &self,
        username: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<PostMetadata>> {
        self.store
            .query_records(POSTS_BY_USER, username, cursor, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::models::UserProfile;
    use chrono::{TimeZone, Utc};
    use readmodels_core::StoreError;
    use readmodels_testing::InMemoryAggregateStore;

    fn post(post_id: &str, username: &str, second: u32) -> PostMetadata {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap();
        PostMetadata {
            post_id: post_id.to_string(),
            username: username.to_string(),
            kind: "TEXT".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            likes: 0,
            superlikes: 0,
            comments: 0,
            reviews: 0,
            created_at: at,
            last_updated: at,
        }
    }

    async fn with_owner() -> (Arc<InMemoryAggregateStore>, PostMetadataRepository) {
        let store = Arc::new(InMemoryAggregateStore::new());
        store
            .insert_record(&UserProfile {
                username: "u1".to_string(),
                name: "N1".to_string(),
                bio: String::new(),
                link: String::new(),
                followers: 0,
                followees: 0,
                posts: 0,
            })
            .await
            .unwrap();
        let repo = PostMetadataRepository::new(store.clone());
        (store, repo)
    }

    async fn owner_posts(store: &InMemoryAggregateStore) -> i64 {
        store
            .get_record::<UserProfile>(&UserProfile::key_for("u1"))
            .await
            .unwrap()
            .posts
    }

    #[tokio::test]
    async fn create_then_delete_keeps_owner_counter_in_step() {
        let (store, repo) = with_owner().await;
        for (i, id) in ["p1", "p2", "p3"].iter().enumerate() {
            repo.create_post_metadata(&post(id, "u1", u32::try_from(i).unwrap()))
                .await
                .unwrap();
        }
        assert_eq!(owner_posts(&store).await, 3);

        repo.delete_posts("u1", &["p1".to_string(), "p3".to_string()])
            .await
            .unwrap();

        assert_eq!(owner_posts(&store).await, 1);
        assert!(repo.get_post_metadata("p1").await.unwrap_err().is_not_found());
        assert_eq!(repo.get_post_metadata("p2").await.unwrap().post_id, "p2");
    }

    #[tokio::test]
    async fn failed_insert_leaves_counter_untouched() {
        let (store, repo) = with_owner().await;
        store.fail_next("insert", StoreError::Backend("throttled".to_string()));

        let err = repo.create_post_metadata(&post("p1", "u1", 0)).await.unwrap_err();

        assert_eq!(err, StoreError::Backend("throttled".to_string()));
        assert_eq!(owner_posts(&store).await, 0);
    }

    #[tokio::test]
    async fn failed_counter_leaves_post_written() {
        let (store, repo) = with_owner().await;
        store.fail_next("increment_counter", StoreError::Backend("throttled".to_string()));

        assert!(repo.create_post_metadata(&post("p1", "u1", 0)).await.is_err());

        assert!(repo.get_post_metadata("p1").await.is_ok());
        assert_eq!(owner_posts(&store).await, 0);
    }

    #[tokio::test]
    async fn post_of_unknown_owner_is_still_created() {
        let store = Arc::new(InMemoryAggregateStore::new());
        let repo = PostMetadataRepository::new(store.clone());

        repo.create_post_metadata(&post("p1", "ghost", 0)).await.unwrap();

        assert_eq!(repo.get_post_metadata("p1").await.unwrap().username, "ghost");
        assert_eq!(store.len(crate::tables::USER_PROFILE), 0);
    }

    #[tokio::test]
    async fn list_user_posts_is_ordered_by_creation() {
        let (_store, repo) = with_owner().await;
        repo.create_post_metadata(&post("late", "u1", 9)).await.unwrap();
        repo.create_post_metadata(&post("early", "u1", 1)).await.unwrap();
        repo.create_post_metadata(&post("other", "u2", 5)).await.ok();

        let page = repo.list_user_posts("u1", None, 12).await.unwrap();

        let ids: Vec<_> = page.items.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn deleting_nothing_makes_no_store_calls() {
        let (store, repo) = with_owner().await;
        store.clear_calls();

        repo.delete_posts("u1", &[]).await.unwrap();

        assert!(store.calls().is_empty());
    }
}
