use crate::models::{Comment, PostMetadata};
use crate::pagination::{PageCache, kinds};
use crate::tables::{COMMENTS, COMMENTS_BY_POST, POST_METADATA, counters};
use crate::timestamp;
use chrono::{DateTime, Utc};
use readmodels_core::store::Result;
use readmodels_core::{AggregateStore, AggregateStoreExt, Attributes, Cursor, Page};
use serde_json::Value;
use std::sync::Arc;

/// Repository for [`Comment`] detail records.
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn AggregateStore>,
    cache: PageCache,
}

impl CommentRepository {
    /// Create a repository over `store`, caching list pages in `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>, cache: PageCache) -> Self {
        Self { store, cache }
    }

    /// Write a comment, then bump the post's `comments` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn create_comment(&self, comment: &Comment) -> Result<()> {
        let result = self
            .store
            .insert_and_increment_counter(
                comment,
                POST_METADATA,
                &PostMetadata::key_for(&comment.post_id),
                counters::COMMENTS,
            )
            .await;

        match &result {
            Ok(()) => tracing::info!(comment_id = %comment.comment_id, post_id = %comment.post_id, "Comment created"),
            Err(e) => tracing::error!(
                comment_id = %comment.comment_id,
                post_id = %comment.post_id,
                error = %e,
                "Failed to create comment"
            ),
        }
        result
    }

    /// Replace a comment's content and stamp its edit time.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the comment does not exist, or the store error.
    pub async fn update_comment(
        &self,
        comment_id: &str,
        content: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut changes = Attributes::new();
        changes.insert("content".to_string(), Value::String(content.to_string()));
        changes.insert(
            "updatedAt".to_string(),
            Value::String(timestamp::format(&updated_at)),
        );

        let result = self
            .store
            .update(COMMENTS, &Comment::key_for(comment_id), changes)
            .await;

        match &result {
            Ok(()) => tracing::info!(comment_id, "Comment updated"),
            Err(e) => tracing::error!(comment_id, error = %e, "Failed to update comment"),
        }
        result
    }

    /// Remove a comment, then decrease the post's `comments` counter.
    ///
    /// # Errors
    ///
    /// Returns the store error of whichever step failed.
    pub async fn delete_comment(&self, comment_id: &str, post_id: &str) -> Result<()> {
        let result = self
            .store
            .remove_and_decrement_counter(
                COMMENTS,
                &Comment::key_for(comment_id),
                POST_METADATA,
                &PostMetadata::key_for(post_id),
                counters::COMMENTS,
            )
            .await;

        match &result {
            Ok(()) => tracing::info!(comment_id, post_id, "Comment deleted"),
            Err(e) => tracing::error!(comment_id, post_id, error = %e, "Failed to delete comment"),
        }
        result
    }

    /// Fetch a comment.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the comment does not exist, or the store error.
    pub async fn get_comment(&self, comment_id: &str) -> Result<Comment> {
        self.store.get_record(&Comment::key_for(comment_id)).await
    }

    /// Comments of a post, oldest first, through the page cache.
    ///
    /// # Errors
    ///
    /// Returns the store error on a cache miss whose query fails.
    pub async fn list_post_comments(
        &self,
        post_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<Comment>> {
        self.cache
            .get_or_load(kinds::COMMENTS, post_id, cursor, limit, || {
                self.store
                    .query_records(COMMENTS_BY_POST, post_id, cursor, limit)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use readmodels_testing::{InMemoryAggregateStore, InMemoryCacheStore};

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, second).unwrap()
    }

    fn comment(comment_id: &str, second: u32) -> Comment {
        Comment {
            comment_id: comment_id.to_string(),
            post_id: "p1".to_string(),
            username: "u1".to_string(),
            content: "hello".to_string(),
            created_at: at(second),
            updated_at: None,
        }
    }

    async fn with_post() -> (Arc<InMemoryAggregateStore>, CommentRepository) {
        let store = Arc::new(InMemoryAggregateStore::new());
        store
            .insert_record(&PostMetadata {
                post_id: "p1".to_string(),
                username: "u1".to_string(),
                kind: "TEXT".to_string(),
                title: "T".to_string(),
                description: "D".to_string(),
                likes: 0,
                superlikes: 0,
                comments: 0,
                reviews: 0,
                created_at: at(0),
                last_updated: at(0),
            })
            .await
            .unwrap();
        let cache = PageCache::new(Arc::new(InMemoryCacheStore::new()));
        let repo = CommentRepository::new(store.clone(), cache);
        (store, repo)
    }

    async fn comment_counter(store: &InMemoryAggregateStore) -> i64 {
        store
            .get_record::<PostMetadata>(&PostMetadata::key_for("p1"))
            .await
            .unwrap()
            .comments
    }

    #[tokio::test]
    async fn create_update_delete_round_trip() {
        let (store, repo) = with_post().await;

        repo.create_comment(&comment("c1", 1)).await.unwrap();
        assert_eq!(comment_counter(&store).await, 1);

        repo.update_comment("c1", "edited", at(2)).await.unwrap();
        let stored = repo.get_comment("c1").await.unwrap();
        assert_eq!(stored.content, "edited");
        assert_eq!(stored.updated_at, Some(at(2)));
        assert_eq!(stored.created_at, at(1));

        repo.delete_comment("c1", "p1").await.unwrap();
        assert!(repo.get_comment("c1").await.unwrap_err().is_not_found());
        assert_eq!(comment_counter(&store).await, 0);
    }

    #[tokio::test]
    async fn delete_removes_detail_before_decrementing() {
        let (store, repo) = with_post().await;
        repo.create_comment(&comment("c1", 1)).await.unwrap();
        store.clear_calls();

        repo.delete_comment("c1", "p1").await.unwrap();

        assert_eq!(
            store.calls(),
            vec![
                "remove readmodels.comments {commentId=c1}".to_string(),
                "increment_counter PostMetadata {postId=p1} comments -1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn second_list_of_same_shape_skips_the_store() {
        let (store, repo) = with_post().await;
        repo.create_comment(&comment("c1", 1)).await.unwrap();
        repo.create_comment(&comment("c2", 2)).await.unwrap();
        store.clear_calls();

        let first = repo.list_post_comments("p1", None, 12).await.unwrap();
        let second = repo.list_post_comments("p1", None, 12).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.call_count("query"), 1);
    }

    #[tokio::test]
    async fn cached_list_is_not_invalidated_by_writes() {
        let (_store, repo) = with_post().await;
        repo.create_comment(&comment("c1", 1)).await.unwrap();
        let before = repo.list_post_comments("p1", None, 12).await.unwrap();

        repo.create_comment(&comment("c2", 2)).await.unwrap();
        let after = repo.list_post_comments("p1", None, 12).await.unwrap();

        assert_eq!(before, after);
        assert_eq!(after.items.len(), 1);
    }
}
