//! Cache-aside pagination over the read models.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use proptest::prelude::*;
use readmodels_core::{Cursor, Page};
use readmodels_projections::models::{Comment, PostMetadata, UserProfile};
use readmodels_projections::{PageCache, Repositories};
use readmodels_testing::fixtures::base_time;
use readmodels_testing::properties::page_limit;
use readmodels_testing::{InMemoryAggregateStore, InMemoryCacheStore};
use chrono::TimeDelta;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    store: Arc<InMemoryAggregateStore>,
    repositories: Repositories,
}

async fn fixture(comments: usize, likers: usize) -> Fixture {
    let store = Arc::new(InMemoryAggregateStore::new());
    let cache = PageCache::new(Arc::new(InMemoryCacheStore::new())).with_ttl(Duration::from_secs(60));
    let repositories = Repositories::new(store.clone(), cache);

    for i in 0..likers.max(1) {
        repositories
            .users
            .create_user_profile(&UserProfile {
                username: format!("u{i:03}"),
                name: format!("User {i}"),
                bio: String::new(),
                link: String::new(),
                followers: 0,
                followees: 0,
                posts: 0,
            })
            .await
            .unwrap();
    }
    repositories
        .posts
        .create_post_metadata(&PostMetadata {
            post_id: "p1".to_string(),
            username: "u000".to_string(),
            kind: "TEXT".to_string(),
            title: "T".to_string(),
            description: "D".to_string(),
            likes: 0,
            superlikes: 0,
            comments: 0,
            reviews: 0,
            created_at: base_time(),
            last_updated: base_time(),
        })
        .await
        .unwrap();
    for i in 0..comments {
        repositories
            .comments
            .create_comment(&Comment {
                comment_id: format!("c{i:03}"),
                post_id: "p1".to_string(),
                username: "u000".to_string(),
                content: format!("comment {i}"),
                // Pairs share a timestamp so ties are broken by key.
                created_at: base_time() + TimeDelta::seconds(i64::try_from(i / 2).unwrap()),
                updated_at: None,
            })
            .await
            .unwrap();
    }
    for i in 0..likers {
        repositories.reactions.like_post(&format!("u{i:03}"), "p1").await.unwrap();
    }
    store.clear_calls();
    Fixture { store, repositories }
}

async fn all_comment_pages(repositories: &Repositories, limit: usize) -> Vec<Page<Comment>> {
    let mut pages = Vec::new();
    let mut cursor: Option<Cursor> = None;
    loop {
        let page = repositories
            .comments
            .list_post_comments("p1", cursor.as_ref(), limit)
            .await
            .unwrap();
        cursor = page.next_cursor.clone();
        pages.push(page);
        if cursor.is_none() {
            return pages;
        }
    }
}

#[tokio::test]
async fn second_identical_read_is_served_from_cache() {
    let f = fixture(5, 0).await;

    let first = f.repositories.comments.list_post_comments("p1", None, 2).await.unwrap();
    let second = f.repositories.comments.list_post_comments("p1", None, 2).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(f.store.call_count("query"), 1);
}

#[tokio::test]
async fn different_shapes_are_cached_separately() {
    let f = fixture(5, 3).await;

    f.repositories.comments.list_post_comments("p1", None, 2).await.unwrap();
    f.repositories.comments.list_post_comments("p1", None, 3).await.unwrap();
    f.repositories.reactions.list_post_likes("p1", None, 2).await.unwrap();
    f.repositories.reactions.list_post_superlikes("p1", None, 2).await.unwrap();

    assert_eq!(f.store.call_count("query"), 4);
}

#[tokio::test(start_paused = true)]
async fn expired_page_is_reloaded() {
    let f = fixture(3, 0).await;

    f.repositories.comments.list_post_comments("p1", None, 2).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;
    f.repositories.comments.list_post_comments("p1", None, 2).await.unwrap();

    assert_eq!(f.store.call_count("query"), 2);
}

#[tokio::test]
async fn exact_multiple_ends_with_an_empty_page() {
    let f = fixture(4, 0).await;

    let pages = all_comment_pages(&f.repositories, 2).await;

    let sizes: Vec<_> = pages.iter().map(|p| p.items.len()).collect();
    assert_eq!(sizes, vec![2, 2, 0]);
}

#[tokio::test]
async fn reviews_are_never_cached() {
    let f = fixture(0, 0).await;

    f.repositories.reactions.list_post_reviews("p1", None, 5).await.unwrap();
    f.repositories.reactions.list_post_reviews("p1", None, 5).await.unwrap();

    assert_eq!(f.store.call_count("query"), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn comment_pages_cover_everything_once_in_order(count in 0_usize..30, limit in page_limit()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        runtime.block_on(async {
            let f = fixture(count, 0).await;
            let pages = all_comment_pages(&f.repositories, limit).await;

            let ids: Vec<String> = pages.iter().flat_map(|p| p.items.iter().map(|c| c.comment_id.clone())).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            prop_assert_eq!(&ids, &sorted);
            prop_assert_eq!(ids.iter().collect::<HashSet<_>>().len(), count);
            prop_assert!(pages.iter().all(|p| p.items.len() <= limit));
            Ok(())
        })?;
    }

    #[test]
    fn like_pages_do_not_overlap(likers in 1_usize..20, limit in page_limit()) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        runtime.block_on(async {
            let f = fixture(0, likers).await;
            let mut seen = HashSet::new();
            let mut cursor: Option<Cursor> = None;
            loop {
                let page = f.repositories.reactions.list_post_likes("p1", cursor.as_ref(), limit).await.unwrap();
                for like in &page.items {
                    prop_assert!(seen.insert(like.username.clone()), "{} seen twice", like.username);
                }
                cursor = page.next_cursor;
                if cursor.is_none() {
                    break;
                }
            }
            prop_assert_eq!(seen.len(), likers);
            Ok(())
        })?;
    }
}
