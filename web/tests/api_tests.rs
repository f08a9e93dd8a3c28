//! Read API behavior over in-memory stores.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::TimeDelta;
use readmodels_core::StoreError;
use readmodels_projections::models::{Comment, PostMetadata, UserProfile};
use readmodels_projections::{PageCache, Repositories};
use readmodels_testing::fixtures::base_time;
use readmodels_testing::{InMemoryAggregateStore, InMemoryCacheStore};
use readmodels_web::{AppState, REQUEST_ID_HEADER, router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

struct Api {
    store: Arc<InMemoryAggregateStore>,
    repositories: Repositories,
    app: Router,
}

fn api() -> Api {
    let store = Arc::new(InMemoryAggregateStore::new());
    let repositories = Repositories::new(store.clone(), PageCache::new(Arc::new(InMemoryCacheStore::new())));
    let app = router(AppState::new(repositories.clone()));
    Api {
        store,
        repositories,
        app,
    }
}

impl Api {
    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn seed_post_with_comments(&self, count: i64) {
        self.repositories
            .users
            .create_user_profile(&UserProfile {
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
        self.repositories
            .posts
            .create_post_metadata(&PostMetadata {
                post_id: "p1".to_string(),
                username: "u1".to_string(),
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
        for i in 0..count {
            self.repositories
                .comments
                .create_comment(&Comment {
                    comment_id: format!("c{i}"),
                    post_id: "p1".to_string(),
                    username: "u1".to_string(),
                    content: format!("comment {i}"),
                    created_at: base_time() + TimeDelta::seconds(i),
                    updated_at: None,
                })
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = api().get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn post_metadata_is_served_in_wire_shape() {
    let api = api();
    api.seed_post_with_comments(1).await;

    let (status, body) = api.get("/posts/p1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["postId"], "p1");
    assert_eq!(body["type"], "TEXT");
    assert_eq!(body["comments"], 1);
    assert_eq!(body["createdAt"], "2025-01-01T00:00:00.000000000Z");
}

#[tokio::test]
async fn profile_counts_posts() {
    let api = api();
    api.seed_post_with_comments(0).await;

    let (status, body) = api.get("/users/u1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "N1");
    assert_eq!(body["posts"], 1);
}

#[tokio::test]
async fn missing_rows_are_not_found() {
    let api = api();
    for uri in ["/users/ghost", "/posts/ghost", "/comments/ghost"] {
        let (status, body) = api.get(uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["code"], "NOT_FOUND");
    }
}

#[tokio::test]
async fn store_failures_are_internal_errors_without_details() {
    let api = api();
    api.store.fail_next("get", StoreError::Backend("connection reset".to_string()));

    let (status, body) = api.get("/posts/p1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("connection reset"));
}

#[tokio::test]
async fn comments_page_through_next_cursor() {
    let api = api();
    api.seed_post_with_comments(5).await;

    let (status, first) = api.get("/posts/p1/comments?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = first["items"].as_array().unwrap().iter().map(|c| c["commentId"].clone()).collect();
    assert_eq!(ids, vec![json!("c0"), json!("c1")]);

    let mut seen = ids.len();
    let mut cursor = first["nextCursor"].as_str().unwrap().to_string();
    loop {
        let (status, page) = api.get(&format!("/posts/p1/comments?limit=2&cursor={cursor}")).await;
        assert_eq!(status, StatusCode::OK);
        seen += page["items"].as_array().unwrap().len();
        match page["nextCursor"].as_str() {
            Some(next) => cursor = next.to_string(),
            None => break,
        }
    }
    assert_eq!(seen, 5);
}

#[tokio::test]
async fn empty_list_has_no_cursor() {
    let (status, body) = api().get("/posts/p1/likes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"items": [], "nextCursor": null}));
}

#[tokio::test]
async fn invalid_page_requests_are_rejected() {
    let api = api();
    for uri in [
        "/posts/p1/comments?limit=0",
        "/posts/p1/superlikes?limit=-3",
        "/posts/p1/reviews?limit=many",
        "/users/u1/posts?cursor=%25%25%25",
    ] {
        let (status, body) = api.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["code"], "BAD_REQUEST");
    }
    assert!(api.store.calls().is_empty());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let response = api()
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}
