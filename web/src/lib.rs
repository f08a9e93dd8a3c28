//! HTTP read API over the projected read models.
//!
//! # Routes
//!
//! ```text
//! GET /health
//! GET /users/:username
//! GET /users/:username/posts        ?limit=&cursor=
//! GET /posts/:post_id
//! GET /posts/:post_id/comments      ?limit=&cursor=
//! GET /posts/:post_id/likes         ?limit=&cursor=
//! GET /posts/:post_id/superlikes    ?limit=&cursor=
//! GET /posts/:post_id/reviews       ?limit=&cursor=
//! GET /comments/:comment_id
//! ```
//!
//! Lists answer `{"items": [...], "nextCursor": "..." | null}`. Pass
//! `nextCursor` back as `cursor` to read the following page.
//!
//! # Example
//!
//! ```no_run
//! use readmodels_projections::{PageCache, Repositories};
//! use readmodels_testing::{InMemoryAggregateStore, InMemoryCacheStore};
//! use readmodels_web::{AppState, router};
//! use std::sync::Arc;
//!
//! # async fn serve() -> std::io::Result<()> {
//! let repositories = Repositories::new(
//!     Arc::new(InMemoryAggregateStore::new()),
//!     PageCache::new(Arc::new(InMemoryCacheStore::new())),
//! );
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router(AppState::new(repositories))).await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use extractors::PageRequest;
pub use middleware::{REQUEST_ID_HEADER, RequestId, track_request};
pub use state::{AppState, DEFAULT_PAGE_LIMIT};

use axum::{Router, routing::get};
use handlers::{comments, posts, users};
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the read API router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/users/:username", get(users::get_user))
        .route("/users/:username/posts", get(users::list_user_posts))
        .route("/posts/:post_id", get(posts::get_post))
        .route("/posts/:post_id/comments", get(posts::list_comments))
        .route("/posts/:post_id/likes", get(posts::list_likes))
        .route("/posts/:post_id/superlikes", get(posts::list_superlikes))
        .route("/posts/:post_id/reviews", get(posts::list_reviews))
        .route("/comments/:comment_id", get(comments::get_comment))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_request))
        .with_state(state)
}
