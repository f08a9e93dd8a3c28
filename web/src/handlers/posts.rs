//! Post metadata and per-post lists.
//!
//! Comments, likes and superlikes are served through the page cache; reviews
//! always hit the store.

use crate::extractors::PageRequest;
use crate::{AppState, WebResult};
use axum::Json;
use axum::extract::{Path, State};
use readmodels_core::Page;
use readmodels_projections::models::{Comment, PostLike, PostMetadata, PostSuperlike, Review};

/// `GET /posts/:post_id`
///
/// # Errors
///
/// 404 if the post is unknown, 500 on store failure.
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> WebResult<Json<PostMetadata>> {
    Ok(Json(state.repositories.posts.get_post_metadata(&post_id).await?))
}

/// `GET /posts/:post_id/comments`
///
/// # Errors
///
/// 400 on a bad page request, 500 on store failure.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    page: PageRequest,
) -> WebResult<Json<Page<Comment>>> {
    let comments = state
        .repositories
        .comments
        .list_post_comments(&post_id, page.cursor.as_ref(), page.limit)
        .await?;
    Ok(Json(comments))
}

/// `GET /posts/:post_id/likes`
///
/// # Errors
///
/// 400 on a bad page request, 500 on store failure.
pub async fn list_likes(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    page: PageRequest,
) -> WebResult<Json<Page<PostLike>>> {
    let likes = state
        .repositories
        .reactions
        .list_post_likes(&post_id, page.cursor.as_ref(), page.limit)
        .await?;
    Ok(Json(likes))
}

/// `GET /posts/:post_id/superlikes`
///
/// # Errors
///
/// 400 on a bad page request, 500 on store failure.
pub async fn list_superlikes(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    page: PageRequest,
) -> WebResult<Json<Page<PostSuperlike>>> {
    let superlikes = state
        .repositories
        .reactions
        .list_post_superlikes(&post_id, page.cursor.as_ref(), page.limit)
        .await?;
    Ok(Json(superlikes))
}

/// `GET /posts/:post_id/reviews`
///
/// # Errors
///
/// 400 on a bad page request, 500 on store failure.
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    page: PageRequest,
) -> WebResult<Json<Page<Review>>> {
    let reviews = state
        .repositories
        .reactions
        .list_post_reviews(&post_id, page.cursor.as_ref(), page.limit)
        .await?;
    Ok(Json(reviews))
}
