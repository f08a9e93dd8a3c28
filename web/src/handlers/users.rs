//! User profile reads.

use crate::extractors::PageRequest;
use crate::{AppState, WebResult};
use axum::Json;
use axum::extract::{Path, State};
use readmodels_core::Page;
use readmodels_projections::models::{PostMetadata, UserProfile};

/// `GET /users/:username`
///
/// # Errors
///
/// 404 if the user has no profile, 500 on store failure.
pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> WebResult<Json<UserProfile>> {
    Ok(Json(state.repositories.users.get_user_profile(&username).await?))
}

/// `GET /users/:username/posts`, newest last.
///
/// # Errors
///
/// 400 on a bad page request, 500 on store failure.
pub async fn list_user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    page: PageRequest,
) -> WebResult<Json<Page<PostMetadata>>> {
    let posts = state
        .repositories
        .posts
        .list_user_posts(&username, page.cursor.as_ref(), page.limit)
        .await?;
    Ok(Json(posts))
}
