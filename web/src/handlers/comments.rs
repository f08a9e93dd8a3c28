//! Single comment reads.

use crate::{AppState, WebResult};
use axum::Json;
use axum::extract::{Path, State};
use readmodels_projections::models::Comment;

/// `GET /comments/:comment_id`
///
/// # Errors
///
/// 404 if the comment is unknown, 500 on store failure.
pub async fn get_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
) -> WebResult<Json<Comment>> {
    Ok(Json(state.repositories.comments.get_comment(&comment_id).await?))
}
