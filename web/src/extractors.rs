//! Request extractors for list endpoints.
//!
//! ```ignore
//! async fn list(State(state): State<AppState>, page: PageRequest) -> WebResult<Json<Page<Comment>>> {
//!     let page = state.repositories.comments.list_post_comments(&id, page.cursor.as_ref(), page.limit).await?;
//!     Ok(Json(page))
//! }
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use readmodels_core::Cursor;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct RawPageParams {
    limit: Option<String>,
    cursor: Option<String>,
}

/// `limit` and `cursor` of a list request, validated.
///
/// - `limit` defaults to the state's page size and must be a positive integer
/// - `cursor` defaults to the first page and must be a cursor issued by this API
///
/// Anything else is rejected with 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of items
    pub limit: usize,
    /// Position after which to read, `None` for the first page
    pub cursor: Option<Cursor>,
}

impl PageRequest {
    fn parse(raw: RawPageParams, default_limit: usize) -> Result<Self, AppError> {
        let limit = match raw.limit.as_deref() {
            None | Some("") => default_limit,
            Some(value) => match value.parse::<usize>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(AppError::bad_request(format!(
                        "limit must be a positive integer, got '{value}'"
                    )));
                }
            },
        };
        let cursor = Cursor::decode(raw.cursor.as_deref().unwrap_or_default())?;
        Ok(Self { limit, cursor })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for PageRequest {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Query(raw) = Query::<RawPageParams>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Self::parse(raw, state.default_limit)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use axum::http::StatusCode;
    use readmodels_core::Key;

    fn raw(limit: Option<&str>, cursor: Option<&str>) -> RawPageParams {
        RawPageParams {
            limit: limit.map(str::to_string),
            cursor: cursor.map(str::to_string),
        }
    }

    #[test]
    fn defaults_apply_when_absent() {
        let page = PageRequest::parse(raw(None, None), 12).unwrap();
        assert_eq!(page, PageRequest { limit: 12, cursor: None });
    }

    #[test]
    fn zero_negative_and_garbage_limits_are_rejected() {
        for limit in ["0", "-1", "ten"] {
            let err = PageRequest::parse(raw(Some(limit), None), 12).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{limit}");
        }
    }

    #[test]
    fn issued_cursor_is_accepted() {
        let cursor = Cursor::from(Key::single("username", "u1"));
        let page = PageRequest::parse(raw(Some("5"), Some(&cursor.encode())), 12).unwrap();
        assert_eq!(page.limit, 5);
        assert_eq!(page.cursor, Some(cursor));
    }

    #[test]
    fn undecodable_cursor_is_rejected() {
        let err = PageRequest::parse(raw(None, Some("***")), 12).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
