//! Read-model records.
//!
//! Each record serializes to the flat, camelCase attribute map stored in its
//! table. Counters default to zero so freshly created aggregates and rows
//! written before a counter existed decode the same way.

use crate::tables;
use crate::timestamp::layout;
use chrono::{DateTime, Utc};
use readmodels_core::{Key, Record, Table};
use serde::{Deserialize, Serialize};

/// Public profile of a user (aggregate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Unique username
    pub username: String,
    /// Display name
    pub name: String,
    /// Free-form biography
    #[serde(default)]
    pub bio: String,
    /// Personal link
    #[serde(default)]
    pub link: String,
    /// Number of users following this user
    #[serde(default)]
    pub followers: i64,
    /// Number of users this user follows
    #[serde(default)]
    pub followees: i64,
    /// Number of posts owned by this user
    #[serde(default)]
    pub posts: i64,
}

impl UserProfile {
    /// Key of the profile for `username`.
    #[must_use]
    pub fn key_for(username: &str) -> Key {
        Key::single("username", username)
    }
}

impl Record for UserProfile {
    const TABLE: Table = tables::USER_PROFILE;
}

/// Denormalized post header with reaction counters (aggregate).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadata {
    /// Post identifier
    pub post_id: String,
    /// Owner
    pub username: String,
    /// Post kind (e.g. `TEXT`)
    #[serde(rename = "type")]
    pub kind: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Like counter
    #[serde(default)]
    pub likes: i64,
    /// Superlike counter
    #[serde(default)]
    pub superlikes: i64,
    /// Comment counter
    #[serde(default)]
    pub comments: i64,
    /// Review counter
    #[serde(default)]
    pub reviews: i64,
    /// Creation time
    #[serde(with = "layout")]
    pub created_at: DateTime<Utc>,
    /// Last modification time
    #[serde(with = "layout")]
    pub last_updated: DateTime<Utc>,
}

impl PostMetadata {
    /// Key of the metadata row for `post_id`.
    #[must_use]
    pub fn key_for(post_id: &str) -> Key {
        Key::single("postId", post_id)
    }
}

impl Record for PostMetadata {
    const TABLE: Table = tables::POST_METADATA;
}

/// A comment on a post (detail).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// Comment identifier
    pub comment_id: String,
    /// Commented post
    pub post_id: String,
    /// Author
    pub username: String,
    /// Body
    pub content: String,
    /// Creation time
    #[serde(with = "layout")]
    pub created_at: DateTime<Utc>,
    /// Time of the last edit
    #[serde(default, with = "layout::option")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// Key of the comment `comment_id`.
    #[must_use]
    pub fn key_for(comment_id: &str) -> Key {
        Key::single("commentId", comment_id)
    }
}

impl Record for Comment {
    const TABLE: Table = tables::COMMENTS;
}

/// One user's like on a post (detail).
///
/// `name` is the liker's display name when the like was recorded; it is not
/// refreshed when the profile changes later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostLike {
    /// Liked post
    pub post_id: String,
    /// Liker
    pub username: String,
    /// Liker's display name snapshot
    pub name: String,
}

impl Record for PostLike {
    const TABLE: Table = tables::POST_LIKES;
}

/// One user's superlike on a post (detail). Same snapshot rule as [`PostLike`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSuperlike {
    /// Superliked post
    pub post_id: String,
    /// Superliker
    pub username: String,
    /// Superliker's display name snapshot
    pub name: String,
}

impl Record for PostSuperlike {
    const TABLE: Table = tables::POST_SUPERLIKES;
}

/// Composite key shared by likes and superlikes.
#[must_use]
pub fn reaction_key(post_id: &str, username: &str) -> Key {
    Key::pair("postId", post_id, "username", username)
}

/// A rated review of a post (detail).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    /// Review identifier
    pub review_id: String,
    /// Reviewed post
    pub post_id: String,
    /// Reviewer
    pub username: String,
    /// Body
    pub content: String,
    /// Rating given by the reviewer
    pub rating: i32,
    /// Creation time
    #[serde(with = "layout")]
    pub created_at: DateTime<Utc>,
}

impl Record for Review {
    const TABLE: Table = tables::REVIEWS;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use readmodels_core::store::to_attributes;

    #[test]
    fn post_metadata_uses_wire_attribute_names() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let post = PostMetadata {
            post_id: "p1".into(),
            username: "u1".into(),
            kind: "TEXT".into(),
            title: "T".into(),
            description: "D".into(),
            likes: 0,
            superlikes: 0,
            comments: 0,
            reviews: 0,
            created_at: at,
            last_updated: at,
        };

        let row = to_attributes(&post).unwrap();

        assert_eq!(row["postId"], "p1");
        assert_eq!(row["type"], "TEXT");
        assert_eq!(row["createdAt"], "2024-01-01T00:00:00.000000000Z");
        assert_eq!(post.key().unwrap(), PostMetadata::key_for("p1"));
    }

    #[test]
    fn like_key_is_composite() {
        let like = PostLike {
            post_id: "p1".into(),
            username: "u1".into(),
            name: "N1".into(),
        };
        assert_eq!(like.key().unwrap(), reaction_key("p1", "u1"));
    }

    #[test]
    fn profile_counters_default_to_zero() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"username": "u1", "name": "N1"}"#).unwrap();
        assert_eq!((profile.followers, profile.followees, profile.posts), (0, 0, 0));
        assert_eq!(profile.bio, "");
    }

    #[test]
    fn comment_without_edit_has_no_updated_at() {
        let comment: Comment = serde_json::from_str(
            r#"{"commentId": "c1", "postId": "p1", "username": "u1", "content": "hi",
                "createdAt": "2024-01-01T00:00:00.000000000Z"}"#,
        )
        .unwrap();
        assert_eq!(comment.updated_at, None);
    }
}
