//! Typed domain events consumed by the projections.
//!
//! Payloads are camelCase JSON. Timestamps stay raw strings here; handlers
//! parse them with [`crate::timestamp::parse`] so a bad layout is reported as
//! [`readmodels_core::DropReason::InvalidTimestamp`] rather than a shape error.

use readmodels_core::Event;
use serde::{Deserialize, Serialize};

macro_rules! event_type {
    ($event:ty, $name:literal) => {
        impl Event for $event {
            const EVENT_TYPE: &'static str = $name;
        }
    };
}

/// A user account was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWasRegistered {
    /// New username
    pub username: String,
    /// Display name
    pub name: String,
    /// Optional biography
    #[serde(default)]
    pub bio: Option<String>,
    /// Optional personal link
    #[serde(default)]
    pub link: Option<String>,
}

/// Some profile fields changed. Absent fields are left untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileUpdated {
    /// Updated user
    pub username: String,
    /// New display name
    #[serde(default)]
    pub name: Option<String>,
    /// New biography
    #[serde(default)]
    pub bio: Option<String>,
    /// New link
    #[serde(default)]
    pub link: Option<String>,
}

/// `user_a` started following `user_b`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAFollowedUserB {
    /// Follower
    #[serde(rename = "userA")]
    pub user_a: String,
    /// Followee
    #[serde(rename = "userB")]
    pub user_b: String,
}

/// `user_a` stopped following `user_b`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAUnfollowedUserB {
    /// Former follower
    #[serde(rename = "userA")]
    pub user_a: String,
    /// Former followee
    #[serde(rename = "userB")]
    pub user_b: String,
}

/// Header fields of a new post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetadataPayload {
    /// Owner
    pub username: String,
    /// Post kind
    #[serde(rename = "type")]
    pub kind: String,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Creation time (fixed layout)
    pub created_at: String,
    /// Last modification time (fixed layout)
    pub last_updated: String,
}

/// A post was published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWasCreated {
    /// Post identifier
    pub post_id: String,
    /// Header fields
    pub metadata: PostMetadataPayload,
}

/// Several posts of one user were deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsWereDeleted {
    /// Owner of every deleted post
    pub username: String,
    /// Deleted post identifiers
    pub post_ids: Vec<String>,
}

/// A comment was written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWasCreated {
    /// Comment identifier
    pub comment_id: String,
    /// Commented post
    pub post_id: String,
    /// Author
    pub username: String,
    /// Body
    pub content: String,
    /// Creation time (fixed layout)
    pub created_at: String,
}

/// A comment was edited.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWasUpdated {
    /// Comment identifier
    pub comment_id: String,
    /// New body
    pub content: String,
    /// Edit time (fixed layout)
    pub updated_at: String,
}

/// A comment was deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentWasDeleted {
    /// Comment identifier
    pub comment_id: String,
    /// Post the comment belonged to
    pub post_id: String,
}

/// A user reaction (like, unlike, superlike, unsuperlike) on a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostReaction {
    /// Reacting user
    pub username: String,
    /// Target post
    pub post_id: String,
}

/// A user liked a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserLikedPost(pub PostReaction);

/// A user withdrew a like.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserUnlikedPost(pub PostReaction);

/// A user superliked a post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserSuperlikedPost(pub PostReaction);

/// A user withdrew a superlike.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserUnsuperlikedPost(pub PostReaction);

/// A review was posted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewWasCreated {
    /// Review identifier
    pub review_id: String,
    /// Reviewed post
    pub post_id: String,
    /// Reviewer
    pub username: String,
    /// Body
    pub content: String,
    /// Rating
    pub rating: i32,
    /// Creation time (fixed layout)
    pub created_at: String,
}

event_type!(UserWasRegistered, "UserWasRegistered");
event_type!(UserProfileUpdated, "UserProfileUpdated");
event_type!(UserAFollowedUserB, "UserAFollowedUserB");
event_type!(UserAUnfollowedUserB, "UserAUnfollowedUserB");
event_type!(PostWasCreated, "PostWasCreated");
event_type!(PostsWereDeleted, "PostsWereDeleted");
event_type!(CommentWasCreated, "CommentWasCreated");
event_type!(CommentWasUpdated, "CommentWasUpdated");
event_type!(CommentWasDeleted, "CommentWasDeleted");
event_type!(UserLikedPost, "UserLikedPost");
event_type!(UserUnlikedPost, "UserUnlikedPost");
event_type!(UserSuperlikedPost, "UserSuperlikedPost");
event_type!(UserUnsuperlikedPost, "UserUnsuperlikedPost");
event_type!(ReviewWasCreated, "ReviewWasCreated");

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn post_was_created_reads_nested_metadata() {
        let payload = br#"{"postId": "p1", "metadata": {"username": "u1", "type": "TEXT",
            "title": "T", "description": "D",
            "createdAt": "2024-01-01T00:00:00.000000000Z",
            "lastUpdated": "2024-01-01T00:00:00.000000000Z"}}"#;

        let event = PostWasCreated::from_bytes(payload).unwrap();

        assert_eq!(event.post_id, "p1");
        assert_eq!(event.metadata.kind, "TEXT");
    }

    #[test]
    fn reactions_share_one_flat_shape() {
        let like = UserLikedPost::from_bytes(br#"{"username": "u1", "postId": "p1"}"#).unwrap();
        assert_eq!(like.0.post_id, "p1");
        assert_eq!(
            String::from_utf8(like.to_bytes().unwrap()).unwrap(),
            r#"{"username":"u1","postId":"p1"}"#
        );
    }

    #[test]
    fn follow_uses_user_a_and_user_b() {
        let follow = UserAFollowedUserB::from_bytes(br#"{"userA": "a", "userB": "b"}"#).unwrap();
        assert_eq!((follow.user_a.as_str(), follow.user_b.as_str()), ("a", "b"));
    }

    #[test]
    fn missing_fields_fail_to_decode() {
        assert!(CommentWasDeleted::from_bytes(br#"{"commentId": "c1"}"#).is_err());
        assert!(UserWasRegistered::from_bytes(b"not json").is_err());
    }
}
