//! Table and index declarations for the read models.

use readmodels_core::{Index, Table};

/// User profile aggregates, keyed by username.
pub const USER_PROFILE: Table = Table::new("UserProfile", &["username"]);

/// Post metadata aggregates, keyed by post id.
pub const POST_METADATA: Table = Table::new("PostMetadata", &["postId"]);

/// Comment detail records.
pub const COMMENTS: Table = Table::new("readmodels.comments", &["commentId"]);

/// Like detail records, one per (post, user).
pub const POST_LIKES: Table = Table::new("readmodels.postLikes", &["postId", "username"]);

/// Superlike detail records, one per (post, user).
pub const POST_SUPERLIKES: Table = Table::new("readmodels.postSuperlikes", &["postId", "username"]);

/// Review detail records.
pub const REVIEWS: Table = Table::new("readmodels.reviews", &["reviewId"]);

/// Posts of one user, oldest first.
pub const POSTS_BY_USER: Index = Index::new("username-createdAt-index", "username", "createdAt");

/// Comments of one post, oldest first.
pub const COMMENTS_BY_POST: Index = Index::new("postId-createdAt-index", "postId", "createdAt");

/// Likes and superlikes of one post, by username.
pub const REACTIONS_BY_POST: Index = Index::new("postId-username-index", "postId", "username");

/// Reviews of one post, oldest first.
pub const REVIEWS_BY_POST: Index = Index::new("postId-createdAt-index", "postId", "createdAt");

/// Counter attributes on aggregates.
pub mod counters {
    /// `UserProfile.followers`
    pub const FOLLOWERS: &str = "followers";
    /// `UserProfile.followees`
    pub const FOLLOWEES: &str = "followees";
    /// `UserProfile.posts`
    pub const POSTS: &str = "posts";
    /// `PostMetadata.likes`
    pub const LIKES: &str = "likes";
    /// `PostMetadata.superlikes`
    pub const SUPERLIKES: &str = "superlikes";
    /// `PostMetadata.comments`
    pub const COMMENTS: &str = "comments";
    /// `PostMetadata.reviews`
    pub const REVIEWS: &str = "reviews";
}
