use crate::models::UserProfile;
use crate::tables::{USER_PROFILE, counters};
use readmodels_core::store::{Result, to_attributes};
use readmodels_core::{AggregateStore, AggregateStoreExt};
use serde::Serialize;
use std::sync::Arc;

/// Partial profile update; only present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileChanges {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New biography
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// New link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl ProfileChanges {
    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.link.is_none()
    }
}

/// Repository for [`UserProfile`] aggregates and their follow counters.
#[derive(Clone)]
pub struct UserProfileRepository {
    store: Arc<dyn AggregateStore>,
}

impl UserProfileRepository {
    /// Create a repository over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn AggregateStore>) -> Self {
        Self { store }
    }

    /// Write a new profile.
    ///
    /// # Errors
    ///
    /// Returns the store error if the insert fails.
    pub async fn create_user_profile(&self, profile: &UserProfile) -> Result<()> {
        match self.store.insert_record(profile).await {
            Ok(()) => {
                tracing::info!(username = %profile.username, "User profile created");
                Ok(())
            }
            Err(e) => {
                tracing::error!(username = %profile.username, error = %e, "Failed to create user profile");
                Err(e)
            }
        }
    }

    /// Overwrite the fields present in `changes`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not exist, or the store error.
    pub async fn update_user_profile(&self, username: &str, changes: &ProfileChanges) -> Result<()> {
        if changes.is_empty() {
            tracing::debug!(username, "Profile update carries no changes");
            return Ok(());
        }
        let result = async {
            let attributes = to_attributes(changes)?;
            self.store
                .update(USER_PROFILE, &UserProfile::key_for(username), attributes)
                .await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(username, "User profile updated"),
            Err(e) => tracing::error!(username, error = %e, "Failed to update user profile"),
        }
        result
    }

    /// Fetch a profile.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the profile does not exist, or the store error.
    pub async fn get_user_profile(&self, username: &str) -> Result<UserProfile> {
        self.store.get_record(&UserProfile::key_for(username)).await
    }

    /// `follower` now follows `followee`.
    ///
    /// Two independent counter calls: the followee's `followers` first, then
    /// the follower's `followees`. A failure of the first skips the second.
    ///
    /// # Errors
    ///
    /// Returns the first failing store error.
    pub async fn follow(&self, follower: &str, followee: &str) -> Result<()> {
        self.adjust_follow_counters(follower, followee, 1).await
    }

    /// `follower` no longer follows `followee`. Mirror of [`Self::follow`].
    ///
    /// # Errors
    ///
    /// Returns the first failing store error.
    pub async fn unfollow(&self, follower: &str, followee: &str) -> Result<()> {
        self.adjust_follow_counters(follower, followee, -1).await
    }

    async fn adjust_follow_counters(&self, follower: &str, followee: &str, delta: i64) -> Result<()> {
        let result = async {
            self.store
                .increment_counter(
                    USER_PROFILE,
                    &UserProfile::key_for(followee),
                    counters::FOLLOWERS,
                    delta,
                )
                .await?;
            self.store
                .increment_counter(
                    USER_PROFILE,
                    &UserProfile::key_for(follower),
                    counters::FOLLOWEES,
                    delta,
                )
                .await
        }
        .await;

        match &result {
            Ok(()) => tracing::info!(follower, followee, delta, "Follow counters updated"),
            Err(e) => tracing::error!(follower, followee, delta, error = %e, "Failed to update follow counters"),
        }
        result
    }
}
