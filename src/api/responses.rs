//! Shared API response types
//!
//! Account and profile views reused across the auth, users and admin
//! endpoints.

use serde::Serialize;

use crate::models::User;
use crate::services::FollowCounts;

/// Full account view, shown to its owner and to administrators
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub about_me: Option<String>,
    pub image_file: String,
    pub avatar_url: String,
    pub last_seen: String,
    pub created_at: String,
    pub roles: Vec<String>,
}

impl AccountResponse {
    pub fn new(user: User, roles: Vec<String>) -> Self {
        Self {
            avatar_url: user.avatar_url(),
            last_seen: user.last_seen.to_rfc3339(),
            created_at: user.created_at.to_rfc3339(),
            id: user.id,
            username: user.username,
            email: user.email,
            about_me: user.about_me,
            image_file: user.image_file,
            roles,
        }
    }
}

/// Public profile of a user
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub username: String,
    pub about_me: Option<String>,
    pub avatar_url: String,
    pub last_seen: String,
    pub followers: i64,
    pub following: i64,
    /// Whether the viewer follows this user
    pub is_following: bool,
    /// Whether the viewer is this user
    pub is_self: bool,
}

impl ProfileResponse {
    pub fn new(user: User, counts: FollowCounts, is_following: bool, is_self: bool) -> Self {
        Self {
            avatar_url: user.avatar_url(),
            last_seen: user.last_seen.to_rfc3339(),
            username: user.username,
            about_me: user.about_me,
            followers: counts.followers,
            following: counts.following,
            is_following,
            is_self,
        }
    }
}

/// Successful login or registration
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub next: String,
    pub user: AccountResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
