//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image assigned to every account until a picture is uploaded
pub const DEFAULT_IMAGE: &str = "default.jpg";

/// Public path under which profile pictures are served
pub const PROFILE_PICS_URL: &str = "/static/images/profile_pics";

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique, at most 32 characters
    pub username: String,
    /// Unique, at most 128 characters
    pub email: String,
    /// File name of the profile picture inside the upload directory
    pub image_file: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub about_me: Option<String>,
    /// Refreshed on every authenticated request
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Build a not-yet-persisted user.
    ///
    /// The password must already be hashed with `services::password::hash_password`.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            image_file: DEFAULT_IMAGE.to_string(),
            password_hash,
            about_me: None,
            last_seen: now,
            created_at: now,
        }
    }

    /// Public URL of the profile picture
    pub fn avatar_url(&self) -> String {
        format!("{}/{}", PROFILE_PICS_URL, self.image_file)
    }

    pub fn has_default_image(&self) -> bool {
        self.image_file == DEFAULT_IMAGE
    }
}

/// Changes applied by the profile form. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub about_me: Option<String>,
    pub image_file: Option<String>,
}

/// Changes an administrator may apply to any account
#[derive(Debug, Clone, Default)]
pub struct AdminUpdateUserInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub about_me: Option<String>,
    /// Replaces the whole role set when present
    pub roles: Option<Vec<String>>,
}
