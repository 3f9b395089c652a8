//! Role model
//!
//! Roles are attached to users many-to-many. Three are well known: `Admin`
//! opens the back office, `Student` is granted on account activation.

use serde::{Deserialize, Serialize};

pub const ADMIN: &str = "Admin";
pub const TUTOR: &str = "Tutor";
pub const STUDENT: &str = "Student";

/// Longest accepted role name
pub const MAX_ROLE_LENGTH: usize = 64;

/// The roles `create-roles` installs, with their descriptions.
pub const DEFAULT_ROLES: &[(&str, &str)] = &[
    (ADMIN, "Site administrator"),
    (
        TUTOR,
        "Can all that can student plus creating and editing posts",
    ),
    (STUDENT, "Can read posts, leave comments, send messages"),
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: i64,
    /// Unique, at most 64 characters
    pub name: String,
    pub description: String,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            description: description.into(),
        }
    }
}
