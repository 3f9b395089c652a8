//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Tag;

/// A blog post. Every post has exactly one author (`user_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    /// At most 128 characters
    pub title: String,
    pub content: String,
    /// Publication time
    pub date: DateTime<Utc>,
    pub user_id: i64,
}

impl Post {
    pub fn new(title: String, content: String, user_id: i64) -> Self {
        Self {
            id: 0,
            title,
            content,
            date: Utc::now(),
            user_id,
        }
    }

    pub fn is_authored_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

/// Minimal author details shown next to a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub image_file: String,
}

/// A post with its author and tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author: AuthorSummary,
    pub tags: Vec<Tag>,
}

/// Which posts a listing covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostScope {
    /// Every post
    All,
    /// Posts written by one user
    Author(i64),
    /// Posts carrying one tag
    Tag(i64),
    /// Posts by the users someone follows, plus their own
    Feed(i64),
}

/// Listing filter: a scope plus an optional title/content search
#[derive(Debug, Clone)]
pub struct PostQuery {
    pub scope: PostScope,
    pub search: Option<String>,
}

impl PostQuery {
    pub fn new(scope: PostScope) -> Self {
        Self {
            scope,
            search: None,
        }
    }

    /// Attach a search term; blank terms are ignored
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }
}

/// Input for creating a post
#[derive(Debug, Clone)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    /// Tag names, already split and deduplicated
    pub tags: Vec<String>,
}

/// Input for replacing a post's editable fields
#[derive(Debug, Clone)]
pub struct UpdatePostInput {
    pub title: String,
    pub content: String,
    /// The complete new tag set
    pub tags: Vec<String>,
}
