//! Tag service
//!
//! Tags are free-form labels deduplicated by name. Posts receive them as a
//! comma-separated string which is split with [`parse_tags`] and resolved to
//! rows with [`TagService::make_tags`].

use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use anyhow::Context;
use std::sync::Arc;

/// Longest accepted tag name
pub const MAX_TAG_LENGTH: usize = 64;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another tag already has this name
    #[error("Tag already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Split `data` on `separator`, trim every piece, drop empty pieces and keep
/// only the first occurrence of each name.
pub fn parse_tags(data: &str, separator: char) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for piece in data.split(separator) {
        let name = piece.trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Resolve names to tags, reusing existing rows and creating the missing
    /// ones. Order follows `names`.
    pub async fn make_tags(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags = Vec::with_capacity(names.len());
        for name in names {
            let name = validate_name(name)?;
            let tag = match self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to look up tag")?
            {
                Some(existing) => existing,
                None => self
                    .repo
                    .create(&Tag::new(name))
                    .await
                    .context("Failed to create tag")?,
            };
            if !tags.iter().any(|t: &Tag| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    /// Replace the tag set of a post
    pub async fn set_post_tags(&self, post_id: i64, tags: &[Tag]) -> Result<(), TagServiceError> {
        let ids: Vec<i64> = tags.iter().map(|t| t.id).collect();
        self.repo
            .set_post_tags(post_id, &ids)
            .await
            .context("Failed to set post tags")?;
        Ok(())
    }

    pub async fn get_by_post(&self, post_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self
            .repo
            .get_by_post(post_id)
            .await
            .context("Failed to get post tags")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tag>, TagServiceError> {
        Ok(self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get tag by ID")?)
    }

    /// All tags with their post counts, ordered by name
    pub async fn list(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        Ok(self
            .repo
            .list_with_counts()
            .await
            .context("Failed to list tags")?)
    }

    pub async fn count(&self) -> Result<i64, TagServiceError> {
        Ok(self.repo.count().await.context("Failed to count tags")?)
    }

    /// Create a tag by name; an existing name is a conflict
    pub async fn create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        self.ensure_name_free(name, None).await?;
        Ok(self
            .repo
            .create(&Tag::new(name))
            .await
            .context("Failed to create tag")?)
    }

    pub async fn rename(&self, id: i64, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        self.require(id).await?;
        self.ensure_name_free(name, Some(id)).await?;
        self.repo
            .rename(id, name)
            .await
            .context("Failed to rename tag")?;
        Ok(Tag {
            id,
            name: name.to_string(),
        })
    }

    /// Delete a tag; posts keep existing without it
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        self.require(id).await?;
        self.repo.delete(id).await.context("Failed to delete tag")?;
        Ok(())
    }

    async fn require(&self, id: i64) -> Result<Tag, TagServiceError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| TagServiceError::NotFound(format!("Tag {} not found", id)))
    }

    async fn ensure_name_free(&self, name: &str, except: Option<i64>) -> Result<(), TagServiceError> {
        let existing = self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check tag name")?;
        match existing {
            Some(tag) if Some(tag.id) != except => Err(TagServiceError::Conflict(format!(
                "Tag '{}' already exists",
                name
            ))),
            _ => Ok(()),
        }
    }
}

fn validate_name(name: &str) -> Result<&str, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::ValidationError(
            "Tag name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_TAG_LENGTH {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name must be at most {} characters",
            MAX_TAG_LENGTH
        )));
    }
    Ok(name)
}
