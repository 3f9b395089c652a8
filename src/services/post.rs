//! Post service
//!
//! Posts are written by one user and carry a set of tags. Only the author
//! may edit or delete a post through the public routes; administrators
//! delete through [`PostService::admin_delete`].

use crate::db::repositories::{PostRepository, UserRepository};
use crate::models::{
    AuthorSummary, CreatePostInput, ListParams, PagedResult, Post, PostQuery, PostScope,
    PostWithMeta, UpdatePostInput,
};
use crate::services::tag::{TagService, TagServiceError};
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Longest accepted post title
pub const MAX_TITLE_LENGTH: usize = 128;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("{0}")]
    NotFound(String),

    /// The caller is not the author
    #[error("{0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for PostServiceError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(msg) => Self::NotFound(msg),
            TagServiceError::ValidationError(msg) | TagServiceError::Conflict(msg) => {
                Self::ValidationError(msg)
            }
            TagServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Values that prefill the post editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostEditForm {
    pub title: String,
    pub content: String,
    /// Tag names joined with ", "
    pub tags: String,
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    tags: Arc<TagService>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        tags: Arc<TagService>,
    ) -> Self {
        Self {
            repo,
            user_repo,
            tags,
        }
    }

    /// A post with its author and tags
    pub async fn get(&self, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let post = self.require(id).await?;
        self.with_meta(post, &mut HashMap::new()).await
    }

    pub async fn create(
        &self,
        author_id: i64,
        input: CreatePostInput,
    ) -> Result<PostWithMeta, PostServiceError> {
        let title = validate_title(&input.title)?;
        let tags = self.tags.make_tags(&input.tags).await?;

        let post = self
            .repo
            .create(&Post::new(title, input.content, author_id))
            .await
            .context("Failed to create post")?;
        self.tags.set_post_tags(post.id, &tags).await?;

        tracing::info!("User {} created post {}", author_id, post.id);
        self.with_meta(post, &mut HashMap::new()).await
    }

    /// Editor prefill for the author
    pub async fn edit_prefill(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<PostEditForm, PostServiceError> {
        let post = self.require_authored(user_id, id).await?;
        let tags = self.tags.get_by_post(post.id).await?;
        Ok(PostEditForm {
            title: post.title,
            content: post.content,
            tags: tags
                .iter()
                .map(|t| t.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    /// Replace title, content and the whole tag set
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<PostWithMeta, PostServiceError> {
        let mut post = self.require_authored(user_id, id).await?;
        post.title = validate_title(&input.title)?;
        post.content = input.content;

        let tags = self.tags.make_tags(&input.tags).await?;
        let post = self
            .repo
            .update(&post)
            .await
            .context("Failed to update post")?;
        self.tags.set_post_tags(post.id, &tags).await?;

        self.with_meta(post, &mut HashMap::new()).await
    }

    /// Delete a post as its author
    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), PostServiceError> {
        self.require_authored(user_id, id).await?;
        self.repo.delete(id).await.context("Failed to delete post")?;
        tracing::info!("User {} deleted post {}", user_id, id);
        Ok(())
    }

    /// Delete any post
    pub async fn admin_delete(&self, id: i64) -> Result<(), PostServiceError> {
        self.require(id).await?;
        self.repo.delete(id).await.context("Failed to delete post")?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, PostServiceError> {
        Ok(self.repo.count().await.context("Failed to count posts")?)
    }

    /// One page of a listing, newest first.
    ///
    /// A page past the end is not found, except the first page of an empty
    /// listing.
    pub async fn list(
        &self,
        query: &PostQuery,
        params: &ListParams,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        if let PostScope::Tag(tag_id) = query.scope {
            if self.tags.get_by_id(tag_id).await?.is_none() {
                return Err(PostServiceError::NotFound(format!("Tag {} not found", tag_id)));
            }
        }

        let (posts, total) = self
            .repo
            .list(query, params)
            .await
            .context("Failed to list posts")?;
        if posts.is_empty() && params.page > 1 {
            return Err(PostServiceError::NotFound(format!(
                "Page {} not found",
                params.page
            )));
        }

        let mut authors = HashMap::new();
        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            items.push(self.with_meta(post, &mut authors).await?);
        }
        Ok(PagedResult::new(items, total, params))
    }

    async fn require(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Post {} not found", id)))
    }

    async fn require_authored(&self, user_id: i64, id: i64) -> Result<Post, PostServiceError> {
        let post = self.require(id).await?;
        if !post.is_authored_by(user_id) {
            return Err(PostServiceError::Forbidden(
                "You can only change your own posts".to_string(),
            ));
        }
        Ok(post)
    }

    /// Attach author and tags; `authors` caches lookups within one listing
    async fn with_meta(
        &self,
        post: Post,
        authors: &mut HashMap<i64, AuthorSummary>,
    ) -> Result<PostWithMeta, PostServiceError> {
        let author = match authors.get(&post.user_id) {
            Some(author) => author.clone(),
            None => {
                let user = self
                    .user_repo
                    .get_by_id(post.user_id)
                    .await
                    .context("Failed to get post author")?
                    .ok_or_else(|| anyhow!("Author {} of post {} is missing", post.user_id, post.id))?;
                let author = AuthorSummary {
                    id: user.id,
                    username: user.username,
                    image_file: user.image_file,
                };
                authors.insert(author.id, author.clone());
                author
            }
        };
        let tags = self.tags.get_by_post(post.id).await?;
        Ok(PostWithMeta { post, author, tags })
    }
}

fn validate_title(title: &str) -> Result<String, PostServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(PostServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxPostRepository, SqlxTagRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};

    async fn setup_test_service() -> (DynDatabasePool, PostService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for (id, name) in [(1, "ana"), (2, "bob")] {
            pool.execute(&format!(
                "INSERT INTO users (id, username, email, password_hash) VALUES ({id}, '{name}', '{name}@example.com', 'h')"
            ))
            .await
            .expect("Failed to create test user");
        }
        let tags = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone())));
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            tags,
        );
        (pool, service)
    }

    fn input(title: &str, tags: &[&str]) -> CreatePostInput {
        CreatePostInput {
            title: title.to_string(),
            content: format!("About {}", title),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_with_meta() {
        let (_pool, service) = setup_test_service().await;
        let created = service.create(1, input("Hello", &["rust", "web"])).await.unwrap();

        let fetched = service.get(created.post.id).await.unwrap();
        assert_eq!(fetched.post.title, "Hello");
        assert_eq!(fetched.author.username, "ana");
        let names: Vec<_> = fetched.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["rust", "web"]);
    }

    #[tokio::test]
    async fn test_create_validates_title() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.create(1, input("   ", &[])).await,
            Err(PostServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(1, input(&"t".repeat(129), &[])).await,
            Err(PostServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_edit_prefill_joins_tags() {
        let (_pool, service) = setup_test_service().await;
        let created = service.create(1, input("Hello", &["web", "rust"])).await.unwrap();

        let form = service.edit_prefill(1, created.post.id).await.unwrap();
        assert_eq!(form.title, "Hello");
        assert_eq!(form.tags, "rust, web");
    }

    #[tokio::test]
    async fn test_only_author_may_change_post() {
        let (_pool, service) = setup_test_service().await;
        let id = service.create(1, input("Mine", &[])).await.unwrap().post.id;

        let update = UpdatePostInput {
            title: "Stolen".into(),
            content: "x".into(),
            tags: vec![],
        };
        assert!(matches!(service.update(2, id, update).await, Err(PostServiceError::Forbidden(_))));
        assert!(matches!(service.edit_prefill(2, id).await, Err(PostServiceError::Forbidden(_))));
        assert!(matches!(service.delete(2, id).await, Err(PostServiceError::Forbidden(_))));

        service.delete(1, id).await.unwrap();
        assert!(matches!(service.get(id).await, Err(PostServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_replaces_tag_set() {
        let (_pool, service) = setup_test_service().await;
        let id = service.create(1, input("Post", &["a", "b"])).await.unwrap().post.id;

        let updated = service
            .update(
                1,
                id,
                UpdatePostInput {
                    title: "Post v2".into(),
                    content: "new".into(),
                    tags: vec!["b".into(), "c".into()],
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.post.title, "Post v2");
        let names: Vec<_> = updated.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_list_pages_and_missing_pages() {
        let (_pool, service) = setup_test_service().await;
        for i in 0..3 {
            service.create(1 + i % 2, input(&format!("p{}", i), &[])).await.unwrap();
        }
        let query = PostQuery::new(PostScope::All);

        let first = service.list(&query, &ListParams::new(1, 2)).await.unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        assert!(first.has_next());

        assert!(matches!(
            service.list(&query, &ListParams::new(3, 2)).await,
            Err(PostServiceError::NotFound(_))
        ));

        // An empty listing still has a first page
        let empty = service
            .list(&PostQuery::new(PostScope::Author(99)), &ListParams::new(1, 2))
            .await
            .unwrap();
        assert_eq!(empty.total, 0);
    }

    #[tokio::test]
    async fn test_list_by_missing_tag() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.list(&PostQuery::new(PostScope::Tag(5)), &ListParams::default()).await,
            Err(PostServiceError::NotFound(_))
        ));
    }
}
