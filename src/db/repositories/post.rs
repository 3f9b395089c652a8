//! Post repository
//!
//! Listings are built from a [`PostQuery`]: a scope (everything, one
//! author, one tag, or a user's feed) plus an optional substring search on
//! title and content. Results are ordered newest first.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, Post, PostQuery, PostScope};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Update title and content
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post; its tag links go with it
    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// One page of a listing plus the total number of matches
    async fn list(&self, query: &PostQuery, params: &ListParams) -> Result<(Vec<Post>, i64)>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let sql = "INSERT INTO posts (title, content, date, user_id) VALUES (?, ?, ?, ?)";
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(post.date)
                .bind(post.user_id)
                .execute(pool)
                .await
                .context("Failed to create post")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(post.date)
                .bind(post.user_id)
                .execute(pool)
                .await
                .context("Failed to create post")?
                .last_insert_id() as i64,
        };
        Ok(Post { id, ..post.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_post_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_post_by_id_mysql(pool, id).await,
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let sql = "UPDATE posts SET title = ?, content = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&post.title)
                    .bind(&post.content)
                    .bind(post.id)
                    .execute(pool)
                    .await
                    .context("Failed to update post")?;
                get_post_by_id_sqlite(pool, post.id).await?
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&post.title)
                    .bind(&post.content)
                    .bind(post.id)
                    .execute(pool)
                    .await
                    .context("Failed to update post")?;
                get_post_by_id_mysql(pool, post.id).await?
            }
        }
        .ok_or_else(|| anyhow::anyhow!("Post not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM posts WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete post")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete post")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM posts";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count posts")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count posts")?
                .get("count"),
        };
        Ok(count)
    }

    async fn list(&self, query: &PostQuery, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        let filter = PostFilter::from_query(query);
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_posts_sqlite(pool, &filter, params).await,
            Backend::Mysql(pool) => list_posts_mysql(pool, &filter, params).await,
        }
    }
}

/// A bound value of a listing filter
#[derive(Debug, Clone, PartialEq)]
enum FilterArg {
    Int(i64),
    Text(String),
}

/// WHERE clause and its arguments for a listing, shared by both backends
#[derive(Debug)]
struct PostFilter {
    clause: String,
    args: Vec<FilterArg>,
}

impl PostFilter {
    fn from_query(query: &PostQuery) -> Self {
        let mut conditions = Vec::new();
        let mut args = Vec::new();

        match query.scope {
            PostScope::All => {}
            PostScope::Author(user_id) => {
                conditions.push("p.user_id = ?".to_string());
                args.push(FilterArg::Int(user_id));
            }
            PostScope::Tag(tag_id) => {
                conditions.push(
                    "p.id IN (SELECT post_id FROM post_tags WHERE tag_id = ?)".to_string(),
                );
                args.push(FilterArg::Int(tag_id));
            }
            PostScope::Feed(user_id) => {
                conditions.push(
                    "(p.user_id = ? OR p.user_id IN (SELECT followed_id FROM followers WHERE follower_id = ?))"
                        .to_string(),
                );
                args.push(FilterArg::Int(user_id));
                args.push(FilterArg::Int(user_id));
            }
        }

        if let Some(search) = &query.search {
            let pattern = format!("%{}%", escape_like(search));
            conditions.push(
                "(p.title LIKE ? ESCAPE '!' OR p.content LIKE ? ESCAPE '!')".to_string(),
            );
            args.push(FilterArg::Text(pattern.clone()));
            args.push(FilterArg::Text(pattern));
        }

        let clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        Self { clause, args }
    }
}

/// Escape LIKE wildcards so a search term matches literally (escape char `!`)
fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '!' | '%' | '_') {
            out.push('!');
        }
        out.push(c);
    }
    out
}

const POST_COLUMNS: &str = "p.id, p.title, p.content, p.date, p.user_id";

// ============================================================================
// SQLite implementations
// ============================================================================

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.map(|row| row_to_post_sqlite(&row)).transpose()
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    filter: &PostFilter,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let count_sql = format!("SELECT COUNT(*) as count FROM posts p {}", filter.clause);
    let mut count_query = sqlx::query(&count_sql);
    for arg in &filter.args {
        count_query = match arg {
            FilterArg::Int(v) => count_query.bind(*v),
            FilterArg::Text(v) => count_query.bind(v.as_str()),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM posts p {} ORDER BY p.date DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, filter.clause
    );
    let mut list_query = sqlx::query(&list_sql);
    for arg in &filter.args {
        list_query = match arg {
            FilterArg::Int(v) => list_query.bind(*v),
            FilterArg::Text(v) => list_query.bind(v.as_str()),
        };
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows
        .iter()
        .map(row_to_post_sqlite)
        .collect::<Result<Vec<_>>>()?;
    Ok((posts, total))
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        date: row.try_get("date")?,
        user_id: row.try_get("user_id")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    row.map(|row| row_to_post_mysql(&row)).transpose()
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    filter: &PostFilter,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let count_sql = format!("SELECT COUNT(*) as count FROM posts p {}", filter.clause);
    let mut count_query = sqlx::query(&count_sql);
    for arg in &filter.args {
        count_query = match arg {
            FilterArg::Int(v) => count_query.bind(*v),
            FilterArg::Text(v) => count_query.bind(v.as_str()),
        };
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    let list_sql = format!(
        "SELECT {} FROM posts p {} ORDER BY p.date DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, filter.clause
    );
    let mut list_query = sqlx::query(&list_sql);
    for arg in &filter.args {
        list_query = match arg {
            FilterArg::Int(v) => list_query.bind(*v),
            FilterArg::Text(v) => list_query.bind(v.as_str()),
        };
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let posts = rows
        .iter()
        .map(row_to_post_mysql)
        .collect::<Result<Vec<_>>>()?;
    Ok((posts, total))
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        date: row.try_get("date")?,
        user_id: row.try_get("user_id")?,
    })
}
