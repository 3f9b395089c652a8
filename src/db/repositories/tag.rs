//! Tag repository
//!
//! Tags and the `post_tags` link table.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    /// Exact, case-sensitive name match
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags with the number of posts carrying each, ordered by name
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn rename(&self, id: i64, name: &str) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// Tags of a post, ordered by name
    async fn get_by_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Replace the whole tag set of a post
    async fn set_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let sql = "INSERT INTO tags (name) VALUES (?)";
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(&tag.name)
                .execute(pool)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };
        Ok(Tag {
            id,
            name: tag.name.clone(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        let sql = "SELECT id, name FROM tags WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get tag by ID")?;
                row.map(|row| row_to_tag_sqlite(&row)).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get tag by ID")?;
                row.map(|row| row_to_tag_mysql(&row)).transpose()
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, name FROM tags WHERE name = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get tag by name")?;
                row.map(|row| row_to_tag_sqlite(&row)).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get tag by name")?;
                row.map(|row| row_to_tag_mysql(&row)).transpose()
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_tags_with_counts_sqlite(pool).await,
            Backend::Mysql(pool) => list_tags_with_counts_mysql(pool).await,
        }
    }

    async fn rename(&self, id: i64, name: &str) -> Result<()> {
        let sql = "UPDATE tags SET name = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(name)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to rename tag")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(name)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to rename tag")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM tags WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete tag")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete tag")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM tags";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count tags")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count tags")?
                .get("count"),
        };
        Ok(count)
    }

    async fn get_by_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_tags_by_post_sqlite(pool, post_id).await,
            Backend::Mysql(pool) => get_tags_by_post_mysql(pool, post_id).await,
        }
    }

    async fn set_post_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => set_post_tags_sqlite(pool, post_id, tag_ids).await,
            Backend::Mysql(pool) => set_post_tags_mysql(pool, post_id, tag_ids).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_tags_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, COUNT(pt.post_id) as post_count
        FROM tags t
        LEFT JOIN post_tags pt ON pt.tag_id = t.id
        GROUP BY t.id, t.name
        ORDER BY t.name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tags")?;

    rows.iter()
        .map(|row| -> Result<TagWithCount> {
            Ok(TagWithCount {
                tag: row_to_tag_sqlite(row)?,
                post_count: row.try_get("post_count")?,
            })
        })
        .collect()
}

async fn get_tags_by_post_sqlite(pool: &SqlitePool, post_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name
        FROM tags t
        JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags by post")?;

    rows.iter().map(row_to_tag_sqlite).collect()
}

async fn set_post_tags_sqlite(pool: &SqlitePool, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to add tag to post")?;
    }

    tx.commit().await.context("Failed to commit post tags")?;
    Ok(())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_tags_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name, COUNT(pt.post_id) as post_count
        FROM tags t
        LEFT JOIN post_tags pt ON pt.tag_id = t.id
        GROUP BY t.id, t.name
        ORDER BY t.name
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to list tags")?;

    rows.iter()
        .map(|row| -> Result<TagWithCount> {
            Ok(TagWithCount {
                tag: row_to_tag_mysql(row)?,
                post_count: row.try_get("post_count")?,
            })
        })
        .collect()
}

async fn get_tags_by_post_mysql(pool: &MySqlPool, post_id: i64) -> Result<Vec<Tag>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.name
        FROM tags t
        JOIN post_tags pt ON pt.tag_id = t.id
        WHERE pt.post_id = ?
        ORDER BY t.name
        "#,
    )
    .bind(post_id)
    .fetch_all(pool)
    .await
    .context("Failed to get tags by post")?;

    rows.iter().map(row_to_tag_mysql).collect()
}

async fn set_post_tags_mysql(pool: &MySqlPool, post_id: i64, tag_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post tags")?;

    for tag_id in tag_ids {
        sqlx::query("INSERT IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(*tag_id)
            .execute(&mut *tx)
            .await
            .context("Failed to add tag to post")?;
    }

    tx.commit().await.context("Failed to commit post tags")?;
    Ok(())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, username, email, password_hash) VALUES (1, 'ana', 'ana@example.com', 'h')",
        )
        .await
        .expect("Failed to create test user");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_post(pool: &DynDatabasePool, title: &str) -> i64 {
        let result = sqlx::query("INSERT INTO posts (title, content, user_id) VALUES (?, 'body', 1)")
            .bind(title)
            .execute(pool.as_sqlite().unwrap())
            .await
            .expect("Failed to create test post");
        result.last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_find_tag() {
        let (_pool, repo) = setup_test_repo().await;

        let tag = repo.create(&Tag::new("rust")).await.unwrap();
        assert!(tag.id > 0);

        assert_eq!(repo.get_by_name("rust").await.unwrap(), Some(tag.clone()));
        assert_eq!(repo.get_by_id(tag.id).await.unwrap(), Some(tag));
        assert!(repo.get_by_name("Rust").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_tag_name_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&Tag::new("rust")).await.unwrap();
        assert!(repo.create(&Tag::new("rust")).await.is_err());
    }

    #[tokio::test]
    async fn test_set_post_tags_replaces_set() {
        let (pool, repo) = setup_test_repo().await;
        let post_id = create_test_post(&pool, "Hello").await;
        let rust = repo.create(&Tag::new("rust")).await.unwrap();
        let web = repo.create(&Tag::new("web")).await.unwrap();
        let db = repo.create(&Tag::new("db")).await.unwrap();

        repo.set_post_tags(post_id, &[rust.id, web.id]).await.unwrap();
        let names: Vec<_> = repo.get_by_post(post_id).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["rust", "web"]);

        repo.set_post_tags(post_id, &[db.id]).await.unwrap();
        let names: Vec<_> = repo.get_by_post(post_id).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["db"]);

        repo.set_post_tags(post_id, &[]).await.unwrap();
        assert!(repo.get_by_post(post_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_counts_and_rename() {
        let (pool, repo) = setup_test_repo().await;
        let first = create_test_post(&pool, "One").await;
        let second = create_test_post(&pool, "Two").await;
        let rust = repo.create(&Tag::new("rust")).await.unwrap();
        repo.create(&Tag::new("unused")).await.unwrap();

        repo.set_post_tags(first, &[rust.id]).await.unwrap();
        repo.set_post_tags(second, &[rust.id]).await.unwrap();

        let tags = repo.list_with_counts().await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag.name, "rust");
        assert_eq!(tags[0].post_count, 2);
        assert_eq!(tags[1].post_count, 0);

        repo.rename(rust.id, "rustlang").await.unwrap();
        assert!(repo.get_by_name("rustlang").await.unwrap().is_some());

        repo.delete(rust.id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_post(first).await.unwrap().is_empty());
    }
}
