//! Follow repository
//!
//! The self-referential `followers` relation: `follower_id` follows
//! `followed_id`.

use crate::db::{Backend, DynDatabasePool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// Record that `follower_id` follows `followed_id`.
    /// Returns false when the edge already existed.
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// Remove the edge. Returns false when there was nothing to remove.
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool>;

    /// How many users follow `user_id`
    async fn count_followers(&self, user_id: i64) -> Result<i64>;

    /// How many users `user_id` follows
    async fn count_following(&self, user_id: i64) -> Result<i64>;
}

/// SQLx-based follow repository implementation
pub struct SqlxFollowRepository {
    pool: DynDatabasePool,
}

impl SqlxFollowRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FollowRepository> {
        Arc::new(Self::new(pool))
    }

    async fn count_where(&self, column: &str, user_id: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) as count FROM followers WHERE {} = ?", column);
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count follows")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(&sql)
                .bind(user_id)
                .fetch_one(pool)
                .await
                .context("Failed to count follows")?
                .get("count"),
        };
        Ok(count)
    }
}

#[async_trait]
impl FollowRepository for SqlxFollowRepository {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let now = Utc::now();
        let inserted = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(
                "INSERT OR IGNORE INTO followers (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(follower_id)
            .bind(followed_id)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to follow user")?
            .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(
                "INSERT IGNORE INTO followers (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
            )
            .bind(follower_id)
            .bind(followed_id)
            .bind(now)
            .execute(pool)
            .await
            .context("Failed to follow user")?
            .rows_affected(),
        };
        Ok(inserted > 0)
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let sql = "DELETE FROM followers WHERE follower_id = ? AND followed_id = ?";
        let removed = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .execute(pool)
                .await
                .context("Failed to unfollow user")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .execute(pool)
                .await
                .context("Failed to unfollow user")?
                .rows_affected(),
        };
        Ok(removed > 0)
    }

    async fn is_following(&self, follower_id: i64, followed_id: i64) -> Result<bool> {
        let sql =
            "SELECT COUNT(*) as count FROM followers WHERE follower_id = ? AND followed_id = ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .fetch_one(pool)
                .await
                .context("Failed to check follow")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(follower_id)
                .bind(followed_id)
                .fetch_one(pool)
                .await
                .context("Failed to check follow")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn count_followers(&self, user_id: i64) -> Result<i64> {
        self.count_where("followed_id", user_id).await
    }

    async fn count_following(&self, user_id: i64) -> Result<i64> {
        self.count_where("follower_id", user_id).await
    }
}
