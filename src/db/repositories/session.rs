//! Session repository
//!
//! Login sessions keyed by the random token stored in the `session` cookie.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user (password reset signs out everywhere)
    async fn delete_by_user(&self, user_id: i64) -> Result<()>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    /// Run a single-parameter statement on whichever backend is configured
    async fn execute_with(&self, sql: &str, value: &str, what: &str) -> Result<u64> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(value)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to {}", what))?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(value)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to {}", what))?
                .rows_affected(),
        };
        Ok(affected)
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_session_sqlite(pool, session).await,
            Backend::Mysql(pool) => create_session_mysql(pool, session).await,
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_session_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_session_by_id_mysql(pool, id).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.execute_with("DELETE FROM sessions WHERE id = ?", id, "delete session")
            .await?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<()> {
        let sql = "DELETE FROM sessions WHERE user_id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(user_id)
                    .execute(pool)
                    .await
                    .context("Failed to delete sessions by user")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(user_id)
                    .execute(pool)
                    .await
                    .context("Failed to delete sessions by user")?;
            }
        }
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let sql = "DELETE FROM sessions WHERE expires_at < ?";
        let now = Utc::now();
        let removed = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(now)
                .execute(pool)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected(),
        };
        Ok(removed)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.map(|row| -> Result<Session> {
        Ok(Session {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .transpose()
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query("INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
        .bind(&session.id)
        .bind(session.user_id)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(pool)
        .await
        .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query("SELECT id, user_id, expires_at, created_at FROM sessions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get session by ID")?;

    row.map(|row| -> Result<Session> {
        Ok(Session {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> SqlxSessionRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (id, username, email, password_hash) VALUES (1, 'ana', 'ana@example.com', 'h')",
        )
        .await
        .expect("Failed to create test user");
        SqlxSessionRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let repo = setup_test_repo().await;
        let session = Session::new(1, Duration::days(1));

        repo.create(&session).await.expect("Failed to create session");

        let found = repo.get_by_id(&session.id).await.unwrap().unwrap();
        assert_eq!(found.user_id, 1);
        assert!(!found.is_expired());
        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_delete_by_user() {
        let repo = setup_test_repo().await;
        let first = Session::new(1, Duration::days(1));
        let second = Session::new(1, Duration::days(1));
        repo.create(&first).await.unwrap();
        repo.create(&second).await.unwrap();

        repo.delete(&first.id).await.unwrap();
        assert!(repo.get_by_id(&first.id).await.unwrap().is_none());
        assert!(repo.get_by_id(&second.id).await.unwrap().is_some());

        repo.delete_by_user(1).await.unwrap();
        assert!(repo.get_by_id(&second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let repo = setup_test_repo().await;
        let live = Session::new(1, Duration::days(1));
        let stale = Session::new(1, Duration::seconds(-60));
        repo.create(&live).await.unwrap();
        repo.create(&stale).await.unwrap();

        let removed = repo.delete_expired().await.unwrap();

        assert_eq!(removed, 1);
        assert!(repo.get_by_id(&live.id).await.unwrap().is_some());
    }
}
