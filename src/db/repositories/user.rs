//! User repository
//!
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ListParams, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, image_file, password_hash, about_me, last_seen, created_at";

/// Unique keys a user can be fetched by
#[derive(Clone, Copy)]
enum Lookup<'a> {
    Id(i64),
    Username(&'a str),
    Email(&'a str),
}

impl Lookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            Lookup::Id(_) => "id",
            Lookup::Username(_) => "username",
            Lookup::Email(_) => "email",
        }
    }
}

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user and return it with its new ID
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every column of `user`
    async fn update(&self, user: &User) -> Result<User>;

    /// Record activity without touching the rest of the row
    async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// List users by ID with pagination, returning the page and the total
    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => create_user_mysql(pool, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, Lookup::Id(id)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, Lookup::Id(id)).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, Lookup::Username(username)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, Lookup::Username(username)).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_sqlite(pool, Lookup::Email(email)).await,
            Backend::Mysql(pool) => get_user_mysql(pool, Lookup::Email(email)).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_user_sqlite(pool, user).await,
            Backend::Mysql(pool) => update_user_mysql(pool, user).await,
        }
    }

    async fn touch_last_seen(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let sql = "UPDATE users SET last_seen = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update last seen")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(at)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to update last seen")?;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM users WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete user")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete user")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => count_users_sqlite(pool).await,
            Backend::Mysql(pool) => count_users_mysql(pool).await,
        }
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_users_sqlite(pool, params).await,
            Backend::Mysql(pool) => list_users_mysql(pool, params).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, image_file, password_hash, about_me, last_seen, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.image_file)
    .bind(&user.password_hash)
    .bind(&user.about_me)
    .bind(user.last_seen)
    .bind(user.created_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

async fn get_user_sqlite(pool: &SqlitePool, lookup: Lookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        Lookup::Id(id) => query.bind(id),
        Lookup::Username(value) | Lookup::Email(value) => query.bind(value),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", lookup.column()))?;

    row.map(|row| row_to_user_sqlite(&row)).transpose()
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, image_file = ?, password_hash = ?, about_me = ?, last_seen = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.image_file)
    .bind(&user.password_hash)
    .bind(&user.about_me)
    .bind(user.last_seen)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_sqlite(pool, Lookup::Id(user.id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_sqlite)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_sqlite(pool).await?;

    Ok((users, total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        image_file: row.try_get("image_file")?,
        password_hash: row.try_get("password_hash")?,
        about_me: row.try_get("about_me")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, image_file, password_hash, about_me, last_seen, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.image_file)
    .bind(&user.password_hash)
    .bind(&user.about_me)
    .bind(user.last_seen)
    .bind(user.created_at)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        ..user.clone()
    })
}

async fn get_user_mysql(pool: &MySqlPool, lookup: Lookup<'_>) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, lookup.column());
    let query = sqlx::query(&sql);
    let query = match lookup {
        Lookup::Id(id) => query.bind(id),
        Lookup::Username(value) | Lookup::Email(value) => query.bind(value),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", lookup.column()))?;

    row.map(|row| row_to_user_mysql(&row)).transpose()
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, image_file = ?, password_hash = ?, about_me = ?, last_seen = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.image_file)
    .bind(&user.password_hash)
    .bind(&user.about_me)
    .bind(user.last_seen)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user_mysql(pool, Lookup::Id(user.id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) as count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn list_users_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<User>, i64)> {
    let sql = format!(
        "SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?",
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let users = rows
        .iter()
        .map(row_to_user_mysql)
        .collect::<Result<Vec<_>>>()?;
    let total = count_users_mysql(pool).await?;

    Ok((users, total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        image_file: row.try_get("image_file")?,
        password_hash: row.try_get("password_hash")?,
        about_me: row.try_get("about_me")?,
        last_seen: row.try_get("last_seen")?,
        created_at: row.try_get("created_at")?,
    })
}
