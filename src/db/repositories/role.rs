//! Role repository
//!
//! Roles and the `user_roles` link table.

use crate::db::{Backend, DynDatabasePool};
use crate::models::Role;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn create(&self, role: &Role) -> Result<Role>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Role>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// All roles ordered by name
    async fn list(&self) -> Result<Vec<Role>>;

    /// Update name and description
    async fn update(&self, role: &Role) -> Result<Role>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// Roles held by a user, ordered by name
    async fn get_by_user(&self, user_id: i64) -> Result<Vec<Role>>;

    /// Whether a user holds the role with the given name
    async fn user_has_role(&self, user_id: i64, name: &str) -> Result<bool>;

    /// Grant a role. Granting a held role is a no-op.
    async fn add_to_user(&self, user_id: i64, role_id: i64) -> Result<()>;

    async fn remove_from_user(&self, user_id: i64, role_id: i64) -> Result<()>;
}

/// SQLx-based role repository implementation
pub struct SqlxRoleRepository {
    pool: DynDatabasePool,
}

impl SqlxRoleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn RoleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl RoleRepository for SqlxRoleRepository {
    async fn create(&self, role: &Role) -> Result<Role> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_role_sqlite(pool, role).await,
            Backend::Mysql(pool) => create_role_mysql(pool, role).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Role>> {
        let sql = "SELECT id, name, description FROM roles WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get role by ID")?;
                row.map(|row| row_to_role_sqlite(&row)).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get role by ID")?;
                row.map(|row| row_to_role_mysql(&row)).transpose()
            }
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Role>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_role_by_name_sqlite(pool, name).await,
            Backend::Mysql(pool) => get_role_by_name_mysql(pool, name).await,
        }
    }

    async fn list(&self) -> Result<Vec<Role>> {
        let sql = "SELECT id, name, description FROM roles ORDER BY name";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list roles")?;
                rows.iter().map(row_to_role_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list roles")?;
                rows.iter().map(row_to_role_mysql).collect()
            }
        }
    }

    async fn update(&self, role: &Role) -> Result<Role> {
        let sql = "UPDATE roles SET name = ?, description = ? WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(&role.name)
                    .bind(&role.description)
                    .bind(role.id)
                    .execute(pool)
                    .await
                    .context("Failed to update role")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(&role.name)
                    .bind(&role.description)
                    .bind(role.id)
                    .execute(pool)
                    .await
                    .context("Failed to update role")?;
            }
        }
        Ok(role.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM roles WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete role")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("Failed to delete role")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) as count FROM roles";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count roles")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .fetch_one(pool)
                .await
                .context("Failed to count roles")?
                .get("count"),
        };
        Ok(count)
    }

    async fn get_by_user(&self, user_id: i64) -> Result<Vec<Role>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_roles_by_user_sqlite(pool, user_id).await,
            Backend::Mysql(pool) => get_roles_by_user_mysql(pool, user_id).await,
        }
    }

    async fn user_has_role(&self, user_id: i64, name: &str) -> Result<bool> {
        let sql = r#"
            SELECT COUNT(*) as count
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE ur.user_id = ? AND r.name = ?
        "#;
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(name)
                .fetch_one(pool)
                .await
                .context("Failed to check user role")?
                .get("count"),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(user_id)
                .bind(name)
                .fetch_one(pool)
                .await
                .context("Failed to check user role")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn add_to_user(&self, user_id: i64, role_id: i64) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(role_id)
                    .execute(pool)
                    .await
                    .context("Failed to add role to user")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query("INSERT IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)")
                    .bind(user_id)
                    .bind(role_id)
                    .execute(pool)
                    .await
                    .context("Failed to add role to user")?;
            }
        }
        Ok(())
    }

    async fn remove_from_user(&self, user_id: i64, role_id: i64) -> Result<()> {
        let sql = "DELETE FROM user_roles WHERE user_id = ? AND role_id = ?";
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(role_id)
                    .execute(pool)
                    .await
                    .context("Failed to remove role from user")?;
            }
            Backend::Mysql(pool) => {
                sqlx::query(sql)
                    .bind(user_id)
                    .bind(role_id)
                    .execute(pool)
                    .await
                    .context("Failed to remove role from user")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_role_sqlite(pool: &SqlitePool, role: &Role) -> Result<Role> {
    let result = sqlx::query("INSERT INTO roles (name, description) VALUES (?, ?)")
        .bind(&role.name)
        .bind(&role.description)
        .execute(pool)
        .await
        .context("Failed to create role")?;

    Ok(Role {
        id: result.last_insert_rowid(),
        ..role.clone()
    })
}

async fn get_role_by_name_sqlite(pool: &SqlitePool, name: &str) -> Result<Option<Role>> {
    let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get role by name")?;

    row.map(|row| row_to_role_sqlite(&row)).transpose()
}

async fn get_roles_by_user_sqlite(pool: &SqlitePool, user_id: i64) -> Result<Vec<Role>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.name, r.description
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = ?
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to get roles by user")?;

    rows.iter().map(row_to_role_sqlite).collect()
}

fn row_to_role_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Role> {
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_role_mysql(pool: &MySqlPool, role: &Role) -> Result<Role> {
    let result = sqlx::query("INSERT INTO roles (name, description) VALUES (?, ?)")
        .bind(&role.name)
        .bind(&role.description)
        .execute(pool)
        .await
        .context("Failed to create role")?;

    Ok(Role {
        id: result.last_insert_id() as i64,
        ..role.clone()
    })
}

async fn get_role_by_name_mysql(pool: &MySqlPool, name: &str) -> Result<Option<Role>> {
    let row = sqlx::query("SELECT id, name, description FROM roles WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get role by name")?;

    row.map(|row| row_to_role_mysql(&row)).transpose()
}

async fn get_roles_by_user_mysql(pool: &MySqlPool, user_id: i64) -> Result<Vec<Role>> {
    let rows = sqlx::query(
        r#"
        SELECT r.id, r.name, r.description
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = ?
        ORDER BY r.name
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("Failed to get roles by user")?;

    rows.iter().map(row_to_role_mysql).collect()
}

fn row_to_role_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Role> {
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::role::{ADMIN, STUDENT};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxRoleRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxRoleRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_test_user(pool: &DynDatabasePool, name: &str) -> i64 {
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'hash')",
        )
        .bind(name)
        .bind(format!("{}@example.com", name))
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to create test user");
        result.last_insert_rowid()
    }

    #[tokio::test]
    async fn test_create_and_get_role() {
        let (_pool, repo) = setup_test_repo().await;

        let role = repo.create(&Role::new(ADMIN, "Site administrator")).await.unwrap();
        assert!(role.id > 0);

        let by_name = repo.get_by_name(ADMIN).await.unwrap().unwrap();
        assert_eq!(by_name, role);
        assert_eq!(repo.get_by_id(role.id).await.unwrap(), Some(role));
        assert!(repo.get_by_name("Ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_role_name_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&Role::new(STUDENT, "")).await.unwrap();
        assert!(repo.create(&Role::new(STUDENT, "again")).await.is_err());
    }

    #[tokio::test]
    async fn test_user_role_links() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;
        let admin = repo.create(&Role::new(ADMIN, "")).await.unwrap();
        let student = repo.create(&Role::new(STUDENT, "")).await.unwrap();

        assert!(!repo.user_has_role(user_id, ADMIN).await.unwrap());

        repo.add_to_user(user_id, student.id).await.unwrap();
        repo.add_to_user(user_id, student.id).await.unwrap();
        repo.add_to_user(user_id, admin.id).await.unwrap();

        let roles = repo.get_by_user(user_id).await.unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[0].name, ADMIN);
        assert!(repo.user_has_role(user_id, STUDENT).await.unwrap());

        repo.remove_from_user(user_id, admin.id).await.unwrap();
        assert!(!repo.user_has_role(user_id, ADMIN).await.unwrap());
    }

    #[tokio::test]
    async fn test_deleting_role_unlinks_users() {
        let (pool, repo) = setup_test_repo().await;
        let user_id = create_test_user(&pool, "ana").await;
        let role = repo.create(&Role::new(STUDENT, "")).await.unwrap();
        repo.add_to_user(user_id, role.id).await.unwrap();

        repo.delete(role.id).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(repo.get_by_user(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_role_description() {
        let (_pool, repo) = setup_test_repo().await;
        let mut role = repo.create(&Role::new(STUDENT, "old")).await.unwrap();

        role.description = "Can read posts".to_string();
        repo.update(&role).await.unwrap();

        let reloaded = repo.get_by_id(role.id).await.unwrap().unwrap();
        assert_eq!(reloaded.description, "Can read posts");
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
