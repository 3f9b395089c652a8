//! Role service
//!
//! Roles are named permission groups granted to users many-to-many. The
//! well-known roles are created by [`RoleService::ensure_default_roles`].

use crate::db::repositories::RoleRepository;
use crate::models::role::{DEFAULT_ROLES, MAX_ROLE_LENGTH};
use crate::models::Role;
use anyhow::Context;
use std::sync::Arc;

/// Error types for role service operations
#[derive(Debug, thiserror::Error)]
pub enum RoleServiceError {
    #[error("Role not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Role already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct RoleService {
    repo: Arc<dyn RoleRepository>,
}

impl RoleService {
    pub fn new(repo: Arc<dyn RoleRepository>) -> Self {
        Self { repo }
    }

    /// Create `Admin`, `Tutor` and `Student` when missing.
    /// Returns how many roles were created.
    pub async fn ensure_default_roles(&self) -> Result<usize, RoleServiceError> {
        let mut created = 0;
        for (name, description) in DEFAULT_ROLES {
            if self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to look up role")?
                .is_none()
            {
                self.repo
                    .create(&Role::new(*name, *description))
                    .await
                    .context("Failed to create role")?;
                tracing::info!("Created role {}", name);
                created += 1;
            }
        }
        Ok(created)
    }

    pub async fn list(&self) -> Result<Vec<Role>, RoleServiceError> {
        Ok(self.repo.list().await.context("Failed to list roles")?)
    }

    pub async fn count(&self) -> Result<i64, RoleServiceError> {
        Ok(self.repo.count().await.context("Failed to count roles")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Role>, RoleServiceError> {
        Ok(self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get role by ID")?)
    }

    pub async fn create(&self, name: &str, description: &str) -> Result<Role, RoleServiceError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_ROLE_LENGTH {
            return Err(RoleServiceError::ValidationError(format!(
                "Role name must be between 1 and {} characters",
                MAX_ROLE_LENGTH
            )));
        }
        if self
            .repo
            .get_by_name(name)
            .await
            .context("Failed to check role name")?
            .is_some()
        {
            return Err(RoleServiceError::Conflict(format!(
                "Role '{}' already exists",
                name
            )));
        }
        Ok(self
            .repo
            .create(&Role::new(name, description.trim()))
            .await
            .context("Failed to create role")?)
    }

    pub async fn update_description(
        &self,
        id: i64,
        description: &str,
    ) -> Result<Role, RoleServiceError> {
        let mut role = self.require(id).await?;
        role.description = description.trim().to_string();
        Ok(self
            .repo
            .update(&role)
            .await
            .context("Failed to update role")?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), RoleServiceError> {
        self.require(id).await?;
        self.repo.delete(id).await.context("Failed to delete role")?;
        Ok(())
    }

    /// Role names held by a user, ordered by name
    pub async fn role_names(&self, user_id: i64) -> Result<Vec<String>, RoleServiceError> {
        let roles = self
            .repo
            .get_by_user(user_id)
            .await
            .context("Failed to get user roles")?;
        Ok(roles.into_iter().map(|r| r.name).collect())
    }

    pub async fn has_role(&self, user_id: i64, name: &str) -> Result<bool, RoleServiceError> {
        Ok(self
            .repo
            .user_has_role(user_id, name)
            .await
            .context("Failed to check user role")?)
    }

    /// Grant a role by name; granting twice is a no-op
    pub async fn grant(&self, user_id: i64, name: &str) -> Result<(), RoleServiceError> {
        let role = self.require_by_name(name).await?;
        self.repo
            .add_to_user(user_id, role.id)
            .await
            .context("Failed to grant role")?;
        Ok(())
    }

    /// Make `names` the exact role set of a user. Unknown names are rejected
    /// before anything changes.
    pub async fn set_user_roles(&self, user_id: i64, names: &[String]) -> Result<(), RoleServiceError> {
        let wanted = self.resolve(names).await?;
        self.assign_user_roles(user_id, &wanted).await
    }

    /// Look up every role by name without changing anything
    pub async fn resolve(&self, names: &[String]) -> Result<Vec<Role>, RoleServiceError> {
        let mut roles = Vec::with_capacity(names.len());
        for name in names {
            roles.push(self.require_by_name(name.trim()).await?);
        }
        Ok(roles)
    }

    /// Make `wanted` the exact role set of a user
    pub async fn assign_user_roles(&self, user_id: i64, wanted: &[Role]) -> Result<(), RoleServiceError> {
        let current = self
            .repo
            .get_by_user(user_id)
            .await
            .context("Failed to get user roles")?;

        for role in &current {
            if !wanted.iter().any(|w| w.id == role.id) {
                self.repo
                    .remove_from_user(user_id, role.id)
                    .await
                    .context("Failed to revoke role")?;
            }
        }
        for role in wanted {
            if !current.iter().any(|c| c.id == role.id) {
                self.repo
                    .add_to_user(user_id, role.id)
                    .await
                    .context("Failed to grant role")?;
            }
        }
        Ok(())
    }

    async fn require(&self, id: i64) -> Result<Role, RoleServiceError> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| RoleServiceError::NotFound(format!("Role {} not found", id)))
    }

    async fn require_by_name(&self, name: &str) -> Result<Role, RoleServiceError> {
        self.repo
            .get_by_name(name)
            .await
            .context("Failed to look up role")?
            .ok_or_else(|| RoleServiceError::NotFound(format!("Role '{}' not found", name)))
    }
}
