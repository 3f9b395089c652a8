//! User service
//!
//! Accounts and authentication:
//! - Registration with an activation mail, activation grants `Student`
//! - Login/logout over database-backed sessions
//! - Password reset through signed, expiring tokens
//! - Profile updates, the follow graph and `last_seen`
//! - Account administration

use crate::db::repositories::{FollowRepository, SessionRepository, UserRepository};
use crate::models::role::{ADMIN, STUDENT};
use crate::models::{
    AdminUpdateUserInput, ListParams, PagedResult, Session, UpdateProfileInput, User,
};
use crate::services::email::MailService;
use crate::services::password::{hash_password, verify_password};
use crate::services::role::{RoleService, RoleServiceError};
use crate::services::token::TokenSigner;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Default session expiration time in days for "remember me" logins
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Lifetime of a login without "remember me"
const BROWSER_SESSION_DAYS: i64 = 1;

pub const LOGIN_FAILED: &str = "Login unsuccessful. Please check email and password";
pub const INVALID_TOKEN: &str = "That is an invalid or expired token";
pub const UNKNOWN_EMAIL: &str = "There is no account with that email. You must register first";

/// Message for a username or e-mail that belongs to someone else
pub fn taken_message(field: &str) -> String {
    format!("That {} is taken. Please choose a different one", field)
}

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// A single form field failed a database-backed check
    #[error("{field}: {message}")]
    FieldError { field: &'static str, message: String },

    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Activation or reset token is malformed, forged or expired
    #[error("That is an invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl UserServiceError {
    fn taken(field: &'static str) -> Self {
        Self::FieldError {
            field,
            message: taken_message(field),
        }
    }
}

impl From<RoleServiceError> for UserServiceError {
    fn from(e: RoleServiceError) -> Self {
        match e {
            RoleServiceError::NotFound(msg) => Self::ValidationError(msg),
            RoleServiceError::ValidationError(msg) | RoleServiceError::Conflict(msg) => {
                Self::ValidationError(msg)
            }
            RoleServiceError::InternalError(e) => Self::InternalError(e),
        }
    }
}

/// Registration input
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Login input
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    /// Keep the session beyond the browser session
    pub remember: bool,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>, remember: bool) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            remember,
        }
    }
}

/// Follower and following counts of a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FollowCounts {
    pub followers: i64,
    pub following: i64,
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    follow_repo: Arc<dyn FollowRepository>,
    roles: Arc<RoleService>,
    mail: Arc<MailService>,
    tokens: TokenSigner,
    session_expiration_days: i64,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        follow_repo: Arc<dyn FollowRepository>,
        roles: Arc<RoleService>,
        mail: Arc<MailService>,
        tokens: TokenSigner,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            follow_repo,
            roles,
            mail,
            tokens,
            session_expiration_days: DEFAULT_SESSION_EXPIRATION_DAYS,
        }
    }

    /// Override how long "remember me" sessions last
    pub fn with_session_expiration(mut self, days: i64) -> Self {
        self.session_expiration_days = days;
        self
    }

    pub fn session_expiration_days(&self) -> i64 {
        self.session_expiration_days
    }

    // ========================================================================
    // Registration and activation
    // ========================================================================

    /// Create an account without roles and mail an activation link.
    ///
    /// Field shapes (lengths, e-mail syntax, matching passwords) are checked
    /// by the form; this checks uniqueness.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_string();

        if self.get_by_username(&username).await?.is_some() {
            return Err(UserServiceError::taken("username"));
        }
        if self.get_by_email(&email).await?.is_some() {
            return Err(UserServiceError::taken("email"));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&User::new(username, email, password_hash))
            .await
            .context("Failed to create user")?;

        let token = self.tokens.generate(user.id);
        self.mail
            .send_activation(&user, &token)
            .context("Failed to prepare activation mail")?;

        tracing::info!("Registered user {} ({})", user.username, user.id);
        Ok(user)
    }

    /// Grant `Student` to the account a valid activation token names.
    /// Activating twice changes nothing.
    pub async fn activate_account(&self, token: &str) -> Result<User, UserServiceError> {
        let user = self.user_from_token(token).await?;
        self.roles.grant(user.id, STUDENT).await?;
        tracing::info!("Activated user {}", user.username);
        Ok(user)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// Check credentials and open a session.
    ///
    /// Unknown e-mail and wrong password fail the same way.
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let user = self
            .get_by_email(input.email.trim())
            .await?
            .ok_or_else(|| UserServiceError::AuthenticationError(LOGIN_FAILED.to_string()))?;

        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            tracing::debug!("Failed login for {}", user.username);
            return Err(UserServiceError::AuthenticationError(LOGIN_FAILED.to_string()));
        }

        let lifetime = if input.remember {
            Duration::days(self.session_expiration_days)
        } else {
            Duration::days(BROWSER_SESSION_DAYS)
        };
        let session = self
            .session_repo
            .create(&Session::new(user.id, lifetime))
            .await
            .context("Failed to create session")?;

        Ok((user, session))
    }

    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The user behind a session token; `None` when unknown or expired.
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            self.session_repo
                .delete(token)
                .await
                .context("Failed to delete expired session")?;
            return Ok(None);
        }

        self.get_by_id(session.user_id).await
    }

    /// Delete every expired session, returning how many went
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Only local absolute paths are accepted as a post-login destination
    pub fn safe_next(next: Option<&str>) -> String {
        match next {
            Some(path)
                if path.starts_with('/')
                    && !path.starts_with("//")
                    && !path.contains('\\')
                    && !path.chars().any(char::is_control) =>
            {
                path.to_string()
            }
            _ => "/".to_string(),
        }
    }

    // ========================================================================
    // Password reset
    // ========================================================================

    /// Mail a reset link to the account registered with `email`
    pub async fn request_password_reset(&self, email: &str) -> Result<(), UserServiceError> {
        let user = self
            .get_by_email(email.trim())
            .await?
            .ok_or_else(|| UserServiceError::FieldError {
                field: "email",
                message: UNKNOWN_EMAIL.to_string(),
            })?;

        let token = self.tokens.generate(user.id);
        self.mail
            .send_reset(&user, &token)
            .context("Failed to prepare reset mail")?;
        Ok(())
    }

    /// The account a reset token belongs to
    pub async fn check_reset_token(&self, token: &str) -> Result<User, UserServiceError> {
        self.user_from_token(token).await
    }

    /// Store a new password and sign the account out everywhere
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<User, UserServiceError> {
        let mut user = self.user_from_token(token).await?;
        user.password_hash = hash_password(new_password).context("Failed to hash password")?;

        let updated = self
            .user_repo
            .update(&user)
            .await
            .context("Failed to update password")?;
        self.session_repo
            .delete_by_user(user.id)
            .await
            .context("Failed to delete sessions")?;

        tracing::info!("Password reset for {}", updated.username);
        Ok(updated)
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to get user by email")?)
    }

    /// Look up by username, failing with "User {username} not found"
    pub async fn require_by_username(&self, username: &str) -> Result<User, UserServiceError> {
        self.get_by_username(username)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {} not found", username)))
    }

    /// Apply the profile form. Uniqueness is checked only for values that
    /// actually change.
    pub async fn update_profile(
        &self,
        user: &User,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let mut updated = user.clone();

        if let Some(username) = input.username.map(|u| u.trim().to_string()) {
            if username != user.username {
                if self.get_by_username(&username).await?.is_some() {
                    return Err(UserServiceError::taken("username"));
                }
                updated.username = username;
            }
        }
        if let Some(email) = input.email.map(|e| e.trim().to_string()) {
            if email != user.email {
                if self.get_by_email(&email).await?.is_some() {
                    return Err(UserServiceError::taken("email"));
                }
                updated.email = email;
            }
        }
        if let Some(about_me) = input.about_me {
            let about_me = about_me.trim().to_string();
            updated.about_me = (!about_me.is_empty()).then_some(about_me);
        }
        if let Some(image_file) = input.image_file {
            updated.image_file = image_file;
        }

        Ok(self
            .user_repo
            .update(&updated)
            .await
            .context("Failed to update user")?)
    }

    pub async fn touch_last_seen(&self, user_id: i64) -> Result<(), UserServiceError> {
        self.user_repo
            .touch_last_seen(user_id, Utc::now())
            .await
            .context("Failed to update last seen")?;
        Ok(())
    }

    pub async fn has_role(&self, user_id: i64, name: &str) -> Result<bool, UserServiceError> {
        Ok(self.roles.has_role(user_id, name).await?)
    }

    pub async fn is_admin(&self, user_id: i64) -> Result<bool, UserServiceError> {
        self.has_role(user_id, ADMIN).await
    }

    pub async fn role_names(&self, user_id: i64) -> Result<Vec<String>, UserServiceError> {
        Ok(self.roles.role_names(user_id).await?)
    }

    // ========================================================================
    // Follow graph
    // ========================================================================

    /// Follow the user called `username`. Following twice is a no-op.
    pub async fn follow(&self, user: &User, username: &str) -> Result<User, UserServiceError> {
        let target = self.require_by_username(username).await?;
        if target.id == user.id {
            return Err(UserServiceError::ValidationError(
                "You cannot follow yourself".to_string(),
            ));
        }
        self.follow_repo
            .follow(user.id, target.id)
            .await
            .context("Failed to follow user")?;
        Ok(target)
    }

    /// Stop following the user called `username`. Unfollowing twice is a no-op.
    pub async fn unfollow(&self, user: &User, username: &str) -> Result<User, UserServiceError> {
        let target = self.require_by_username(username).await?;
        if target.id == user.id {
            return Err(UserServiceError::ValidationError(
                "You cannot unfollow yourself".to_string(),
            ));
        }
        self.follow_repo
            .unfollow(user.id, target.id)
            .await
            .context("Failed to unfollow user")?;
        Ok(target)
    }

    pub async fn is_following(
        &self,
        follower_id: i64,
        followed_id: i64,
    ) -> Result<bool, UserServiceError> {
        Ok(self
            .follow_repo
            .is_following(follower_id, followed_id)
            .await
            .context("Failed to check follow")?)
    }

    pub async fn follow_counts(&self, user_id: i64) -> Result<FollowCounts, UserServiceError> {
        let followers = self
            .follow_repo
            .count_followers(user_id)
            .await
            .context("Failed to count followers")?;
        let following = self
            .follow_repo
            .count_following(user_id)
            .await
            .context("Failed to count followed users")?;
        Ok(FollowCounts {
            followers,
            following,
        })
    }

    // ========================================================================
    // Administration
    // ========================================================================

    pub async fn count(&self) -> Result<i64, UserServiceError> {
        Ok(self.user_repo.count().await.context("Failed to count users")?)
    }

    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change any account's fields and optionally its role set
    pub async fn admin_update(
        &self,
        id: i64,
        input: AdminUpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let user = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {} not found", id)))?;

        // Roles change only once every other check has passed
        let roles = match &input.roles {
            Some(names) => Some(self.roles.resolve(names).await?),
            None => None,
        };

        let updated = self
            .update_profile(
                &user,
                UpdateProfileInput {
                    username: input.username,
                    email: input.email,
                    about_me: input.about_me,
                    image_file: None,
                },
            )
            .await?;

        if let Some(roles) = roles {
            self.roles.assign_user_roles(id, &roles).await?;
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<User, UserServiceError> {
        let user = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(format!("User {} not found", id)))?;
        self.user_repo
            .delete(id)
            .await
            .context("Failed to delete user")?;
        tracing::info!("Deleted user {} ({})", user.username, id);
        Ok(user)
    }

    /// Create the administrator account, or reuse the one with this e-mail,
    /// and grant it `Admin`.
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserServiceError> {
        let user = match self.get_by_email(email).await? {
            Some(existing) => existing,
            None => {
                if self.get_by_username(username).await?.is_some() {
                    return Err(UserServiceError::taken("username"));
                }
                let password_hash = hash_password(password).context("Failed to hash password")?;
                self.user_repo
                    .create(&User::new(username.to_string(), email.to_string(), password_hash))
                    .await
                    .context("Failed to create admin user")?
            }
        };
        self.roles.grant(user.id, ADMIN).await?;
        Ok(user)
    }

    // ========================================================================
    // Private helper methods
    // ========================================================================

    async fn user_from_token(&self, token: &str) -> Result<User, UserServiceError> {
        let user_id = self
            .tokens
            .verify(token)
            .ok_or(UserServiceError::InvalidToken)?;
        self.get_by_id(user_id)
            .await?
            .ok_or(UserServiceError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxFollowRepository, SqlxRoleRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::services::email::{RecordingMailer, ACTIVATION_SUBJECT, RESET_SUBJECT};
    use crate::models::role::TUTOR;

    struct Fixture {
        service: UserService,
        sessions: Arc<dyn SessionRepository>,
        roles: Arc<RoleService>,
        mailer: Arc<RecordingMailer>,
        tokens: TokenSigner,
    }

    async fn setup_test_service() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let roles = Arc::new(RoleService::new(SqlxRoleRepository::boxed(pool.clone())));
        roles.ensure_default_roles().await.expect("Failed to create roles");

        let mailer = Arc::new(RecordingMailer::default());
        let mail = Arc::new(MailService::new(mailer.clone(), "http://localhost:5000", 1800));
        let tokens = TokenSigner::new("test-secret", 1800);

        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            sessions.clone(),
            SqlxFollowRepository::boxed(pool.clone()),
            roles.clone(),
            mail,
            tokens.clone(),
        );

        Fixture {
            service,
            sessions,
            roles,
            mailer,
            tokens,
        }
    }

    async fn register(fx: &Fixture, name: &str) -> User {
        fx.service
            .register(RegisterInput::new(name, format!("{}@example.com", name), "Secret123"))
            .await
            .expect("Failed to register")
    }

    // ========================================================================
    // Registration tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_creates_user_without_roles_and_mails_link() {
        let fx = setup_test_service().await;
        let user = register(&fx, "ana").await;

        assert!(user.id > 0);
        assert!(fx.service.role_names(user.id).await.unwrap().is_empty());
        assert_ne!(user.password_hash, "Secret123");

        let sent = fx.mailer.wait_for(1).await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ana@example.com");
        assert_eq!(sent[0].subject, ACTIVATION_SUBJECT);
    }

    #[tokio::test]
    async fn test_register_duplicate_username_and_email() {
        let fx = setup_test_service().await;
        register(&fx, "ana").await;

        let err = fx
            .service
            .register(RegisterInput::new("ana", "other@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UserServiceError::FieldError { field: "username", ref message }
                if message == "That username is taken. Please choose a different one"
        ));

        let err = fx
            .service
            .register(RegisterInput::new("bob", "ana@example.com", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::FieldError { field: "email", .. }));
    }

    #[tokio::test]
    async fn test_activate_account_grants_student_once() {
        let fx = setup_test_service().await;
        let user = register(&fx, "ana").await;
        let token = fx.tokens.generate(user.id);

        fx.service.activate_account(&token).await.unwrap();
        fx.service.activate_account(&token).await.unwrap();

        assert_eq!(fx.service.role_names(user.id).await.unwrap(), vec![STUDENT]);
    }

    #[tokio::test]
    async fn test_activate_account_rejects_bad_tokens() {
        let fx = setup_test_service().await;

        let err = fx.service.activate_account("garbage").await.unwrap_err();
        assert!(matches!(err, UserServiceError::InvalidToken));
        assert_eq!(err.to_string(), INVALID_TOKEN);

        // Well-signed, but for an account that does not exist
        let orphan = fx.tokens.generate(999);
        assert!(matches!(
            fx.service.activate_account(&orphan).await,
            Err(UserServiceError::InvalidToken)
        ));
    }

    // ========================================================================
    // Login tests
    // ========================================================================

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let fx = setup_test_service().await;
        let user = register(&fx, "ana").await;

        let (logged_in, session) = fx
            .service
            .login(LoginInput::new("ana@example.com", "Secret123", false))
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);
        assert!(session.expires_at <= Utc::now() + Duration::days(1));

        let validated = fx.service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, user.id);

        fx.service.logout(&session.id).await.unwrap();
        assert!(fx.service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remembered_login_lasts_longer() {
        let fx = setup_test_service().await;
        register(&fx, "ana").await;

        let (_, session) = fx
            .service
            .login(LoginInput::new("ana@example.com", "Secret123", true))
            .await
            .unwrap();

        assert!(session.expires_at > Utc::now() + Duration::days(6));
    }

    #[tokio::test]
    async fn test_login_failures_share_one_message() {
        let fx = setup_test_service().await;
        register(&fx, "ana").await;

        for (email, password) in [("ana@example.com", "wrong"), ("nobody@example.com", "Secret123")] {
            let err = fx
                .service
                .login(LoginInput::new(email, password, false))
                .await
                .unwrap_err();
            assert!(matches!(err, UserServiceError::AuthenticationError(ref m) if m == LOGIN_FAILED));
        }
    }

    #[test]
    fn test_safe_next() {
        assert_eq!(UserService::safe_next(Some("/home")), "/home");
        assert_eq!(UserService::safe_next(Some("/posts/1?x=2")), "/posts/1?x=2");
        assert_eq!(UserService::safe_next(None), "/");
        assert_eq!(UserService::safe_next(Some("https://evil.example")), "/");
        assert_eq!(UserService::safe_next(Some("//evil.example")), "/");
        assert_eq!(UserService::safe_next(Some("/\\evil.example")), "/");
        assert_eq!(UserService::safe_next(Some("home")), "/");
    }

    // ========================================================================
    // Password reset tests
    // ========================================================================

    #[tokio::test]
    async fn test_password_reset_flow() {
        let fx = setup_test_service().await;
        let user = register(&fx, "ana").await;
        let (_, session) = fx
            .service
            .login(LoginInput::new("ana@example.com", "Secret123", true))
            .await
            .unwrap();

        fx.service.request_password_reset("ana@example.com").await.unwrap();
        let sent = fx.mailer.wait_for(2).await;
        assert!(sent.iter().any(|m| m.subject == RESET_SUBJECT));

        let token = fx.tokens.generate(user.id);
        fx.service.reset_password(&token, "NewSecret456").await.unwrap();

        // Old sessions are gone and only the new password works
        assert!(fx.service.validate_session(&session.id).await.unwrap().is_none());
        assert!(fx
            .service
            .login(LoginInput::new("ana@example.com", "Secret123", false))
            .await
            .is_err());
        assert!(fx
            .service
            .login(LoginInput::new("ana@example.com", "NewSecret456", false))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_password_reset_unknown_email() {
        let fx = setup_test_service().await;
        let err = fx
            .service
            .request_password_reset("nobody@example.com")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UserServiceError::FieldError { field: "email", ref message } if message == UNKNOWN_EMAIL
        ));
    }

    #[tokio::test]
    async fn test_reset_password_rejects_foreign_token() {
        let fx = setup_test_service().await;
        let user = register(&fx, "ana").await;
        let foreign = TokenSigner::new("other-secret", 1800).generate(user.id);

        assert!(matches!(
            fx.service.reset_password(&foreign, "pw").await,
            Err(UserServiceError::InvalidToken)
        ));
    }

    // ========================================================================
    // Profile and follow tests
    // ========================================================================

    #[tokio::test]
    async fn test_update_profile_checks_uniqueness_only_on_change() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;
        register(&fx, "bob").await;

        // Same username and email as before: no conflict
        let same = fx
            .service
            .update_profile(
                &ana,
                UpdateProfileInput {
                    username: Some("ana".into()),
                    email: Some("ana@example.com".into()),
                    about_me: Some("Hello".into()),
                    image_file: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(same.about_me.as_deref(), Some("Hello"));

        let err = fx
            .service
            .update_profile(
                &same,
                UpdateProfileInput {
                    username: Some("bob".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UserServiceError::FieldError { field: "username", .. }));

        let renamed = fx
            .service
            .update_profile(
                &same,
                UpdateProfileInput {
                    username: Some("anna".into()),
                    image_file: Some("abc.png".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.username, "anna");
        assert_eq!(renamed.image_file, "abc.png");
        assert_eq!(renamed.about_me.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;
        let bob = register(&fx, "bob").await;

        fx.service.follow(&ana, "bob").await.unwrap();
        fx.service.follow(&ana, "bob").await.unwrap();
        assert!(fx.service.is_following(ana.id, bob.id).await.unwrap());
        assert_eq!(
            fx.service.follow_counts(bob.id).await.unwrap(),
            FollowCounts { followers: 1, following: 0 }
        );

        fx.service.unfollow(&ana, "bob").await.unwrap();
        assert!(!fx.service.is_following(ana.id, bob.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_follow_refusals() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;

        assert!(matches!(
            fx.service.follow(&ana, "ana").await,
            Err(UserServiceError::ValidationError(_))
        ));
        let err = fx.service.follow(&ana, "ghost").await.unwrap_err();
        assert!(matches!(err, UserServiceError::NotFound(ref m) if m == "User ghost not found"));
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;
        let live = Session::new(ana.id, Duration::days(1));
        let stale = Session::new(ana.id, Duration::seconds(-60));
        fx.sessions.create(&live).await.unwrap();
        fx.sessions.create(&stale).await.unwrap();

        assert_eq!(fx.service.cleanup_expired_sessions().await.unwrap(), 1);
        assert_eq!(fx.service.cleanup_expired_sessions().await.unwrap(), 0);
        assert!(fx.sessions.get_by_id(&live.id).await.unwrap().is_some());
        assert!(fx.sessions.get_by_id(&stale.id).await.unwrap().is_none());
    }

    // ========================================================================
    // Administration tests
    // ========================================================================

    #[tokio::test]
    async fn test_admin_update_sets_roles() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;

        let updated = fx
            .service
            .admin_update(
                ana.id,
                AdminUpdateUserInput {
                    email: Some("anna@example.com".into()),
                    roles: Some(vec![TUTOR.to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.email, "anna@example.com");
        assert_eq!(fx.service.role_names(ana.id).await.unwrap(), vec![TUTOR]);
    }

    #[tokio::test]
    async fn test_admin_update_rejection_keeps_roles() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;
        register(&fx, "bob").await;
        let before = fx.service.role_names(ana.id).await.unwrap();

        let result = fx
            .service
            .admin_update(
                ana.id,
                AdminUpdateUserInput {
                    username: Some("bob".into()),
                    roles: Some(vec![ADMIN.to_string()]),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(UserServiceError::FieldError { .. })));
        assert_eq!(fx.service.role_names(ana.id).await.unwrap(), before);
        assert!(!fx.service.is_admin(ana.id).await.unwrap());

        let result = fx
            .service
            .admin_update(
                ana.id,
                AdminUpdateUserInput {
                    email: Some("anna@example.com".into()),
                    roles: Some(vec!["Wizard".to_string()]),
                    ..Default::default()
                },
            )
            .await;
        assert!(result.is_err());
        let stored = fx.service.get_by_id(ana.id).await.unwrap().unwrap();
        assert_eq!(stored.email, "ana@example.com");
    }

    #[tokio::test]
    async fn test_create_admin_is_idempotent() {
        let fx = setup_test_service().await;

        let first = fx
            .service
            .create_admin("Admin", "admin@example.com", "AdminPass1")
            .await
            .unwrap();
        let second = fx
            .service
            .create_admin("Admin", "admin@example.com", "AdminPass1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(fx.service.is_admin(first.id).await.unwrap());
        assert!(fx.roles.has_role(first.id, ADMIN).await.unwrap());
        assert_eq!(fx.service.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let fx = setup_test_service().await;
        let ana = register(&fx, "ana").await;
        register(&fx, "bob").await;

        let page = fx.service.list(&ListParams::new(1, 1)).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 1);

        fx.service.delete(ana.id).await.unwrap();
        assert!(matches!(fx.service.delete(ana.id).await, Err(UserServiceError::NotFound(_))));
        assert_eq!(fx.service.count().await.unwrap(), 1);
    }
}
