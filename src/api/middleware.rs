//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error type and conversions from service errors
//! - Authentication (session token validation, `last_seen` refresh)
//! - Authorization (admin role check)

use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use validator::ValidationErrors;

use crate::api::forms::{error_details, field_detail};
use crate::config::Config;
use crate::db::repositories::{
    SqlxFollowRepository, SqlxPostRepository, SqlxRoleRepository, SqlxSessionRepository,
    SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    AvatarError, AvatarStore, MailService, Mailer, PostService, PostServiceError, RoleService,
    RoleServiceError, TagService, TagServiceError, TokenSigner, UserService, UserServiceError,
};
use crate::services::user::INVALID_TOKEN;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub role_service: Arc<RoleService>,
    pub post_service: Arc<PostService>,
    pub tag_service: Arc<TagService>,
    pub avatar_store: Arc<AvatarStore>,
    /// Listing page size
    pub per_page: i64,
}

impl AppState {
    /// Wire repositories and services over one pool.
    ///
    /// `config.security.secret_key` must already be set.
    pub fn new(pool: DynDatabasePool, config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let role_service = Arc::new(RoleService::new(SqlxRoleRepository::boxed(pool.clone())));
        let tag_service = Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone())));
        let mail_service = Arc::new(MailService::new(
            mailer,
            config.server.public_url.clone(),
            config.security.token_expiration_secs,
        ));
        let tokens = TokenSigner::new(
            &config.security.secret_key,
            config.security.token_expiration_secs,
        );

        let user_service = UserService::new(
            user_repo.clone(),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxFollowRepository::boxed(pool.clone()),
            role_service.clone(),
            mail_service,
            tokens,
        )
        .with_session_expiration(config.security.session_expiration_days);

        let post_service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            user_repo,
            tag_service.clone(),
        );

        Self {
            pool,
            user_service: Arc::new(user_service),
            role_service,
            post_service: Arc::new(post_service),
            tag_service,
            avatar_store: Arc::new(AvatarStore::new(&config.upload)),
            per_page: config.pagination.per_page,
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The current user, if the request carries a valid session
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Session id of the authenticated request
#[derive(Debug, Clone)]
pub struct SessionToken(pub String);

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    /// 401 pointing at the login route, with `next` set to `path`
    pub fn login_required(path: &str) -> Self {
        Self::with_details(
            "UNAUTHORIZED",
            "Please log in to access this page.",
            serde_json::json!({
                "login": format!("/api/v1/auth/login?next={}", urlencoding::encode(path)),
            }),
        )
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    /// Validation failure on a single form field
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_details("VALIDATION_ERROR", message.clone(), field_detail(field, &message))
    }

    pub fn already_authenticated() -> Self {
        Self::new("ALREADY_AUTHENTICATED", "You are already logged in")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Log the cause and hide it from the client
    fn internal(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", error);
        Self::internal_error("An unexpected error has occurred")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "ALREADY_AUTHENTICATED" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::with_details("VALIDATION_ERROR", "Invalid form data", error_details(&errors))
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::FieldError { field, message } => Self::field_error(field, message),
            UserServiceError::AuthenticationError(msg) => Self::unauthorized(msg),
            UserServiceError::InvalidToken => Self::validation_error(INVALID_TOKEN),
            UserServiceError::NotFound(msg) => Self::not_found(msg),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound(msg) => Self::not_found(msg),
            PostServiceError::Forbidden(msg) => Self::forbidden(msg),
            PostServiceError::ValidationError(msg) => Self::validation_error(msg),
            PostServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(e: TagServiceError) -> Self {
        match e {
            TagServiceError::NotFound(msg) => Self::not_found(msg),
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::Conflict(msg) => Self::conflict(msg),
            TagServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<RoleServiceError> for ApiError {
    fn from(e: RoleServiceError) -> Self {
        match e {
            RoleServiceError::NotFound(msg) => Self::not_found(msg),
            RoleServiceError::ValidationError(msg) => Self::validation_error(msg),
            RoleServiceError::Conflict(msg) => Self::conflict(msg),
            RoleServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<AvatarError> for ApiError {
    fn from(e: AvatarError) -> Self {
        match e {
            AvatarError::InvalidExtension(_) | AvatarError::TooLarge(_) => {
                Self::field_error("picture", e.to_string())
            }
            AvatarError::InternalError(e) => Self::internal(e),
        }
    }
}

/// Extract session token from request
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    if !token.is_empty() {
                        return Some(token.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Path as the client sent it, before nesting stripped any prefix
fn original_path(request: &Request) -> String {
    request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

/// Resolve the session into extensions and refresh `last_seen`.
/// Returns whether a user was found.
async fn authenticate(state: &AppState, request: &mut Request) -> Result<bool, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return Ok(true);
    }
    let Some(token) = extract_session_token(request) else {
        return Ok(false);
    };
    let Some(user) = state.user_service.validate_session(&token).await? else {
        return Ok(false);
    };

    state.user_service.touch_last_seen(user.id).await?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    request.extensions_mut().insert(SessionToken(token));
    Ok(true)
}

/// Authentication middleware
///
/// Unauthenticated requests get a 401 whose details point at the login
/// route with `next` set to the requested path.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !authenticate(&state, &mut request).await? {
        return Err(ApiError::login_required(&original_path(&request)));
    }
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Err(e) = authenticate(&state, &mut request).await {
        return e.into_response();
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::login_required(&original_path(&request)))?;

    if !state.user_service.is_admin(user.0.id).await? {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
        ))
    }
}

impl MaybeUser {
    /// Anonymous-only routes (register, login, password reset)
    pub fn reject_authenticated(&self) -> Result<(), ApiError> {
        match self.0 {
            Some(_) => Err(ApiError::already_authenticated()),
            None => Ok(()),
        }
    }
}
