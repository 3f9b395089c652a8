//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - Registration, mails an activation link
//! - GET|POST /api/v1/auth/activate_account/{token} - Account activation
//! - POST /api/v1/auth/login - Login, sets the session cookie
//! - GET|POST /api/v1/auth/logout - Logout
//! - POST /api/v1/auth/reset_request - Mail a password reset link
//! - GET|POST /api/v1/auth/reset_password/{token} - Check token / set new password
//!
//! Register, login and both reset routes refuse already authenticated users.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::api::common::MessageResponse;
use crate::api::forms::{LoginForm, RegistrationForm, RequestResetForm, ResetPasswordForm};
use crate::api::middleware::{ApiError, AppState, MaybeUser, SessionToken};
use crate::api::responses::{AccountResponse, AuthResponse};
use crate::services::{LoginInput, RegisterInput, UserService};

const LOGIN_ROUTE: &str = "/api/v1/auth/login";
const RESET_REQUEST_ROUTE: &str = "/api/v1/auth/reset_request";

/// `?next=` of the login route
#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route(
            "/activate_account/{token}",
            get(activate_account).post(activate_account),
        )
        .route("/login", post(login))
        .route("/reset_request", post(reset_request))
        .route(
            "/reset_password/{token}",
            get(check_reset_token).post(reset_password),
        )
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/logout", get(logout).post(logout))
}

fn session_cookie(session_id: &str, max_age_secs: Option<i64>) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!("session={}; Path=/; HttpOnly; SameSite=Lax", session_id);
    if let Some(max_age) = max_age_secs {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| ApiError::internal_error(format!("Invalid cookie: {}", e)))
}

/// POST /api/v1/auth/register - User registration
///
/// The account starts without roles; the mailed link grants `Student`.
async fn register(
    State(state): State<AppState>,
    current: MaybeUser,
    Json(form): Json<RegistrationForm>,
) -> Result<impl IntoResponse, ApiError> {
    current.reject_authenticated()?;
    form.validate()?;

    let user = state
        .user_service
        .register(RegisterInput::new(form.username, form.email, form.password))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "An email has been sent with instructions to activate your account"
                .to_string(),
            next: LOGIN_ROUTE.to_string(),
            user: AccountResponse::new(user, Vec::new()),
            token: None,
        }),
    ))
}

/// GET|POST /api/v1/auth/activate_account/{token}
async fn activate_account(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.activate_account(&token).await?;
    Ok(Json(MessageResponse::with_next(
        "Your account has been activated",
        LOGIN_ROUTE,
    )))
}

/// POST /api/v1/auth/login - User login
///
/// "Remember me" sessions get a persistent cookie; others last for the
/// browser session.
async fn login(
    State(state): State<AppState>,
    current: MaybeUser,
    Query(query): Query<NextQuery>,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    current.reject_authenticated()?;
    form.validate()?;

    let (user, session) = state
        .user_service
        .login(LoginInput::new(form.email, form.password, form.remember))
        .await?;
    let roles = state.user_service.role_names(user.id).await?;

    let max_age = form
        .remember
        .then(|| state.user_service.session_expiration_days() * 24 * 60 * 60);
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie(&session.id, max_age)?);

    tracing::debug!("User {} logged in", user.username);
    Ok((
        headers,
        Json(AuthResponse {
            message: "You have been logged in!".to_string(),
            next: UserService::safe_next(query.next.as_deref()),
            user: AccountResponse::new(user, roles),
            token: Some(session.id),
        }),
    ))
}

/// GET|POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<impl IntoResponse, ApiError> {
    state.user_service.logout(&token).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, session_cookie("", Some(0))?);
    Ok((
        headers,
        Json(MessageResponse::with_next("You have been logged out", "/")),
    ))
}

/// POST /api/v1/auth/reset_request - Mail a password reset link
async fn reset_request(
    State(state): State<AppState>,
    current: MaybeUser,
    Json(form): Json<RequestResetForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    current.reject_authenticated()?;
    form.validate()?;

    state.user_service.request_password_reset(&form.email).await?;
    Ok(Json(MessageResponse::with_next(
        "An email has been sent with instructions to reset your password",
        LOGIN_ROUTE,
    )))
}

/// GET /api/v1/auth/reset_password/{token} - Check a reset token before
/// asking for the new password
async fn check_reset_token(
    State(state): State<AppState>,
    current: MaybeUser,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    current.reject_authenticated()?;
    let user = state
        .user_service
        .check_reset_token(&token)
        .await
        .map_err(|e| invalid_token(e.into()))?;
    Ok(Json(MessageResponse::new(format!(
        "Choose a new password for {}",
        user.username
    ))))
}

/// POST /api/v1/auth/reset_password/{token} - Set a new password
async fn reset_password(
    State(state): State<AppState>,
    current: MaybeUser,
    Path(token): Path<String>,
    Json(form): Json<ResetPasswordForm>,
) -> Result<Json<MessageResponse>, ApiError> {
    current.reject_authenticated()?;
    state
        .user_service
        .check_reset_token(&token)
        .await
        .map_err(|e| invalid_token(e.into()))?;
    form.validate()?;

    state
        .user_service
        .reset_password(&token, &form.password)
        .await?;
    Ok(Json(MessageResponse::with_next(
        "Your password has been changed. You are now able to sign in",
        LOGIN_ROUTE,
    )))
}

/// A bad reset token points the client back at the reset request form
fn invalid_token(mut error: ApiError) -> ApiError {
    if error.error.code == "VALIDATION_ERROR" {
        error.error.details = Some(serde_json::json!({ "next": RESET_REQUEST_ROUTE }));
    }
    error
}
