//! Post API endpoints
//!
//! - GET /api/v1/posts/{id} - Post with author and tags
//! - POST /api/v1/posts - Create a post
//! - GET /api/v1/posts/{id}/edit - Editor prefill (author only)
//! - PUT /api/v1/posts/{id} - Replace title, content and tags (author only)
//! - DELETE /api/v1/posts/{id} - Delete (author only)

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::api::common::MessageResponse;
use crate::api::forms::PostForm;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreatePostInput, PostWithMeta, UpdatePostInput};
use crate::services::PostEditForm;

/// Build public post routes
pub fn public_router() -> Router<AppState> {
    Router::new().route("/posts/{id}", get(get_post))
}

/// Build protected post routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{id}/edit", get(edit_post))
        .route("/posts/{id}", axum::routing::put(update_post).delete(delete_post))
}

/// A post together with the outcome message
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub message: String,
    pub post: PostWithMeta,
}

/// GET /api/v1/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostWithMeta>, ApiError> {
    Ok(Json(state.post_service.get(id).await?))
}

/// POST /api/v1/posts
async fn create_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(form): Json<PostForm>,
) -> Result<impl IntoResponse, ApiError> {
    form.validate()?;
    let tags = form.tag_names();

    let post = state
        .post_service
        .create(
            user.id,
            CreatePostInput {
                title: form.title,
                content: form.content,
                tags,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Your posts has been created".to_string(),
            post,
        }),
    ))
}

/// GET /api/v1/posts/{id}/edit
async fn edit_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PostEditForm>, ApiError> {
    Ok(Json(state.post_service.edit_prefill(user.id, id).await?))
}

/// PUT /api/v1/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
    Json(form): Json<PostForm>,
) -> Result<Json<PostResponse>, ApiError> {
    form.validate()?;
    let tags = form.tag_names();

    let post = state
        .post_service
        .update(
            user.id,
            id,
            UpdatePostInput {
                title: form.title,
                content: form.content,
                tags,
            },
        )
        .await?;

    Ok(Json(PostResponse {
        message: "Your posts has been updated".to_string(),
        post,
    }))
}

/// DELETE /api/v1/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.post_service.delete(user.id, id).await?;
    Ok(Json(MessageResponse::with_next(
        "Your posts has been deleted",
        "/",
    )))
}
