//! Listings and site information
//!
//! - GET /api/v1 and /api/v1/index?page=&query= - Every post, newest first
//! - GET /api/v1/home?page=&query= - Posts by followed users and oneself
//! - GET /api/v1/about - Application name and version

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{PageQuery, PageResponse};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{PostQuery, PostScope, PostWithMeta};

/// Build the public site router
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/index", get(index))
        .route("/about", get(about))
}

/// Build protected site routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/home", get(home))
}

/// Response for the about page
#[derive(Debug, Serialize)]
pub struct AboutResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
}

async fn list(
    state: &AppState,
    scope: PostScope,
    query: PageQuery,
) -> Result<Json<PageResponse<PostWithMeta>>, ApiError> {
    let params = query.list_params(state.per_page)?;
    let filter = PostQuery::new(scope).with_search(query.query);
    let posts = state.post_service.list(&filter, &params).await?;
    Ok(Json(posts.into()))
}

/// GET /api/v1 - All posts
async fn index(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<PostWithMeta>>, ApiError> {
    list(&state, PostScope::All, query).await
}

/// GET /api/v1/home - The signed-in user's feed
async fn home(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageResponse<PostWithMeta>>, ApiError> {
    list(&state, PostScope::Feed(user.id), query).await
}

/// GET /api/v1/about
async fn about() -> Json<AboutResponse> {
    Json(AboutResponse {
        name: "Educatia",
        version: env!("CARGO_PKG_VERSION"),
        description: env!("CARGO_PKG_DESCRIPTION"),
    })
}
