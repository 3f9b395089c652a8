//! Tag API endpoints
//!
//! - GET /api/v1/tags - All tags with their post counts
//! - GET /api/v1/tags/{id}?page= - Posts carrying a tag, newest first

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::common::{PageQuery, PageResponse};
use crate::api::middleware::{ApiError, AppState};
use crate::models::{PostQuery, PostScope, PostWithMeta, Tag, TagWithCount};

/// Build the tag router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/{id}", get(tag_posts))
}

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,
}

/// Posts carrying one tag
#[derive(Debug, Serialize)]
pub struct TagPostsResponse {
    pub tag: Tag,
    pub posts: PageResponse<PostWithMeta>,
}

/// GET /api/v1/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.list().await?;
    Ok(Json(TagListResponse { tags }))
}

/// GET /api/v1/tags/{id}
async fn tag_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TagPostsResponse>, ApiError> {
    let params = query.list_params(state.per_page)?;
    let tag = state
        .tag_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Tag {} not found", id)))?;

    let posts = state
        .post_service
        .list(&PostQuery::new(PostScope::Tag(tag.id)), &params)
        .await?;

    Ok(Json(TagPostsResponse {
        tag,
        posts: posts.into(),
    }))
}
