//! Admin API endpoints
//!
//! Back-office management of users, roles, posts and tags. Every route sits
//! behind `require_auth` and `require_admin`:
//! - GET /api/v1/admin - Dashboard counts
//! - /api/v1/admin/users - list, get, update (incl. roles), delete
//! - /api/v1/admin/roles - list, create, update description, delete
//! - /api/v1/admin/posts - list, delete
//! - /api/v1/admin/tags - list, create, rename, delete

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::common::{page_params, parse_page, MessageResponse, PageResponse};
use crate::api::forms::{AdminUserForm, RoleDescriptionForm, RoleForm, TagForm};
use crate::api::middleware::{ApiError, AppState};
use crate::api::responses::AccountResponse;
use crate::models::{
    AdminUpdateUserInput, ListParams, PagedResult, PostQuery, PostScope, PostWithMeta, Role,
    TagWithCount,
};

/// Response for dashboard stats
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_users: i64,
    pub total_roles: i64,
    pub total_posts: i64,
    pub total_tags: i64,
}

/// Admin pagination query parameters.
///
/// Values that are not numbers fall back to page 1 and 20 rows.
#[derive(Debug, Default, Deserialize)]
pub struct AdminPageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub per_page: Option<String>,
}

const ADMIN_PER_PAGE: i64 = 20;

impl AdminPageQuery {
    fn params(&self) -> Result<ListParams, ApiError> {
        let per_page = self
            .per_page
            .as_deref()
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(ADMIN_PER_PAGE);
        page_params(parse_page(self.page.as_deref()), per_page)
    }
}

/// Response for role list
#[derive(Debug, Serialize)]
pub struct RoleListResponse {
    pub roles: Vec<Role>,
}

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_dashboard))
        // Users
        .route("/users", get(list_users))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        // Roles
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{id}", put(update_role).delete(delete_role))
        // Posts
        .route("/posts", get(list_posts))
        .route("/posts/{id}", axum::routing::delete(delete_post))
        // Tags
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", put(rename_tag).delete(delete_tag))
}

/// GET /api/v1/admin - Dashboard counts
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    Ok(Json(DashboardResponse {
        total_users: state.user_service.count().await?,
        total_roles: state.role_service.count().await?,
        total_posts: state.post_service.count().await?,
        total_tags: state.tag_service.count().await?,
    }))
}

// ============================================================================
// Users
// ============================================================================

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<AdminPageQuery>,
) -> Result<Json<PageResponse<AccountResponse>>, ApiError> {
    let params = query.params()?;
    let users = state.user_service.list(&params).await?;

    let mut accounts = Vec::with_capacity(users.items.len());
    for user in users.items {
        let roles = state.user_service.role_names(user.id).await?;
        accounts.push(AccountResponse::new(user, roles));
    }

    Ok(Json(PagedResult::new(accounts, users.total, &params).into()))
}

/// GET /api/v1/admin/users/{id}
async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user = state
        .user_service
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", id)))?;
    let roles = state.user_service.role_names(user.id).await?;
    Ok(Json(AccountResponse::new(user, roles)))
}

/// PUT /api/v1/admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<AdminUserForm>,
) -> Result<Json<AccountResponse>, ApiError> {
    form.validate()?;
    let user = state
        .user_service
        .admin_update(
            id,
            AdminUpdateUserInput {
                username: form.username,
                email: form.email,
                about_me: form.about_me,
                roles: form.roles,
            },
        )
        .await?;
    let roles = state.user_service.role_names(user.id).await?;
    Ok(Json(AccountResponse::new(user, roles)))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let user = state.user_service.delete(id).await?;
    state.avatar_store.remove(&user.image_file).await;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Roles
// ============================================================================

/// GET /api/v1/admin/roles
async fn list_roles(State(state): State<AppState>) -> Result<Json<RoleListResponse>, ApiError> {
    Ok(Json(RoleListResponse {
        roles: state.role_service.list().await?,
    }))
}

/// POST /api/v1/admin/roles
async fn create_role(
    State(state): State<AppState>,
    Json(form): Json<RoleForm>,
) -> Result<impl IntoResponse, ApiError> {
    form.validate()?;
    let role = state
        .role_service
        .create(&form.name, &form.description)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// PUT /api/v1/admin/roles/{id}
async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<RoleDescriptionForm>,
) -> Result<Json<Role>, ApiError> {
    Ok(Json(
        state
            .role_service
            .update_description(id, &form.description)
            .await?,
    ))
}

/// DELETE /api/v1/admin/roles/{id}
async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.role_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Posts
// ============================================================================

/// GET /api/v1/admin/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminPageQuery>,
) -> Result<Json<PageResponse<PostWithMeta>>, ApiError> {
    let posts = state
        .post_service
        .list(&PostQuery::new(PostScope::All), &query.params()?)
        .await?;
    Ok(Json(posts.into()))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.post_service.admin_delete(id).await?;
    Ok(Json(MessageResponse::new(format!("Post {} has been deleted", id))))
}

// ============================================================================
// Tags
// ============================================================================

/// GET /api/v1/admin/tags
async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    Ok(Json(TagListResponse {
        tags: state.tag_service.list().await?,
    }))
}

/// POST /api/v1/admin/tags
async fn create_tag(
    State(state): State<AppState>,
    Json(form): Json<TagForm>,
) -> Result<impl IntoResponse, ApiError> {
    form.validate()?;
    let tag = state.tag_service.create(&form.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// PUT /api/v1/admin/tags/{id}
async fn rename_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<TagForm>,
) -> Result<impl IntoResponse, ApiError> {
    form.validate()?;
    let tag = state.tag_service.rename(id, &form.name).await?;
    Ok(Json(tag))
}

/// DELETE /api/v1/admin/tags/{id}
async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::api::testing::TestApp;
    use crate::models::role::{ADMIN, STUDENT, TUTOR};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    async fn admin_session(app: &TestApp) -> String {
        let (admin, session) = app.signed_in("root").await;
        app.make_admin(&admin).await;
        session
    }

    #[tokio::test]
    async fn test_admin_access_control() {
        let app = TestApp::new().await;
        let (_, student) = app.signed_in("ana").await;

        let response = app.get("/api/v1/admin/users?page=1", None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.body["error"]["details"]["login"],
            "/api/v1/auth/login?next=%2Fapi%2Fv1%2Fadmin%2Fusers"
        );

        let response = app.get("/api/v1/admin", Some(&student)).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);

        let admin = admin_session(&app).await;
        let response = app.get("/api/v1/admin", Some(&admin)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["total_users"], 2);
        assert_eq!(response.body["total_roles"], 3);
    }

    #[tokio::test]
    async fn test_admin_page_query_is_lenient() {
        let app = TestApp::new().await;
        let admin = admin_session(&app).await;

        let response = app.get("/api/v1/admin/users?page=abc&per_page=x", Some(&admin)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["page"], 1);
        assert_eq!(response.body["per_page"], 20);

        let response = app.get("/api/v1/admin/users?page=0", Some(&admin)).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["error"]["code"], "NOT_FOUND");

        let response = app
            .get("/api/v1/admin/users?page=9223372036854775807", Some(&admin))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["items"], json!([]));
        assert_eq!(response.body["next_num"], serde_json::Value::Null);

        let response = app
            .get("/api/v1/admin/posts?page=9223372036854775807", Some(&admin))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manage_users() {
        let app = TestApp::new().await;
        let admin = admin_session(&app).await;
        let (ana, _) = app.signed_in("ana").await;

        let response = app.get("/api/v1/admin/users", Some(&admin)).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["total"], 2);

        let uri = format!("/api/v1/admin/users/{}", ana.id);
        let response = app
            .request(
                Method::PUT,
                &uri,
                Some(&admin),
                Some(json!({"email": "ana@school.test", "roles": [TUTOR, STUDENT]})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        assert_eq!(response.body["email"], "ana@school.test");
        assert_eq!(response.body["username"], "ana");
        assert_eq!(response.body["roles"], json!([STUDENT, TUTOR]));

        let response = app
            .request(
                Method::PUT,
                &uri,
                Some(&admin),
                Some(json!({"roles": ["Wizard"]})),
            )
            .await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = app.request(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert_eq!(app.get(&uri, Some(&admin)).await.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manage_roles() {
        let app = TestApp::new().await;
        let admin = admin_session(&app).await;

        let response = app
            .post(
                "/api/v1/admin/roles",
                Some(&admin),
                json!({"name": "Moderator", "description": "Keeps order"}),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED);
        let id = response.body["id"].as_i64().unwrap();

        let response = app
            .post("/api/v1/admin/roles", Some(&admin), json!({"name": ADMIN}))
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);

        let uri = format!("/api/v1/admin/roles/{}", id);
        let response = app
            .request(
                Method::PUT,
                &uri,
                Some(&admin),
                Some(json!({"description": "Moderates posts"})),
            )
            .await;
        assert_eq!(response.body["description"], "Moderates posts");

        let response = app.request(Method::DELETE, &uri, Some(&admin), None).await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let response = app.get("/api/v1/admin/roles", Some(&admin)).await;
        assert_eq!(response.body["roles"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_manage_posts_and_tags() {
        let app = TestApp::new().await;
        let admin = admin_session(&app).await;
        let (_, ana) = app.signed_in("ana").await;
        let response = app
            .post(
                "/api/v1/posts",
                Some(&ana),
                json!({"title": "Hello", "content": "", "tags": "rust"}),
            )
            .await;
        let post_id = response.body["post"]["id"].as_i64().unwrap();
        let tag_id = response.body["post"]["tags"][0]["id"].as_i64().unwrap();

        let response = app.get("/api/v1/admin/posts", Some(&admin)).await;
        assert_eq!(response.body["total"], 1);

        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/admin/tags/{}", tag_id),
                Some(&admin),
                Some(json!({"name": "rustlang"})),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["name"], "rustlang");

        let response = app
            .post("/api/v1/admin/tags", Some(&admin), json!({"name": "rustlang"}))
            .await;
        assert_eq!(response.status, StatusCode::CONFLICT);
        let response = app
            .post("/api/v1/admin/tags", Some(&admin), json!({"name": "web"}))
            .await;
        assert_eq!(response.status, StatusCode::CREATED);

        let response = app.get("/api/v1/admin/tags", Some(&admin)).await;
        assert_eq!(response.body["tags"].as_array().unwrap().len(), 2);

        let response = app
            .request(
                Method::DELETE,
                &format!("/api/v1/admin/posts/{}", post_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            app.get(&format!("/api/v1/posts/{}", post_id), None).await.status,
            StatusCode::NOT_FOUND
        );

        let response = app
            .request(
                Method::DELETE,
                &format!("/api/v1/admin/tags/{}", tag_id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }
}
