//! User profile API endpoints
//!
//! - GET /api/v1/users/{username} - Public profile
//! - GET /api/v1/users/{username}/posts - Posts by a user
//! - GET /api/v1/profile - Own editable profile
//! - PUT /api/v1/profile - Update profile (multipart, optional picture)
//! - POST /api/v1/follow/{username}, /api/v1/unfollow/{username}

use axum::{
    extract::{
        multipart::{Field, MultipartError},
        DefaultBodyLimit, Multipart, Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

use crate::api::common::{MessageResponse, PageQuery, PageResponse};
use crate::api::forms::UpdateProfileForm;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::responses::{AccountResponse, ProfileResponse};
use crate::models::{PostQuery, PostScope, PostWithMeta, UpdateProfileInput};
use crate::services::AvatarError;

/// Room for the text fields and multipart framing around the picture
const FORM_OVERHEAD: usize = 64 * 1024;

/// Build public user routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/users/{username}", get(get_user))
        .route("/users/{username}/posts", get(user_posts))
}

/// Build protected user routes (requires auth middleware)
///
/// The profile body limit follows the configured picture size.
pub fn protected_router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);
    Router::new()
        .route(
            "/profile",
            get(get_profile)
                .put(update_profile)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/follow/{username}", post(follow))
        .route("/unfollow/{username}", post(unfollow))
}

/// Posts written by one user
#[derive(Debug, Serialize)]
pub struct UserPostsResponse {
    pub username: String,
    pub posts: PageResponse<PostWithMeta>,
}

/// An uploaded profile picture
struct Picture {
    file_name: String,
    data: Vec<u8>,
}

/// GET /api/v1/users/{username}
async fn get_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(username): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.user_service.require_by_username(&username).await?;
    let counts = state.user_service.follow_counts(user.id).await?;

    let (is_following, is_self) = match &viewer {
        Some(viewer) => (
            state.user_service.is_following(viewer.id, user.id).await?,
            viewer.id == user.id,
        ),
        None => (false, false),
    };

    Ok(Json(ProfileResponse::new(user, counts, is_following, is_self)))
}

/// GET /api/v1/users/{username}/posts?page=
async fn user_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserPostsResponse>, ApiError> {
    let params = query.list_params(state.per_page)?;
    let user = state.user_service.require_by_username(&username).await?;

    let posts = state
        .post_service
        .list(&PostQuery::new(PostScope::Author(user.id)), &params)
        .await?;

    Ok(Json(UserPostsResponse {
        username: user.username,
        posts: posts.into(),
    }))
}

/// GET /api/v1/profile
async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let roles = state.user_service.role_names(user.id).await?;
    Ok(Json(AccountResponse::new(user, roles)))
}

/// PUT /api/v1/profile
///
/// Multipart fields `username`, `email`, `about_me` and an optional
/// `picture` file. A new picture replaces the old one, which is deleted
/// unless it is the default image.
async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut form = UpdateProfileForm::default();
    let mut picture = None;
    let max_file_size = state.avatar_store.max_file_size();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "picture" {
            let file_name = field.file_name().unwrap_or("").to_string();
            let data = read_picture(field, max_file_size).await?;
            if !file_name.is_empty() && !data.is_empty() {
                picture = Some(Picture { file_name, data });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| multipart_error(e, max_file_size))?;
        match name.as_str() {
            "username" => form.username = value,
            "email" => form.email = value,
            "about_me" => form.about_me = value,
            _ => {}
        }
    }

    form.validate()?;
    if let Some(picture) = &picture {
        state.avatar_store.check_extension(&picture.file_name)?;
    }

    let new_image = match &picture {
        Some(picture) => Some(
            state
                .avatar_store
                .save(&picture.file_name, &picture.data)
                .await?,
        ),
        None => None,
    };

    let input = UpdateProfileInput {
        username: Some(form.username),
        email: Some(form.email),
        about_me: Some(form.about_me),
        image_file: new_image.clone(),
    };
    let updated = match state.user_service.update_profile(&user, input).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(saved) = &new_image {
                state.avatar_store.remove(saved).await;
            }
            return Err(e.into());
        }
    };
    if new_image.is_some() {
        state.avatar_store.remove(&user.image_file).await;
    }

    let roles = state.user_service.role_names(updated.id).await?;
    Ok(Json(serde_json::json!({
        "message": "Your profile has been updated",
        "user": AccountResponse::new(updated, roles),
    })))
}

/// Read the picture part, refusing it once it grows past the size limit
async fn read_picture(mut field: Field<'_>, max_file_size: u64) -> Result<Vec<u8>, ApiError> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_file_size))?
    {
        if (data.len() + chunk.len()) as u64 > max_file_size {
            return Err(AvatarError::TooLarge(max_file_size).into());
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

/// A body cut off by the size limit is reported against the picture
fn multipart_error(e: MultipartError, max_file_size: u64) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AvatarError::TooLarge(max_file_size).into()
    } else {
        ApiError::validation_error(format!("Failed to read multipart: {}", e))
    }
}

/// POST /api/v1/follow/{username}
async fn follow(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = state.user_service.follow(&user, &username).await?;
    Ok(Json(MessageResponse::with_next(
        format!("You are following {}", target.username),
        format!("/api/v1/users/{}", urlencoding::encode(&target.username)),
    )))
}

/// POST /api/v1/unfollow/{username}
async fn unfollow(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(username): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let target = state.user_service.unfollow(&user, &username).await?;
    Ok(Json(MessageResponse::with_next(
        format!("You are not following {}", target.username),
        format!("/api/v1/users/{}", urlencoding::encode(&target.username)),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::TestApp;
    use crate::models::DEFAULT_IMAGE;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use serde_json::json;

    const BOUNDARY: &str = "educatia-boundary";

    fn multipart_body(fields: &[(&str, &str)], picture: Option<(&str, &[u8])>) -> Body {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, data)) = picture {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"picture\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    BOUNDARY, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Body::from(body)
    }

    fn profile_request(session: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(Method::PUT)
            .uri("/api/v1/profile")
            .header(header::COOKIE, format!("session={}", session))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .unwrap()
    }

    #[tokio::test]
    async fn test_public_profile() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;
        app.signed_in("bob").await;

        let response = app.get("/api/v1/users/bob", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["username"], "bob");
        assert_eq!(response.body["avatar_url"], "/static/images/profile_pics/default.jpg");
        assert_eq!(response.body["is_following"], false);
        assert!(response.body.get("email").is_none());

        let response = app.get("/api/v1/users/ana", Some(&session)).await;
        assert_eq!(response.body["is_self"], true);

        let response = app.get("/api/v1/users/nobody", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["error"]["message"], "User nobody not found");
    }

    #[tokio::test]
    async fn test_follow_and_unfollow() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;
        app.signed_in("bob").await;

        for _ in 0..2 {
            let response = app.post("/api/v1/follow/bob", Some(&session), json!({})).await;
            assert_eq!(response.status, StatusCode::OK);
            assert_eq!(response.body["message"], "You are following bob");
        }

        let response = app.get("/api/v1/users/bob", Some(&session)).await;
        assert_eq!(response.body["followers"], 1);
        assert_eq!(response.body["is_following"], true);

        let response = app.post("/api/v1/unfollow/bob", Some(&session), json!({})).await;
        assert_eq!(response.body["message"], "You are not following bob");
        let response = app.get("/api/v1/users/bob", None).await;
        assert_eq!(response.body["followers"], 0);

        let response = app.post("/api/v1/follow/ana", Some(&session), json!({})).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = app.post("/api/v1/follow/nobody", Some(&session), json!({})).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_follow_requires_login() {
        let app = TestApp::new().await;
        app.signed_in("bob").await;

        let response = app.post("/api/v1/follow/bob", None, json!({})).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.body["error"]["details"]["login"],
            "/api/v1/auth/login?next=%2Fapi%2Fv1%2Ffollow%2Fbob"
        );
    }

    #[tokio::test]
    async fn test_update_profile_with_picture() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;

        let body = multipart_body(
            &[
                ("username", "ana2"),
                ("email", "ana2@example.com"),
                ("about_me", "Teaches Rust"),
            ],
            Some(("me.PNG", b"first")),
        );
        let response = app.send(profile_request(&session, body)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        assert_eq!(response.body["message"], "Your profile has been updated");
        assert_eq!(response.body["user"]["username"], "ana2");
        assert_eq!(response.body["user"]["about_me"], "Teaches Rust");
        let first = response.body["user"]["image_file"].as_str().unwrap().to_string();
        assert!(first.ends_with(".png"));
        assert!(app.state.avatar_store.dir().join(&first).exists());

        let body = multipart_body(
            &[("username", "ana2"), ("email", "ana2@example.com")],
            Some(("again.jpg", b"second")),
        );
        let response = app.send(profile_request(&session, body)).await;
        let second = response.body["user"]["image_file"].as_str().unwrap().to_string();
        assert_ne!(first, second);
        assert!(!app.state.avatar_store.dir().join(&first).exists());
        assert!(app.state.avatar_store.dir().join(&second).exists());
    }

    #[tokio::test]
    async fn test_update_profile_rejections() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;
        app.signed_in("bob").await;

        let body = multipart_body(
            &[("username", "ana"), ("email", "ana@example.com")],
            Some(("me.gif", b"gif")),
        );
        let response = app.send(profile_request(&session, body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert!(response.body["error"]["details"].get("picture").is_some());

        let body = multipart_body(&[("username", "bob"), ("email", "ana@example.com")], None);
        let response = app.send(profile_request(&session, body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body["error"]["details"]["username"][0],
            "That username is taken. Please choose a different one"
        );

        let response = app.get("/api/v1/profile", Some(&session)).await;
        assert_eq!(response.body["username"], "ana");
        assert_eq!(response.body["image_file"], DEFAULT_IMAGE);
    }

    #[tokio::test]
    async fn test_picture_size_limit() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;
        let limit = app.state.avatar_store.max_file_size() as usize;
        let fields = [("username", "ana"), ("email", "ana@example.com")];

        let at_limit = vec![7u8; limit];
        let body = multipart_body(&fields, Some(("me.png", &at_limit)));
        let response = app.send(profile_request(&session, body)).await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        let saved = response.body["user"]["image_file"].as_str().unwrap().to_string();
        let stored = std::fs::read(app.state.avatar_store.dir().join(&saved)).unwrap();
        assert_eq!(stored.len(), limit);

        for size in [limit + 1, limit * 2] {
            let data = vec![7u8; size];
            let body = multipart_body(&fields, Some(("big.png", &data)));
            let response = app.send(profile_request(&session, body)).await;
            assert_eq!(response.status, StatusCode::BAD_REQUEST, "size {}", size);
            assert_eq!(
                response.body["error"]["details"]["picture"][0],
                format!("File too large. Maximum size: {} bytes", limit)
            );
        }

        let response = app.get("/api/v1/profile", Some(&session)).await;
        assert_eq!(response.body["image_file"], saved.as_str());
    }

    #[tokio::test]
    async fn test_user_posts_pagination() {
        let app = TestApp::new().await;
        let (_ana, session) = app.signed_in("ana").await;
        for n in 0..3 {
            let response = app
                .post(
                    "/api/v1/posts",
                    Some(&session),
                    json!({"title": format!("Post {}", n), "content": "body"}),
                )
                .await;
            assert_eq!(response.status, StatusCode::CREATED);
        }

        let response = app.get("/api/v1/users/ana/posts", None).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["posts"]["total"], 3);
        assert_eq!(response.body["posts"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(response.body["posts"]["items"][0]["title"], "Post 2");

        let response = app.get("/api/v1/users/ana/posts?page=2", None).await;
        assert_eq!(response.body["posts"]["items"].as_array().unwrap().len(), 1);

        assert_eq!(
            app.get("/api/v1/users/ana/posts?page=3", None).await.status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            app.get("/api/v1/users/nobody/posts", None).await.status,
            StatusCode::NOT_FOUND
        );
    }
}
