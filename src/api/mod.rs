//! API layer - HTTP handlers and routing
//!
//! All JSON endpoints live under `/api/v1`:
//! - Listings and site information
//! - Auth (registration, activation, login, password reset)
//! - User profiles and the follow graph
//! - Posts and tags
//! - Admin back office
//!
//! Profile pictures are served from `/static/images/profile_pics`.

pub mod admin;
pub mod auth;
pub mod common;
pub mod forms;
pub mod middleware;
pub mod posts;
pub mod responses;
pub mod site;
pub mod static_files;
pub mod tags;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::models::PROFILE_PICS_URL;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest("/admin", admin::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_admin,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(site::protected_router())
        .merge(users::protected_router(state.avatar_store.max_file_size()))
        .merge(posts::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(site::public_router())
        .nest("/auth", auth::public_router())
        .merge(users::public_router())
        .merge(posts::public_router())
        .nest("/tags", tags::router())
        .merge(admin_routes)
        .merge(protected_routes)
        // Resolves the session and refreshes last_seen on every request
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    // CORS configuration - cookie authentication needs credentials
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);
    let cors = match cors_origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(_) => {
            tracing::warn!("Ignoring invalid CORS origin {:?}", cors_origin);
            cors
        }
    };

    Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service(
            PROFILE_PICS_URL,
            static_files::profile_pictures(state.avatar_store.dir()),
        )
        .fallback(static_files::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
