//! Static file serving and the JSON fallback
//!
//! Profile pictures are served from the upload directory under
//! `/static/images/profile_pics`. Any other unknown path answers a JSON 404.

use axum::http::Uri;
use std::path::Path;
use tower_http::services::ServeDir;

use crate::api::middleware::ApiError;

/// File service for the profile picture directory
pub fn profile_pictures(dir: &Path) -> ServeDir {
    ServeDir::new(dir)
}

/// Router fallback
pub async fn not_found(uri: Uri) -> ApiError {
    tracing::debug!("No route for {}", uri.path());
    ApiError::not_found(format!("The requested URL {} was not found", uri.path()))
}

#[cfg(test)]
mod tests {
    use crate::api::testing::TestApp;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = TestApp::new().await;

        let response = app.get("/api/v1/nowhere", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["error"]["code"], "NOT_FOUND");

        let response = app.get("/definitely/not/here", None).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_serves_profile_pictures() {
        let app = TestApp::new().await;
        let dir = app.state.avatar_store.dir().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("abc.png"), b"png-bytes").unwrap();

        let response = app
            .send(
                Request::builder()
                    .uri("/static/images/profile_pics/abc.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }
}
