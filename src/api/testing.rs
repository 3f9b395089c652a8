//! Router test harness: an in-memory database, a recording mailer and a
//! temporary upload directory behind the full router.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::api::{build_router, AppState};
use crate::config::Config;
use crate::db::{create_test_pool, migrations};
use crate::models::User;
use crate::services::email::RecordingMailer;
use crate::services::{RegisterInput, TokenSigner};

pub const SECRET: &str = "test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub tokens: TokenSigner,
    pub uploads: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub set_cookie: Option<String>,
    pub body: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let uploads = TempDir::new().expect("Failed to create upload dir");
        let mut config = Config::default();
        config.security.secret_key = SECRET.to_string();
        config.upload.path = uploads.path().join("profile_pics");
        config.pagination.per_page = 2;

        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(pool, &config, mailer.clone());
        state
            .role_service
            .ensure_default_roles()
            .await
            .expect("Failed to create roles");

        Self {
            router: build_router(state.clone(), &config.server.cors_origin),
            state,
            mailer,
            tokens: TokenSigner::new(SECRET, config.security.token_expiration_secs),
            uploads,
        }
    }

    /// Send a request; `session` becomes the session cookie
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            set_cookie,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        session: Option<&str>,
        json: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(session) = session {
            builder = builder.header(header::COOKIE, format!("session={}", session));
        }
        let body = match json {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("Invalid request")).await
    }

    pub async fn get(&self, uri: &str, session: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, session, None).await
    }

    pub async fn post(&self, uri: &str, session: Option<&str>, json: Value) -> TestResponse {
        self.request(Method::POST, uri, session, Some(json)).await
    }

    /// Register and activate an account
    pub async fn create_user(&self, username: &str, email: &str, password: &str) -> User {
        let user = self
            .state
            .user_service
            .register(RegisterInput::new(username, email, password))
            .await
            .expect("Failed to register");
        self.state
            .user_service
            .activate_account(&self.tokens.generate(user.id))
            .await
            .expect("Failed to activate")
    }

    /// Log in through the API and return the session id
    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .post(
                "/api/v1/auth/login",
                None,
                serde_json::json!({"email": email, "password": password}),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        session_from_cookie(response.set_cookie.as_deref()).expect("No session cookie")
    }

    /// Create a user and log them in
    pub async fn signed_in(&self, username: &str) -> (User, String) {
        let email = format!("{}@example.com", username);
        let user = self.create_user(username, &email, "password").await;
        let session = self.login(&email, "password").await;
        (user, session)
    }

    pub async fn make_admin(&self, user: &User) {
        self.state
            .role_service
            .grant(user.id, crate::models::role::ADMIN)
            .await
            .expect("Failed to grant Admin");
    }
}

pub fn session_from_cookie(cookie: Option<&str>) -> Option<String> {
    cookie?
        .split(';')
        .next()?
        .strip_prefix("session=")
        .filter(|s| !s.is_empty())
        .map(String::from)
}
