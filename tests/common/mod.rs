#![allow(dead_code)]

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use request_pipeline_service::infrastructure::{
    config::{
        AppConfig, AuthConfig, CorsConfig, LogFormat, LoggingConfig, RateLimitSettings,
        RedisConfig, RuntimeMode, ServerConfig, TimeoutConfig,
    },
    http::AppState,
};
use request_pipeline_service::presentation::middleware::auth::Claims;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// Configuration for a pipeline under test: permissive limits unless a test
/// overrides them.
pub fn test_config() -> AppConfig {
    AppConfig {
        mode: RuntimeMode::Local,
        server: ServerConfig { host: "127.0.0.1".to_string(), port: 0 },
        auth: AuthConfig {
            secret: TEST_SECRET.to_string(),
            protected_prefix: "/api/v1".to_string(),
        },
        redis: RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            connect_timeout_seconds: 1,
        },
        rate_limit: RateLimitSettings {
            max_requests: 1000,
            window_seconds: 60,
            per_second: 1000,
            burst: 2000,
        },
        timeout: TimeoutConfig { default_seconds: 5 },
        cors: CorsConfig { allowed_origins: vec!["http://localhost:3000".to_string()] },
        logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Json },
    }
}

/// Pipeline state with the local limiter (no shared store).
pub fn test_state(config: AppConfig) -> AppState {
    AppState::new(config, None)
}

/// Mint a token the way the external auth service would.
pub fn mint_token(secret: &str, subject: &str, exp_offset_secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        iss: "auth-service".to_string(),
        iat: now.max(0) as usize,
        exp: (now + exp_offset_secs).max(0) as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .unwrap()
}

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.get_with_headers(path, &[]).await
    }

    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().uri(path).method("GET");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        TestResponse::new(response).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    async fn new(response: axum::response::Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();

        Self { status, headers, body }
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(self.status, expected, "Response body: {}", self.body);
    }
}
