use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::from_fn,
    response::Response,
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::infrastructure::{
    config::{AppConfig, CorsConfig, RateLimitSettings},
    store::{RedisWindowStore, SlidingWindowStore},
};
use crate::presentation::middleware::{
    correlation::{correlation_context, correlation_id, REQUEST_ID_HEADER},
    error::error_response,
    logging::access_logger,
    panic_barrier::panic_barrier,
    rate_limit::{rate_limit_middleware, RateLimitConfig, RateLimiter},
    security::security_headers,
    timeout::timeout_guard,
    auth::JwtVerifier,
};
use crate::presentation::routes;

/// Everything the pipeline needs per request, built once at process start
/// and shared by handle. No ambient globals.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub limiter: Arc<RateLimiter>,
    pub verifier: Arc<JwtVerifier>,
}

impl AppState {
    /// Assemble the pipeline state. The limiter strategy follows store
    /// reachability: a window store selects the distributed strategy, its
    /// absence the in-process fallback.
    pub fn new(config: AppConfig, window_store: Option<Arc<dyn SlidingWindowStore>>) -> Self {
        let rate_config = rate_limit_config(&config.rate_limit);
        let limiter = match window_store {
            Some(store) => RateLimiter::distributed(store, &rate_config),
            None => RateLimiter::local(&rate_config),
        };

        Self {
            verifier: Arc::new(JwtVerifier::new(&config.auth.secret)),
            limiter: Arc::new(limiter),
            config,
        }
    }
}

/// Create the main application router with the full pipeline applied in
/// order: correlation, panic containment, access logging, security headers,
/// timeout, rate limiting, CORS, then the route split with authentication
/// on the protected subtree.
pub fn create_app(state: &AppState) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(from_fn(correlation_context))
        .layer(from_fn(panic_barrier))
        .layer(from_fn(access_logger))
        .layer(from_fn(security_headers))
        .layer(from_fn(timeout_guard(state.config.timeout.request_timeout())))
        .layer(from_fn(rate_limit_middleware(state.limiter.clone())))
        .layer(create_cors_layer(&state.config.cors));

    routes::create_routes(state).fallback(not_found_handler).layer(middleware_stack)
}

/// Handler for 404 not found, same envelope as every other rejection
async fn not_found_handler(request: Request) -> Response {
    let request_id = correlation_id(request.extensions());
    error_response(StatusCode::NOT_FOUND, "Resource not found", request_id)
}

/// Create CORS layer from the configured allow-list
fn create_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        config.allowed_origins.iter().filter_map(|origin| origin.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300))
}

fn rate_limit_config(settings: &RateLimitSettings) -> RateLimitConfig {
    RateLimitConfig {
        max_requests: settings.max_requests,
        window: settings.window(),
        per_second: settings.per_second,
        burst: settings.burst,
        ..RateLimitConfig::default()
    }
}

/// Start the HTTP server
///
/// # Errors
/// Returns an error if the server fails to start
pub async fn start_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Probe the shared store; its reachability picks the limiter strategy.
    let window_store =
        match RedisWindowStore::connect(&config.redis.url, config.redis.connect_timeout()).await {
            Ok(store) => Some(Arc::new(store) as Arc<dyn SlidingWindowStore>),
            Err(e) => {
                warn!("shared rate-limit store unavailable, using in-process limiter: {e}");
                None
            }
        };

    let state = AppState::new(config, window_store);
    if let RateLimiter::Local(limiter) = state.limiter.as_ref() {
        limiter.spawn_sweeper();
    }

    let app = create_app(&state);
    let addr = state.config.server.socket_addr();

    info!("starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
