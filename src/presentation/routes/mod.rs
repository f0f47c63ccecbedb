use axum::{middleware::from_fn, routing::get, Router};

use crate::infrastructure::http::AppState;
use crate::presentation::{handlers, middleware::auth::require_auth};

/// Create all application routes. Authentication guards only the protected
/// subtree; health stays public.
pub fn create_routes(state: &AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest(&state.config.auth.protected_prefix, protected_routes(state))
}

/// Routes under the protected prefix, every one behind token verification.
fn protected_routes(state: &AppState) -> Router {
    Router::new()
        .route("/profile", get(handlers::get_profile))
        .route("/protected", get(handlers::protected))
        .route_layer(from_fn(require_auth(state.verifier.clone())))
}
