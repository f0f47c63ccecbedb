use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::presentation::middleware::auth::AuthenticatedPrincipal;
use crate::presentation::middleware::error::AppError;

/// Liveness probe, outside the protected subtree.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "request-pipeline-service"
    }))
}

/// Returns the verified subject the authenticator placed in request
/// extensions.
pub async fn get_profile(
    principal: Option<Extension<AuthenticatedPrincipal>>,
) -> Result<Json<Value>, AppError> {
    let Extension(principal) = principal.ok_or_else(|| AppError::Authentication {
        message: "Authentication required".to_string(),
    })?;

    Ok(Json(json!({
        "success": true,
        "user_id": principal.subject
    })))
}

/// Minimal protected endpoint used to exercise the authenticated path.
pub async fn protected(
    principal: Option<Extension<AuthenticatedPrincipal>>,
) -> Result<Json<Value>, AppError> {
    let Extension(principal) = principal.ok_or_else(|| AppError::Authentication {
        message: "Authentication required".to_string(),
    })?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Hello, {}! This is a protected route.", principal.subject)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_health_check_shape() {
        let response = health_check().await;
        let json_value = response.0;

        assert_eq!(json_value["status"], "healthy");
        assert_eq!(json_value["service"], "request-pipeline-service");
        assert!(json_value.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn test_get_profile_returns_subject() {
        let principal = AuthenticatedPrincipal { subject: "user-7".to_string() };
        let response = get_profile(Some(Extension(principal))).await.unwrap();

        assert_eq!(response.0["success"], true);
        assert_eq!(response.0["user_id"], "user-7");
    }

    #[tokio::test]
    async fn test_get_profile_without_principal_is_unauthorized() {
        let error = get_profile(None).await.unwrap_err();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_protected_greets_subject() {
        let principal = AuthenticatedPrincipal { subject: "user-7".to_string() };
        let response = protected(Some(Extension(principal))).await.unwrap();

        assert_eq!(response.0["success"], true);
        assert!(response.0["message"].as_str().unwrap().contains("user-7"));
    }

    #[tokio::test]
    async fn test_protected_without_principal_is_unauthorized() {
        let error = protected(None).await.unwrap_err();
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
