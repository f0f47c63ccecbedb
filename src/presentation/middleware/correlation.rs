use axum::{
    extract::Request,
    http::{Extensions, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header carrying the per-request correlation id, inbound and outbound.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id assigned at pipeline entry, immutable for the request's
/// lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Read the request's correlation id from its extensions.
///
/// Stages downstream of [`correlation_context`] always find one; the
/// `"unknown"` fallback only shows up when a stage is exercised in
/// isolation.
pub fn correlation_id(extensions: &Extensions) -> &str {
    extensions.get::<CorrelationId>().map_or("unknown", CorrelationId::as_str)
}

/// Assigns the correlation id: reuse the caller's header when present,
/// otherwise generate a fresh UUID v4. The id is stored in request
/// extensions for downstream stages and mirrored onto the response header.
pub async fn correlation_context(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| Uuid::new_v4().to_string(), ToString::to_string);

    request.extensions_mut().insert(CorrelationId(id.clone()));

    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
