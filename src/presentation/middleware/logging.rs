use axum::{
    extract::Request,
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde_json::json;
use std::time::Instant;
use tracing::{error, info, warn};

use super::client_ip::extract_client_ip;
use super::correlation::correlation_id;

/// Access logging middleware: one structured line per request, emitted after
/// the final status is known. Log level escalates with the status class so
/// operational filtering stays cheap. Emitting the line can never fail the
/// request.
pub async fn access_logger(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();
    let request_id = correlation_id(request.extensions()).to_string();
    let client_ip = extract_client_ip(&request).to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let request_size = content_length(request.headers());

    let response = next.run(request).await;

    let status = response.status();
    let duration = start.elapsed();
    let response_size = content_length(response.headers());

    let log_data = json!({
        "request_id": request_id,
        "method": method,
        "path": path,
        "query": query,
        "status": status.as_u16(),
        "duration_ms": duration.as_millis() as u64,
        "ip": client_ip,
        "user_agent": user_agent,
        "request_size": request_size,
        "response_size": response_size,
    });

    if status.is_server_error() {
        error!(target: "http_requests", "{log_data}");
    } else if status.is_client_error() {
        warn!(target: "http_requests", "{log_data}");
    } else {
        info!(target: "http_requests", "{log_data}");
    }

    response
}

fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
