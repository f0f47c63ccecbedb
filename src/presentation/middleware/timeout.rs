use std::{future::Future, pin::Pin, time::Duration};

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use tracing::warn;

use super::correlation::correlation_id;
use super::error::error_response;

/// Deadline middleware: bounds how long the rest of the pipeline may take.
///
/// When the deadline elapses the guard replies once with a 408 envelope and
/// drops the downstream future, which cancels it at its next yield point.
/// Purely synchronous handler sections still run until they next await; the
/// guard's reply is not delayed by that.
pub fn timeout_guard(
    timeout: Duration,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |request: Request, next: Next| {
        Box::pin(async move {
            let request_id = correlation_id(request.extensions()).to_string();
            let path = request.uri().path().to_string();

            match tokio::time::timeout(timeout, next.run(request)).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(
                        target: "http_requests",
                        request_id = %request_id,
                        path = %path,
                        timeout_ms = timeout.as_millis() as u64,
                        "request timed out"
                    );

                    error_response(StatusCode::REQUEST_TIMEOUT, "Request timeout", &request_id)
                }
            }
        })
    }
}
