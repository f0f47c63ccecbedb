use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use futures_util::FutureExt;
use tracing::error;

use super::correlation::correlation_id;
use super::error::error_response;

/// Recovers panics from every downstream stage and the handler itself. The
/// client sees one generic 500 envelope with the correlation id; the panic
/// payload and stack only reach the log.
pub async fn panic_barrier(request: Request, next: Next) -> Response {
    let request_id = correlation_id(request.extensions()).to_string();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            error!(
                target: "http_requests",
                request_id = %request_id,
                panic = panic_detail(&*panic),
                stack = %Backtrace::force_capture(),
                method = %method,
                path = %path,
                "panic recovered"
            );

            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", &request_id)
        }
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
