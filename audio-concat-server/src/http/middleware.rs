//! HTTP middleware

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, warn};

/// Log every request with its status and how long the handler took.
///
/// Concatenation requests can run for minutes, so slow responses are not
/// flagged on their own.
pub async fn request_logger(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_success() {
        info!(%method, %uri, status = status.as_u16(), elapsed_ms, "request");
    } else {
        warn!(%method, %uri, status = status.as_u16(), elapsed_ms, "request failed");
    }

    response
}
