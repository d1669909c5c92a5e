use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

const MAX_LOGGED_BODY: usize = 2000;

/// Largest body buffered for logging; CSV uploads can be big
const MAX_BUFFERED_BODY: usize = 16 * 1024 * 1024;

/// Middleware that logs requests and responses with their bodies.
///
/// Multipart bodies are not echoed, only their size.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read request body: {}", e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Failed to read request body").into_response();
        }
    };

    let request_body = loggable_body(&parts.headers, &bytes);

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        body = %request_body,
        "→ Request"
    );

    let request = Request::from_parts(parts, Body::from(bytes));

    let response = next.run(request).await;

    let status = response.status();
    let (parts, body) = response.into_parts();

    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(request_id = %request_id, "Failed to read response body: {}", e);
            Bytes::new()
        }
    };

    let response_body = loggable_body(&parts.headers, &bytes);
    let latency = start.elapsed();

    if status.is_server_error() {
        tracing::error!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            body = %response_body,
            "← Response"
        );
    } else {
        tracing::info!(
            request_id = %request_id,
            method = %method,
            uri = %uri,
            status = %status.as_u16(),
            latency_ms = %latency.as_millis(),
            body = %response_body,
            "← Response"
        );
    }

    Response::from_parts(parts, Body::from(bytes))
}

fn loggable_body(headers: &HeaderMap, bytes: &Bytes) -> String {
    let is_multipart = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/"));
    if is_multipart {
        return format!("[multipart, {} bytes]", bytes.len());
    }

    truncate_body(&String::from_utf8_lossy(bytes), MAX_LOGGED_BODY)
}

/// Truncate body for logging, adding ellipsis if truncated
fn truncate_body(body: &str, max_len: usize) -> String {
    let body = body.trim();
    if body.len() <= max_len {
        return body.to_string();
    }

    let mut cut = max_len;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!(
        "{}...[truncated, {} bytes total]",
        &body[..cut],
        body.len()
    )
}
