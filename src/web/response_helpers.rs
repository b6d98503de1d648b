// HTTP response helpers shared by the route handlers

use hard_chat_engine::ChatError;
use hyper::http::response::Builder;
use hyper::{Body, Response, StatusCode};
use serde::Serialize;
use serde_json::json;

/// Standard CORS headers
const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type, authorization";

fn with_cors(status: StatusCode) -> Builder {
    Response::builder()
        .status(status)
        .header("access-control-allow-origin", CORS_ORIGIN)
        .header("access-control-allow-methods", CORS_METHODS)
        .header("access-control-allow-headers", CORS_HEADERS)
}

fn finish(builder: Builder, body: Body) -> Response<Body> {
    builder.body(body).unwrap_or_else(|e| {
        log::error!("Failed to build response: {e}");
        let mut fallback = Response::new(Body::empty());
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());
    finish(
        with_cors(status).header("content-type", "application/json"),
        Body::from(json),
    )
}

/// Build a JSON error response
pub fn json_error(status: StatusCode, message: &str) -> Response<Body> {
    json_response(status, &json!({ "error": message }))
}

/// HTTP status for a controller error.
pub fn chat_error_status(error: &ChatError) -> StatusCode {
    match error {
        ChatError::InputTooLong { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::Config { .. } | ChatError::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        ChatError::InferenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Tokenization(_) | ChatError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// `{"error": ...}` body plus the numbers that explain the rejection.
pub fn chat_error_body(error: &ChatError) -> serde_json::Value {
    match error {
        ChatError::InputTooLong { measured, limit } => json!({
            "error": error.to_string(),
            "measured": measured,
            "limit": limit,
        }),
        ChatError::Config { requested, ceiling } => json!({
            "error": error.to_string(),
            "requested": requested,
            "ceiling": ceiling,
        }),
        ChatError::InvalidParameter { name, .. } => json!({
            "error": error.to_string(),
            "parameter": name,
        }),
        _ => json!({ "error": error.to_string() }),
    }
}

pub fn chat_error_response(error: &ChatError) -> Response<Body> {
    json_response(chat_error_status(error), &chat_error_body(error))
}

/// Build a plain-text response
pub fn text_response(status: StatusCode, body: impl Into<Body>) -> Response<Body> {
    finish(
        with_cors(status).header("content-type", "text/plain; charset=utf-8"),
        body.into(),
    )
}

/// Server-Sent Events response around a channel body
pub fn sse_response(body: Body) -> Response<Body> {
    finish(
        with_cors(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .header("connection", "keep-alive")
            .header("x-accel-buffering", "no"), // Disable nginx buffering
        body,
    )
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    finish(with_cors(StatusCode::OK), Body::empty())
}
