// Request parsing utilities for HTTP handlers

use hyper::{Body, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::response_helpers::json_error;

/// Parse a JSON request body into a typed structure.
///
/// On failure returns a ready-to-send 400 response.
///
/// # Example
/// ```ignore
/// let request: ChatRequest = match parse_json_body(req.into_body()).await {
///     Ok(req) => req,
///     Err(error_response) => return Ok(error_response),
/// };
/// ```
pub async fn parse_json_body<T: DeserializeOwned>(body: Body) -> Result<T, Response<Body>> {
    let Ok(body_bytes) = hyper::body::to_bytes(body).await else {
        return Err(json_error(StatusCode::BAD_REQUEST, "Failed to read request body"));
    };

    log::debug!("[REQUEST] Body: {} bytes", body_bytes.len());

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        log::warn!("[REQUEST] JSON parsing error: {e}");
        json_error(StatusCode::BAD_REQUEST, &format!("Invalid JSON format: {e}"))
    })
}
