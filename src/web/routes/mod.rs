// Route table and handler modules

pub mod chat;
pub mod config;
pub mod examples;
pub mod health;

use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;

use super::response_helpers::{cors_preflight, json_error};
use super::AppState;

/// Dispatch one request by method and path.
pub async fn handle_request(
    req: Request<Body>,
    state: AppState,
) -> Result<Response<Body>, Infallible> {
    log::debug!("{} {}", req.method(), req.uri().path());

    match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => Ok(cors_preflight()),
        (&Method::GET, "/") => health::handle_index(&state).await,
        (&Method::GET, "/health") => health::handle(&state).await,
        (&Method::GET, "/api/config") => config::handle_get_config(&state).await,
        (&Method::POST, "/api/chat/validate") => chat::handle_validate(req, &state).await,
        (&Method::POST, "/api/chat/stream") => chat::handle_stream(req, &state).await,
        (&Method::POST, "/api/chat/retry") => chat::handle_retry(req, &state).await,
        (&Method::POST, "/api/chat/undo") => chat::handle_undo(req).await,
        (&Method::GET, "/api/examples") => examples::handle_list().await,
        (&Method::POST, "/api/examples/run") => examples::handle_run(req, &state).await,
        _ => Ok(json_error(StatusCode::NOT_FOUND, "Not found")),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let (_, state) = state("x");
        let response = handle_request(get("/nope"), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight_answers_any_path() {
        let (_, state) = state("x");
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/chat/stream")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .contains_key("access-control-allow-methods"));
    }
}
