// Health check and index route handlers

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::HealthResponse;
use crate::web::response_helpers::{json_response, text_response};
use crate::web::AppState;

const SERVICE: &str = "hard-chat";

const DESCRIPTION: &str = "Hard-Chat

A chatbot that can talk about anything you want.
You must abide by the Llama use policy (https://ai.meta.com/llama/use-policy/).

Endpoints:
  GET  /health              - Health check
  GET  /api/config          - Limits and default generation settings
  POST /api/chat/validate   - Check a message against the input limit
  POST /api/chat/stream     - Stream a response (SSE)
  POST /api/chat/retry      - Regenerate the last turn (SSE)
  POST /api/chat/undo       - Remove the last turn
  GET  /api/examples        - Example prompts
  POST /api/examples/run    - Run an example to completion
";

pub async fn handle_index(_state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(text_response(StatusCode::OK, DESCRIPTION))
}

pub async fn handle(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "ok",
            service: SERVICE,
            inference: state.controller.describe_inference(),
        },
    ))
}
