// Example prompt route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use crate::web::examples::{ExampleError, EXAMPLES};
use crate::web::models::{ExampleRunRequest, ExamplesResponse, HistoryResponse};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{chat_error_response, json_error, json_response};
use crate::web::AppState;

pub async fn handle_list() -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &ExamplesResponse {
            examples: &EXAMPLES,
        },
    ))
}

pub async fn handle_run(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: ExampleRunRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let result = state
        .examples
        .run(&request.message, state.settings(), &state.queue)
        .await;
    Ok(match result {
        Ok(history) => json_response(StatusCode::OK, &HistoryResponse { history }),
        Err(ExampleError::Unknown) => json_error(StatusCode::NOT_FOUND, "Unknown example prompt"),
        Err(ExampleError::Queue(e)) => json_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string()),
        Err(ExampleError::Chat(e)) => chat_error_response(&e),
    })
}
