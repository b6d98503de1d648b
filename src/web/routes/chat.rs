// Chat route handlers

use hyper::body::Bytes;
use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::atomic::Ordering;

use hard_chat_engine::{ConversationHistory, GenerationConfig};

use crate::web::generation_queue::{GenerationRequest, TurnEvent};
use crate::web::models::{ChatRequest, StreamEvent, UndoRequest, UndoResponse, ValidateResponse};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{
    chat_error_body, chat_error_response, json_error, json_response, sse_response,
};
use crate::web::AppState;

const DONE_EVENT: &str = "data: [DONE]\n\n";

fn sse_event(event: &StreamEvent) -> Bytes {
    let json = serde_json::to_string(event)
        .unwrap_or_else(|_| r#"{"type":"error","error":"Serialization failed"}"#.to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

pub async fn handle_validate(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: ChatRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let settings = state.settings();
    let result = state.controller.validate(
        &request.message,
        &request.history,
        request.system_prompt_or(settings),
    );
    Ok(match result {
        Ok(input_tokens) => json_response(
            StatusCode::OK,
            &ValidateResponse {
                ok: true,
                input_tokens,
                limit: settings.max_input_tokens,
            },
        ),
        Err(e) => chat_error_response(&e),
    })
}

pub async fn handle_stream(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: ChatRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let settings = state.settings();
    let system_prompt = request.system_prompt_or(settings).to_string();
    let config = request.generation_or(settings);
    Ok(start_turn(state, request.message, request.history, system_prompt, config))
}

/// Regenerate the newest turn of the supplied history.
pub async fn handle_retry(req: Request<Body>, state: &AppState) -> Result<Response<Body>, Infallible> {
    let request: ChatRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let settings = state.settings();
    let system_prompt = request.system_prompt_or(settings).to_string();
    let config = request.generation_or(settings);
    let mut history = request.history;
    if history.is_empty() {
        return Ok(json_error(StatusCode::BAD_REQUEST, "Nothing to retry"));
    }
    let message = history.pop_last();
    Ok(start_turn(state, message, history, system_prompt, config))
}

pub async fn handle_undo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    let request: UndoRequest = match parse_json_body(req.into_body()).await {
        Ok(req) => req,
        Err(error_response) => return Ok(error_response),
    };

    let mut history = request.history;
    let message = history.pop_last();
    Ok(json_response(StatusCode::OK, &UndoResponse { history, message }))
}

/// Admission, budget check, queueing, then an SSE body fed by the worker.
///
/// Rejections are plain JSON responses; once streaming starts, failures
/// arrive as an `error` event and the stream still ends with `[DONE]`.
fn start_turn(
    state: &AppState,
    message: String,
    history: ConversationHistory,
    system_prompt: String,
    config: GenerationConfig,
) -> Response<Body> {
    if let Err(e) = state.controller.validate(&message, &history, &system_prompt) {
        return chat_error_response(&e);
    }
    if let Err(e) = config.validate(state.settings().max_new_tokens_ceiling) {
        log::info!("Rejected generation config: {e}");
        return chat_error_response(&e);
    }

    let (request, mut events) = GenerationRequest::new(message, history, system_prompt, config);
    let id = request.id;
    let cancel = request.cancel.clone();
    if let Err(e) = state.queue.try_submit(request) {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, &e.to_string());
    }

    let (mut sender, body) = Body::channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let event = match event {
                TurnEvent::Update(history) => StreamEvent::Update { history },
                TurnEvent::Error(e) => StreamEvent::Error(chat_error_body(&e)),
            };
            if sender.send_data(sse_event(&event)).await.is_err() {
                log::info!("[{id}] Client disconnected");
                cancel.store(true, Ordering::SeqCst);
                return;
            }
        }
        let _ = sender.send_data(Bytes::from(DONE_EVENT)).await;
    });

    sse_response(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::routes::handle_request;
    use crate::web::routes::test_support::*;
    use hard_chat_engine::inference::ScriptedInference;
    use hard_chat_engine::ChatSettings;
    use serde_json::{json, Value};
    use std::sync::Arc;

    /// JSON payloads of every `data:` line except the terminator.
    fn sse_payloads(raw: &str) -> Vec<Value> {
        raw.split("\n\n")
            .filter_map(|chunk| chunk.strip_prefix("data: "))
            .filter(|data| *data != "[DONE]")
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_validate_reports_count_and_limit() {
        let (backend, state) = state("x");
        let response = handle_request(
            post("/api/chat/validate", json!({"message": "Hello", "history": []})),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["limit"], 4000);
        assert!(body["input_tokens"].as_u64().unwrap() > 5);
        assert_eq!(backend.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_validate_too_long_is_422() {
        let settings = ChatSettings {
            max_input_tokens: 20,
            ..ChatSettings::default()
        };
        let state = state_with(Arc::new(ScriptedInference::silent()), settings);
        let response = handle_request(
            post("/api/chat/validate", json!({"message": "Hello", "system_prompt": "sys"})),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["limit"], 20);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Clear your chat history"));
    }

    #[tokio::test]
    async fn test_stream_emits_growing_history_then_done() {
        let (_, state) = state("Hi!");
        let response = handle_request(
            post(
                "/api/chat/stream",
                json!({"message": "Hello", "history": [["earlier", "reply"]]}),
            ),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let raw = body_string(response).await;
        assert!(raw.ends_with("data: [DONE]\n\n"));
        let events = sse_payloads(&raw);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e["type"] == "update"));
        assert_eq!(events[0]["history"], json!([["earlier", "reply"], ["Hello", "H"]]));
        assert_eq!(events[2]["history"][1], json!(["Hello", "Hi!"]));
    }

    #[tokio::test]
    async fn test_stream_with_immediate_eos_sends_one_empty_update() {
        let backend = Arc::new(ScriptedInference::silent());
        let state = state_with(backend, ChatSettings::default());
        let response = handle_request(post("/api/chat/stream", json!({"message": "Hi"})), state)
            .await
            .unwrap();
        let events = sse_payloads(&body_string(response).await);
        assert_eq!(events, vec![json!({"type": "update", "history": [["Hi", ""]]})]);
    }

    #[tokio::test]
    async fn test_stream_over_ceiling_is_400_without_inference() {
        let (backend, state) = state("x");
        let response = handle_request(
            post(
                "/api/chat/stream",
                json!({"message": "Hello", "generation": {"max_new_tokens": 2049}}),
            ),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["requested"], 2049);
        assert_eq!(body["ceiling"], 2048);
        assert_eq!(backend.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_generation_under_lower_ceiling_streams() {
        let settings = ChatSettings {
            max_new_tokens_ceiling: 512,
            ..ChatSettings::default()
        };
        let backend = Arc::new(ScriptedInference::new("Hey"));
        let state = state_with(backend.clone(), settings);
        let response = handle_request(
            post(
                "/api/chat/stream",
                json!({"message": "Hello", "generation": {"temperature": 0.7}}),
            ),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_payloads(&body_string(response).await);
        assert_eq!(events.last().unwrap()["history"], json!([["Hello", "Hey"]]));
        assert_eq!(backend.stream_calls(), 1);
    }

    #[tokio::test]
    async fn test_stream_too_long_is_422_without_inference() {
        let settings = ChatSettings {
            max_input_tokens: 10,
            ..ChatSettings::default()
        };
        let backend = Arc::new(ScriptedInference::new("x"));
        let state = state_with(backend.clone(), settings);
        let response = handle_request(post("/api/chat/stream", json!({"message": "Hello"})), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(backend.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_stream_failure_is_error_event_then_done() {
        let backend = Arc::new(ScriptedInference::new("abc").failing_after(1));
        let state = state_with(backend, ChatSettings::default());
        let response = handle_request(post("/api/chat/stream", json!({"message": "q"})), state)
            .await
            .unwrap();
        let raw = body_string(response).await;
        assert!(raw.ends_with("data: [DONE]\n\n"));
        let events = sse_payloads(&raw);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "update");
        assert_eq!(events[1]["type"], "error");
        assert!(events[1]["error"].as_str().unwrap().starts_with("Inference failed"));
    }

    #[tokio::test]
    async fn test_retry_regenerates_last_turn() {
        let (_, state) = state("new");
        let response = handle_request(
            post(
                "/api/chat/retry",
                json!({"history": [["first", "one"], ["second", "old"]]}),
            ),
            state,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let events = sse_payloads(&body_string(response).await);
        assert_eq!(
            events.last().unwrap()["history"],
            json!([["first", "one"], ["second", "new"]])
        );
    }

    #[tokio::test]
    async fn test_retry_with_empty_history_is_400() {
        let (backend, state) = state("x");
        let response = handle_request(post("/api/chat/retry", json!({"history": []})), state)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(backend.stream_calls(), 0);
    }

    #[tokio::test]
    async fn test_undo_pops_last_turn() {
        let (_, state) = state("x");
        let response = handle_request(
            post("/api/chat/undo", json!({"history": [["a", "b"], ["c", "d"]]})),
            state.clone(),
        )
        .await
        .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["message"], "c");
        assert_eq!(body["history"], json!([["a", "b"]]));

        let response = handle_request(post("/api/chat/undo", json!({"history": []})), state)
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["message"], "");
        assert_eq!(body["history"], json!([]));
    }

    #[test]
    fn test_sse_event_framing() {
        let event = StreamEvent::Update {
            history: ConversationHistory::new(),
        };
        assert_eq!(
            sse_event(&event),
            Bytes::from(r#"data: {"type":"update","history":[]}"#.to_string() + "\n\n")
        );
    }
}
