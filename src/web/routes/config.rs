// Configuration route handler

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::ConfigResponse;
use crate::web::response_helpers::json_response;
use crate::web::AppState;

pub async fn handle_get_config(state: &AppState) -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &ConfigResponse::from(state.settings()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::routes::handle_request;
    use crate::web::routes::test_support::*;
    use hard_chat_engine::inference::ScriptedInference;
    use hard_chat_engine::ChatSettings;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_config_exposes_limits_and_defaults() {
        let settings = ChatSettings {
            max_new_tokens_ceiling: 300,
            ..ChatSettings::default()
        };
        let state = state_with(Arc::new(ScriptedInference::silent()), settings);
        let response = handle_request(get("/api/config"), state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["max_input_tokens"], 4000);
        assert_eq!(body["max_new_tokens"], 300);
        assert_eq!(body["default_generation"]["max_new_tokens"], 300);
        assert_eq!(body["default_generation"]["top_k"], 50);
        assert_eq!(body["ranges"]["max_new_tokens"][1], 300);
        assert!(body["default_system_prompt"]
            .as_str()
            .unwrap()
            .starts_with("You are a helpful"));
    }
}
