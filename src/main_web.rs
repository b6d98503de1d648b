use anyhow::Context;
use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::sync::Arc;

use hard_chat::config::Cli;
use hard_chat::logger::setup_logging;
use hard_chat::web::{handle_request, AppState};
use hard_chat_engine::{ChatError, ChatSettings, ChatTurnController, InferenceBackend};

#[cfg(feature = "mock")]
const MOCK_REPLY: &str = "Hello! This is a scripted response from the mock backend.";

#[cfg(feature = "mock")]
async fn load_inference(_settings: Arc<ChatSettings>) -> Result<Arc<dyn InferenceBackend>, ChatError> {
    log::warn!("Using scripted inference (mock feature enabled)");
    Ok(Arc::new(hard_chat_engine::inference::ScriptedInference::new(MOCK_REPLY)))
}

#[cfg(all(feature = "llama", not(feature = "mock")))]
async fn load_inference(settings: Arc<ChatSettings>) -> Result<Arc<dyn InferenceBackend>, ChatError> {
    use hard_chat_engine::inference::LlamaInference;

    // Model loading blocks for seconds; keep it off the runtime threads.
    let inference = tokio::task::spawn_blocking(move || LlamaInference::load(&settings))
        .await
        .map_err(|e| ChatError::InferenceUnavailable(format!("Model loader panicked: {e}")))??;
    Ok(Arc::new(inference))
}

#[cfg(not(any(feature = "llama", feature = "mock")))]
async fn load_inference(_settings: Arc<ChatSettings>) -> Result<Arc<dyn InferenceBackend>, ChatError> {
    Err(ChatError::InferenceUnavailable(
        "built without an inference backend; enable the `llama` or `mock` feature".to_string(),
    ))
}

fn log_settings(settings: &ChatSettings) {
    log::info!("Model: {}", settings.model_path.display());
    log::info!(
        "Limits: max_input_tokens={}, max_new_tokens={}, context={}",
        settings.max_input_tokens,
        settings.max_new_tokens_ceiling,
        settings.effective_context_size()
    );
    log::info!(
        "Prompt history: {}",
        if settings.include_history { "included" } else { "ignored" }
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (chat_settings, server_settings) = Cli::parse()
        .into_settings()
        .context("Invalid configuration")?;

    if let Err(e) = setup_logging(&server_settings.log_dir, server_settings.log_level) {
        eprintln!("Failed to set up logging: {e}");
    }
    log_settings(&chat_settings);

    let settings = Arc::new(chat_settings);
    let inference = load_inference(settings.clone())
        .await
        .context("Failed to initialize inference")?;
    log::info!("Inference ready: {}", inference.describe());

    let controller = ChatTurnController::new(settings, inference);
    let state = AppState::new(controller, server_settings.queue_size);
    let queue = state.queue.clone();

    // Create HTTP service
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
        }
    });

    let addr = server_settings.bind_addr();
    let server = Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {addr}"))?
        .serve(make_svc);

    log::info!("Hard-Chat server listening on http://{addr}");
    println!("Hard-Chat server starting on http://{addr}");

    server
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutdown requested, stopping active generation");
            queue.cancel_active();
        })
        .await
        .context("Server error")?;

    Ok(())
}
