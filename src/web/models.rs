// Request and response bodies for the HTTP API

use hard_chat_engine::{ChatSettings, ConversationHistory, GenerationConfig};
use serde::{Deserialize, Serialize};

/// Body of `/api/chat/validate`, `/api/chat/stream` and `/api/chat/retry`.
///
/// For `stream` the history excludes the new message; for `retry` its last
/// turn is the one regenerated.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: ConversationHistory,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Missing fields fall back to the full budget and the default sampling knobs.
    #[serde(default)]
    pub generation: Option<GenerationParams>,
}

/// Per-request sampling overrides; every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub seed: Option<u32>,
}

impl GenerationParams {
    pub fn resolve(&self, defaults: GenerationConfig) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens.unwrap_or(defaults.max_new_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            seed: self.seed.or(defaults.seed),
        }
    }
}

impl ChatRequest {
    pub fn system_prompt_or<'a>(&'a self, settings: &'a ChatSettings) -> &'a str {
        self.system_prompt
            .as_deref()
            .unwrap_or(&settings.default_system_prompt)
    }

    pub fn generation_or(&self, settings: &ChatSettings) -> GenerationConfig {
        let defaults = settings.default_generation();
        match &self.generation {
            Some(params) => params.resolve(defaults),
            None => defaults,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub ok: bool,
    pub input_tokens: usize,
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct UndoRequest {
    #[serde(default)]
    pub history: ConversationHistory,
}

#[derive(Debug, Serialize)]
pub struct UndoResponse {
    pub history: ConversationHistory,
    /// User message of the removed turn, `""` when there was none.
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ExampleRunRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: ConversationHistory,
}

#[derive(Debug, Serialize)]
pub struct ExamplesResponse {
    pub examples: &'static [&'static str],
}

/// One SSE `data:` payload on the streaming endpoints.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Update { history: ConversationHistory },
    Error(serde_json::Value),
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub inference: String,
}

/// Slider bounds a client should present.
#[derive(Debug, Serialize)]
pub struct UiRanges {
    pub max_new_tokens: (u32, u32),
    pub temperature: (f32, f32),
    pub top_p: (f32, f32),
    pub top_k: (u32, u32),
}

impl UiRanges {
    pub fn for_ceiling(ceiling: u32) -> Self {
        Self {
            max_new_tokens: (1, ceiling),
            temperature: (0.1, 4.0),
            top_p: (0.05, 1.0),
            top_k: (1, 1000),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub max_input_tokens: usize,
    pub max_new_tokens: u32,
    pub default_system_prompt: String,
    pub include_history: bool,
    pub default_generation: GenerationConfig,
    pub ranges: UiRanges,
}

impl From<&ChatSettings> for ConfigResponse {
    fn from(settings: &ChatSettings) -> Self {
        Self {
            max_input_tokens: settings.max_input_tokens,
            max_new_tokens: settings.max_new_tokens_ceiling,
            default_system_prompt: settings.default_system_prompt.clone(),
            include_history: settings.include_history,
            default_generation: settings.default_generation(),
            ranges: UiRanges::for_ceiling(settings.max_new_tokens_ceiling),
        }
    }
}
