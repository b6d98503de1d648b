// Process-wide chat settings, built once at startup and shared read-only.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::SettingsError;
use crate::types::GenerationConfig;

pub const DEFAULT_MODEL_PATH: &str = "models/llama-3-8B-q4-k-m.gguf";
pub const DEFAULT_MAX_INPUT_TOKENS: usize = 4000;
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 2048;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, respectful and honest assistant. Always answer as helpfully as possible, while being safe.  Your answers should not include any harmful, unethical, racist, sexist, toxic, dangerous, or illegal content. Please ensure that your responses are socially unbiased and positive in nature.

If a question does not make any sense, or is not factually coherent, explain why instead of answering something not correct. If you don't know the answer to a question, please don't share false information.";

/// Immutable configuration consumed by the controller and the inference backend.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSettings {
    /// Opaque model location handed to the inference backend.
    pub model_path: PathBuf,
    /// Admission ceiling for the formatted prompt, in tokens.
    pub max_input_tokens: usize,
    /// Ceiling for `GenerationConfig::max_new_tokens`.
    pub max_new_tokens_ceiling: u32,
    pub default_system_prompt: String,
    /// Interleave prior turns into the prompt. Off by default.
    pub include_history: bool,
    /// Explicit llama context size; `None` means input limit plus generation ceiling.
    pub context_size: Option<u32>,
    pub gpu_layers: u32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            max_new_tokens_ceiling: DEFAULT_MAX_NEW_TOKENS,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            include_history: false,
            context_size: None,
            gpu_layers: 0,
        }
    }
}

impl ChatSettings {
    /// Reject settings the controller cannot operate with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_input_tokens == 0 {
            return Err(SettingsError::Zero("max_input_tokens"));
        }
        if self.max_new_tokens_ceiling == 0 {
            return Err(SettingsError::Zero("max_new_tokens_ceiling"));
        }
        if let Some(context) = self.context_size {
            if context == 0 {
                return Err(SettingsError::Zero("context_size"));
            }
            // Only prompts that pass admission need to fit.
            let required = self.max_input_tokens as u64 + 1;
            if u64::from(context) < required {
                return Err(SettingsError::ContextTooSmall { context, required });
            }
        }
        Ok(())
    }

    /// Context window for the llama backend.
    pub fn effective_context_size(&self) -> u32 {
        self.context_size.unwrap_or_else(|| {
            let total = self.max_input_tokens as u64 + u64::from(self.max_new_tokens_ceiling);
            u32::try_from(total).unwrap_or(u32::MAX)
        })
    }

    /// Prompt batch size. The admission limit always fits in one batch.
    pub fn batch_size(&self) -> u32 {
        u32::try_from(self.max_input_tokens)
            .unwrap_or(u32::MAX)
            .min(self.effective_context_size())
    }

    /// Full budget with temperature 1, top-p 0.95 and top-k 50.
    pub fn default_generation(&self) -> GenerationConfig {
        GenerationConfig {
            max_new_tokens: self.max_new_tokens_ceiling,
            ..GenerationConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ChatSettings::default();
        assert_eq!(settings.max_input_tokens, 4000);
        assert_eq!(settings.max_new_tokens_ceiling, 2048);
        assert_eq!(settings.model_path, PathBuf::from("models/llama-3-8B-q4-k-m.gguf"));
        assert!(settings.default_system_prompt.starts_with("You are a helpful"));
        assert!(!settings.include_history);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let settings = ChatSettings {
            max_input_tokens: 0,
            ..ChatSettings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::Zero("max_input_tokens")));

        let settings = ChatSettings {
            max_new_tokens_ceiling: 0,
            ..ChatSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::Zero("max_new_tokens_ceiling"))
        );
    }

    #[test]
    fn test_context_must_hold_admitted_prompt() {
        let settings = ChatSettings {
            context_size: Some(1000),
            ..ChatSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ContextTooSmall { context: 1000, .. })
        ));
    }

    #[test]
    fn test_effective_context_defaults_to_input_plus_budget() {
        let settings = ChatSettings::default();
        assert_eq!(settings.effective_context_size(), 6048);
        assert_eq!(settings.batch_size(), 4000);

        let settings = ChatSettings {
            context_size: Some(8192),
            ..ChatSettings::default()
        };
        assert_eq!(settings.effective_context_size(), 8192);
    }

    #[test]
    fn test_default_generation_uses_full_budget() {
        let settings = ChatSettings {
            max_new_tokens_ceiling: 512,
            ..ChatSettings::default()
        };
        let generation = settings.default_generation();
        assert_eq!(generation.max_new_tokens, 512);
        assert!((generation.temperature - 1.0).abs() < f32::EPSILON);
        assert_eq!(generation.top_k, 50);
    }
}
