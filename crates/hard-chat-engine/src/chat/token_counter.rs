use std::sync::Arc;

use super::templates::PromptFormatter;
use crate::error::ChatError;
use crate::inference::InferenceBackend;
use crate::types::ConversationTurn;

/// Measures the token length of the prompt a turn would send.
#[derive(Clone)]
pub struct TokenCounter {
    inference: Arc<dyn InferenceBackend>,
    formatter: PromptFormatter,
}

impl TokenCounter {
    pub fn new(inference: Arc<dyn InferenceBackend>, formatter: PromptFormatter) -> Self {
        Self {
            inference,
            formatter,
        }
    }

    pub fn count(
        &self,
        message: &str,
        history: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<usize, ChatError> {
        let prompt = self.formatter.format(message, history, system_prompt);
        self.inference.count_tokens(&prompt)
    }
}
