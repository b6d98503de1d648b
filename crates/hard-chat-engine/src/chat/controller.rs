use std::sync::Arc;

use super::generation::{Fragments, GenerationEngine};
use super::templates::PromptFormatter;
use super::token_counter::TokenCounter;
use crate::error::ChatError;
use crate::inference::InferenceBackend;
use crate::settings::ChatSettings;
use crate::types::{ConversationTurn, GenerationConfig};

/// Entry points the transport shell calls for one chat turn.
///
/// Holds no conversation state; history is borrowed per call.
#[derive(Clone)]
pub struct ChatTurnController {
    settings: Arc<ChatSettings>,
    formatter: PromptFormatter,
    counter: TokenCounter,
    engine: GenerationEngine,
}

impl ChatTurnController {
    pub fn new(settings: Arc<ChatSettings>, inference: Arc<dyn InferenceBackend>) -> Self {
        let formatter = PromptFormatter::new(settings.include_history);
        Self {
            counter: TokenCounter::new(inference.clone(), formatter),
            engine: GenerationEngine::new(inference),
            formatter,
            settings,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn describe_inference(&self) -> String {
        self.engine.describe()
    }

    /// Admission control. Returns the measured prompt length when it fits.
    pub fn validate(
        &self,
        message: &str,
        history: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<usize, ChatError> {
        let measured = self.counter.count(message, history, system_prompt)?;
        let limit = self.settings.max_input_tokens;
        if measured > limit {
            log::info!("Rejected input: {measured} tokens > limit {limit}");
            return Err(ChatError::InputTooLong { measured, limit });
        }
        Ok(measured)
    }

    /// Start generating the response to `message`.
    ///
    /// Fails before touching the inference backend when `config` is out of
    /// bounds. The returned stream yields at least one turn.
    pub fn run(
        &self,
        message: &str,
        history: &[ConversationTurn],
        system_prompt: &str,
        config: &GenerationConfig,
    ) -> Result<TurnStream<'_>, ChatError> {
        config.validate(self.settings.max_new_tokens_ceiling)?;

        let prompt = self.formatter.format(message, history, system_prompt);
        let fragments = self.engine.generate(&prompt, config)?;
        Ok(TurnStream {
            message: message.to_string(),
            fragments: Some(fragments),
            budget: config.max_new_tokens,
            emitted: 0,
            phase: Phase::Generating,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Generating,
    Streaming,
    Completed,
}

/// Growing turn for one message, one item per fragment.
///
/// Ends at end-of-sequence, after `max_new_tokens` fragments, or after the
/// first error. A fragment is a sampled token that completes at least one
/// character. Dropping it abandons generation.
pub struct TurnStream<'a> {
    message: String,
    fragments: Option<Fragments<'a>>,
    budget: u32,
    emitted: u32,
    phase: Phase,
}

impl TurnStream<'_> {
    /// Number of turns yielded so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    fn complete(&mut self) {
        self.phase = Phase::Completed;
        self.fragments = None;
    }

    fn turn(&self, response: String) -> ConversationTurn {
        ConversationTurn {
            user_message: self.message.clone(),
            assistant_response: response,
        }
    }
}

impl Iterator for TurnStream<'_> {
    type Item = Result<ConversationTurn, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let fragments = self.fragments.as_mut()?;
        match fragments.next() {
            Some(Ok(text)) => {
                self.phase = Phase::Streaming;
                self.emitted += 1;
                if self.emitted >= self.budget {
                    self.complete();
                }
                Some(Ok(self.turn(text)))
            }
            Some(Err(e)) => {
                log::warn!("Generation failed after {} fragments: {e}", self.emitted);
                self.complete();
                Some(Err(e))
            }
            None => {
                let was_empty = self.phase == Phase::Generating;
                self.complete();
                // The caller always observes at least one update.
                was_empty.then(|| Ok(self.turn(String::new())))
            }
        }
    }
}
