// Canned example prompts and their memoized answers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

use hard_chat_engine::{ChatError, ChatSettings, ConversationHistory, GenerationConfig};

use super::generation_queue::{GenerationQueue, GenerationRequest, QueueError, TurnEvent};

pub const EXAMPLES: [&str; 5] = [
    "Hello there! How are you doing?",
    "Can you explain briefly to me what is the Python programming language?",
    "Explain the plot of Cinderella in a sentence.",
    "How many hours does it take a man to eat a Helicopter?",
    "Write a 100-word article on 'Benefits of Open-Source in AI research'",
];

/// Budget used for examples, capped by the configured ceiling.
const EXAMPLE_MAX_NEW_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ExampleError {
    #[error("Unknown example prompt")]
    Unknown,
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

pub fn example_generation(settings: &ChatSettings) -> GenerationConfig {
    GenerationConfig {
        max_new_tokens: EXAMPLE_MAX_NEW_TOKENS.min(settings.max_new_tokens_ceiling),
        temperature: 1.0,
        top_p: 0.95,
        top_k: 50,
        seed: None,
    }
}

type Slot = Arc<OnceCell<ConversationHistory>>;

/// Final history for each example, computed on first request.
///
/// Each example has its own slot: concurrent requests for one example run it
/// once, while finished examples are served even when another one is
/// generating. A failed run leaves its slot empty.
#[derive(Clone, Default)]
pub struct ExampleCache {
    slots: Arc<Mutex<HashMap<&'static str, Slot>>>,
}

impl ExampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &'static str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }

    #[cfg(test)]
    fn cached(&self, message: &str) -> Option<ConversationHistory> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(message).and_then(|slot| slot.get().cloned())
    }

    /// Run `message` to completion with the default system prompt and an empty history.
    pub async fn run(
        &self,
        message: &str,
        settings: &ChatSettings,
        queue: &GenerationQueue,
    ) -> Result<ConversationHistory, ExampleError> {
        let key = EXAMPLES
            .iter()
            .copied()
            .find(|e| *e == message)
            .ok_or(ExampleError::Unknown)?;

        let slot = self.slot(key);
        if let Some(history) = slot.get() {
            log::debug!("Example served from cache: {key}");
            return Ok(history.clone());
        }
        let history = slot
            .get_or_try_init(|| generate(key, settings, queue))
            .await?;
        Ok(history.clone())
    }
}

async fn generate(
    key: &'static str,
    settings: &ChatSettings,
    queue: &GenerationQueue,
) -> Result<ConversationHistory, ExampleError> {
    let (request, mut events) = GenerationRequest::new(
        key.to_string(),
        ConversationHistory::new(),
        settings.default_system_prompt.clone(),
        example_generation(settings),
    );
    queue.submit(request).await?;

    let mut last = ConversationHistory::new();
    while let Some(event) = events.recv().await {
        match event {
            TurnEvent::Update(history) => last = history,
            TurnEvent::Error(e) => return Err(e.into()),
        }
    }
    log::info!("Example cached: {key}");
    Ok(last)
}
