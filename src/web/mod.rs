// HTTP shell around the chat-turn controller

pub mod examples;
pub mod generation_queue;
pub mod models;
pub mod request_parsing;
pub mod response_helpers;
pub mod routes;

use hard_chat_engine::{ChatSettings, ChatTurnController};

use examples::ExampleCache;
use generation_queue::GenerationQueue;

pub use routes::handle_request;

/// Shared by every connection. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub controller: ChatTurnController,
    pub queue: GenerationQueue,
    pub examples: ExampleCache,
}

impl AppState {
    /// Spawns the generation worker; call from inside a tokio runtime.
    pub fn new(controller: ChatTurnController, queue_size: usize) -> Self {
        Self {
            queue: GenerationQueue::spawn(controller.clone(), queue_size),
            controller,
            examples: ExampleCache::new(),
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        self.controller.settings()
    }
}
