//! Streaming chat-turn engine.
//!
//! Formats a Llama 3 prompt, checks it against the input token limit and
//! streams the growing assistant response token by token.

pub mod chat;
pub mod error;
pub mod inference;
pub mod settings;
pub mod types;

pub use chat::{ChatTurnController, TurnStream};
pub use error::{ChatError, SettingsError};
pub use inference::InferenceBackend;
pub use settings::ChatSettings;
pub use types::{ConversationHistory, ConversationTurn, GenerationConfig};
