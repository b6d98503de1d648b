// Chat turn pipeline: prompt formatting, admission control and generation

mod controller;
mod generation;
mod templates;
mod token_counter;

pub use controller::{ChatTurnController, TurnStream};
pub use generation::{Fragments, GenerationEngine};
pub use templates::{format_prompt, format_prompt_with_history, PromptFormatter};
pub use token_counter::TokenCounter;
