use thiserror::Error;

/// Errors surfaced by the chat-turn controller and the inference capability.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChatError {
    /// Formatted prompt is longer than the admission limit.
    #[error(
        "The accumulated input is too long ({measured} > {limit}). Clear your chat history and try again."
    )]
    InputTooLong { measured: usize, limit: usize },

    /// Requested generation budget is above the configured ceiling.
    #[error("Requested {requested} new tokens but the configured ceiling is {ceiling}")]
    Config { requested: u32, ceiling: u32 },

    #[error("Invalid generation parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Inference capability unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Errors raised while assembling `ChatSettings` at startup.
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("Context size {context} cannot hold an admitted prompt of {required} tokens")]
    ContextTooSmall { context: u32, required: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_too_long_message_carries_both_numbers() {
        let err = ChatError::InputTooLong {
            measured: 4100,
            limit: 4000,
        };
        let msg = err.to_string();
        assert!(msg.contains("4100 > 4000"));
        assert!(msg.contains("Clear your chat history"));
    }
}
