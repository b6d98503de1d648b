use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::error::ChatError;

/// One user message paired with the assistant's response to it.
///
/// Travels as a two-element array `["user", "assistant"]`, the shape chat
/// widgets consume.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct ConversationTurn {
    pub user_message: String,
    pub assistant_response: String,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, assistant_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            assistant_response: assistant_response.into(),
        }
    }
}

impl From<(String, String)> for ConversationTurn {
    fn from((user_message, assistant_response): (String, String)) -> Self {
        Self {
            user_message,
            assistant_response,
        }
    }
}

impl From<ConversationTurn> for (String, String) {
    fn from(turn: ConversationTurn) -> Self {
        (turn.user_message, turn.assistant_response)
    }
}

/// Chronological list of turns. Owned by the shell; the controller only borrows it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory(Vec<ConversationTurn>);

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.0.push(turn);
    }

    /// Remove the newest turn and hand back its user message (`""` when empty).
    pub fn pop_last(&mut self) -> String {
        self.0
            .pop()
            .map(|turn| turn.user_message)
            .unwrap_or_default()
    }

    /// Snapshot of `self + [turn]`, published for every streamed update.
    pub fn with_turn(&self, turn: ConversationTurn) -> Self {
        let mut turns = Vec::with_capacity(self.0.len() + 1);
        turns.extend_from_slice(&self.0);
        turns.push(turn);
        Self(turns)
    }
}

impl Deref for ConversationHistory {
    type Target = [ConversationTurn];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<ConversationTurn>> for ConversationHistory {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self(turns)
    }
}

/// Sampling knobs for one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Fixed sampler seed; random per call when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 1024,
            temperature: 1.0,
            top_p: 0.95,
            top_k: 50,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Check the budget against `ceiling` first, then the sampling ranges.
    pub fn validate(&self, ceiling: u32) -> Result<(), ChatError> {
        if self.max_new_tokens > ceiling {
            return Err(ChatError::Config {
                requested: self.max_new_tokens,
                ceiling,
            });
        }
        if self.max_new_tokens == 0 {
            return Err(ChatError::InvalidParameter {
                name: "max_new_tokens",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ChatError::InvalidParameter {
                name: "temperature",
                reason: format!("must be a positive number, got {}", self.temperature),
            });
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ChatError::InvalidParameter {
                name: "top_p",
                reason: format!("must be in (0, 1], got {}", self.top_p),
            });
        }
        if self.top_k == 0 {
            return Err(ChatError::InvalidParameter {
                name: "top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_serializes_as_pair() {
        let turn = ConversationTurn::new("Hi", "Hello!");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"["Hi","Hello!"]"#);

        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }

    #[test]
    fn test_history_is_a_plain_array() {
        let history: ConversationHistory =
            serde_json::from_str(r#"[["a","b"],["c",""]]"#).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].user_message, "c");
        assert!(history[1].assistant_response.is_empty());
    }

    #[test]
    fn test_pop_last_returns_message_or_empty() {
        let mut history = ConversationHistory::new();
        assert_eq!(history.pop_last(), "");

        history.push(ConversationTurn::new("first", "one"));
        history.push(ConversationTurn::new("second", ""));
        assert_eq!(history.pop_last(), "second");
        assert_eq!(history.len(), 1);
        assert_eq!(history.pop_last(), "first");
        assert!(history.is_empty());
    }

    #[test]
    fn test_with_turn_leaves_original_untouched() {
        let mut history = ConversationHistory::new();
        history.push(ConversationTurn::new("q", "a"));
        let snapshot = history.with_turn(ConversationTurn::new("next", "partial"));
        assert_eq!(history.len(), 1);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[1].assistant_response, "partial");
    }

    #[test]
    fn test_budget_over_ceiling_is_config_error() {
        let config = GenerationConfig {
            max_new_tokens: 2049,
            ..GenerationConfig::default()
        };
        assert_eq!(
            config.validate(2048),
            Err(ChatError::Config {
                requested: 2049,
                ceiling: 2048
            })
        );
    }

    #[test]
    fn test_budget_at_or_below_ceiling_never_config_error() {
        for max_new_tokens in [1, 100, 2047, 2048] {
            let config = GenerationConfig {
                max_new_tokens,
                ..GenerationConfig::default()
            };
            assert!(config.validate(2048).is_ok(), "{max_new_tokens}");
        }
    }

    #[test]
    fn test_ceiling_checked_before_sampling_ranges() {
        let config = GenerationConfig {
            max_new_tokens: 10,
            temperature: -1.0,
            ..GenerationConfig::default()
        };
        assert!(matches!(config.validate(5), Err(ChatError::Config { .. })));
    }

    #[test]
    fn test_sampling_ranges() {
        let bad = [
            GenerationConfig {
                max_new_tokens: 0,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                temperature: 0.0,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                temperature: f32::NAN,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                top_p: 0.0,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                top_p: 1.5,
                ..GenerationConfig::default()
            },
            GenerationConfig {
                top_k: 0,
                ..GenerationConfig::default()
            },
        ];
        for config in bad {
            assert!(
                matches!(config.validate(2048), Err(ChatError::InvalidParameter { .. })),
                "{config:?}"
            );
        }
        let edge = GenerationConfig {
            top_p: 1.0,
            ..GenerationConfig::default()
        };
        assert!(edge.validate(2048).is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: GenerationConfig = serde_json::from_str(r#"{"top_k": 7}"#).unwrap();
        assert_eq!(config.top_k, 7);
        assert_eq!(config.max_new_tokens, 1024);
        assert!(config.seed.is_none());
    }
}
