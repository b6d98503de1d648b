// Llama 3 chat-turn template

use crate::types::ConversationTurn;

const HEADER_SYSTEM: &str = "<|start_header_id|>system<|end_header_id|>\n\n";
const HEADER_USER: &str = "<|start_header_id|>user<|end_header_id|>\n\n";
const HEADER_ASSISTANT: &str = "<|start_header_id|>assistant<|end_header_id|>\n\n";
const END_OF_TURN: &str = "<|eot_id|>\n\n";

/// Build the prompt for `message`: a system block followed by a user block.
///
/// `history` is accepted but not interpolated; the output depends only on
/// `message` and `system_prompt`.
pub fn format_prompt(message: &str, _history: &[ConversationTurn], system_prompt: &str) -> String {
    let mut p = String::with_capacity(
        HEADER_SYSTEM.len() + HEADER_USER.len() + 2 * END_OF_TURN.len() + system_prompt.len() + message.len(),
    );
    push_block(&mut p, HEADER_SYSTEM, system_prompt);
    push_block(&mut p, HEADER_USER, message.trim());
    p
}

/// Same template with every prior turn replayed between the system and user blocks.
pub fn format_prompt_with_history(
    message: &str,
    history: &[ConversationTurn],
    system_prompt: &str,
) -> String {
    let mut p = String::new();
    push_block(&mut p, HEADER_SYSTEM, system_prompt);
    for turn in history {
        push_block(&mut p, HEADER_USER, turn.user_message.trim());
        push_block(&mut p, HEADER_ASSISTANT, turn.assistant_response.trim());
    }
    push_block(&mut p, HEADER_USER, message.trim());
    p
}

fn push_block(p: &mut String, header: &str, content: &str) {
    p.push_str(header);
    p.push_str(content);
    p.push_str(END_OF_TURN);
}

/// Prompt builder selected by settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptFormatter {
    include_history: bool,
}

impl PromptFormatter {
    pub fn new(include_history: bool) -> Self {
        Self { include_history }
    }

    pub fn format(&self, message: &str, history: &[ConversationTurn], system_prompt: &str) -> String {
        if self.include_history {
            format_prompt_with_history(message, history, system_prompt)
        } else {
            format_prompt(message, history, system_prompt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_template() {
        let prompt = format_prompt("  Hello \n", &[], "Be brief.");
        assert_eq!(
            prompt,
            "<|start_header_id|>system<|end_header_id|>\n\nBe brief.<|eot_id|>\n\n\
             <|start_header_id|>user<|end_header_id|>\n\nHello<|eot_id|>\n\n"
        );
    }

    #[test]
    fn test_system_prompt_is_not_trimmed() {
        let prompt = format_prompt("hi", &[], "\n  sys\n");
        assert!(prompt.contains("<|end_header_id|>\n\n\n  sys\n<|eot_id|>"));
    }

    #[test]
    fn test_history_does_not_change_prompt() {
        let history = vec![
            ConversationTurn::new("What is Rust?", "A language."),
            ConversationTurn::new("Is it fast?", "Yes."),
        ];
        let formatter = PromptFormatter::default();
        assert_eq!(
            formatter.format("Next", &history, "sys"),
            formatter.format("Next", &[], "sys")
        );
        assert!(!formatter.format("Next", &history, "sys").contains("What is Rust?"));
    }

    #[test]
    fn test_history_mode_replays_turns_in_order() {
        let history = vec![
            ConversationTurn::new("first", "one"),
            ConversationTurn::new("second", "two"),
        ];
        let prompt = PromptFormatter::new(true).format("third", &history, "sys");
        let first = prompt.find("first").unwrap();
        let two = prompt.find("two").unwrap();
        let third = prompt.find("third").unwrap();
        assert!(first < two && two < third);
        assert!(prompt.contains("<|start_header_id|>assistant<|end_header_id|>\n\none<|eot_id|>"));
        assert!(prompt.ends_with("<|start_header_id|>user<|end_header_id|>\n\nthird<|eot_id|>\n\n"));
    }

    #[test]
    fn test_history_mode_without_history_matches_plain() {
        assert_eq!(
            PromptFormatter::new(true).format("Hello", &[], "sys"),
            format_prompt("Hello", &[], "sys")
        );
    }
}
