//! Token estimation for context budgeting
//!
//! The estimate is a character-count heuristic (about four characters per
//! token), not a subword tokenizer. It is deterministic and cheap, which is
//! all the budget logic needs; real usage reported by the model API will
//! differ somewhat.

use super::models::Message;

/// Fixed role/framing overhead charged per message
pub const MESSAGE_OVERHEAD_TOKENS: usize = 3;

/// Fixed framing overhead charged once per conversation
pub const CONVERSATION_OVERHEAD_TOKENS: usize = 10;

/// Default characters per token
pub const DEFAULT_CHARS_PER_TOKEN: usize = 4;

/// Token estimator trait for different tokenization strategies
pub trait TokenEstimator: Send + Sync {
    /// Estimate the number of tokens in the given text
    fn estimate(&self, text: &str) -> usize;

    /// Estimate a single message: content cost plus per-message overhead.
    /// A message without content costs nothing.
    fn estimate_message(&self, message: &Message) -> usize {
        match message.content.as_deref() {
            Some(content) => self.estimate(content) + MESSAGE_OVERHEAD_TOKENS,
            None => 0,
        }
    }

    /// Estimate an ordered conversation including its framing overhead
    fn estimate_conversation(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .sum::<usize>()
            + CONVERSATION_OVERHEAD_TOKENS
    }

    /// Estimate tokens for multiple texts
    fn estimate_batch(&self, texts: &[&str]) -> Vec<usize> {
        texts.iter().map(|t| self.estimate(t)).collect()
    }
}

/// Character-ratio estimator: `ceil(chars / chars_per_token)`
#[derive(Debug, Clone, Copy)]
pub struct CharRatioEstimator {
    chars_per_token: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_CHARS_PER_TOKEN)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }
}

/// Estimate tokens for a piece of text with the default estimator
pub fn estimate_tokens(text: &str) -> usize {
    CharRatioEstimator::default().estimate(text)
}

/// Estimate tokens for one message with the default estimator
pub fn estimate_message_tokens(message: &Message) -> usize {
    CharRatioEstimator::default().estimate_message(message)
}

/// Estimate tokens for a conversation with the default estimator
pub fn estimate_conversation_tokens(messages: &[Message]) -> usize {
    CharRatioEstimator::default().estimate_conversation(messages)
}

/// Like [`estimate_conversation_tokens`], but absent input costs nothing
pub fn estimate_optional_conversation_tokens(messages: Option<&[Message]>) -> usize {
    messages.map(estimate_conversation_tokens).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::Role;

    #[test]
    fn test_empty_text_costs_nothing() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn test_rounds_up_partial_tokens() {
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_monotonic_in_length() {
        let mut previous = 0;
        for len in 0..64 {
            let tokens = estimate_tokens(&"x".repeat(len));
            assert!(tokens >= previous);
            previous = tokens;
        }
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_message_overhead() {
        assert_eq!(estimate_message_tokens(&Message::user("")), 3);
        assert_eq!(estimate_message_tokens(&Message::user("abcdefgh")), 5);

        let absent = Message {
            role: Role::User,
            content: None,
        };
        assert_eq!(estimate_message_tokens(&absent), 0);
    }

    #[test]
    fn test_conversation_overhead() {
        assert_eq!(estimate_conversation_tokens(&[]), CONVERSATION_OVERHEAD_TOKENS);
        assert_eq!(estimate_optional_conversation_tokens(None), 0);

        let messages = vec![Message::user("abcd"), Message::assistant("abcdefgh")];
        assert_eq!(estimate_conversation_tokens(&messages), (1 + 3) + (2 + 3) + 10);
    }

    #[test]
    fn test_batch_estimation() {
        let estimator = CharRatioEstimator::new(2);
        assert_eq!(estimator.estimate_batch(&["ab", "abc", ""]), vec![1, 2, 0]);
    }
}
