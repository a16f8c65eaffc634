//! Token usage estimation for upstreams that omit the `usage` field.
//!
//! Counts with the o200k BPE when available, falling back to a bytes/4
//! heuristic. Estimates only ever fill a gap; usage reported by the
//! upstream is always preserved verbatim.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

use crate::protocol::{ChatMessage, StreamDelta, Usage};

fn encoder() -> Option<&'static CoreBPE> {
    static BPE: OnceLock<Option<CoreBPE>> = OnceLock::new();
    BPE.get_or_init(|| tiktoken_rs::o200k_base().ok()).as_ref()
}

/// Count tokens in plain text
fn count_tokens(text: &str) -> u32 {
    let count = encoder().map_or(text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len());
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Accumulates prompt and completion text for one request
#[derive(Debug, Default)]
pub struct TokenEstimator {
    prompt: String,
    completion: String,
}

impl TokenEstimator {
    /// Initialize with the request messages as the prompt side
    pub fn new(messages: &[ChatMessage]) -> Self {
        let mut prompt = String::new();
        for message in messages {
            prompt.push_str(&message.content_text());
            prompt.push('\n');
        }
        Self {
            prompt,
            completion: String::new(),
        }
    }

    /// Record a complete response message
    pub fn observe_message(&mut self, message: &ChatMessage) {
        self.completion.push_str(&message.content_text());
    }

    /// Record one streaming delta
    pub fn observe_delta(&mut self, delta: &StreamDelta) {
        if let Some(ref content) = delta.content {
            self.completion.push_str(content);
        }
    }

    /// Estimate usage from the accumulated text
    pub fn usage(&self) -> Usage {
        Usage::new(count_tokens(&self.prompt), count_tokens(&self.completion))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_prompt_plus_completion() {
        let mut estimator = TokenEstimator::new(&[ChatMessage::text("user", "What is the capital of France?")]);
        estimator.observe_message(&ChatMessage::text("assistant", "Paris."));

        let usage = estimator.usage();
        assert!(usage.prompt_tokens >= 1);
        assert!(usage.completion_tokens >= 1);
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
    }

    #[test]
    fn deltas_accumulate() {
        let mut estimator = TokenEstimator::new(&[ChatMessage::text("user", "hi")]);
        for piece in ["Hello", " there", ", how are you?"] {
            estimator.observe_delta(&StreamDelta {
                role: None,
                content: Some(piece.to_owned()),
                tool_calls: None,
            });
        }

        let usage = estimator.usage();
        assert!(usage.completion_tokens >= 3);
    }

    #[test]
    fn empty_delta_is_harmless() {
        let mut estimator = TokenEstimator::new(&[ChatMessage::text("user", "hi")]);
        let before = estimator.usage();
        estimator.observe_delta(&StreamDelta {
            role: Some("assistant".to_owned()),
            content: None,
            tool_calls: None,
        });
        assert_eq!(estimator.usage(), before);
    }
}
