// Token estimation for upstreams that omit usage counts.

use crate::api::types::ChatMessage;

/// Pluggable token estimator. The default approximates 4 characters per
/// token, which tracks English prose closely enough for billing fallback.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text(&self, text: &str) -> i64;

    /// For streamed bodies only the byte count survives; treat bytes as
    /// characters.
    fn estimate_chars(&self, chars: i64) -> i64;

    fn estimate_messages(&self, messages: &[ChatMessage]) -> i64 {
        messages
            .iter()
            .map(|m| self.estimate_text(&m.content) + self.estimate_text(&m.role))
            .sum()
    }
}

pub struct CharRatioEstimator {
    chars_per_token: u32,
}

impl CharRatioEstimator {
    pub fn new(chars_per_token: u32) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate_text(&self, text: &str) -> i64 {
        self.estimate_chars(text.chars().count() as i64)
    }

    fn estimate_chars(&self, chars: i64) -> i64 {
        let ratio = self.chars_per_token as i64;
        (chars.max(0) + ratio - 1) / ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ratio() {
        let est = CharRatioEstimator::default();
        assert_eq!(est.estimate_text(""), 0);
        assert_eq!(est.estimate_text("abcd"), 1);
        assert_eq!(est.estimate_text("abcde"), 2);
        assert_eq!(est.estimate_text(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_messages_include_roles() {
        let est = CharRatioEstimator::default();
        let messages = vec![ChatMessage {
            role: "user".to_string(),
            content: "hello world!".to_string(),
        }];
        // 12 chars content -> 3, 4 chars role -> 1
        assert_eq!(est.estimate_messages(&messages), 4);
    }
}
