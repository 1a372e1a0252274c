// OpenAI-compatible wire types: the gateway's canonical dialect.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<i64>,

    /// String or array of strings, passed through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Unrecognized parameters survive translation.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatCompletionRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i64,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

impl ChatCompletionResponse {
    /// The shape handed back on idempotent replay: token counts are restored
    /// from the stored log, content is not retained.
    pub fn replayed(request_id: &str, model: &str, usage: Usage, created: i64) -> Self {
        Self {
            id: format!("chatcmpl-{}", request_id),
            object: "chat.completion".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatMessage {
                    role: "assistant".to_string(),
                    content: String::new(),
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_openai_shape() {
        let raw = r#"{
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.7,
            "max_tokens": 256,
            "stop": ["\n\n"],
            "logit_bias": {"50256": -100}
        }"#;
        let req: ChatCompletionRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(req.model, "gpt-4");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.max_tokens, Some(256));
        assert!(!req.is_streaming());
        assert!(req.extra.contains_key("logit_bias"));
    }

    #[test]
    fn test_unknown_params_survive_serialization() {
        let raw = r#"{"model":"m","messages":[],"presence_penalty":0.5}"#;
        let req: ChatCompletionRequest = serde_json::from_str(raw).unwrap();
        let out = serde_json::to_value(&req).unwrap();
        assert_eq!(out["presence_penalty"], 0.5);
    }
}
