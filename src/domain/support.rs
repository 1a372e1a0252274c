use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-edge overrides applied when forwarding through a given provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Gateway field name -> upstream field name renames.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameter_mapping: HashMap<String, String>,

    /// Override for the upstream endpoint path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Extra headers sent upstream.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// The (provider, model_slug) edge: provider P serves logical model M.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderModelSupport {
    pub id: i64,
    pub provider_id: i64,
    pub model_slug: String,

    /// Wire name sent upstream; defaults to the logical slug.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_model_name: Option<String>,

    pub enabled: bool,

    /// Lower is preferred; ranks above provider priority.
    pub priority: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<EdgeConfig>,
}

impl ProviderModelSupport {
    pub fn new(provider_id: i64, model_slug: String) -> Self {
        Self {
            id: 0,
            provider_id,
            model_slug,
            upstream_model_name: None,
            enabled: true,
            priority: 100,
            config: None,
        }
    }

    pub fn with_upstream_name(mut self, name: String) -> Self {
        self.upstream_model_name = Some(name);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_config(mut self, config: EdgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn wire_model_name(&self) -> &str {
        self.upstream_model_name
            .as_deref()
            .unwrap_or(&self.model_slug)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_name_defaults_to_slug() {
        let edge = ProviderModelSupport::new(1, "gpt-4".into());
        assert_eq!(edge.wire_model_name(), "gpt-4");

        let edge = edge.with_upstream_name("gpt-4-0613".into());
        assert_eq!(edge.wire_model_name(), "gpt-4-0613");
    }

    #[test]
    fn test_edge_config_roundtrip() {
        let mut mapping = HashMap::new();
        mapping.insert("max_tokens".to_string(), "max_output_tokens".to_string());
        let config = EdgeConfig {
            parameter_mapping: mapping,
            endpoint: Some("/openai/v1/chat/completions".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let back: EdgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(
            back.parameter_mapping.get("max_tokens").map(String::as_str),
            Some("max_output_tokens")
        );
    }
}
