use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Chat,
    Completion,
    Embedding,
    Image,
    Audio,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Chat => "chat",
            ModelType::Completion => "completion",
            ModelType::Embedding => "embedding",
            ModelType::Image => "image",
            ModelType::Audio => "audio",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completion" => ModelType::Completion,
            "embedding" => ModelType::Embedding,
            "image" => ModelType::Image,
            "audio" => ModelType::Audio,
            _ => ModelType::Chat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Inactive,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Active => "active",
            ModelStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => ModelStatus::Inactive,
            _ => ModelStatus::Active,
        }
    }
}

/// A logical model: a stable slug decoupled from any provider's wire name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: i64,
    pub slug: String,
    pub display_name: String,
    pub model_type: ModelType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_length: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<i64>,

    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub status: ModelStatus,

    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn chat(slug: String, display_name: String) -> Self {
        Self {
            id: 0,
            slug,
            display_name,
            model_type: ModelType::Chat,
            context_length: None,
            max_tokens: None,
            supports_streaming: true,
            supports_functions: false,
            status: ModelStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn with_context_length(mut self, context_length: i64) -> Self {
        self.context_length = Some(context_length);
        self
    }
}
