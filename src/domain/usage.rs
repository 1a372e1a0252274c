use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The authoritative audit record for one admitted request. Append-only:
/// never rolled back once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: i64,
    pub user_id: i64,
    pub credential_id: i64,
    pub provider_id: i64,
    pub model_id: i64,

    /// Idempotency key for the entire dispatch+accounting pipeline.
    pub request_id: String,

    pub method: String,
    pub endpoint: String,

    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,

    pub request_size: i64,
    pub response_size: i64,
    pub duration_ms: i64,
    pub status_code: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub cost: Decimal,
    pub created_at: DateTime<Utc>,
}

impl UsageLog {
    pub fn new(
        user_id: i64,
        credential_id: i64,
        provider_id: i64,
        model_id: i64,
        request_id: String,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            credential_id,
            provider_id,
            model_id,
            request_id,
            method: "POST".to_string(),
            endpoint: "/v1/chat/completions".to_string(),
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            request_size: 0,
            response_size: 0,
            duration_ms: 0,
            status_code: 200,
            error_message: None,
            cost: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> super::Result<()> {
        if self.total_tokens != self.input_tokens + self.output_tokens {
            return Err(super::GatewayError::validation(format!(
                "total_tokens mismatch: {} != {} + {}",
                self.total_tokens, self.input_tokens, self.output_tokens
            )));
        }
        if self.request_id.is_empty() {
            return Err(super::GatewayError::validation("empty request_id"));
        }
        Ok(())
    }
}
