// Row models: the flat SQLite shapes mapped back into domain types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;

use crate::domain::{
    BillingKind, BillingRecord, BillingStatus, Credential, CredentialStatus, EdgeConfig,
    HealthStatus, Model, ModelPricing, ModelStatus, ModelType, PriceKind, PriceUnit, Provider,
    ProviderModelSupport, ProviderStatus, Quota, QuotaKind, QuotaPeriod, QuotaStatus, QuotaUsage,
    UsageLog, User, UserStatus,
};

fn decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or(Decimal::ZERO)
}

/// Bucket keys are RFC 3339 strings; '' marks the singleton total bucket.
pub fn parse_period_key(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

pub fn period_key(start: Option<DateTime<Utc>>) -> String {
    match start {
        Some(dt) => dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        None => String::new(),
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub status: String,
    pub balance: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            status: UserStatus::parse(&self.status),
            balance: decimal(&self.balance),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct CredentialRow {
    pub id: i64,
    pub user_id: i64,
    pub secret: String,
    pub prefix: String,
    pub status: String,
    pub permissions: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CredentialRow {
    pub fn into_domain(self) -> Credential {
        Credential {
            id: self.id,
            user_id: self.user_id,
            secret: self.secret,
            prefix: self.prefix,
            status: CredentialStatus::parse(&self.status),
            permissions: self
                .permissions
                .as_deref()
                .and_then(|p| serde_json::from_str(p).ok()),
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ProviderRow {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub base_url: String,
    pub upstream_key: String,
    pub auth_header: Option<String>,
    pub status: String,
    pub priority: i64,
    pub timeout_seconds: i64,
    pub retry_attempts: i64,
    pub health_check_url: Option<String>,
    pub health_check_interval_seconds: i64,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_status: String,
    pub created_at: DateTime<Utc>,
}

impl ProviderRow {
    pub fn into_domain(self) -> Provider {
        Provider {
            id: self.id,
            name: self.name,
            slug: self.slug,
            base_url: self.base_url,
            upstream_key: self.upstream_key,
            auth_header: self.auth_header,
            status: ProviderStatus::parse(&self.status),
            priority: self.priority as i32,
            timeout_seconds: self.timeout_seconds.max(1) as u64,
            retry_attempts: self.retry_attempts.max(0) as u32,
            health_check_url: self.health_check_url,
            health_check_interval_seconds: self.health_check_interval_seconds,
            last_health_check: self.last_health_check,
            health_status: HealthStatus::parse(&self.health_status),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ModelRow {
    pub id: i64,
    pub slug: String,
    pub display_name: String,
    pub model_type: String,
    pub context_length: Option<i64>,
    pub max_tokens: Option<i64>,
    pub supports_streaming: bool,
    pub supports_functions: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl ModelRow {
    pub fn into_domain(self) -> Model {
        Model {
            id: self.id,
            slug: self.slug,
            display_name: self.display_name,
            model_type: ModelType::parse(&self.model_type),
            context_length: self.context_length,
            max_tokens: self.max_tokens,
            supports_streaming: self.supports_streaming,
            supports_functions: self.supports_functions,
            status: ModelStatus::parse(&self.status),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SupportRow {
    pub id: i64,
    pub provider_id: i64,
    pub model_slug: String,
    pub upstream_model_name: Option<String>,
    pub enabled: bool,
    pub priority: i64,
    pub config: Option<String>,
}

impl SupportRow {
    pub fn into_domain(self) -> ProviderModelSupport {
        ProviderModelSupport {
            id: self.id,
            provider_id: self.provider_id,
            model_slug: self.model_slug,
            upstream_model_name: self.upstream_model_name,
            enabled: self.enabled,
            priority: self.priority as i32,
            config: self
                .config
                .as_deref()
                .and_then(|c| serde_json::from_str::<EdgeConfig>(c).ok()),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PricingRow {
    pub id: i64,
    pub model_id: i64,
    pub kind: String,
    pub price_per_unit: String,
    pub multiplier: String,
    pub unit: String,
    pub currency: String,
    pub effective_from: DateTime<Utc>,
    pub effective_until: Option<DateTime<Utc>>,
}

impl PricingRow {
    pub fn into_domain(self) -> ModelPricing {
        ModelPricing {
            id: self.id,
            model_id: self.model_id,
            kind: PriceKind::parse(&self.kind),
            price_per_unit: decimal(&self.price_per_unit),
            multiplier: decimal(&self.multiplier),
            unit: PriceUnit::parse(&self.unit),
            currency: self.currency,
            effective_from: self.effective_from,
            effective_until: self.effective_until,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct QuotaRow {
    pub id: i64,
    pub credential_id: i64,
    pub kind: String,
    pub period: Option<String>,
    pub limit_value: String,
    pub reset_time: Option<String>,
    pub status: String,
}

impl QuotaRow {
    pub fn into_domain(self) -> Quota {
        Quota {
            id: self.id,
            credential_id: self.credential_id,
            kind: QuotaKind::parse(&self.kind),
            period: self.period.as_deref().and_then(QuotaPeriod::parse),
            limit: decimal(&self.limit_value),
            reset_time: self.reset_time,
            status: QuotaStatus::parse(&self.status),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct QuotaUsageRow {
    pub id: i64,
    pub credential_id: i64,
    pub quota_id: i64,
    pub period_start: String,
    pub period_end: Option<String>,
    pub used_value: String,
}

impl QuotaUsageRow {
    pub fn into_domain(self) -> QuotaUsage {
        QuotaUsage {
            id: self.id,
            credential_id: self.credential_id,
            quota_id: self.quota_id,
            period_start: parse_period_key(&self.period_start),
            period_end: self.period_end.as_deref().and_then(parse_period_key),
            used_value: decimal(&self.used_value),
        }
    }
}

#[derive(Debug, FromRow)]
pub struct UsageLogRow {
    pub id: i64,
    pub user_id: i64,
    pub credential_id: i64,
    pub provider_id: i64,
    pub model_id: i64,
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub duration_ms: i64,
    pub status_code: i64,
    pub error_message: Option<String>,
    pub cost: String,
    pub created_at: DateTime<Utc>,
}

impl UsageLogRow {
    pub fn into_domain(self) -> UsageLog {
        UsageLog {
            id: self.id,
            user_id: self.user_id,
            credential_id: self.credential_id,
            provider_id: self.provider_id,
            model_id: self.model_id,
            request_id: self.request_id,
            method: self.method,
            endpoint: self.endpoint,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            total_tokens: self.total_tokens,
            request_size: self.request_size,
            response_size: self.response_size,
            duration_ms: self.duration_ms,
            status_code: self.status_code as i32,
            error_message: self.error_message,
            cost: decimal(&self.cost),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct BillingRow {
    pub id: i64,
    pub user_id: i64,
    pub usage_log_id: i64,
    pub amount: String,
    pub currency: String,
    pub kind: String,
    pub status: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BillingRow {
    pub fn into_domain(self) -> BillingRecord {
        BillingRecord {
            id: self.id,
            user_id: self.user_id,
            usage_log_id: self.usage_log_id,
            amount: decimal(&self.amount),
            currency: self.currency,
            kind: BillingKind::parse(&self.kind),
            status: BillingStatus::parse(&self.status),
            processed_at: self.processed_at,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_key_roundtrip() {
        let now = Utc::now();
        let key = period_key(Some(now));
        let back = parse_period_key(&key).unwrap();
        assert_eq!(back.timestamp(), now.timestamp());

        assert_eq!(period_key(None), "");
        assert_eq!(parse_period_key(""), None);
    }
}
