// Core domain models for the gateway

pub mod billing;
pub mod credential;
pub mod error;
pub mod model;
pub mod pricing;
pub mod provider;
pub mod quota;
pub mod support;
pub mod usage;
pub mod user;

pub use billing::{BillingKind, BillingRecord, BillingStatus};
pub use credential::{generate_secret, Credential, CredentialStatus, Permissions, PREFIX_LEN};
pub use error::{GatewayError, Result};
pub use model::{Model, ModelStatus, ModelType};
pub use pricing::{ModelPricing, PriceKind, PriceUnit};
pub use provider::{HealthStatus, Provider, ProviderStatus};
pub use quota::{Quota, QuotaKind, QuotaPeriod, QuotaStatus, QuotaUsage};
pub use support::{EdgeConfig, ProviderModelSupport};
pub use usage::UsageLog;
pub use user::{User, UserStatus};
