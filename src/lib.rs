//! AI API gateway: an OpenAI-compatible chat-completion surface that
//! authenticates opaque bearer credentials, routes to upstream model
//! providers with failover, meters token usage, and debits balances.

pub mod accounting;
pub mod api;
pub mod auth;
pub mod background;
pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod governor;
pub mod observability;
pub mod proxy;
pub mod routing;
pub mod storage;

// Re-export commonly used types
pub use domain::{
    BillingRecord, BillingStatus, Credential, CredentialStatus, GatewayError, HealthStatus, Model,
    ModelPricing, Permissions, PriceKind, Provider, ProviderStatus, Quota, QuotaKind, QuotaPeriod,
    Result, UsageLog, User, UserStatus,
};

pub use accounting::{settle_billing, AccountingRecorder, CompletedCall, Recorded};
pub use auth::{AuthContext, Authenticator};
pub use background::{BillingSweeper, HealthProber, SweepStats};
pub use cache::{CacheHandle, InMemoryCache, MetadataCache, RedisCache};
pub use config::Config;
pub use dispatch::{DispatchOutcome, Dispatcher, RequestMeta};
pub use engine::{CharRatioEstimator, CostBreakdown, PricingCalculator, TokenEstimator};
pub use governor::{ActualUnits, QuotaGovernor, RequestedUnits, Reservation};
pub use proxy::{AttemptFeed, ForwardOutcome, UpstreamProxy};
pub use routing::{Candidate, ProviderSelector};
pub use storage::{Database, Repositories};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
