// Storage: pool management, row models, repository contracts.

pub mod database;
pub mod models;
pub mod repository;

use sqlx::{Pool, Sqlite};

pub use database::Database;
pub use repository::{
    BillingRepository, CredentialRepository, ModelRepository, PricingRepository,
    ProviderRepository, QuotaRepository, QuotaUsageRepository, SqliteBillingRepository,
    SqliteCredentialRepository, SqliteModelRepository, SqlitePricingRepository,
    SqliteProviderRepository, SqliteQuotaRepository, SqliteQuotaUsageRepository,
    SqliteSupportRepository, SqliteUsageLogRepository, SqliteUserRepository, SupportRepository,
    UsageLogRepository, UserRepository,
};

/// Bundle of concrete repositories over one pool; cheap to clone.
#[derive(Clone)]
pub struct Repositories {
    pub users: SqliteUserRepository,
    pub credentials: SqliteCredentialRepository,
    pub providers: SqliteProviderRepository,
    pub models: SqliteModelRepository,
    pub support: SqliteSupportRepository,
    pub pricing: SqlitePricingRepository,
    pub quotas: SqliteQuotaRepository,
    pub quota_usage: SqliteQuotaUsageRepository,
    pub usage_logs: SqliteUsageLogRepository,
    pub billing: SqliteBillingRepository,
}

impl Repositories {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self {
            users: SqliteUserRepository::new(pool.clone()),
            credentials: SqliteCredentialRepository::new(pool.clone()),
            providers: SqliteProviderRepository::new(pool.clone()),
            models: SqliteModelRepository::new(pool.clone()),
            support: SqliteSupportRepository::new(pool.clone()),
            pricing: SqlitePricingRepository::new(pool.clone()),
            quotas: SqliteQuotaRepository::new(pool.clone()),
            quota_usage: SqliteQuotaUsageRepository::new(pool.clone()),
            usage_logs: SqliteUsageLogRepository::new(pool.clone()),
            billing: SqliteBillingRepository::new(pool),
        }
    }
}
