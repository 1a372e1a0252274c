use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::str::FromStr;
use tracing::info;

use super::models::{
    BillingRow, CredentialRow, ModelRow, PricingRow, ProviderRow, QuotaRow, QuotaUsageRow,
    SupportRow, UserRow,
};
use crate::domain::{
    BillingRecord, BillingStatus, Credential, CredentialStatus, HealthStatus, Model, ModelPricing,
    Provider, ProviderModelSupport, ProviderStatus, Quota, QuotaUsage, Result, UsageLog, User,
    UserStatus,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn update_status(&self, id: i64, status: UserStatus) -> Result<()>;
    async fn credit_balance(&self, id: i64, amount: Decimal) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn create(&self, credential: &Credential) -> Result<Credential>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Credential>>;
    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<Credential>>;
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Credential>>;
    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()>;
    async fn update_status(&self, id: i64, status: CredentialStatus) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn create(&self, provider: &Provider) -> Result<Provider>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Provider>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Provider>>;
    async fn list_all(&self) -> Result<Vec<Provider>>;
    async fn list_active(&self) -> Result<Vec<Provider>>;
    async fn update_health(&self, id: i64, status: HealthStatus, at: DateTime<Utc>) -> Result<()>;
    async fn update_status(&self, id: i64, status: ProviderStatus) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn create(&self, model: &Model) -> Result<Model>;
    async fn get_by_id(&self, id: i64) -> Result<Option<Model>>;
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Model>>;
    async fn list_active(&self) -> Result<Vec<Model>>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait SupportRepository: Send + Sync {
    async fn create(&self, edge: &ProviderModelSupport) -> Result<ProviderModelSupport>;
    async fn list_enabled_for_model(&self, model_slug: &str) -> Result<Vec<ProviderModelSupport>>;
    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<ProviderModelSupport>>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait PricingRepository: Send + Sync {
    async fn create(&self, pricing: &ModelPricing) -> Result<ModelPricing>;
    async fn list_for_model(&self, model_id: i64) -> Result<Vec<ModelPricing>>;
    async fn delete_for_model(&self, model_id: i64) -> Result<()>;
}

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn create(&self, quota: &Quota) -> Result<Quota>;
    async fn list_active_for_credential(&self, credential_id: i64) -> Result<Vec<Quota>>;
    async fn delete_for_credential(&self, credential_id: i64) -> Result<()>;
}

#[async_trait]
pub trait QuotaUsageRepository: Send + Sync {
    async fn get_bucket(
        &self,
        credential_id: i64,
        quota_id: i64,
        period_key: &str,
    ) -> Result<Option<QuotaUsage>>;
    async fn list_for_credential(&self, credential_id: i64) -> Result<Vec<QuotaUsage>>;
}

#[async_trait]
pub trait UsageLogRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<UsageLog>>;
    async fn get_by_request_id(&self, request_id: &str) -> Result<Option<UsageLog>>;
    async fn list_by_credential(
        &self,
        credential_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UsageLog>>;
    async fn count_by_credential(&self, credential_id: i64) -> Result<i64>;
    async fn update(&self, log: &UsageLog) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<BillingRecord>>;
    async fn get_by_usage_log(&self, usage_log_id: i64) -> Result<Option<BillingRecord>>;
    async fn list_by_user(&self, user_id: i64, limit: i64, offset: i64)
        -> Result<Vec<BillingRecord>>;
    async fn count_by_user(&self, user_id: i64) -> Result<i64>;
    async fn list_pending(&self, older_than: DateTime<Utc>, limit: i64)
        -> Result<Vec<BillingRecord>>;
    async fn mark_failed(&self, id: i64) -> Result<()>;
    async fn mark_pending(&self, id: i64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// SQLite implementations
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUserRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        info!("Creating user: username={}", user.username);

        let result = sqlx::query(
            r#"
            INSERT INTO users (username, email, status, balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(user.status.as_str())
        .bind(user.balance.to_string())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;

        let mut created = user.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_domain))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserRow::into_domain))
    }

    async fn update_status(&self, id: i64, status: UserStatus) -> Result<()> {
        sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn credit_balance(&self, id: i64, amount: Decimal) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        adjust_user_balance(&mut tx, id, amount).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteCredentialRepository {
    pool: Pool<Sqlite>,
}

impl SqliteCredentialRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRepository for SqliteCredentialRepository {
    async fn create(&self, credential: &Credential) -> Result<Credential> {
        info!(
            "Creating credential: user_id={} prefix={}",
            credential.user_id, credential.prefix
        );

        let permissions_json = credential
            .permissions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO credentials
                (user_id, secret, prefix, status, permissions, expires_at, last_used_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(credential.user_id)
        .bind(&credential.secret)
        .bind(&credential.prefix)
        .bind(credential.status.as_str())
        .bind(permissions_json)
        .bind(credential.expires_at)
        .bind(credential.last_used_at)
        .bind(credential.created_at)
        .execute(&self.pool)
        .await?;

        let mut created = credential.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>("SELECT * FROM credentials WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CredentialRow::into_domain))
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<Credential>> {
        let rows =
            sqlx::query_as::<_, CredentialRow>("SELECT * FROM credentials WHERE prefix = ?")
                .bind(prefix)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(CredentialRow::into_domain).collect())
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Credential>> {
        let rows =
            sqlx::query_as::<_, CredentialRow>("SELECT * FROM credentials WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(CredentialRow::into_domain).collect())
    }

    async fn touch_last_used(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE credentials SET last_used_at = ? WHERE id = ?")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_status(&self, id: i64, status: CredentialStatus) -> Result<()> {
        sqlx::query("UPDATE credentials SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteProviderRepository {
    pool: Pool<Sqlite>,
}

impl SqliteProviderRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProviderRepository for SqliteProviderRepository {
    async fn create(&self, provider: &Provider) -> Result<Provider> {
        info!("Creating provider: slug={}", provider.slug);

        let result = sqlx::query(
            r#"
            INSERT INTO providers
                (name, slug, base_url, upstream_key, auth_header, status, priority,
                 timeout_seconds, retry_attempts, health_check_url,
                 health_check_interval_seconds, last_health_check, health_status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&provider.name)
        .bind(&provider.slug)
        .bind(&provider.base_url)
        .bind(&provider.upstream_key)
        .bind(&provider.auth_header)
        .bind(provider.status.as_str())
        .bind(provider.priority)
        .bind(provider.timeout_seconds as i64)
        .bind(provider.retry_attempts as i64)
        .bind(&provider.health_check_url)
        .bind(provider.health_check_interval_seconds)
        .bind(provider.last_health_check)
        .bind(provider.health_status.as_str())
        .bind(provider.created_at)
        .execute(&self.pool)
        .await?;

        let mut created = provider.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ProviderRow::into_domain))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Provider>> {
        let row = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ProviderRow::into_domain))
    }

    async fn list_all(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>("SELECT * FROM providers ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(ProviderRow::into_domain).collect())
    }

    async fn list_active(&self) -> Result<Vec<Provider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(
            "SELECT * FROM providers WHERE status = 'active' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ProviderRow::into_domain).collect())
    }

    async fn update_health(&self, id: i64, status: HealthStatus, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE providers SET health_status = ?, last_health_check = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(&self, id: i64, status: ProviderStatus) -> Result<()> {
        sqlx::query("UPDATE providers SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM provider_model_support WHERE provider_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM providers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteModelRepository {
    pool: Pool<Sqlite>,
}

impl SqliteModelRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelRepository for SqliteModelRepository {
    async fn create(&self, model: &Model) -> Result<Model> {
        info!("Creating model: slug={}", model.slug);

        let result = sqlx::query(
            r#"
            INSERT INTO models
                (slug, display_name, model_type, context_length, max_tokens,
                 supports_streaming, supports_functions, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&model.slug)
        .bind(&model.display_name)
        .bind(model.model_type.as_str())
        .bind(model.context_length)
        .bind(model.max_tokens)
        .bind(model.supports_streaming)
        .bind(model.supports_functions)
        .bind(model.status.as_str())
        .bind(model.created_at)
        .execute(&self.pool)
        .await?;

        let mut created = model.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Model>> {
        let row = sqlx::query_as::<_, ModelRow>("SELECT * FROM models WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ModelRow::into_domain))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Model>> {
        let row = sqlx::query_as::<_, ModelRow>("SELECT * FROM models WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ModelRow::into_domain))
    }

    async fn list_active(&self) -> Result<Vec<Model>> {
        let rows = sqlx::query_as::<_, ModelRow>(
            "SELECT * FROM models WHERE status = 'active' ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ModelRow::into_domain).collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM model_pricing WHERE model_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM models WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteSupportRepository {
    pool: Pool<Sqlite>,
}

impl SqliteSupportRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SupportRepository for SqliteSupportRepository {
    async fn create(&self, edge: &ProviderModelSupport) -> Result<ProviderModelSupport> {
        let config_json = edge.config.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"
            INSERT INTO provider_model_support
                (provider_id, model_slug, upstream_model_name, enabled, priority, config)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(edge.provider_id)
        .bind(&edge.model_slug)
        .bind(&edge.upstream_model_name)
        .bind(edge.enabled)
        .bind(edge.priority)
        .bind(config_json)
        .execute(&self.pool)
        .await?;

        let mut created = edge.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn list_enabled_for_model(&self, model_slug: &str) -> Result<Vec<ProviderModelSupport>> {
        let rows = sqlx::query_as::<_, SupportRow>(
            r#"
            SELECT * FROM provider_model_support
            WHERE model_slug = ? AND enabled = 1
            ORDER BY priority, provider_id
            "#,
        )
        .bind(model_slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SupportRow::into_domain).collect())
    }

    async fn list_by_provider(&self, provider_id: i64) -> Result<Vec<ProviderModelSupport>> {
        let rows = sqlx::query_as::<_, SupportRow>(
            "SELECT * FROM provider_model_support WHERE provider_id = ?",
        )
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SupportRow::into_domain).collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM provider_model_support WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqlitePricingRepository {
    pool: Pool<Sqlite>,
}

impl SqlitePricingRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PricingRepository for SqlitePricingRepository {
    async fn create(&self, pricing: &ModelPricing) -> Result<ModelPricing> {
        info!(
            "Creating pricing row: model_id={} kind={}",
            pricing.model_id,
            pricing.kind.as_str()
        );

        let result = sqlx::query(
            r#"
            INSERT INTO model_pricing
                (model_id, kind, price_per_unit, multiplier, unit, currency,
                 effective_from, effective_until)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(pricing.model_id)
        .bind(pricing.kind.as_str())
        .bind(pricing.price_per_unit.to_string())
        .bind(pricing.multiplier.to_string())
        .bind(pricing.unit.as_str())
        .bind(&pricing.currency)
        .bind(pricing.effective_from)
        .bind(pricing.effective_until)
        .execute(&self.pool)
        .await?;

        let mut created = pricing.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn list_for_model(&self, model_id: i64) -> Result<Vec<ModelPricing>> {
        let rows = sqlx::query_as::<_, PricingRow>(
            "SELECT * FROM model_pricing WHERE model_id = ? ORDER BY effective_from DESC",
        )
        .bind(model_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PricingRow::into_domain).collect())
    }

    async fn delete_for_model(&self, model_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM model_pricing WHERE model_id = ?")
            .bind(model_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteQuotaRepository {
    pool: Pool<Sqlite>,
}

impl SqliteQuotaRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRepository for SqliteQuotaRepository {
    async fn create(&self, quota: &Quota) -> Result<Quota> {
        let result = sqlx::query(
            r#"
            INSERT INTO quotas (credential_id, kind, period, limit_value, reset_time, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(quota.credential_id)
        .bind(quota.kind.as_str())
        .bind(quota.period.map(|p| p.as_str().to_string()))
        .bind(quota.limit.to_string())
        .bind(&quota.reset_time)
        .bind(quota.status.as_str())
        .execute(&self.pool)
        .await?;

        let mut created = quota.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    async fn list_active_for_credential(&self, credential_id: i64) -> Result<Vec<Quota>> {
        let rows = sqlx::query_as::<_, QuotaRow>(
            "SELECT * FROM quotas WHERE credential_id = ? AND status = 'active' ORDER BY id",
        )
        .bind(credential_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(QuotaRow::into_domain).collect())
    }

    async fn delete_for_credential(&self, credential_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM quotas WHERE credential_id = ?")
            .bind(credential_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteQuotaUsageRepository {
    pool: Pool<Sqlite>,
}

impl SqliteQuotaUsageRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaUsageRepository for SqliteQuotaUsageRepository {
    async fn get_bucket(
        &self,
        credential_id: i64,
        quota_id: i64,
        period_key: &str,
    ) -> Result<Option<QuotaUsage>> {
        let row = sqlx::query_as::<_, QuotaUsageRow>(
            r#"
            SELECT * FROM quota_usage
            WHERE credential_id = ? AND quota_id = ? AND period_start = ?
            "#,
        )
        .bind(credential_id)
        .bind(quota_id)
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(QuotaUsageRow::into_domain))
    }

    async fn list_for_credential(&self, credential_id: i64) -> Result<Vec<QuotaUsage>> {
        let rows = sqlx::query_as::<_, QuotaUsageRow>(
            "SELECT * FROM quota_usage WHERE credential_id = ? ORDER BY quota_id, period_start",
        )
        .bind(credential_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(QuotaUsageRow::into_domain).collect())
    }
}

#[derive(Clone)]
pub struct SqliteUsageLogRepository {
    pool: Pool<Sqlite>,
}

impl SqliteUsageLogRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageLogRepository for SqliteUsageLogRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<UsageLog>> {
        let row = sqlx::query_as::<_, super::models::UsageLogRow>(
            "SELECT * FROM usage_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.into_domain()))
    }

    async fn get_by_request_id(&self, request_id: &str) -> Result<Option<UsageLog>> {
        let mut conn = self.pool.acquire().await?;
        fetch_usage_log_by_request_id(&mut conn, request_id).await
    }

    async fn list_by_credential(
        &self,
        credential_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<UsageLog>> {
        // No global order exists across writers; created_at then id is the
        // stable read order.
        let rows = sqlx::query_as::<_, super::models::UsageLogRow>(
            r#"
            SELECT * FROM usage_logs
            WHERE credential_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(credential_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    async fn count_by_credential(&self, credential_id: i64) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM usage_logs WHERE credential_id = ?")
                .bind(credential_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn update(&self, log: &UsageLog) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE usage_logs
            SET status_code = ?, error_message = ?, response_size = ?, duration_ms = ?
            WHERE id = ?
            "#,
        )
        .bind(log.status_code)
        .bind(&log.error_message)
        .bind(log.response_size)
        .bind(log.duration_ms)
        .bind(log.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM billing_records WHERE usage_log_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM usage_logs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteBillingRepository {
    pool: Pool<Sqlite>,
}

impl SqliteBillingRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingRepository for SqliteBillingRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<BillingRecord>> {
        let row = sqlx::query_as::<_, BillingRow>("SELECT * FROM billing_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(BillingRow::into_domain))
    }

    async fn get_by_usage_log(&self, usage_log_id: i64) -> Result<Option<BillingRecord>> {
        let row = sqlx::query_as::<_, BillingRow>(
            "SELECT * FROM billing_records WHERE usage_log_id = ?",
        )
        .bind(usage_log_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BillingRow::into_domain))
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BillingRecord>> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT * FROM billing_records
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BillingRow::into_domain).collect())
    }

    async fn count_by_user(&self, user_id: i64) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM billing_records WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.0)
    }

    async fn list_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<BillingRecord>> {
        let rows = sqlx::query_as::<_, BillingRow>(
            r#"
            SELECT * FROM billing_records
            WHERE status = 'pending' AND created_at < ?
            ORDER BY created_at, id
            LIMIT ?
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BillingRow::into_domain).collect())
    }

    async fn mark_failed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE billing_records SET status = 'failed' WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_pending(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE billing_records SET status = 'pending' WHERE id = ? AND status = 'failed'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transaction-scoped operations shared by the governor, recorder, and sweeper.
// SQLite serializes writers; a conflicting reservation fails rather than
// double-counts.
// ---------------------------------------------------------------------------

pub async fn fetch_bucket_value(
    conn: &mut SqliteConnection,
    credential_id: i64,
    quota_id: i64,
    period_key: &str,
) -> Result<Option<Decimal>> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        SELECT used_value FROM quota_usage
        WHERE credential_id = ? AND quota_id = ? AND period_start = ?
        "#,
    )
    .bind(credential_id)
    .bind(quota_id)
    .bind(period_key)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|(v,)| Decimal::from_str(&v).unwrap_or(Decimal::ZERO)))
}

pub async fn store_bucket_value(
    conn: &mut SqliteConnection,
    credential_id: i64,
    quota_id: i64,
    period_key: &str,
    period_end: Option<&str>,
    value: Decimal,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO quota_usage (credential_id, quota_id, period_start, period_end, used_value)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (credential_id, quota_id, period_start)
        DO UPDATE SET used_value = excluded.used_value
        "#,
    )
    .bind(credential_id)
    .bind(quota_id)
    .bind(period_key)
    .bind(period_end)
    .bind(value.to_string())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Add `delta` (possibly negative) to a bucket, clamping at zero so release
/// after rollover never drives a fresh bucket negative.
pub async fn adjust_bucket_value(
    conn: &mut SqliteConnection,
    credential_id: i64,
    quota_id: i64,
    period_key: &str,
    period_end: Option<&str>,
    delta: Decimal,
) -> Result<()> {
    let current = fetch_bucket_value(conn, credential_id, quota_id, period_key)
        .await?
        .unwrap_or(Decimal::ZERO);
    let next = (current + delta).max(Decimal::ZERO);
    store_bucket_value(conn, credential_id, quota_id, period_key, period_end, next).await
}

pub async fn adjust_user_balance(
    conn: &mut SqliteConnection,
    user_id: i64,
    delta: Decimal,
) -> Result<()> {
    let row: Option<(String,)> = sqlx::query_as("SELECT balance FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    let current = row
        .map(|(b,)| Decimal::from_str(&b).unwrap_or(Decimal::ZERO))
        .ok_or(sqlx::Error::RowNotFound)?;

    sqlx::query("UPDATE users SET balance = ?, updated_at = ? WHERE id = ?")
        .bind((current + delta).to_string())
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_usage_log(conn: &mut SqliteConnection, log: &UsageLog) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO usage_logs
            (user_id, credential_id, provider_id, model_id, request_id, method, endpoint,
             input_tokens, output_tokens, total_tokens, request_size, response_size,
             duration_ms, status_code, error_message, cost, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(log.user_id)
    .bind(log.credential_id)
    .bind(log.provider_id)
    .bind(log.model_id)
    .bind(&log.request_id)
    .bind(&log.method)
    .bind(&log.endpoint)
    .bind(log.input_tokens)
    .bind(log.output_tokens)
    .bind(log.total_tokens)
    .bind(log.request_size)
    .bind(log.response_size)
    .bind(log.duration_ms)
    .bind(log.status_code)
    .bind(&log.error_message)
    .bind(log.cost.to_string())
    .bind(log.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_usage_log_by_request_id(
    conn: &mut SqliteConnection,
    request_id: &str,
) -> Result<Option<UsageLog>> {
    let row = sqlx::query_as::<_, super::models::UsageLogRow>(
        "SELECT * FROM usage_logs WHERE request_id = ?",
    )
    .bind(request_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.map(|r| r.into_domain()))
}

pub async fn insert_billing_record(
    conn: &mut SqliteConnection,
    record: &BillingRecord,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO billing_records
            (user_id, usage_log_id, amount, currency, kind, status, processed_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.user_id)
    .bind(record.usage_log_id)
    .bind(record.amount.to_string())
    .bind(&record.currency)
    .bind(record.kind.as_str())
    .bind(record.status.as_str())
    .bind(record.processed_at)
    .bind(record.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn mark_billing_status(
    conn: &mut SqliteConnection,
    id: i64,
    status: BillingStatus,
    processed_at: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query("UPDATE billing_records SET status = ?, processed_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(processed_at)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove a user and every row hanging off it. Used by the operator cleanup
/// path; order respects foreign keys.
pub async fn purge_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM billing_records WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM usage_logs WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "DELETE FROM quota_usage WHERE credential_id IN (SELECT id FROM credentials WHERE user_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "DELETE FROM quotas WHERE credential_id IN (SELECT id FROM credentials WHERE user_id = ?)",
    )
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("DELETE FROM credentials WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!("Purged user {} and dependent rows", user_id);
    Ok(())
}
