// Shared fixtures for the integration suites: a file-backed database with
// migrations applied, seeded principals, and routing metadata.

#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::TempDir;

use llm_gateway::api::types::ChatCompletionRequest;
use llm_gateway::auth::AuthContext;
use llm_gateway::cache::{CacheHandle, InMemoryCache};
use llm_gateway::dispatch::{Dispatcher, RequestMeta};
use llm_gateway::domain::{
    Credential, HealthStatus, Model, ModelPricing, PriceKind, Provider, ProviderModelSupport,
    Quota, QuotaKind, QuotaPeriod, User,
};
use llm_gateway::storage::{
    CredentialRepository, Database, ModelRepository, PricingRepository, ProviderRepository,
    QuotaRepository, Repositories, SupportRepository, UserRepository,
};
use llm_gateway::Config;

pub struct TestEnv {
    // Holds the database file alive for the test's duration.
    _dir: TempDir,
    pub db: Database,
    pub repos: Repositories,
    pub cache: CacheHandle,
    pub config: Config,
    pub dispatcher: Arc<Dispatcher>,
}

pub async fn test_env() -> TestEnv {
    let dir = TempDir::new().expect("tempdir");
    let mut config = Config::default();
    config.database.url = format!(
        "sqlite://{}",
        dir.path().join("gateway-test.db").display()
    );
    config.sweeper.grace_secs = 0;

    let db = Database::connect(&config.database).await.expect("database");
    let repos = Repositories::new(db.pool().clone());
    let cache: CacheHandle = Arc::new(InMemoryCache::new());
    let dispatcher = Arc::new(Dispatcher::new(db.pool().clone(), cache.clone(), &config));

    TestEnv {
        _dir: dir,
        db,
        repos,
        cache,
        config,
        dispatcher,
    }
}

pub async fn seed_user(env: &TestEnv, balance: Decimal) -> (User, Credential) {
    let user = env
        .repos
        .users
        .create(&User::new(
            format!("user-{}", uuid::Uuid::new_v4().simple()),
            format!("{}@test.local", uuid::Uuid::new_v4().simple()),
            balance,
        ))
        .await
        .expect("create user");
    let credential = env
        .repos
        .credentials
        .create(&Credential::generate(user.id))
        .await
        .expect("create credential");
    (user, credential)
}

/// gpt-4 with the seed-case prices: 0.03/1k input, 0.06/1k output, x1.5.
pub async fn seed_gpt4(env: &TestEnv) -> Model {
    let model = env
        .repos
        .models
        .create(&Model::chat("gpt-4".into(), "GPT-4".into()).with_context_length(8192))
        .await
        .expect("create model");

    for (kind, per_1k) in [(PriceKind::Input, "0.03"), (PriceKind::Output, "0.06")] {
        let price = Decimal::from_str(per_1k).unwrap() / Decimal::from(1000);
        env.repos
            .pricing
            .create(
                &ModelPricing::new(model.id, kind, price)
                    .with_multiplier(dec!(1.5))
                    .with_effective_from(chrono::Utc::now() - chrono::Duration::days(1)),
            )
            .await
            .expect("create pricing");
    }
    model
}

pub async fn seed_provider(env: &TestEnv, slug: &str, base_url: &str, priority: i32) -> Provider {
    env.repos
        .providers
        .create(
            &Provider::new(
                slug.to_uppercase(),
                slug.to_string(),
                base_url.to_string(),
                format!("upstream-key-{}", slug),
            )
            .with_priority(priority)
            .with_health(HealthStatus::Healthy),
        )
        .await
        .expect("create provider")
}

pub async fn link(env: &TestEnv, provider: &Provider, model_slug: &str, priority: i32) {
    env.repos
        .support
        .create(&ProviderModelSupport::new(provider.id, model_slug.to_string()).with_priority(priority))
        .await
        .expect("create support edge");
}

pub async fn add_quota(
    env: &TestEnv,
    credential: &Credential,
    kind: QuotaKind,
    period: Option<QuotaPeriod>,
    limit: Decimal,
) -> Quota {
    env.repos
        .quotas
        .create(&Quota::new(credential.id, kind, period, limit))
        .await
        .expect("create quota")
}

pub fn auth_ctx(user: &User, credential: &Credential) -> AuthContext {
    AuthContext {
        user: user.clone(),
        credential: credential.clone(),
    }
}

pub fn chat_request(model: &str) -> ChatCompletionRequest {
    serde_json::from_value(serde_json::json!({
        "model": model,
        "messages": [{"role": "user", "content": "x".repeat(400)}],
    }))
    .expect("request")
}

pub fn meta(request_id: &str) -> RequestMeta {
    RequestMeta {
        request_id: Some(request_id.to_string()),
        request_size: 420,
        method: "POST".to_string(),
        endpoint: "/v1/chat/completions".to_string(),
    }
}

/// The canonical upstream success body: 100 prompt + 200 completion tokens.
pub fn upstream_ok_body() -> serde_json::Value {
    serde_json::json!({
        "id": "cmpl-upstream",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4-upstream",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "Hello!"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 100, "completion_tokens": 200, "total_tokens": 300}
    })
}
