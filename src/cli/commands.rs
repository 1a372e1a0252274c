use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::info;

use super::{QuotasArgs, SetupArgs, TestArgs};
use crate::config::Config;
use crate::domain::{
    Credential, GatewayError, HealthStatus, Model, ModelPricing, PriceKind, Provider,
    ProviderModelSupport, Quota, QuotaKind, QuotaPeriod, Result, User, PREFIX_LEN,
};
use crate::storage::{
    repository::purge_user, CredentialRepository, Database, ModelRepository, PricingRepository,
    ProviderRepository, QuotaRepository, Repositories, SupportRepository, UserRepository,
};

async fn open(config: &Config) -> Result<(Database, Repositories)> {
    let db = Database::connect(&config.database).await?;
    let repos = Repositories::new(db.pool().clone());
    Ok((db, repos))
}

/// Provision a complete test fixture and print the credential secret.
pub async fn setup(config: &Config, args: &SetupArgs) -> Result<()> {
    let (_db, repos) = open(config).await?;

    let balance = Decimal::from_str(&args.balance)
        .map_err(|e| GatewayError::validation(format!("invalid balance: {}", e)))?;

    if repos.users.get_by_username(&args.username).await?.is_some() {
        return Err(GatewayError::validation(format!(
            "user {} already exists; run cleanup first",
            args.username
        )));
    }

    let user = repos
        .users
        .create(&User::new(
            args.username.clone(),
            format!("{}@gateway.local", args.username),
            balance,
        ))
        .await?;

    let credential = repos.credentials.create(&Credential::generate(user.id)).await?;

    let mut seed = Provider::new(
        "Seed Provider".to_string(),
        "seed-provider".to_string(),
        args.base_url.clone(),
        args.upstream_key.clone(),
    )
    .with_priority(1)
    // Routable immediately; the prober takes over from here.
    .with_health(HealthStatus::Healthy);
    seed.timeout_seconds = config.proxy.default_timeout_secs;
    seed.retry_attempts = config.proxy.default_retry_attempts;

    let provider = repos.providers.create(&seed).await?;

    let model = repos
        .models
        .create(&Model::chat(args.model.clone(), args.model.clone()).with_context_length(8192))
        .await?;

    repos
        .support
        .create(&ProviderModelSupport::new(provider.id, model.slug.clone()).with_priority(1))
        .await?;

    // Seed-case prices: 0.03 / 0.06 per thousand tokens, multiplier from
    // configuration.
    let per_token = |per_1k: &str| {
        Decimal::from_str(per_1k).unwrap_or(Decimal::ZERO) / Decimal::from(1000)
    };
    for (kind, per_1k) in [(PriceKind::Input, "0.03"), (PriceKind::Output, "0.06")] {
        let mut row = ModelPricing::new(model.id, kind, per_token(per_1k))
            .with_multiplier(config.pricing.default_multiplier);
        row.currency = config.pricing.currency.clone();
        repos.pricing.create(&row).await?;
    }

    info!(user_id = user.id, provider_id = provider.id, model_id = model.id, "setup complete");
    println!("user: {} (id {})", user.username, user.id);
    println!("credential: {}", credential.secret);
    println!("model: {} via {}", model.slug, provider.slug);
    Ok(())
}

/// End-to-end probe against a running gateway.
pub async fn test(args: &TestArgs) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!(
        "{}/v1/chat/completions",
        args.endpoint.trim_end_matches('/')
    );

    let response = client
        .post(&url)
        .bearer_auth(&args.key)
        .json(&serde_json::json!({
            "model": args.model,
            "messages": [{"role": "user", "content": args.prompt}],
        }))
        .send()
        .await
        .map_err(|e| GatewayError::internal(format!("request failed: {}", e)))?;

    let status = response.status();
    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| GatewayError::internal(format!("unreadable response: {}", e)))?;

    if !status.is_success() {
        return Err(GatewayError::internal(format!(
            "gateway returned {}: {}",
            status,
            body["error"]["message"].as_str().unwrap_or("unknown error")
        )));
    }

    let content = body["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("<no content>");
    println!("model: {}", body["model"].as_str().unwrap_or("?"));
    println!("content: {}", content);
    println!(
        "usage: {} prompt + {} completion tokens",
        body["usage"]["prompt_tokens"], body["usage"]["completion_tokens"]
    );
    Ok(())
}

/// Remove everything setup created, plus the seeded provider and model.
pub async fn cleanup(config: &Config, username: &str) -> Result<()> {
    let (db, repos) = open(config).await?;

    let user = repos
        .users
        .get_by_username(username)
        .await?
        .ok_or_else(|| GatewayError::validation(format!("no user named {}", username)))?;

    purge_user(db.pool(), user.id).await?;

    if let Some(provider) = repos.providers.get_by_slug("seed-provider").await? {
        for edge in repos.support.list_by_provider(provider.id).await? {
            if let Some(model) = repos.models.get_by_slug(&edge.model_slug).await? {
                repos.models.delete(model.id).await?;
            }
        }
        repos.providers.delete(provider.id).await?;
    }

    println!("cleaned up user {}", username);
    Ok(())
}

/// The standard quota set: request fairness windows plus token and cost
/// ceilings.
pub async fn quotas(config: &Config, args: &QuotasArgs) -> Result<()> {
    let (_db, repos) = open(config).await?;

    let prefix: String = args.key.chars().take(PREFIX_LEN).collect();
    let credential = repos
        .credentials
        .list_by_prefix(&prefix)
        .await?
        .into_iter()
        .find(|c| c.secret == args.key || args.key == c.prefix)
        .ok_or_else(|| GatewayError::validation("no credential matches that key"))?;

    let standard = [
        (QuotaKind::Requests, Some(QuotaPeriod::Minute), "60"),
        (QuotaKind::Requests, Some(QuotaPeriod::Day), "10000"),
        (QuotaKind::Tokens, Some(QuotaPeriod::Day), "1000000"),
        (QuotaKind::Cost, Some(QuotaPeriod::Day), "10.0"),
        (QuotaKind::Cost, Some(QuotaPeriod::Month), "100.0"),
    ];

    for (kind, period, limit) in standard {
        let limit = Decimal::from_str(limit).unwrap_or(Decimal::ZERO);
        repos
            .quotas
            .create(&Quota::new(credential.id, kind, period, limit))
            .await?;
    }

    println!(
        "applied {} quotas to credential {}",
        standard.len(),
        credential.prefix
    );
    Ok(())
}
