// Repository coverage against a real database.

mod helpers;

use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use helpers::{seed_gpt4, seed_provider, seed_user, test_env};
use llm_gateway::domain::{
    BillingRecord, BillingStatus, CredentialStatus, HealthStatus, UsageLog,
};
use llm_gateway::storage::repository::{
    insert_billing_record, insert_usage_log, purge_user,
};
use llm_gateway::storage::{
    BillingRepository, CredentialRepository, PricingRepository, ProviderRepository,
    UsageLogRepository, UserRepository,
};

#[tokio::test]
async fn test_user_roundtrip_and_balance() {
    let env = test_env().await;
    let (user, _) = seed_user(&env, dec!(100)).await;

    let loaded = env.repos.users.get_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(loaded.username, user.username);
    assert_eq!(loaded.balance, dec!(100));

    env.repos.users.credit_balance(user.id, dec!(25.5)).await.unwrap();
    let loaded = env.repos.users.get_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(loaded.balance, dec!(125.5));
}

#[tokio::test]
async fn test_credential_prefix_lookup_and_status() {
    let env = test_env().await;
    let (_, credential) = seed_user(&env, dec!(10)).await;

    let found = env
        .repos
        .credentials
        .list_by_prefix(&credential.prefix)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].secret, credential.secret);

    env.repos
        .credentials
        .update_status(credential.id, CredentialStatus::Revoked)
        .await
        .unwrap();
    let loaded = env
        .repos
        .credentials
        .get_by_id(credential.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.status, CredentialStatus::Revoked);
}

#[tokio::test]
async fn test_provider_health_update() {
    let env = test_env().await;
    let provider = seed_provider(&env, "prov-a", "http://a.test", 1).await;
    assert_eq!(provider.health_status, HealthStatus::Healthy);

    let at = Utc::now();
    env.repos
        .providers
        .update_health(provider.id, HealthStatus::Unhealthy, at)
        .await
        .unwrap();

    let loaded = env
        .repos
        .providers
        .get_by_id(provider.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.health_status, HealthStatus::Unhealthy);
    assert!(loaded.last_health_check.is_some());
    assert!(!loaded.is_available());
}

#[tokio::test]
async fn test_pricing_rows_persist_decimals_exactly() {
    let env = test_env().await;
    let model = seed_gpt4(&env).await;

    let rows = env.repos.pricing.list_for_model(model.id).await.unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert_eq!(row.multiplier, dec!(1.5));
        assert!(row.price_per_unit > dec!(0));
    }
}

#[tokio::test]
async fn test_usage_log_request_id_unique() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;
    let provider = seed_provider(&env, "prov-u", "http://u.test", 1).await;
    let model = seed_gpt4(&env).await;

    let log = UsageLog::new(
        user.id,
        credential.id,
        provider.id,
        model.id,
        "req-unique".into(),
        10,
        20,
    );

    let mut conn = env.db.pool().acquire().await.unwrap();
    insert_usage_log(&mut conn, &log).await.unwrap();
    let duplicate = insert_usage_log(&mut conn, &log).await;
    assert!(duplicate.is_err());

    let loaded = env
        .repos
        .usage_logs
        .get_by_request_id("req-unique")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.total_tokens, 30);
}

#[tokio::test]
async fn test_usage_log_list_count_update_delete() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;
    let provider = seed_provider(&env, "prov-l", "http://l.test", 1).await;
    let model = seed_gpt4(&env).await;

    let mut conn = env.db.pool().acquire().await.unwrap();
    for i in 0..3 {
        let log = UsageLog::new(
            user.id,
            credential.id,
            provider.id,
            model.id,
            format!("req-list-{}", i),
            10,
            20,
        );
        insert_usage_log(&mut conn, &log).await.unwrap();
    }
    drop(conn);

    assert_eq!(
        env.repos
            .usage_logs
            .count_by_credential(credential.id)
            .await
            .unwrap(),
        3
    );

    let page = env
        .repos
        .usage_logs
        .list_by_credential(credential.id, 2, 0)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let mut first = page[0].clone();
    first.error_message = Some("late failure".into());
    first.status_code = 502;
    env.repos.usage_logs.update(&first).await.unwrap();
    let reloaded = env
        .repos
        .usage_logs
        .get_by_id(first.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.status_code, 502);
    assert_eq!(reloaded.error_message.as_deref(), Some("late failure"));

    env.repos.usage_logs.delete(first.id).await.unwrap();
    assert_eq!(
        env.repos
            .usage_logs
            .count_by_credential(credential.id)
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_billing_pending_listing_and_transitions() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;
    let provider = seed_provider(&env, "prov-b", "http://b.test", 1).await;
    let model = seed_gpt4(&env).await;

    let mut conn = env.db.pool().acquire().await.unwrap();
    let log = UsageLog::new(
        user.id,
        credential.id,
        provider.id,
        model.id,
        "req-bill".into(),
        10,
        20,
    );
    let log_id = insert_usage_log(&mut conn, &log).await.unwrap();

    let mut record = BillingRecord::usage(user.id, log_id, dec!(0.05), "USD".into());
    record.created_at = Utc::now() - chrono::Duration::minutes(5);
    insert_billing_record(&mut conn, &record).await.unwrap();
    drop(conn);

    let pending = env
        .repos
        .billing
        .list_pending(Utc::now(), 10)
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].amount, dec!(0.05));
    assert_eq!(pending[0].status, BillingStatus::Pending);

    env.repos.billing.mark_failed(pending[0].id).await.unwrap();
    let failed = env
        .repos
        .billing
        .get_by_id(pending[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.status, BillingStatus::Failed);

    env.repos.billing.mark_pending(failed.id).await.unwrap();
    let back = env.repos.billing.get_by_id(failed.id).await.unwrap().unwrap();
    assert_eq!(back.status, BillingStatus::Pending);

    assert_eq!(env.repos.billing.count_by_user(user.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_purge_user_removes_dependents() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;
    let provider = seed_provider(&env, "prov-p", "http://p.test", 1).await;
    let model = seed_gpt4(&env).await;

    let mut conn = env.db.pool().acquire().await.unwrap();
    let log = UsageLog::new(
        user.id,
        credential.id,
        provider.id,
        model.id,
        "req-purge".into(),
        1,
        1,
    );
    let log_id = insert_usage_log(&mut conn, &log).await.unwrap();
    let record = BillingRecord::usage(user.id, log_id, dec!(0.01), "USD".into());
    insert_billing_record(&mut conn, &record).await.unwrap();
    drop(conn);

    purge_user(env.db.pool(), user.id).await.unwrap();

    assert!(env.repos.users.get_by_id(user.id).await.unwrap().is_none());
    assert!(env
        .repos
        .credentials
        .get_by_id(credential.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(env.repos.billing.count_by_user(user.id).await.unwrap(), 0);
}
