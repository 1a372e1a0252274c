// Background loops: health probing and billing drain.

mod helpers;

use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{seed_gpt4, seed_provider, seed_user, test_env};
use llm_gateway::background::{BillingSweeper, HealthProber};
use llm_gateway::domain::{BillingRecord, BillingStatus, HealthStatus, UsageLog};
use llm_gateway::proxy::AttemptFeed;
use llm_gateway::routing::ProviderSelector;
use llm_gateway::storage::repository::{insert_billing_record, insert_usage_log};
use llm_gateway::storage::{BillingRepository, ProviderRepository, UserRepository};

fn prober(env: &helpers::TestEnv) -> HealthProber {
    HealthProber::new(
        env.repos.providers.clone(),
        env.cache.clone(),
        AttemptFeed::new(),
        env.config.prober.clone(),
    )
}

#[tokio::test]
async fn test_probe_marks_healthy_and_unhealthy() {
    let env = test_env().await;

    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&up)
        .await;
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let healthy = seed_provider(&env, "prov-up", &up.uri(), 1).await;
    let sick = seed_provider(&env, "prov-down", &down.uri(), 1).await;
    // Start from unknown with probes due immediately.
    for p in [&healthy, &sick] {
        env.repos
            .providers
            .update_health(p.id, HealthStatus::Unknown, chrono::Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();
    }

    let probed = prober(&env).tick().await.unwrap();
    assert_eq!(probed, 2);

    let healthy = env.repos.providers.get_by_id(healthy.id).await.unwrap().unwrap();
    let sick = env.repos.providers.get_by_id(sick.id).await.unwrap().unwrap();
    assert_eq!(healthy.health_status, HealthStatus::Healthy);
    assert_eq!(sick.health_status, HealthStatus::Unhealthy);
    assert!(healthy.last_health_check.is_some());
}

#[tokio::test]
async fn test_probe_respects_interval() {
    let env = test_env().await;
    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&up)
        .await;

    let provider = seed_provider(&env, "prov-fresh", &up.uri(), 1).await;
    // Probed moments ago: nothing due.
    env.repos
        .providers
        .update_health(provider.id, HealthStatus::Healthy, chrono::Utc::now())
        .await
        .unwrap();

    let probed = prober(&env).tick().await.unwrap();
    assert_eq!(probed, 0);
}

#[tokio::test]
async fn test_probe_transition_reaches_selector() {
    let env = test_env().await;
    seed_gpt4(&env).await;

    let flaky = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&flaky)
        .await;

    let provider = seed_provider(&env, "prov-watch", &flaky.uri(), 1).await;
    helpers::link(&env, &provider, "gpt-4", 1).await;
    env.repos
        .providers
        .update_health(provider.id, HealthStatus::Healthy, chrono::Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();

    let selector = ProviderSelector::new(env.repos.clone(), env.cache.clone(), Duration::from_secs(60));
    assert_eq!(selector.select("gpt-4", None).await.unwrap().len(), 1);

    // Probe fails; the prober's invalidation makes the selector see it.
    prober(&env).tick().await.unwrap();
    assert!(selector.select("gpt-4", None).await.is_err());
}

#[tokio::test]
async fn test_sweeper_settles_pending_records() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(20)).await;
    let provider = seed_provider(&env, "prov-sw", "http://sw.test", 1).await;
    let model = seed_gpt4(&env).await;

    // A usage log whose debit never landed.
    let mut conn = env.db.pool().acquire().await.unwrap();
    let log = UsageLog::new(user.id, credential.id, provider.id, model.id, "req-sw".into(), 10, 20);
    let log_id = insert_usage_log(&mut conn, &log).await.unwrap();
    let mut record = BillingRecord::usage(user.id, log_id, dec!(0.5), "USD".into());
    record.created_at = chrono::Utc::now() - chrono::Duration::minutes(2);
    insert_billing_record(&mut conn, &record).await.unwrap();
    drop(conn);

    let sweeper = BillingSweeper::new(env.db.pool().clone(), env.config.sweeper.clone());
    let stats = sweeper.sweep().await.unwrap();
    assert_eq!(stats.examined, 1);
    assert_eq!(stats.settled, 1);
    assert_eq!(stats.failed, 0);

    let balance = env.repos.users.get_by_id(user.id).await.unwrap().unwrap().balance;
    assert_eq!(balance, dec!(19.5));

    let settled = env.repos.billing.list_by_user(user.id, 10, 0).await.unwrap();
    assert_eq!(settled[0].status, BillingStatus::Processed);

    // A second sweep finds nothing.
    let stats = sweeper.sweep().await.unwrap();
    assert_eq!(stats.examined, 0);
}

#[tokio::test]
async fn test_sweeper_marks_unsettleable_failed_and_operator_retries() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(20)).await;
    let provider = seed_provider(&env, "prov-fail", "http://fail.test", 1).await;
    let model = seed_gpt4(&env).await;

    let mut conn = env.db.pool().acquire().await.unwrap();
    let log = UsageLog::new(user.id, credential.id, provider.id, model.id, "req-swf".into(), 1, 1);
    let log_id = insert_usage_log(&mut conn, &log).await.unwrap();
    // Points at a user that does not exist: the debit cannot land.
    let mut record = BillingRecord::usage(999_999, log_id, dec!(0.5), "USD".into());
    record.created_at = chrono::Utc::now() - chrono::Duration::minutes(2);
    let record_id = insert_billing_record(&mut conn, &record).await.unwrap();
    drop(conn);

    let sweeper = BillingSweeper::new(env.db.pool().clone(), env.config.sweeper.clone());
    let stats = sweeper.sweep().await.unwrap();
    assert_eq!(stats.failed, 1);

    let failed = env.repos.billing.get_by_id(record_id).await.unwrap().unwrap();
    assert_eq!(failed.status, BillingStatus::Failed);

    // Operator pushes it back for another attempt.
    sweeper.retry_failed(record_id).await.unwrap();
    let back = env.repos.billing.get_by_id(record_id).await.unwrap().unwrap();
    assert_eq!(back.status, BillingStatus::Pending);
}
