// Credential authentication paths.

mod helpers;

use assert_matches::assert_matches;
use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

use helpers::{seed_user, test_env};
use llm_gateway::auth::Authenticator;
use llm_gateway::domain::{Credential, CredentialStatus, GatewayError, UserStatus};
use llm_gateway::storage::{CredentialRepository, UserRepository};

#[tokio::test]
async fn test_valid_bearer_resolves_principal() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;

    let auth = Authenticator::new(&env.repos);
    let ctx = auth.authenticate_bearer(&credential.secret).await.unwrap();
    assert_eq!(ctx.user.id, user.id);
    assert_eq!(ctx.credential.id, credential.id);

    // The touch is best-effort but should normally land.
    let loaded = env
        .repos
        .credentials
        .get_by_id(credential.id)
        .await
        .unwrap()
        .unwrap();
    assert!(loaded.last_used_at.is_some());
}

#[tokio::test]
async fn test_unknown_and_malformed_tokens_rejected() {
    let env = test_env().await;
    seed_user(&env, dec!(10)).await;
    let auth = Authenticator::new(&env.repos);

    assert_matches!(
        auth.authenticate_bearer("sk-gw-notARealSecret000000000000000000000000").await,
        Err(GatewayError::AuthInvalid)
    );
    assert_matches!(auth.authenticate_bearer("").await, Err(GatewayError::AuthInvalid));
    assert_matches!(auth.authenticate_bearer("short").await, Err(GatewayError::AuthInvalid));
}

#[tokio::test]
async fn test_wrong_secret_same_prefix_rejected() {
    let env = test_env().await;
    let (_, credential) = seed_user(&env, dec!(10)).await;
    let auth = Authenticator::new(&env.repos);

    // Same visible prefix, different secret material.
    let mut forged = credential.secret.clone();
    forged.pop();
    forged.push('!');
    assert_matches!(
        auth.authenticate_bearer(&forged).await,
        Err(GatewayError::AuthInvalid)
    );
}

#[tokio::test]
async fn test_revoked_suspended_expired_states() {
    let env = test_env().await;
    let auth = Authenticator::new(&env.repos);

    let (_, revoked) = seed_user(&env, dec!(10)).await;
    env.repos
        .credentials
        .update_status(revoked.id, CredentialStatus::Revoked)
        .await
        .unwrap();
    assert_matches!(
        auth.authenticate_bearer(&revoked.secret).await,
        Err(GatewayError::AuthRevoked)
    );

    let (_, suspended) = seed_user(&env, dec!(10)).await;
    env.repos
        .credentials
        .update_status(suspended.id, CredentialStatus::Suspended)
        .await
        .unwrap();
    assert_matches!(
        auth.authenticate_bearer(&suspended.secret).await,
        Err(GatewayError::AuthRevoked)
    );

    let (_, expired) = seed_user(&env, dec!(10)).await;
    env.repos
        .credentials
        .update_status(expired.id, CredentialStatus::Expired)
        .await
        .unwrap();
    assert_matches!(
        auth.authenticate_bearer(&expired.secret).await,
        Err(GatewayError::AuthExpired)
    );
}

#[tokio::test]
async fn test_past_expiry_timestamp_rejected() {
    let env = test_env().await;
    let (user, _) = seed_user(&env, dec!(10)).await;

    let stale = env
        .repos
        .credentials
        .create(&Credential::generate(user.id).with_expiry(Utc::now() - chrono::Duration::hours(1)))
        .await
        .unwrap();

    let auth = Authenticator::new(&env.repos);
    assert_matches!(
        auth.authenticate_bearer(&stale.secret).await,
        Err(GatewayError::AuthExpired)
    );
}

#[tokio::test]
async fn test_deleted_user_rejected() {
    let env = test_env().await;
    let (user, credential) = seed_user(&env, dec!(10)).await;
    env.repos
        .users
        .update_status(user.id, UserStatus::Deleted)
        .await
        .unwrap();

    let auth = Authenticator::new(&env.repos);
    assert_matches!(
        auth.authenticate_bearer(&credential.secret).await,
        Err(GatewayError::AuthRevoked)
    );
}
