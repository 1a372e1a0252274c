// HTTP surface: routing, auth middleware, error contract.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tower::util::ServiceExt;

use helpers::{seed_gpt4, seed_user, test_env};
use llm_gateway::api::{build_router, ApiError, AppState};
use llm_gateway::auth::Authenticator;
use llm_gateway::domain::GatewayError;

async fn app(env: &helpers::TestEnv) -> axum::Router {
    let state = Arc::new(AppState {
        dispatcher: env.dispatcher.clone(),
        authenticator: Authenticator::new(&env.repos),
        db: env.db.clone(),
    });
    build_router(state, &env.config.server)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint_unauthenticated() {
    let env = test_env().await;
    let response = app(&env)
        .await
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_bearer_is_401_with_error_shape() {
    let env = test_env().await;
    let response = app(&env)
        .await
        .oneshot(
            Request::post("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AuthInvalid");
}

#[tokio::test]
async fn test_models_listing_with_bearer() {
    let env = test_env().await;
    let (_, credential) = seed_user(&env, dec!(10)).await;
    seed_gpt4(&env).await;

    let response = app(&env)
        .await
        .oneshot(
            Request::get("/v1/models")
                .header(header::AUTHORIZATION, format!("Bearer {}", credential.secret))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"][0]["id"], "gpt-4");
    assert_eq!(body["data"][0]["object"], "model");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let env = test_env().await;
    let (_, credential) = seed_user(&env, dec!(10)).await;

    let response = app(&env)
        .await
        .oneshot(
            Request::post("/v1/chat/completions")
                .header(header::AUTHORIZATION, format!("Bearer {}", credential.secret))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"model\": 42}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BadRequest");
}

#[tokio::test]
async fn test_response_carries_request_id_header() {
    let env = test_env().await;
    let response = app(&env)
        .await
        .oneshot(
            Request::get("/health")
                .header("x-request-id", "trace-me-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}

#[tokio::test]
async fn test_retry_after_header_on_rate_limit() {
    use axum::response::IntoResponse;

    let response = ApiError(GatewayError::RateLimited {
        reason: "requests per minute limit of 10 reached".into(),
        retry_after_seconds: 37,
    })
    .into_response();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "37");
}

#[tokio::test]
async fn test_unknown_model_via_http_is_404() {
    let env = test_env().await;
    let (_, credential) = seed_user(&env, dec!(10)).await;

    let body = serde_json::json!({
        "model": "missing",
        "messages": [{"role": "user", "content": "hello"}],
    });
    let response = app(&env)
        .await
        .oneshot(
            Request::post("/v1/chat/completions")
                .header(header::AUTHORIZATION, format!("Bearer {}", credential.secret))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "ModelNotFound");
}
