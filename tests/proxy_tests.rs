// Upstream proxy behavior against wiremock doubles: retries, failover,
// terminal rejections, token estimation.

mod helpers;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use helpers::{chat_request, upstream_ok_body};
use llm_gateway::domain::{GatewayError, Provider};
use llm_gateway::engine::CharRatioEstimator;
use llm_gateway::proxy::{AttemptFeed, ForwardOutcome, UpstreamProxy};
use llm_gateway::routing::{Candidate, ResolvedEdge};

fn proxy() -> (UpstreamProxy, Arc<AttemptFeed>) {
    let feed = AttemptFeed::new();
    let proxy = UpstreamProxy::new(Arc::new(CharRatioEstimator::default()), feed.clone());
    (proxy, feed)
}

fn candidate(id: i64, slug: &str, base_url: &str, retry_attempts: u32) -> Candidate {
    let mut provider = Provider::new(
        slug.to_uppercase(),
        slug.to_string(),
        base_url.to_string(),
        format!("key-{}", slug),
    );
    provider.id = id;
    provider.retry_attempts = retry_attempts;

    Candidate {
        upstream_model: "gpt-4".to_string(),
        edge: ResolvedEdge {
            endpoint: "/v1/chat/completions".to_string(),
            parameter_mapping: Default::default(),
            headers: Default::default(),
            max_tokens: None,
            temperature: None,
            timeout: std::time::Duration::from_secs(provider.timeout_seconds),
            retry_attempts,
        },
        provider,
    }
}

#[tokio::test]
async fn test_success_with_reported_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer key-a"))
        .and(body_partial_json(serde_json::json!({"model": "gpt-4"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (proxy, feed) = proxy();
    let candidates = vec![candidate(1, "a", &server.uri(), 2)];
    let outcome = proxy.forward(&candidates, &chat_request("gpt-4")).await.unwrap();

    let result = match outcome {
        ForwardOutcome::Complete(result) => result,
        _ => panic!("expected a complete response"),
    };
    assert_eq!(result.status, 200);
    assert_eq!(result.input_tokens, 100);
    assert_eq!(result.output_tokens, 200);
    assert!(result.usage_reported);
    assert_eq!(result.content, "Hello!");

    let stats = feed.stats(1).await;
    assert_eq!(stats.total, 1);
    assert_eq!(stats.failures, 0);
}

#[tokio::test]
async fn test_missing_usage_falls_back_to_estimator() {
    let server = MockServer::start().await;
    let body = serde_json::json!({
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "12345678"},
            "finish_reason": "stop"
        }]
    });
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let (proxy, _) = proxy();
    let candidates = vec![candidate(1, "a", &server.uri(), 1)];
    let request = chat_request("gpt-4");
    let outcome = proxy.forward(&candidates, &request).await.unwrap();

    let result = match outcome {
        ForwardOutcome::Complete(result) => result,
        _ => panic!("expected a complete response"),
    };
    assert!(!result.usage_reported);
    // 400-char content + 4-char role at 4 chars/token.
    assert_eq!(result.input_tokens, 101);
    // 8 characters of output.
    assert_eq!(result.output_tokens, 2);
}

#[tokio::test]
async fn test_transient_503_retried_within_candidate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let (proxy, feed) = proxy();
    let candidates = vec![candidate(1, "a", &server.uri(), 3)];
    let outcome = proxy.forward(&candidates, &chat_request("gpt-4")).await.unwrap();
    assert_matches!(outcome, ForwardOutcome::Complete(_));

    let stats = feed.stats(1).await;
    assert_eq!(stats.total, 2);
    assert_eq!(stats.failures, 1);
}

#[tokio::test]
async fn test_failover_to_second_candidate() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&down)
        .await;

    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_ok_body()))
        .expect(1)
        .mount(&up)
        .await;

    let (proxy, feed) = proxy();
    let candidates = vec![
        candidate(1, "a", &down.uri(), 2),
        candidate(2, "b", &up.uri(), 2),
    ];
    let outcome = proxy.forward(&candidates, &chat_request("gpt-4")).await.unwrap();

    let result = match outcome {
        ForwardOutcome::Complete(result) => result,
        _ => panic!("expected a complete response"),
    };
    assert_eq!(result.provider_id, 2);

    assert_eq!(feed.stats(1).await.failures, 2);
    assert_eq!(feed.stats(2).await.failures, 0);
}

#[tokio::test]
async fn test_4xx_is_terminal_no_failover() {
    let bad = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&bad)
        .await;

    let never = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_ok_body()))
        .expect(0)
        .mount(&never)
        .await;

    let (proxy, _) = proxy();
    let candidates = vec![
        candidate(1, "a", &bad.uri(), 3),
        candidate(2, "b", &never.uri(), 3),
    ];
    let err = proxy
        .forward(&candidates, &chat_request("gpt-4"))
        .await
        .unwrap_err();

    assert_matches!(err, GatewayError::UpstreamRejected { status: 400, .. });
}

#[tokio::test]
async fn test_429_is_transient_and_fails_over() {
    let throttled = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&throttled)
        .await;

    let up = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_ok_body()))
        .expect(1)
        .mount(&up)
        .await;

    let (proxy, _) = proxy();
    let candidates = vec![
        candidate(1, "a", &throttled.uri(), 1),
        candidate(2, "b", &up.uri(), 1),
    ];
    let outcome = proxy.forward(&candidates, &chat_request("gpt-4")).await.unwrap();
    assert_matches!(outcome, ForwardOutcome::Complete(_));
}

#[tokio::test]
async fn test_all_candidates_exhausted() {
    let down = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let (proxy, _) = proxy();
    let candidates = vec![candidate(1, "a", &down.uri(), 2)];
    let err = proxy
        .forward(&candidates, &chat_request("gpt-4"))
        .await
        .unwrap_err();
    assert_matches!(err, GatewayError::UpstreamUnavailable(_));
}

#[tokio::test]
async fn test_streaming_passthrough_commits_on_headers() {
    use futures::StreamExt;

    let server = MockServer::start().await;
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (proxy, _) = proxy();
    let candidates = vec![candidate(1, "a", &server.uri(), 1)];
    let mut request = chat_request("gpt-4");
    request.stream = Some(true);

    let outcome = proxy.forward(&candidates, &request).await.unwrap();
    let mut streamed = match outcome {
        ForwardOutcome::Streaming(streamed) => streamed,
        _ => panic!("expected a streaming response"),
    };

    let mut collected = Vec::new();
    while let Some(chunk) = streamed.stream.next().await {
        collected.extend_from_slice(&chunk.unwrap());
    }
    let text = String::from_utf8(collected).unwrap();
    assert!(text.contains("data: [DONE]"));
    assert!(streamed.input_tokens_estimate > 0);
}
