// Upstream proxy: forward a translated request across the candidate list
// with per-candidate retry and inter-candidate failover.

pub mod health;
pub mod stream;
pub mod translate;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::types::ChatCompletionRequest;
use crate::domain::{GatewayError, Result};
use crate::engine::TokenEstimator;
use crate::routing::Candidate;

pub use health::{AttemptFeed, AttemptStats};
pub use stream::{completion_channel, MeteredStream, StreamStats};
pub use translate::{normalize_response, parse_response, translate_request, TranslatedRequest};

const ERROR_BODY_LIMIT: usize = 512;

/// A finished non-streaming forward with measured token counts.
#[derive(Debug)]
pub struct ProxyResult {
    pub provider_id: i64,
    pub provider_slug: String,
    pub status: u16,
    pub body: Value,
    pub content: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    /// False when the estimator filled in for a missing usage block.
    pub usage_reported: bool,
    pub duration_ms: i64,
    pub response_size: i64,
}

/// A streaming forward that produced headers; the body is handed through.
pub struct StreamingStart {
    pub provider_id: i64,
    pub provider_slug: String,
    pub status: u16,
    pub stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    pub input_tokens_estimate: i64,
    pub duration_ms: i64,
}

pub enum ForwardOutcome {
    Complete(ProxyResult),
    Streaming(StreamingStart),
}

impl std::fmt::Debug for ForwardOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardOutcome::Complete(result) => f.debug_tuple("Complete").field(result).finish(),
            ForwardOutcome::Streaming(_) => f.debug_tuple("Streaming").field(&"<streaming>").finish(),
        }
    }
}

enum AttemptOutcome {
    Json {
        status: u16,
        body: Value,
        size: i64,
    },
    Stream {
        status: u16,
        stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    },
}

enum AttemptFailure {
    /// Worth another try on this or the next candidate.
    Transient(GatewayError),
    /// Stops the whole forward: the upstream judged the request itself.
    Terminal(GatewayError),
}

pub struct UpstreamProxy {
    client: reqwest::Client,
    estimator: Arc<dyn TokenEstimator>,
    attempts: Arc<AttemptFeed>,
}

impl UpstreamProxy {
    pub fn new(estimator: Arc<dyn TokenEstimator>, attempts: Arc<AttemptFeed>) -> Self {
        Self {
            client: reqwest::Client::new(),
            estimator,
            attempts,
        }
    }

    /// Walk the candidate list in order. Within one candidate, transient
    /// failures are retried up to its attempt budget; a terminal failure
    /// aborts the whole forward. Retries never happen once a streaming body
    /// has started: streaming attempts commit at the 2xx header.
    pub async fn forward(
        &self,
        candidates: &[Candidate],
        request: &ChatCompletionRequest,
    ) -> Result<ForwardOutcome> {
        let streaming = request.is_streaming();
        let mut last_error: Option<GatewayError> = None;

        for candidate in candidates {
            let translated = translate_request(candidate, request)?;
            let attempts = candidate.edge.retry_attempts.max(1);

            for attempt in 1..=attempts {
                let started = Instant::now();
                let outcome = self.try_once(candidate, &translated, streaming).await;
                let duration_ms = started.elapsed().as_millis() as i64;

                match outcome {
                    Ok(AttemptOutcome::Json { status, body, size }) => {
                        self.attempts
                            .record(candidate.provider.id, true, duration_ms)
                            .await;

                        let parsed = parse_response(&body);
                        let (input_tokens, output_tokens, usage_reported) = match &parsed.usage {
                            Some(usage) => (usage.prompt_tokens, usage.completion_tokens, true),
                            None => (
                                self.estimator.estimate_messages(&request.messages),
                                self.estimator.estimate_text(&parsed.content),
                                false,
                            ),
                        };

                        info!(
                            provider = %candidate.provider.slug,
                            status,
                            input_tokens,
                            output_tokens,
                            usage_reported,
                            duration_ms,
                            "upstream forward complete"
                        );

                        return Ok(ForwardOutcome::Complete(ProxyResult {
                            provider_id: candidate.provider.id,
                            provider_slug: candidate.provider.slug.clone(),
                            status,
                            body,
                            content: parsed.content,
                            input_tokens,
                            output_tokens,
                            usage_reported,
                            duration_ms,
                            response_size: size,
                        }));
                    }
                    Ok(AttemptOutcome::Stream { status, stream }) => {
                        self.attempts
                            .record(candidate.provider.id, true, duration_ms)
                            .await;

                        let input_tokens_estimate =
                            self.estimator.estimate_messages(&request.messages);

                        info!(
                            provider = %candidate.provider.slug,
                            status,
                            "upstream stream started"
                        );

                        return Ok(ForwardOutcome::Streaming(StreamingStart {
                            provider_id: candidate.provider.id,
                            provider_slug: candidate.provider.slug.clone(),
                            status,
                            stream,
                            input_tokens_estimate,
                            duration_ms,
                        }));
                    }
                    Err(AttemptFailure::Transient(err)) => {
                        self.attempts
                            .record(candidate.provider.id, false, duration_ms)
                            .await;
                        debug!(
                            provider = %candidate.provider.slug,
                            attempt,
                            attempts,
                            "transient upstream failure: {}",
                            err
                        );
                        last_error = Some(err);
                    }
                    Err(AttemptFailure::Terminal(err)) => {
                        self.attempts
                            .record(candidate.provider.id, false, duration_ms)
                            .await;
                        return Err(err);
                    }
                }
            }

            warn!(
                provider = %candidate.provider.slug,
                "candidate exhausted after {} attempt(s), failing over",
                attempts
            );
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::UpstreamUnavailable("candidate list exhausted".to_string())
        }))
    }

    async fn try_once(
        &self,
        candidate: &Candidate,
        translated: &TranslatedRequest,
        streaming: bool,
    ) -> std::result::Result<AttemptOutcome, AttemptFailure> {
        let provider = &candidate.provider.slug;

        let mut req = self
            .client
            .post(&translated.url)
            .timeout(candidate.edge.timeout)
            .json(&translated.body);
        for (name, value) in &translated.headers {
            req = req.header(name, value);
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                AttemptFailure::Transient(GatewayError::UpstreamTimeout {
                    provider: provider.clone(),
                })
            } else {
                AttemptFailure::Transient(GatewayError::UpstreamUnavailable(format!(
                    "{}: {}",
                    provider, e
                )))
            }
        })?;

        let status = response.status();

        if status.is_success() {
            if streaming {
                return Ok(AttemptOutcome::Stream {
                    status: status.as_u16(),
                    stream: response.bytes_stream().boxed(),
                });
            }

            let bytes = response.bytes().await.map_err(|e| {
                AttemptFailure::Transient(GatewayError::UpstreamUnavailable(format!(
                    "{}: body read failed: {}",
                    provider, e
                )))
            })?;
            let size = bytes.len() as i64;
            let body: Value = serde_json::from_slice(&bytes).map_err(|e| {
                AttemptFailure::Transient(GatewayError::UpstreamUnavailable(format!(
                    "{}: unparseable 2xx body: {}",
                    provider, e
                )))
            })?;

            return Ok(AttemptOutcome::Json {
                status: status.as_u16(),
                body,
                size,
            });
        }

        let code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let truncated: String = body.chars().take(ERROR_BODY_LIMIT).collect();

        // Transient: 429 and 5xx except 501. Everything else judged the
        // request itself and stops the forward.
        if code == 429 || (status.is_server_error() && code != 501) {
            Err(AttemptFailure::Transient(GatewayError::UpstreamUnavailable(
                format!("{}: upstream status {}", provider, code),
            )))
        } else {
            Err(AttemptFailure::Terminal(GatewayError::UpstreamRejected {
                provider: provider.clone(),
                status: code,
                body: truncated,
            }))
        }
    }

    pub fn attempt_feed(&self) -> Arc<AttemptFeed> {
        self.attempts.clone()
    }
}
