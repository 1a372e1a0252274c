// The per-request pipeline: admission check, provider selection, forwarding
// with failover, and durable accounting.

use bytes::Bytes;
use futures::Stream;
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api::types::{ChatCompletionRequest, ChatCompletionResponse, Usage};
use crate::auth::AuthContext;
use crate::cache::CacheHandle;
use crate::config::Config;
use crate::domain::{GatewayError, ModelPricing, ModelType, Result, UsageLog};
use crate::engine::{CharRatioEstimator, PricingCalculator, TokenEstimator};
use crate::governor::{QuotaGovernor, RequestedUnits, Reservation};
use crate::proxy::{
    completion_channel, AttemptFeed, ForwardOutcome, MeteredStream, ProxyResult, StreamingStart,
    UpstreamProxy,
};
use crate::routing::{Candidate, ProviderSelector};
use crate::accounting::{AccountingRecorder, CompletedCall, Recorded};
use crate::storage::{ModelRepository, Repositories, UsageLogRepository};

/// Transport-level facts about the inbound call.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Caller-supplied idempotency key; generated when absent.
    pub request_id: Option<String>,
    pub request_size: i64,
    pub method: String,
    pub endpoint: String,
}

pub enum DispatchOutcome {
    Json(serde_json::Value),
    /// Pass-through SSE body; accounting completes via the stream finalizer.
    Stream(Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>),
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchOutcome::Json(value) => f.debug_tuple("Json").field(value).finish(),
            DispatchOutcome::Stream(_) => f.debug_tuple("Stream").field(&"<stream>").finish(),
        }
    }
}

/// Owns the per-request chain. Shared handles only; nothing global.
pub struct Dispatcher {
    pool: Pool<Sqlite>,
    repos: Repositories,
    governor: QuotaGovernor,
    selector: Arc<ProviderSelector>,
    proxy: UpstreamProxy,
    recorder: Arc<AccountingRecorder>,
    estimator: Arc<dyn TokenEstimator>,
}

impl Dispatcher {
    pub fn new(pool: Pool<Sqlite>, cache: CacheHandle, config: &Config) -> Self {
        let repos = Repositories::new(pool.clone());
        let estimator: Arc<dyn TokenEstimator> =
            Arc::new(CharRatioEstimator::new(config.proxy.chars_per_token));
        let attempts = AttemptFeed::new();
        let selector = Arc::new(ProviderSelector::new(
            repos.clone(),
            cache,
            std::time::Duration::from_secs(config.cache.ttl_secs.min(60)),
        ));

        Self {
            pool: pool.clone(),
            repos,
            governor: QuotaGovernor::new(pool.clone()),
            selector,
            proxy: UpstreamProxy::new(estimator.clone(), attempts),
            recorder: Arc::new(AccountingRecorder::new(pool)),
            estimator,
        }
    }

    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    pub fn attempt_feed(&self) -> Arc<AttemptFeed> {
        self.proxy.attempt_feed()
    }

    /// The chat-completion pipeline: authenticate (done by the caller),
    /// admission check, selection, forward, record.
    pub async fn chat_completion(
        &self,
        ctx: &AuthContext,
        request: ChatCompletionRequest,
        meta: RequestMeta,
    ) -> Result<DispatchOutcome> {
        let started = Instant::now();
        let request_id = meta
            .request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Cheap replay short-circuit before any admission side effects; the
        // recorder still enforces uniqueness under races.
        if let Some(existing) = self.repos.usage_logs.get_by_request_id(&request_id).await? {
            return self.replay_response(&existing).await;
        }

        let input_estimate = self.estimator.estimate_messages(&request.messages);
        let requested = RequestedUnits {
            tokens_estimate: token_reservation(ctx, &request, input_estimate),
            cost_estimate: Decimal::ZERO,
        };

        // Admission: check-then-reserve. Failures before upstream bytes flow must
        // release; the accounting paths own the reservation afterwards.
        let reservation = self
            .governor
            .check(&ctx.user, &ctx.credential, &requested)
            .await?;

        let (model, pricing_rows, outcome) = match self
            .route_and_forward(ctx, &request, &meta, &request_id, started)
            .await
        {
            Ok(routed) => routed,
            Err(err) => {
                self.release_quietly(&reservation).await;
                return Err(err);
            }
        };

        match outcome {
            ForwardOutcome::Complete(result) => {
                self.finish_complete(
                    ctx,
                    meta,
                    request_id,
                    started,
                    &reservation,
                    &model.id,
                    &model.slug,
                    pricing_rows,
                    result,
                )
                .await
            }
            ForwardOutcome::Streaming(streamed) => {
                self.finish_streaming(
                    ctx,
                    meta,
                    request_id,
                    started,
                    reservation,
                    model.id,
                    pricing_rows,
                    streamed,
                )
            }
        }
    }

    async fn release_quietly(&self, reservation: &Reservation) {
        if let Err(e) = self.governor.release(reservation).await {
            error!("reservation release failed: {}", e);
        }
    }

    /// Resolve the model, filter by permission, preflight pricing, select
    /// candidates, and forward with failover.
    async fn route_and_forward(
        &self,
        ctx: &AuthContext,
        request: &ChatCompletionRequest,
        meta: &RequestMeta,
        request_id: &str,
        started: Instant,
    ) -> Result<(crate::domain::Model, Vec<ModelPricing>, ForwardOutcome)> {
        let model = self.selector.model_by_slug(&request.model).await?;

        if let Some(perms) = &ctx.credential.permissions {
            if !perms.allows_model(&model.slug) {
                return Err(GatewayError::PermissionDenied(format!(
                    "model {} not permitted",
                    model.slug
                )));
            }
        }
        if model.model_type != ModelType::Chat {
            return Err(GatewayError::Validation(format!(
                "model {} does not serve chat completions",
                model.slug
            )));
        }
        if request.is_streaming() && !model.supports_streaming {
            return Err(GatewayError::Validation(format!(
                "model {} does not support streaming",
                model.slug
            )));
        }

        let pricing_rows = self.selector.pricing_for_model(model.id).await?;
        // Fail configuration errors before contacting any upstream.
        PricingCalculator::new().calculate(model.id, &pricing_rows, 0, 0, chrono::Utc::now())?;

        let candidates = self
            .selector
            .select(&model.slug, ctx.credential.permissions.as_ref())
            .await?;

        match self.proxy.forward(&candidates, request).await {
            Ok(outcome) => Ok((model, pricing_rows, outcome)),
            Err(err) => {
                self.record_forward_failure(ctx, meta, request_id, &model.id, &candidates, &err, started)
                    .await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_complete(
        &self,
        ctx: &AuthContext,
        meta: RequestMeta,
        request_id: String,
        started: Instant,
        reservation: &Reservation,
        model_id: &i64,
        model_slug: &str,
        pricing_rows: Vec<ModelPricing>,
        result: ProxyResult,
    ) -> Result<DispatchOutcome> {
        let call = CompletedCall {
            request_id: request_id.clone(),
            user_id: ctx.user.id,
            credential_id: ctx.credential.id,
            provider_id: result.provider_id,
            model_id: *model_id,
            method: meta.method,
            endpoint: meta.endpoint,
            input_tokens: result.input_tokens,
            output_tokens: result.output_tokens,
            request_size: meta.request_size,
            response_size: result.response_size,
            duration_ms: started.elapsed().as_millis() as i64,
            status_code: result.status as i32,
            error_message: None,
        };

        let usage = Usage {
            prompt_tokens: result.input_tokens,
            completion_tokens: result.output_tokens,
            total_tokens: result.input_tokens + result.output_tokens,
        };

        // Durable accounting, detached so a client disconnect after
        // upstream success cannot cancel the record. An accounting failure
        // is logged for the operator but does not take the answer away from
        // the caller. The reservation is not released in that case: the
        // estimate stands in for the unrecorded usage.
        let recorder = self.recorder.clone();
        let governor_pool = self.pool.clone();
        let reservation = reservation.clone();
        let rows = pricing_rows;
        let task_request_id = request_id.clone();
        let recorded = tokio::spawn(async move {
            let recorded = recorder.record_success(call, &reservation, &rows).await;
            match &recorded {
                Ok(Recorded::Replayed(_)) => {
                    // Lost the idempotency race: this call's work is not
                    // billed.
                    let governor = QuotaGovernor::new(governor_pool);
                    if let Err(e) = governor.release(&reservation).await {
                        error!("reservation release failed: {}", e);
                    }
                }
                Err(e) => {
                    error!(
                        request_id = %task_request_id,
                        "accounting failed after upstream success: {}", e
                    );
                }
                Ok(Recorded::Fresh(_)) => {}
            }
            recorded
        })
        .await;

        match recorded {
            Ok(Ok(Recorded::Replayed(existing))) => {
                // Hand back the winner's view.
                return self.replay_response(&existing).await;
            }
            Ok(_) => {}
            Err(join_err) => {
                error!(request_id = %request_id, "accounting task failed: {}", join_err);
            }
        }

        let body =
            crate::proxy::normalize_response(result.body, &request_id, model_slug, &usage);
        Ok(DispatchOutcome::Json(body))
    }

    /// Streaming: the body is passed through while a finalizer task performs
    /// accounting once the stream ends, even if the client disconnected.
    #[allow(clippy::too_many_arguments)]
    fn finish_streaming(
        &self,
        ctx: &AuthContext,
        meta: RequestMeta,
        request_id: String,
        started: Instant,
        reservation: Reservation,
        model_id: i64,
        pricing_rows: Vec<ModelPricing>,
        streamed: StreamingStart,
    ) -> Result<DispatchOutcome> {
        let (done_tx, done_rx) = completion_channel();
        let metered = MeteredStream::new(streamed.stream, done_tx);

        let recorder = self.recorder.clone();
        let governor_pool = self.pool.clone();
        let estimator = self.estimator.clone();
        let user_id = ctx.user.id;
        let credential_id = ctx.credential.id;
        let provider_id = streamed.provider_id;
        let input_tokens = streamed.input_tokens_estimate;
        let status = streamed.status;

        tokio::spawn(async move {
            let stats = match done_rx.await {
                Ok(stats) => stats,
                Err(_) => {
                    warn!(request_id = %request_id, "stream finalizer dropped without stats");
                    return;
                }
            };

            // SSE framing counts as content here; the estimate errs high,
            // which the estimator ratio absorbs in practice.
            let output_tokens = estimator.estimate_chars(stats.bytes);

            let call = CompletedCall {
                request_id: request_id.clone(),
                user_id,
                credential_id,
                provider_id,
                model_id,
                method: meta.method,
                endpoint: meta.endpoint,
                input_tokens,
                output_tokens,
                request_size: meta.request_size,
                response_size: stats.bytes,
                duration_ms: started.elapsed().as_millis() as i64,
                status_code: status as i32,
                error_message: (!stats.completed)
                    .then(|| "client disconnected mid-stream".to_string()),
            };

            match recorder.record_success(call, &reservation, &pricing_rows).await {
                Ok(Recorded::Fresh(log)) => {
                    info!(
                        request_id = %log.request_id,
                        output_tokens,
                        completed = stats.completed,
                        "stream accounted"
                    );
                }
                Ok(Recorded::Replayed(_)) => {
                    let governor = QuotaGovernor::new(governor_pool);
                    if let Err(e) = governor.release(&reservation).await {
                        error!("stream replay release failed: {}", e);
                    }
                }
                Err(e) => {
                    error!(request_id = %request_id, "stream accounting failed: {}", e);
                    let governor = QuotaGovernor::new(governor_pool);
                    if let Err(release_err) = governor.release(&reservation).await {
                        error!("reservation release failed: {}", release_err);
                    }
                }
            }
        });

        Ok(DispatchOutcome::Stream(Box::pin(metered)))
    }

    /// Write the audit row for an admitted request whose forward failed with
    /// a known provider; selection failures leave no row.
    #[allow(clippy::too_many_arguments)]
    async fn record_forward_failure(
        &self,
        ctx: &AuthContext,
        meta: &RequestMeta,
        request_id: &str,
        model_id: &i64,
        candidates: &[Candidate],
        err: &GatewayError,
        started: Instant,
    ) {
        let Some(provider_id) = provider_id_for_error(candidates, err) else {
            return;
        };

        let status_code = match err {
            GatewayError::UpstreamTimeout { .. } => 504,
            GatewayError::UpstreamRejected { status, .. } => *status as i32,
            _ => 502,
        };

        let call = CompletedCall {
            request_id: request_id.to_string(),
            user_id: ctx.user.id,
            credential_id: ctx.credential.id,
            provider_id,
            model_id: *model_id,
            method: meta.method.clone(),
            endpoint: meta.endpoint.clone(),
            input_tokens: 0,
            output_tokens: 0,
            request_size: meta.request_size,
            response_size: 0,
            duration_ms: started.elapsed().as_millis() as i64,
            status_code,
            error_message: Some(err.to_string()),
        };

        if let Err(e) = self.recorder.record_failure(call).await {
            error!(request_id, "failure audit write failed: {}", e);
        }
    }

    /// Serve a request whose id already has an audit row. Success rows
    /// replay the accounted answer; failure rows replay the failure, so a
    /// request id always maps to one outcome.
    async fn replay_response(&self, existing: &UsageLog) -> Result<DispatchOutcome> {
        if !(200..300).contains(&existing.status_code) {
            let message = existing
                .error_message
                .clone()
                .unwrap_or_else(|| "upstream failure".to_string());
            return Err(match existing.status_code {
                504 => GatewayError::UpstreamTimeout {
                    provider: "replayed".to_string(),
                },
                _ => GatewayError::UpstreamUnavailable(message),
            });
        }

        let model_slug = self
            .repos
            .models
            .get_by_id(existing.model_id)
            .await?
            .map(|m| m.slug)
            .unwrap_or_else(|| "unknown".to_string());

        let usage = Usage {
            prompt_tokens: existing.input_tokens,
            completion_tokens: existing.output_tokens,
            total_tokens: existing.total_tokens,
        };
        let response = ChatCompletionResponse::replayed(
            &existing.request_id,
            &model_slug,
            usage,
            existing.created_at.timestamp(),
        );

        info!(request_id = %existing.request_id, "idempotent replay served from usage log");
        Ok(DispatchOutcome::Json(serde_json::to_value(response)?))
    }
}

/// A-priori token reservation: the credential's per-request cap when set,
/// else the input estimate plus the caller's output budget.
fn token_reservation(ctx: &AuthContext, request: &ChatCompletionRequest, input_estimate: i64) -> i64 {
    if let Some(cap) = ctx
        .credential
        .permissions
        .as_ref()
        .and_then(|p| p.max_tokens_per_request)
    {
        return cap;
    }
    input_estimate + request.max_tokens.unwrap_or(0)
}

fn provider_id_for_error(candidates: &[Candidate], err: &GatewayError) -> Option<i64> {
    let slug = match err {
        GatewayError::UpstreamTimeout { provider } => Some(provider.as_str()),
        GatewayError::UpstreamRejected { provider, .. } => Some(provider.as_str()),
        _ => None,
    };
    match slug {
        Some(slug) => candidates
            .iter()
            .find(|c| c.provider.slug == slug)
            .map(|c| c.provider.id),
        None => candidates.last().map(|c| c.provider.id),
    }
}
