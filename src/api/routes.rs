// Route handlers: the OpenAI-compatible surface plus liveness.

use axum::body::{Body, Bytes};
use axum::extract::{Extension, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use super::error::{ApiError, ApiResult};
use super::middleware::RequestId;
use super::server::AppState;
use super::types::{ChatCompletionRequest, ModelEntry, ModelList};
use crate::auth::AuthContext;
use crate::dispatch::{DispatchOutcome, RequestMeta};
use crate::domain::GatewayError;
use crate::storage::ModelRepository;

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<AuthContext>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Bytes,
) -> ApiResult<Response> {
    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError(GatewayError::Validation(format!("malformed request: {}", e))))?;

    if request.messages.is_empty() {
        return Err(ApiError(GatewayError::Validation(
            "messages must not be empty".to_string(),
        )));
    }

    let meta = RequestMeta {
        request_id: Some(request_id),
        request_size: body.len() as i64,
        method: "POST".to_string(),
        endpoint: "/v1/chat/completions".to_string(),
    };

    let outcome = state.dispatcher.chat_completion(&ctx, request, meta).await?;

    Ok(match outcome {
        DispatchOutcome::Json(body) => Json(body).into_response(),
        DispatchOutcome::Stream(stream) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    })
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Extension(_ctx): Extension<AuthContext>,
) -> ApiResult<Json<ModelList>> {
    let models = state.dispatcher.repos().models.list_active().await?;

    Ok(Json(ModelList {
        object: "list".to_string(),
        data: models
            .into_iter()
            .map(|m| ModelEntry {
                id: m.slug,
                object: "model".to_string(),
                created: m.created_at.timestamp(),
                owned_by: "gateway".to_string(),
            })
            .collect(),
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "version": crate::VERSION,
        }))
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}
