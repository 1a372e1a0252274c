// Request-id stamping and bearer authentication middleware.

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;
use crate::domain::GatewayError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Caller-supplied request id, validated and attached; generated otherwise.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let supplied = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string);

    let request_id = supplied.unwrap_or_else(|| Uuid::new_v4().to_string());
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Resolve `Authorization: Bearer` to an AuthContext extension; everything
/// under /v1 runs behind this.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError(GatewayError::AuthInvalid))?
        .to_string();

    let ctx = state.authenticator.authenticate_bearer(&token).await?;
    request.extensions_mut().insert(ctx);

    Ok(next.run(request).await)
}
