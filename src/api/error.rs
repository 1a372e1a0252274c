// API error surface: domain errors mapped to the wire contract.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::GatewayError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Wrapper carrying a domain error to the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            GatewayError::AuthInvalid
            | GatewayError::AuthExpired
            | GatewayError::AuthRevoked => StatusCode::UNAUTHORIZED,
            GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::ModelNotFound(_) | GatewayError::NoAvailableProvider(_) => {
                StatusCode::NOT_FOUND
            }
            GatewayError::RateLimited { .. } | GatewayError::QuotaExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            GatewayError::Validation(_) | GatewayError::Translated(_) => StatusCode::BAD_REQUEST,
            GatewayError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::UpstreamRejected { .. } | GatewayError::UpstreamUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            // Operator bugs and everything else: the caller did nothing wrong.
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match &self.0 {
            GatewayError::AuthInvalid => "AuthInvalid",
            GatewayError::AuthExpired => "AuthExpired",
            GatewayError::AuthRevoked => "AuthRevoked",
            GatewayError::PermissionDenied(_) => "PermissionDenied",
            GatewayError::ModelNotFound(_) => "ModelNotFound",
            GatewayError::NoAvailableProvider(_) => "NoAvailableProvider",
            GatewayError::RateLimited { .. } => "RateLimited",
            GatewayError::QuotaExceeded { .. } => "QuotaExceeded",
            GatewayError::PricingMissing { .. } => "PricingMissing",
            GatewayError::PricingInconsistent(_) => "PricingInconsistent",
            GatewayError::UpstreamTimeout { .. } => "UpstreamTimeout",
            GatewayError::UpstreamRejected { .. } => "UpstreamRejected",
            GatewayError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            GatewayError::Translated(_) => "Translated",
            GatewayError::Validation(_) => "BadRequest",
            _ => "InternalError",
        }
    }

    fn retry_after_seconds(&self) -> Option<i64> {
        match &self.0 {
            GatewayError::RateLimited {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            GatewayError::QuotaExceeded {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
            _ => None,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match &self.0 {
            GatewayError::RateLimited {
                retry_after_seconds,
                ..
            } => Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds })),
            GatewayError::QuotaExceeded {
                retry_after_seconds: Some(seconds),
                ..
            } => Some(serde_json::json!({ "retry_after_seconds": seconds })),
            GatewayError::UpstreamRejected {
                provider, status, ..
            } => Some(serde_json::json!({ "provider": provider, "upstream_status": status })),
            _ => None,
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: ErrorDetail {
                code: self.error_code().to_string(),
                message: self.0.to_string(),
                details: self.details(),
            },
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_seconds();
        let body = Json(self.to_response_body());

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
