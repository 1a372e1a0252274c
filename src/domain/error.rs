use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Credential failures
    #[error("Invalid credential")]
    AuthInvalid,

    #[error("Credential expired")]
    AuthExpired,

    #[error("Credential revoked")]
    AuthRevoked,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // Routing failures
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("No available provider for model: {0}")]
    NoAvailableProvider(String),

    // Admission denials
    #[error("Rate limited: {reason}")]
    RateLimited {
        reason: String,
        retry_after_seconds: i64,
    },

    #[error("Quota exceeded: {reason}")]
    QuotaExceeded {
        reason: String,
        retry_after_seconds: Option<i64>,
    },

    // Pricing configuration errors: the operator's bug, never the caller's
    #[error("Pricing missing for model {model_id}, kind {kind}")]
    PricingMissing { model_id: i64, kind: String },

    #[error("Pricing inconsistent: {0}")]
    PricingInconsistent(String),

    // Proxy failures
    #[error("Upstream timeout: provider {provider}")]
    UpstreamTimeout { provider: String },

    #[error("Upstream rejected request: provider {provider}, status {status}")]
    UpstreamRejected {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Request translation failed: {0}")]
    Translated(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        GatewayError::Validation(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// True when retrying against another candidate could still succeed.
    pub fn is_retriable_upstream(&self) -> bool {
        matches!(
            self,
            GatewayError::UpstreamTimeout { .. } | GatewayError::UpstreamUnavailable(_)
        )
    }
}
