use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Visible key prefix length; everything after it is secret material.
pub const PREFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Active,
    Suspended,
    Expired,
    Revoked,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Active => "active",
            CredentialStatus::Suspended => "suspended",
            CredentialStatus::Expired => "expired",
            CredentialStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "suspended" => CredentialStatus::Suspended,
            "expired" => CredentialStatus::Expired,
            "revoked" => CredentialStatus::Revoked,
            _ => CredentialStatus::Active,
        }
    }
}

/// Optional restrictions attached to a credential. Lists are authoritative:
/// they filter the routable set after availability, and `"*"` matches any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub allowed_models: Vec<String>,

    #[serde(default)]
    pub allowed_providers: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests_per_minute: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens_per_request: Option<i64>,
}

impl Permissions {
    pub fn allows_model(&self, slug: &str) -> bool {
        self.allowed_models.is_empty()
            || self.allowed_models.iter().any(|m| m == slug || m == "*")
    }

    pub fn allows_provider(&self, slug: &str) -> bool {
        self.allowed_providers.is_empty()
            || self.allowed_providers.iter().any(|p| p == slug || p == "*")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: i64,
    pub user_id: i64,

    /// Opaque bearer secret, compared with constant-time equality.
    pub secret: String,

    /// First visible characters of the secret, indexed for lookup.
    pub prefix: String,

    pub status: CredentialStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Credential {
    /// Mint a new credential with a freshly generated secret.
    pub fn generate(user_id: i64) -> Self {
        let secret = generate_secret();
        let prefix = secret.chars().take(PREFIX_LEN).collect();
        Self {
            id: 0,
            user_id,
            secret,
            prefix,
            status: CredentialStatus::Active,
            permissions: None,
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == CredentialStatus::Expired
            || self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// "sk-gw-" followed by 40 alphanumeric characters.
pub fn generate_secret() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("sk-gw-{}", suffix)
}
