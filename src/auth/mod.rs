// Credential authentication: opaque bearer secrets, prefix-indexed lookup,
// constant-time comparison.

use chrono::Utc;
use constant_time_eq::constant_time_eq;
use tracing::{debug, warn};

use crate::domain::{
    Credential, CredentialStatus, GatewayError, Result, User, UserStatus, PREFIX_LEN,
};
use crate::storage::{
    CredentialRepository, Repositories, SqliteCredentialRepository, SqliteUserRepository,
    UserRepository,
};

/// The authenticated principal attached to a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub credential: Credential,
}

pub struct Authenticator {
    credentials: SqliteCredentialRepository,
    users: SqliteUserRepository,
}

impl Authenticator {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            credentials: repos.credentials.clone(),
            users: repos.users.clone(),
        }
    }

    /// Resolve a bearer token to its principal. Secrets sharing the visible
    /// prefix are all compared in constant time before a winner is chosen.
    pub async fn authenticate_bearer(&self, token: &str) -> Result<AuthContext> {
        let token = token.trim();
        if token.chars().count() <= PREFIX_LEN {
            return Err(GatewayError::AuthInvalid);
        }

        let prefix: String = token.chars().take(PREFIX_LEN).collect();
        let candidates = self.credentials.list_by_prefix(&prefix).await?;

        let mut matched: Option<Credential> = None;
        for candidate in candidates {
            if constant_time_eq(candidate.secret.as_bytes(), token.as_bytes()) {
                matched = Some(candidate);
            }
        }
        let credential = matched.ok_or(GatewayError::AuthInvalid)?;

        let now = Utc::now();
        match credential.status {
            CredentialStatus::Active => {}
            CredentialStatus::Expired => return Err(GatewayError::AuthExpired),
            CredentialStatus::Suspended | CredentialStatus::Revoked => {
                return Err(GatewayError::AuthRevoked)
            }
        }
        if credential.is_expired(now) {
            return Err(GatewayError::AuthExpired);
        }

        let user = self
            .users
            .get_by_id(credential.user_id)
            .await?
            .ok_or(GatewayError::AuthInvalid)?;
        if user.status == UserStatus::Deleted {
            return Err(GatewayError::AuthRevoked);
        }

        // Best-effort bookkeeping; a failed touch never blocks the request.
        if let Err(e) = self.credentials.touch_last_used(credential.id, now).await {
            warn!(credential_id = credential.id, "last_used update failed: {}", e);
        }

        debug!(
            credential_id = credential.id,
            user_id = user.id,
            "authenticated"
        );

        Ok(AuthContext { user, credential })
    }
}
