use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Inactive,
    Maintenance,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Inactive => "inactive",
            ProviderStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "inactive" => ProviderStatus::Inactive,
            "maintenance" => ProviderStatus::Maintenance,
            _ => ProviderStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => HealthStatus::Healthy,
            "unhealthy" => HealthStatus::Unhealthy,
            _ => HealthStatus::Unknown,
        }
    }
}

/// An upstream service with its own base URL, credential, and dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub base_url: String,

    /// Opaque upstream credential, injected on forwarded requests.
    pub upstream_key: String,

    /// Header carrying the upstream credential. None means
    /// `Authorization: Bearer <key>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,

    pub status: ProviderStatus,

    /// Lower is preferred.
    pub priority: i32,

    pub timeout_seconds: u64,
    pub retry_attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    pub health_check_interval_seconds: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_status: HealthStatus,

    pub created_at: DateTime<Utc>,
}

impl Provider {
    pub fn new(name: String, slug: String, base_url: String, upstream_key: String) -> Self {
        Self {
            id: 0,
            name,
            slug,
            base_url,
            upstream_key,
            auth_header: None,
            status: ProviderStatus::Active,
            priority: 100,
            timeout_seconds: 30,
            retry_attempts: 2,
            health_check_url: None,
            health_check_interval_seconds: 60,
            last_health_check: None,
            health_status: HealthStatus::Unknown,
            created_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_health(mut self, status: HealthStatus) -> Self {
        self.health_status = status;
        self
    }

    /// Routable iff administratively active and the last probe was healthy.
    pub fn is_available(&self) -> bool {
        self.status == ProviderStatus::Active && self.health_status == HealthStatus::Healthy
    }

    /// Probe target: the dedicated health URL when configured, else the base URL.
    pub fn probe_url(&self) -> &str {
        self.health_check_url.as_deref().unwrap_or(&self.base_url)
    }

    pub fn probe_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_health_check {
            None => true,
            Some(at) => (now - at).num_seconds() >= self.health_check_interval_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_provider() -> Provider {
        Provider::new(
            "OpenAI Primary".into(),
            "openai-primary".into(),
            "https://api.openai.com".into(),
            "sk-upstream".into(),
        )
    }

    #[test]
    fn test_availability_requires_both_flags() {
        let mut p = test_provider();
        assert!(!p.is_available()); // health unknown

        p.health_status = HealthStatus::Healthy;
        assert!(p.is_available());

        p.status = ProviderStatus::Maintenance;
        assert!(!p.is_available());
    }

    #[test]
    fn test_probe_due() {
        let now = Utc::now();
        let mut p = test_provider();
        assert!(p.probe_due(now));

        p.last_health_check = Some(now - chrono::Duration::seconds(30));
        assert!(!p.probe_due(now));

        p.last_health_check = Some(now - chrono::Duration::seconds(90));
        assert!(p.probe_due(now));
    }
}
