use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::cache::{read_through, CacheHandle};
use crate::domain::{
    GatewayError, Model, ModelPricing, ModelStatus, Permissions, Provider, ProviderModelSupport,
    Result,
};
use crate::storage::{
    ModelRepository, PricingRepository, ProviderRepository, Repositories, SupportRepository,
};

/// Effective per-call settings after merging edge config over provider
/// defaults.
#[derive(Debug, Clone)]
pub struct ResolvedEdge {
    pub endpoint: String,
    pub parameter_mapping: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub max_tokens: Option<i64>,
    pub temperature: Option<f64>,
    pub timeout: Duration,
    pub retry_attempts: u32,
}

/// One resolved (provider, upstream model, config) triple for the proxy.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: Provider,
    pub upstream_model: String,
    pub edge: ResolvedEdge,
}

pub struct ProviderSelector {
    repos: Repositories,
    cache: CacheHandle,
    ttl: Duration,
}

impl ProviderSelector {
    pub fn new(repos: Repositories, cache: CacheHandle, ttl: Duration) -> Self {
        Self { repos, cache, ttl }
    }

    /// Resolve a logical model slug through the metadata cache.
    pub async fn model_by_slug(&self, slug: &str) -> Result<Model> {
        let key = format!("model:{}", slug);
        let repos = self.repos.clone();
        let slug_owned = slug.to_string();

        let model: Option<Model> = read_through(&self.cache, &key, self.ttl, || async move {
            repos.models.get_by_slug(&slug_owned).await
        })
        .await?;

        match model {
            Some(model) if model.status == ModelStatus::Active => Ok(model),
            _ => Err(GatewayError::ModelNotFound(slug.to_string())),
        }
    }

    /// Pricing rows for a model, cache-assisted; the calculator filters by
    /// effective date.
    pub async fn pricing_for_model(&self, model_id: i64) -> Result<Vec<ModelPricing>> {
        let key = format!("pricing:{}", model_id);
        let repos = self.repos.clone();

        read_through(&self.cache, &key, self.ttl, || async move {
            repos.pricing.list_for_model(model_id).await
        })
        .await
    }

    /// Ordered candidate list for a model under the credential's permission
    /// filter. Empty results surface as NoAvailableProvider.
    pub async fn select(
        &self,
        model_slug: &str,
        permissions: Option<&Permissions>,
    ) -> Result<Vec<Candidate>> {
        let edges = self.enabled_edges(model_slug).await?;

        let mut ranked: Vec<(ProviderModelSupport, Provider)> = Vec::new();
        for edge in edges {
            let provider = self.provider_by_id(edge.provider_id).await?;
            let Some(provider) = provider else {
                continue;
            };
            if !provider.is_available() {
                debug!(
                    provider = %provider.slug,
                    "skipping unavailable provider for {}",
                    model_slug
                );
                continue;
            }
            if let Some(perms) = permissions {
                if !perms.allows_provider(&provider.slug) {
                    continue;
                }
            }
            ranked.push((edge, provider));
        }

        // Edge priority, then provider priority, then provider id for
        // deterministic ordering.
        ranked.sort_by(|a, b| {
            a.0.priority
                .cmp(&b.0.priority)
                .then(a.1.priority.cmp(&b.1.priority))
                .then(a.1.id.cmp(&b.1.id))
        });

        let candidates: Vec<Candidate> = ranked
            .into_iter()
            .map(|(edge, provider)| {
                let upstream_model = edge.wire_model_name().to_string();
                let resolved = resolve_edge(&provider, &edge);
                Candidate {
                    provider,
                    upstream_model,
                    edge: resolved,
                }
            })
            .collect();

        if candidates.is_empty() {
            return Err(GatewayError::NoAvailableProvider(model_slug.to_string()));
        }
        Ok(candidates)
    }

    pub async fn invalidate_provider(&self, provider_id: i64) {
        self.cache
            .invalidate(&format!("provider:{}", provider_id))
            .await;
    }

    async fn enabled_edges(&self, model_slug: &str) -> Result<Vec<ProviderModelSupport>> {
        let key = format!("support:{}", model_slug);
        let repos = self.repos.clone();
        let slug = model_slug.to_string();

        read_through(&self.cache, &key, self.ttl, || async move {
            repos.support.list_enabled_for_model(&slug).await
        })
        .await
    }

    async fn provider_by_id(&self, provider_id: i64) -> Result<Option<Provider>> {
        let key = format!("provider:{}", provider_id);
        let repos = self.repos.clone();

        read_through(&self.cache, &key, self.ttl, || async move {
            repos.providers.get_by_id(provider_id).await
        })
        .await
    }
}

/// Merge per-edge overrides onto provider defaults.
fn resolve_edge(provider: &Provider, edge: &ProviderModelSupport) -> ResolvedEdge {
    let config = edge.config.clone().unwrap_or_default();
    ResolvedEdge {
        endpoint: config
            .endpoint
            .unwrap_or_else(|| "/v1/chat/completions".to_string()),
        parameter_mapping: config.parameter_mapping,
        headers: config.headers,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        timeout: Duration::from_secs(provider.timeout_seconds),
        retry_attempts: provider.retry_attempts,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EdgeConfig;

    #[test]
    fn test_resolve_edge_defaults() {
        let provider = Provider::new("A".into(), "a".into(), "http://a".into(), "k".into());
        let edge = ProviderModelSupport::new(1, "gpt-4".into());
        let resolved = resolve_edge(&provider, &edge);

        assert_eq!(resolved.endpoint, "/v1/chat/completions");
        assert_eq!(resolved.timeout, Duration::from_secs(30));
        assert_eq!(resolved.retry_attempts, 2);
        assert!(resolved.parameter_mapping.is_empty());
    }

    #[test]
    fn test_resolve_edge_overrides() {
        let provider = Provider::new("A".into(), "a".into(), "http://a".into(), "k".into());
        let mut config = EdgeConfig {
            endpoint: Some("/custom/chat".to_string()),
            max_tokens: Some(2048),
            ..Default::default()
        };
        config
            .parameter_mapping
            .insert("max_tokens".into(), "max_output_tokens".into());

        let edge = ProviderModelSupport::new(1, "gpt-4".into()).with_config(config);
        let resolved = resolve_edge(&provider, &edge);

        assert_eq!(resolved.endpoint, "/custom/chat");
        assert_eq!(resolved.max_tokens, Some(2048));
        assert_eq!(
            resolved.parameter_mapping.get("max_tokens").unwrap(),
            "max_output_tokens"
        );
    }
}
