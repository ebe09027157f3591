//! Unified model catalog across every configured provider
//!
//! The registry holds an immutable snapshot of the provider set and its
//! merged catalog. Refreshing dynamic providers builds a whole new snapshot
//! and swaps it atomically, so in-flight calls always see a consistent
//! provider set. Catalog order is first-seen and deterministic: built-in
//! providers in registration order, then dynamic providers in store order,
//! with the first occurrence of a model slug winning.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{ProviderStore, SecretStore};
use crate::core::providers::{
    custom, AnthropicProvider, CustomProvider, GeminiProvider, OpenAiProvider, OpenRouterProvider,
    Provider,
};
use crate::core::types::{ModelDescriptor, Tier};
use crate::utils::{PipelineError, Result};

pub use custom::{provider_id_for as custom_provider_id, slug_for as custom_slug};

#[derive(Debug, Default)]
struct RegistrySnapshot {
    /// First-seen provider order, drives catalog merge determinism
    providers: Vec<Arc<Provider>>,
    /// Catalog union, deduplicated by slug with first occurrence winning
    models: Vec<ModelDescriptor>,
}

impl RegistrySnapshot {
    fn build(providers: Vec<Arc<Provider>>) -> Self {
        let mut models: Vec<ModelDescriptor> = Vec::new();
        for provider in &providers {
            for model in provider.catalog() {
                if !models.iter().any(|m| m.slug == model.slug) {
                    models.push(model);
                }
            }
        }
        Self { providers, models }
    }
}

#[derive(Debug)]
pub struct ModelRegistry {
    secrets: Arc<dyn SecretStore>,
    store: Arc<dyn ProviderStore>,
    snapshot: ArcSwap<RegistrySnapshot>,
}

impl ModelRegistry {
    /// Registry over the four built-in providers.
    ///
    /// Dynamic providers are loaded on the first
    /// [`refresh_dynamic_providers`](Self::refresh_dynamic_providers) call.
    pub fn new(secrets: Arc<dyn SecretStore>, store: Arc<dyn ProviderStore>) -> Self {
        let builtins: Vec<Arc<Provider>> = vec![
            Arc::new(Provider::OpenAi(OpenAiProvider::new(secrets.clone()))),
            Arc::new(Provider::Anthropic(AnthropicProvider::new(secrets.clone()))),
            Arc::new(Provider::Gemini(GeminiProvider::new(secrets.clone()))),
            Arc::new(Provider::OpenRouter(OpenRouterProvider::new(secrets.clone()))),
        ];
        Self::from_providers(builtins, secrets, store)
    }

    /// Registry over an explicit provider set, used by tests and embedders
    /// that rebase providers onto non-default URLs
    pub fn from_providers(
        providers: Vec<Arc<Provider>>,
        secrets: Arc<dyn SecretStore>,
        store: Arc<dyn ProviderStore>,
    ) -> Self {
        Self {
            secrets,
            store,
            snapshot: ArcSwap::from_pointee(RegistrySnapshot::build(providers)),
        }
    }

    /// Reload dynamic providers from the store and swap in a new snapshot.
    ///
    /// Built-in providers are carried over from the current snapshot;
    /// previous dynamic providers are discarded wholesale, never patched.
    pub async fn refresh_dynamic_providers(&self) -> Result<()> {
        let configs = self.store.list_providers().await?;

        let mut providers: Vec<Arc<Provider>> = self
            .snapshot
            .load()
            .providers
            .iter()
            .filter(|p| p.as_custom().is_none())
            .cloned()
            .collect();

        for config in configs.into_iter().filter(|c| c.enabled) {
            let slug = custom_slug(config.id);
            let models = self
                .store
                .list_models(config.id)
                .await?
                .into_iter()
                .map(|m| ModelDescriptor {
                    slug: m.slug,
                    display_name: m.display_name,
                    tier: m.tier,
                    max_output_tokens: m.max_output_tokens,
                    cost_per_1000_tokens: m.cost_per_1000_tokens,
                    context_window: m.context_window,
                    provider_slug: slug.clone(),
                    provider_name: config.display_name.clone(),
                })
                .collect();

            match CustomProvider::new(config, models) {
                Ok(provider) => providers.push(Arc::new(Provider::Custom(provider))),
                Err(e) => {
                    tracing::warn!(provider = %slug, error = %e, "skipping dynamic provider");
                }
            }
        }

        let snapshot = RegistrySnapshot::build(providers);
        tracing::info!(
            providers = snapshot.providers.len(),
            models = snapshot.models.len(),
            "registry snapshot refreshed"
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    pub fn all_models(&self) -> Vec<ModelDescriptor> {
        self.snapshot.load().models.clone()
    }

    pub fn find_model(&self, slug: &str) -> Option<ModelDescriptor> {
        self.snapshot
            .load()
            .models
            .iter()
            .find(|m| m.slug == slug)
            .cloned()
    }

    /// Models whose provider currently has a credential
    pub fn available_models(&self) -> Vec<ModelDescriptor> {
        let snapshot = self.snapshot.load();
        snapshot
            .models
            .iter()
            .filter(|m| self.provider_is_credentialed(&snapshot, &m.provider_slug))
            .cloned()
            .collect()
    }

    pub fn is_available(&self, slug: &str) -> bool {
        let snapshot = self.snapshot.load();
        snapshot
            .models
            .iter()
            .find(|m| m.slug == slug)
            .is_some_and(|m| self.provider_is_credentialed(&snapshot, &m.provider_slug))
    }

    /// Cheapest available model of a tier; ties break on first-seen order
    pub fn best_model_for_tier(&self, tier: Tier) -> Option<ModelDescriptor> {
        let mut best: Option<ModelDescriptor> = None;
        for model in self.available_models() {
            if model.tier != tier {
                continue;
            }
            // Strict comparison keeps the earlier model on ties
            match &best {
                Some(current) if model.cost_per_1000_tokens >= current.cost_per_1000_tokens => {}
                _ => best = Some(model),
            }
        }
        best
    }

    /// Check a slug is known and its provider credentialed
    pub fn validate_selection(&self, slug: &str) -> Result<ModelDescriptor> {
        let snapshot = self.snapshot.load();
        let model = snapshot
            .models
            .iter()
            .find(|m| m.slug == slug)
            .ok_or_else(|| PipelineError::ModelNotFound {
                slug: slug.to_string(),
            })?;

        if !self.provider_is_credentialed(&snapshot, &model.provider_slug) {
            return Err(PipelineError::ModelUnavailable {
                slug: slug.to_string(),
                provider: model.provider_name.clone(),
            });
        }
        Ok(model.clone())
    }

    pub fn calculate_cost(&self, slug: &str, tokens: u32) -> f64 {
        let cost_per_1k = self
            .find_model(slug)
            .map(|m| m.cost_per_1000_tokens)
            .unwrap_or(0.0);
        cost_per_1k * f64::from(tokens) / 1000.0
    }

    pub fn model_tier(&self, slug: &str) -> Option<Tier> {
        self.find_model(slug).map(|m| m.tier)
    }

    pub fn models_by_tier(&self, tier: Tier) -> Vec<ModelDescriptor> {
        self.snapshot
            .load()
            .models
            .iter()
            .filter(|m| m.tier == tier)
            .cloned()
            .collect()
    }

    pub fn models_by_provider(&self, provider_slug: &str) -> Vec<ModelDescriptor> {
        self.snapshot
            .load()
            .models
            .iter()
            .filter(|m| m.provider_slug == provider_slug)
            .cloned()
            .collect()
    }

    /// Best available replacement after `failed_slug` failed: same tier
    /// first, then the given fallback tier. Never returns the failed slug.
    pub fn get_fallback_model(
        &self,
        failed_slug: &str,
        fallback_tier: Tier,
    ) -> Option<ModelDescriptor> {
        if let Some(tier) = self.model_tier(failed_slug) {
            if let Some(candidate) = self
                .available_models()
                .into_iter()
                .filter(|m| m.tier == tier && m.slug != failed_slug)
                .min_by(|a, b| {
                    a.cost_per_1000_tokens
                        .partial_cmp(&b.cost_per_1000_tokens)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            {
                return Some(candidate);
            }
        }

        self.best_model_for_tier(fallback_tier)
            .filter(|m| m.slug != failed_slug)
    }

    /// Provider handle for a model slug
    pub fn provider_for_model(&self, slug: &str) -> Option<Arc<Provider>> {
        let snapshot = self.snapshot.load();
        let provider_slug = snapshot
            .models
            .iter()
            .find(|m| m.slug == slug)
            .map(|m| m.provider_slug.clone())?;
        snapshot
            .providers
            .iter()
            .find(|p| p.slug() == provider_slug)
            .cloned()
    }

    /// Current provider set, in first-seen order
    pub fn providers(&self) -> Vec<Arc<Provider>> {
        self.snapshot.load().providers.clone()
    }

    pub fn provider_by_slug(&self, provider_slug: &str) -> Option<Arc<Provider>> {
        self.snapshot
            .load()
            .providers
            .iter()
            .find(|p| p.slug() == provider_slug)
            .cloned()
    }

    /// Pull the model listing from a dynamic provider's backend, persist the
    /// rows, and refresh the snapshot. Returns the number of imported models.
    pub async fn import_models_from_api(&self, provider_slug: &str) -> Result<usize> {
        let provider = self
            .provider_by_slug(provider_slug)
            .ok_or_else(|| PipelineError::Config(format!("Unknown provider: {provider_slug}")))?;
        let custom = provider.as_custom().ok_or_else(|| {
            PipelineError::Config(format!("Provider {provider_slug} is not a dynamic provider"))
        })?;

        let models = custom.discover_models().await?;
        let count = models.len();
        for model in models {
            self.store.save_model(model).await?;
        }

        self.refresh_dynamic_providers().await?;
        tracing::info!(provider = provider_slug, imported = count, "imported models");
        Ok(count)
    }

    fn provider_is_credentialed(&self, snapshot: &RegistrySnapshot, provider_slug: &str) -> bool {
        match snapshot.providers.iter().find(|p| p.slug() == provider_slug) {
            Some(provider) => match provider.as_custom() {
                Some(custom) => custom.has_credential(),
                None => self.secrets.get_secret(provider_slug).is_some(),
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AuthMode, DynamicModel, InMemoryProviderStore, InMemorySecretStore, ProviderConfig,
    };

    fn registry_with_secrets(slugs: &[&str]) -> ModelRegistry {
        let secrets = Arc::new(InMemorySecretStore::new());
        for slug in slugs {
            secrets.set(*slug, "test-key");
        }
        ModelRegistry::new(secrets, Arc::new(InMemoryProviderStore::new()))
    }

    #[test]
    fn catalog_union_deduplicates_by_slug() {
        let registry = registry_with_secrets(&[]);
        let models = registry.all_models();
        let mut slugs: Vec<&str> = models.iter().map(|m| m.slug.as_str()).collect();
        slugs.sort_unstable();
        let before = slugs.len();
        slugs.dedup();
        assert_eq!(before, slugs.len());
    }

    #[test]
    fn availability_tracks_secret_presence() {
        let registry = registry_with_secrets(&["anthropic"]);
        assert!(registry.is_available("claude-3-haiku"));
        assert!(!registry.is_available("gpt-4o"));
        assert!(registry
            .available_models()
            .iter()
            .all(|m| m.provider_slug == "anthropic"));
    }

    #[test]
    fn best_model_for_tier_is_cheapest_available() {
        let registry = registry_with_secrets(&["openai", "anthropic"]);
        let best = registry.best_model_for_tier(Tier::Standard).unwrap();
        // gpt-4o-mini at 0.00015 undercuts every other credentialed standard model
        assert_eq!(best.slug, "gpt-4o-mini");
    }

    #[test]
    fn best_model_for_tier_none_without_credentials() {
        let registry = registry_with_secrets(&[]);
        assert!(registry.best_model_for_tier(Tier::Premium).is_none());
    }

    #[test]
    fn validate_selection_distinguishes_missing_from_unavailable() {
        let registry = registry_with_secrets(&["openai"]);
        assert!(registry.validate_selection("gpt-4o").is_ok());
        assert!(matches!(
            registry.validate_selection("no-such-model"),
            Err(PipelineError::ModelNotFound { .. })
        ));
        assert!(matches!(
            registry.validate_selection("claude-3-haiku"),
            Err(PipelineError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn cost_scales_linearly_with_tokens() {
        let registry = registry_with_secrets(&[]);
        // gpt-4 at 0.03 per 1k tokens
        let cost = registry.calculate_cost("gpt-4", 2000);
        assert!((cost - 0.06).abs() < 1e-9);
        assert_eq!(registry.calculate_cost("no-such-model", 2000), 0.0);
    }

    #[test]
    fn fallback_model_never_repeats_the_failed_slug() {
        let registry = registry_with_secrets(&["openai", "anthropic"]);
        let fallback = registry.get_fallback_model("gpt-4o-mini", Tier::Cheap).unwrap();
        assert_ne!(fallback.slug, "gpt-4o-mini");
        assert_eq!(fallback.tier, Tier::Standard);
    }

    #[tokio::test]
    async fn refresh_picks_up_dynamic_providers() {
        let secrets = Arc::new(InMemorySecretStore::new());
        let store = Arc::new(InMemoryProviderStore::new());
        store.add_provider(ProviderConfig {
            id: 3,
            display_name: "Local Gateway".into(),
            base_url: "http://localhost:9999".into(),
            auth_mode: AuthMode::BearerApiKey,
            credential: "token".into(),
            extra_headers: String::new(),
            referer: None,
            title: None,
            enabled: true,
        });
        store.add_model(DynamicModel {
            provider_id: 3,
            slug: "local-llm".into(),
            display_name: "Local LLM".into(),
            tier: Tier::Cheap,
            max_output_tokens: 2048,
            cost_per_1000_tokens: 0.0,
            context_window: 8192,
            enabled: true,
        });

        let registry = ModelRegistry::new(secrets, store.clone());
        assert!(registry.find_model("local-llm").is_none());

        registry.refresh_dynamic_providers().await.unwrap();
        let model = registry.find_model("local-llm").unwrap();
        assert_eq!(model.provider_slug, "custom_3");
        assert!(registry.is_available("local-llm"));

        store.remove_provider(3);
        registry.refresh_dynamic_providers().await.unwrap();
        assert!(registry.find_model("local-llm").is_none());
    }

    #[test]
    fn custom_slug_helpers_round_trip() {
        assert_eq!(custom_slug(11), "custom_11");
        assert_eq!(custom_provider_id("custom_11"), Some(11));
    }
}
