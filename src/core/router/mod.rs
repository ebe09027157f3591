//! Model selection across routing modes, with fallback and escalation
//!
//! `select_model` is a small state machine: a provider-specific pin wins
//! outright, then the configured routing mode picks a slug, then validation
//! either confirms it or hands off to fallback selection. Configuration is
//! re-read on every decision so a long-lived process tracks administrative
//! changes without restarting.

pub mod complexity;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{RoutingConfigSource, RoutingMode};
use crate::core::providers::Provider;
use crate::core::registry::ModelRegistry;
use crate::core::types::{Message, ModelDescriptor, RequestOptions, Tier};
use crate::utils::{PipelineError, Result};

pub use complexity::{complexity_to_tier, estimate_complexity, is_low_confidence, should_escalate};

/// How the selected model was arrived at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    ProviderSpecific,
    Fixed,
    Manual,
    Auto,
}

/// Why a fallback model replaced the original selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    SameTierAlternative,
    LowerTierFallback,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::SameTierAlternative => "same_tier_alternative",
            FallbackReason::LowerTierFallback => "lower_tier_fallback",
        }
    }
}

/// Outcome of a routing decision
#[derive(Debug, Clone)]
pub struct Selection {
    pub model: ModelDescriptor,
    pub provider: Arc<Provider>,
    pub mode: SelectionMode,
    pub complexity: Option<f64>,
    pub tier: Option<Tier>,
    pub fallback: Option<FallbackReason>,
}

/// Per-tier cost spread for [`RoutingStats`]
#[derive(Debug, Clone, Default)]
pub struct TierStats {
    pub count: usize,
    pub cheapest: Option<f64>,
    pub most_expensive: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RoutingStats {
    pub total_models: usize,
    pub available_models: usize,
    pub mode: RoutingMode,
    pub fallback_enabled: bool,
    pub tiers: HashMap<Tier, TierStats>,
}

#[derive(Debug)]
pub struct Router {
    registry: Arc<ModelRegistry>,
    config: Arc<dyn RoutingConfigSource>,
}

impl Router {
    pub fn new(registry: Arc<ModelRegistry>, config: Arc<dyn RoutingConfigSource>) -> Self {
        Self { registry, config }
    }

    pub fn fallback_enabled(&self) -> bool {
        self.config.load().fallback_enabled
    }

    /// Pick a model for a conversation.
    ///
    /// Precedence: provider pin, then the configured routing mode. A
    /// selection that fails validation is replaced via
    /// [`select_fallback`](Self::select_fallback) when fallback is enabled.
    pub fn select_model(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<Selection> {
        let config = self.config.load();

        if let Some(selection) = self.provider_specific(&config.provider_models, options) {
            return Ok(selection);
        }

        match config.mode {
            RoutingMode::Fixed => self.fixed_routing(&config),
            RoutingMode::Manual => self.manual_routing(&config, messages),
            RoutingMode::Auto => self.auto_routing(&config, messages),
        }
    }

    /// Provider pin: requires a configured model for that provider which
    /// validates; anything missing falls through to mode routing
    fn provider_specific(
        &self,
        provider_models: &HashMap<String, String>,
        options: &RequestOptions,
    ) -> Option<Selection> {
        let provider = options.preferred_provider.as_deref()?;
        let slug = provider_models.get(&provider.to_lowercase())?;
        if slug.is_empty() {
            return None;
        }
        let model = self.registry.validate_selection(slug).ok()?;
        let provider = self.registry.provider_for_model(slug)?;
        Some(Selection {
            model,
            provider,
            mode: SelectionMode::ProviderSpecific,
            complexity: None,
            tier: None,
            fallback: None,
        })
    }

    fn fixed_routing(&self, config: &crate::config::RoutingConfig) -> Result<Selection> {
        if config.fixed_model.is_empty() {
            // No pin configured, behave as auto with an empty conversation
            return self.auto_routing(config, &[]);
        }

        match self.finish(&config.fixed_model, SelectionMode::Fixed, None, None) {
            Ok(selection) => Ok(selection),
            Err(_) if config.fallback_enabled => self.select_fallback(&config.fixed_model),
            Err(e) => Err(e),
        }
    }

    fn manual_routing(
        &self,
        config: &crate::config::RoutingConfig,
        messages: &[Message],
    ) -> Result<Selection> {
        let complexity = estimate_complexity(messages);
        let tier = complexity_to_tier(complexity);

        let slug = config.tier_models.for_tier(tier);
        if slug.is_empty() {
            return self.auto_routing(config, messages);
        }

        match self.finish(slug, SelectionMode::Manual, Some(complexity), Some(tier)) {
            Ok(selection) => Ok(selection),
            Err(_) if config.fallback_enabled => self.select_fallback(slug),
            Err(e) => Err(e),
        }
    }

    fn auto_routing(
        &self,
        config: &crate::config::RoutingConfig,
        messages: &[Message],
    ) -> Result<Selection> {
        let complexity = estimate_complexity(messages);
        let tier = complexity_to_tier(complexity);

        let slug = match self.registry.best_model_for_tier(tier) {
            Some(model) => model.slug,
            None => config.tier_models.for_tier(tier).to_string(),
        };

        if slug.is_empty() {
            if config.fallback_enabled {
                return self.fallback_walk(None, &slug);
            }
            return Err(PipelineError::NoModelAvailable { tier });
        }

        match self.finish(&slug, SelectionMode::Auto, Some(complexity), Some(tier)) {
            Ok(selection) => Ok(selection),
            Err(_) if config.fallback_enabled => self.select_fallback(&slug),
            Err(e) => Err(e),
        }
    }

    fn finish(
        &self,
        slug: &str,
        mode: SelectionMode,
        complexity: Option<f64>,
        tier: Option<Tier>,
    ) -> Result<Selection> {
        let model = self.registry.validate_selection(slug)?;
        let provider = self
            .registry
            .provider_for_model(slug)
            .ok_or_else(|| PipelineError::ModelNotFound {
                slug: slug.to_string(),
            })?;
        Ok(Selection {
            model,
            provider,
            mode,
            complexity,
            tier,
            fallback: None,
        })
    }

    /// Replacement after `failed_slug` failed validation or execution: best
    /// other model in the same tier, then the best model of each tier below
    /// it. Never returns the failed slug.
    pub fn select_fallback(&self, failed_slug: &str) -> Result<Selection> {
        let failed_tier = self.registry.model_tier(failed_slug);

        if let Some(tier) = failed_tier {
            if let Some(candidate) = self.registry.best_model_for_tier(tier) {
                if candidate.slug != failed_slug {
                    if let Ok(mut selection) =
                        self.finish(&candidate.slug, SelectionMode::Auto, None, Some(tier))
                    {
                        tracing::warn!(
                            failed = failed_slug,
                            fallback = %candidate.slug,
                            "routing to same-tier alternative"
                        );
                        selection.fallback = Some(FallbackReason::SameTierAlternative);
                        return Ok(selection);
                    }
                }
            }
        }

        self.fallback_walk(failed_tier, failed_slug)
    }

    /// Walk tiers downward below `failed_tier` (all tiers when the failed
    /// tier is unknown), taking the first valid best-for-tier model
    fn fallback_walk(&self, failed_tier: Option<Tier>, failed_slug: &str) -> Result<Selection> {
        for tier in Tier::DESCENDING {
            if let Some(failed) = failed_tier {
                if tier >= failed {
                    continue;
                }
            }
            let Some(candidate) = self.registry.best_model_for_tier(tier) else {
                continue;
            };
            if candidate.slug == failed_slug {
                continue;
            }
            if let Ok(mut selection) =
                self.finish(&candidate.slug, SelectionMode::Auto, None, Some(tier))
            {
                tracing::warn!(
                    failed = failed_slug,
                    fallback = %candidate.slug,
                    tier = %tier,
                    "routing to lower tier"
                );
                selection.fallback = Some(FallbackReason::LowerTierFallback);
                return Ok(selection);
            }
        }

        Err(PipelineError::FallbackExhausted)
    }

    /// Upward re-route after a low-confidence response. Returns the first
    /// valid best-for-tier model above the current model's tier.
    pub fn escalate(&self, current_slug: &str) -> Option<Selection> {
        let mut tier = self.registry.model_tier(current_slug)?;
        while let Some(higher) = tier.next_higher() {
            tier = higher;
            let Some(candidate) = self.registry.best_model_for_tier(tier) else {
                continue;
            };
            if candidate.slug == current_slug {
                continue;
            }
            if let Ok(selection) =
                self.finish(&candidate.slug, SelectionMode::Auto, None, Some(tier))
            {
                tracing::warn!(
                    from = current_slug,
                    to = %candidate.slug,
                    tier = %tier,
                    "escalating after low-confidence response"
                );
                return Some(selection);
            }
        }
        None
    }

    /// Snapshot of catalog breadth and per-tier cost spread
    pub fn routing_stats(&self) -> RoutingStats {
        let config = self.config.load();
        let all = self.registry.all_models();
        let available = self.registry.available_models();

        let mut tiers = HashMap::new();
        for tier in Tier::ASCENDING {
            let costs: Vec<f64> = available
                .iter()
                .filter(|m| m.tier == tier)
                .map(|m| m.cost_per_1000_tokens)
                .collect();
            tiers.insert(
                tier,
                TierStats {
                    count: costs.len(),
                    cheapest: costs.iter().copied().reduce(f64::min),
                    most_expensive: costs.iter().copied().reduce(f64::max),
                },
            );
        }

        RoutingStats {
            total_models: all.len(),
            available_models: available.len(),
            mode: config.mode,
            fallback_enabled: config.fallback_enabled,
            tiers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        InMemoryProviderStore, InMemoryRoutingConfig, InMemorySecretStore, RoutingConfig,
    };

    fn setup(secret_slugs: &[&str], config: RoutingConfig) -> Router {
        let secrets = Arc::new(InMemorySecretStore::new());
        for slug in secret_slugs {
            secrets.set(*slug, "test-key");
        }
        let registry = Arc::new(ModelRegistry::new(
            secrets,
            Arc::new(InMemoryProviderStore::new()),
        ));
        Router::new(registry, Arc::new(InMemoryRoutingConfig::new(config)))
    }

    #[test]
    fn auto_routes_simple_prompts_to_cheap() {
        let router = setup(&["anthropic"], RoutingConfig::default());
        let selection = router
            .select_model(&[Message::user("hi")], &RequestOptions::default())
            .unwrap();
        assert_eq!(selection.tier, Some(Tier::Cheap));
        assert_eq!(selection.model.slug, "claude-3-haiku");
        assert_eq!(selection.mode, SelectionMode::Auto);
    }

    #[test]
    fn fixed_mode_pins_the_configured_model() {
        let mut config = RoutingConfig::default();
        config.mode = RoutingMode::Fixed;
        config.fixed_model = "gpt-4o".into();
        let router = setup(&["openai"], config);

        let selection = router
            .select_model(&[Message::user("anything at all")], &RequestOptions::default())
            .unwrap();
        assert_eq!(selection.model.slug, "gpt-4o");
        assert_eq!(selection.mode, SelectionMode::Fixed);
    }

    #[test]
    fn fixed_mode_without_pin_behaves_as_auto() {
        let mut config = RoutingConfig::default();
        config.mode = RoutingMode::Fixed;
        let router = setup(&["anthropic"], config);

        let selection = router
            .select_model(&[Message::user("hi")], &RequestOptions::default())
            .unwrap();
        // Empty conversation context scores 0.1, landing in cheap
        assert_eq!(selection.tier, Some(Tier::Cheap));
    }

    #[test]
    fn manual_mode_uses_tier_pins() {
        let mut config = RoutingConfig::default();
        config.mode = RoutingMode::Manual;
        config.tier_models.cheap = "gpt-3.5-turbo-16k".into();
        let router = setup(&["openai"], config);

        let selection = router
            .select_model(&[Message::user("hi")], &RequestOptions::default())
            .unwrap();
        assert_eq!(selection.model.slug, "gpt-3.5-turbo-16k");
        assert_eq!(selection.mode, SelectionMode::Manual);
    }

    #[test]
    fn provider_pin_takes_precedence_over_mode() {
        let mut config = RoutingConfig::default();
        config
            .provider_models
            .insert("anthropic".into(), "claude-4.5-sonnet".into());
        let router = setup(&["openai", "anthropic"], config);

        let options = RequestOptions {
            preferred_provider: Some("Anthropic".into()),
            ..RequestOptions::default()
        };
        let selection = router.select_model(&[Message::user("hi")], &options).unwrap();
        assert_eq!(selection.model.slug, "claude-4.5-sonnet");
        assert_eq!(selection.mode, SelectionMode::ProviderSpecific);
    }

    #[test]
    fn invalid_provider_pin_falls_through_to_mode() {
        let mut config = RoutingConfig::default();
        config
            .provider_models
            .insert("gemini".into(), "gemini-3".into());
        let router = setup(&["openai"], config);

        // Gemini is uncredentialed so its pin cannot validate
        let options = RequestOptions {
            preferred_provider: Some("gemini".into()),
            ..RequestOptions::default()
        };
        let selection = router.select_model(&[Message::user("hi")], &options).unwrap();
        assert_eq!(selection.mode, SelectionMode::Auto);
    }

    #[test]
    fn fallback_prefers_same_tier_then_walks_down() {
        let router = setup(&["openai"], RoutingConfig::default());

        // Another standard model exists, so same tier wins
        let selection = router.select_fallback("gpt-3.5-turbo").unwrap();
        assert_eq!(selection.fallback, Some(FallbackReason::SameTierAlternative));
        assert_ne!(selection.model.slug, "gpt-3.5-turbo");

        // Premium falls past standard since gpt-4o-mini is cheapest there
        let selection = router.select_fallback("gpt-4o").unwrap();
        assert_ne!(selection.model.slug, "gpt-4o");
    }

    #[test]
    fn fallback_never_returns_failed_slug() {
        let router = setup(&["openai"], RoutingConfig::default());
        for slug in ["gpt-4o", "gpt-4o-mini", "gpt-3.5-turbo-16k"] {
            if let Ok(selection) = router.select_fallback(slug) {
                assert_ne!(selection.model.slug, slug);
            }
        }
    }

    #[test]
    fn fallback_exhaustion_is_a_typed_error() {
        let router = setup(&[], RoutingConfig::default());
        assert!(matches!(
            router.select_fallback("gpt-4o"),
            Err(PipelineError::FallbackExhausted)
        ));
    }

    #[test]
    fn escalation_walks_upward() {
        let router = setup(&["openai"], RoutingConfig::default());
        let selection = router.escalate("gpt-3.5-turbo-16k").unwrap();
        assert_eq!(selection.tier, Some(Tier::Standard));

        // Nothing above premium
        assert!(router.escalate("gpt-4o").is_none());
    }

    #[test]
    fn disabled_fallback_propagates_validation_errors() {
        let mut config = RoutingConfig::default();
        config.mode = RoutingMode::Fixed;
        config.fixed_model = "claude-3-haiku".into();
        config.fallback_enabled = false;
        let router = setup(&["openai"], config);

        assert!(matches!(
            router.select_model(&[], &RequestOptions::default()),
            Err(PipelineError::ModelUnavailable { .. })
        ));
    }

    #[test]
    fn stats_report_cost_spread_per_tier() {
        let router = setup(&["openai"], RoutingConfig::default());
        let stats = router.routing_stats();
        assert!(stats.total_models > stats.available_models);
        let standard = &stats.tiers[&Tier::Standard];
        assert_eq!(standard.count, 2);
        assert_eq!(standard.cheapest, Some(0.00015));
        assert_eq!(standard.most_expensive, Some(0.0005));
    }
}
