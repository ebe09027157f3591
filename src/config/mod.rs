//! Configuration models and external collaborator seams
//!
//! The pipeline owns no persistence. Routing settings, provider credentials,
//! dynamically configured providers, and usage logging all live behind the
//! traits defined here; in-memory implementations are provided for embedding
//! and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::types::{Tier, UsageRecord};
use crate::utils::Result;

/// How a model is chosen for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// Complexity scoring picks a tier, cheapest available model wins
    Auto,
    /// One pinned model for every request
    Fixed,
    /// Complexity scoring picks a tier, operator pins the model per tier
    Manual,
}

/// Per-tier pinned model slugs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TierModels {
    pub cheap: String,
    pub standard: String,
    pub premium: String,
}

impl TierModels {
    pub fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Cheap => &self.cheap,
            Tier::Standard => &self.standard,
            Tier::Premium => &self.premium,
        }
    }
}

/// Routing settings, re-read on every routing decision.
///
/// A long-lived process may have these changed underneath it by an
/// administrative surface, so the router never caches a copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    pub fallback_enabled: bool,
    /// Model slug used in [`RoutingMode::Fixed`]; empty falls through to auto
    pub fixed_model: String,
    /// Manual-mode tier pins, also the auto-mode per-tier override
    pub tier_models: TierModels,
    /// provider slug -> preferred model slug, consulted for
    /// `preferred_provider` requests
    pub provider_models: HashMap<String, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Auto,
            fallback_enabled: true,
            fixed_model: String::new(),
            tier_models: TierModels::default(),
            provider_models: HashMap::new(),
        }
    }
}

/// Source of the current routing configuration
pub trait RoutingConfigSource: Send + Sync + std::fmt::Debug {
    fn load(&self) -> RoutingConfig;
}

/// In-memory routing configuration with atomic runtime updates
#[derive(Debug, Default)]
pub struct InMemoryRoutingConfig {
    inner: ArcSwap<RoutingConfig>,
}

impl InMemoryRoutingConfig {
    pub fn new(config: RoutingConfig) -> Self {
        Self {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Replace the whole configuration atomically
    pub fn update(&self, config: RoutingConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl RoutingConfigSource for InMemoryRoutingConfig {
    fn load(&self) -> RoutingConfig {
        RoutingConfig::clone(&self.inner.load())
    }
}

/// Credential accessor for providers.
///
/// Returned values are opaque secrets: they must never be logged, and every
/// error path redacts them before a message leaves the crate.
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Secret for a provider slug, `None` when unset or empty
    fn get_secret(&self, provider_slug: &str) -> Option<String>;
}

/// Simple map-backed secret store
#[derive(Debug, Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<HashMap<String, String>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider_slug: impl Into<String>, secret: impl Into<String>) {
        self.secrets.write().insert(provider_slug.into(), secret.into());
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret(&self, provider_slug: &str) -> Option<String> {
        self.secrets
            .read()
            .get(provider_slug)
            .filter(|s| !s.is_empty())
            .cloned()
    }
}

/// Authentication convention for a dynamically configured provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// `Authorization: Bearer <credential>`
    BearerApiKey,
    /// `X-API-Key: <credential>`
    CustomHeader,
}

/// Operator-supplied configuration for a dynamic provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Store-assigned numeric id; the provider slug is derived as
    /// `custom_<id>`
    pub id: i64,
    pub display_name: String,
    pub base_url: String,
    pub auth_mode: AuthMode,
    /// Opaque secret; empty means uncredentialed
    pub credential: String,
    /// Free-form extra headers, one `Header: value` per line
    pub extra_headers: String,
    /// Optional referer/title pair forwarded to OpenRouter-style backends
    pub referer: Option<String>,
    pub title: Option<String>,
    pub enabled: bool,
}

/// Catalog row for a dynamic provider's model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicModel {
    pub provider_id: i64,
    pub slug: String,
    pub display_name: String,
    pub tier: Tier,
    pub max_output_tokens: u32,
    pub cost_per_1000_tokens: f64,
    pub context_window: u32,
    pub enabled: bool,
}

/// External store of dynamic provider configuration.
///
/// The registry consumes a read-all view when (re)building its snapshot and
/// writes imported models back through `save_model`.
#[async_trait]
pub trait ProviderStore: Send + Sync + std::fmt::Debug {
    async fn list_providers(&self) -> Result<Vec<ProviderConfig>>;
    async fn list_models(&self, provider_id: i64) -> Result<Vec<DynamicModel>>;
    async fn save_model(&self, model: DynamicModel) -> Result<()>;
}

/// In-memory provider store
#[derive(Debug, Default)]
pub struct InMemoryProviderStore {
    providers: RwLock<Vec<ProviderConfig>>,
    models: RwLock<Vec<DynamicModel>>,
}

impl InMemoryProviderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_provider(&self, config: ProviderConfig) {
        self.providers.write().push(config);
    }

    pub fn remove_provider(&self, id: i64) {
        self.providers.write().retain(|p| p.id != id);
        self.models.write().retain(|m| m.provider_id != id);
    }

    pub fn add_model(&self, model: DynamicModel) {
        self.models.write().push(model);
    }
}

#[async_trait]
impl ProviderStore for InMemoryProviderStore {
    async fn list_providers(&self) -> Result<Vec<ProviderConfig>> {
        Ok(self.providers.read().clone())
    }

    async fn list_models(&self, provider_id: i64) -> Result<Vec<DynamicModel>> {
        Ok(self
            .models
            .read()
            .iter()
            .filter(|m| m.provider_id == provider_id && m.enabled)
            .cloned()
            .collect())
    }

    async fn save_model(&self, model: DynamicModel) -> Result<()> {
        let mut models = self.models.write();
        if let Some(existing) = models
            .iter_mut()
            .find(|m| m.provider_id == model.provider_id && m.slug == model.slug)
        {
            *existing = model;
        } else {
            models.push(model);
        }
        Ok(())
    }
}

/// Sink for per-call usage records.
///
/// Write failures are logged and swallowed by the caller; a broken sink must
/// never fail a generation call.
#[async_trait]
pub trait UsageSink: Send + Sync + std::fmt::Debug {
    async fn record(&self, record: &UsageRecord) -> Result<()>;
}

/// Usage sink that drops every record
#[derive(Debug, Default)]
pub struct NullUsageSink;

#[async_trait]
impl UsageSink for NullUsageSink {
    async fn record(&self, _record: &UsageRecord) -> Result<()> {
        Ok(())
    }
}

/// Usage sink that keeps records in memory, mainly for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryUsageSink {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.read().clone()
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn record(&self, record: &UsageRecord) -> Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }
}
