//! Shared fixtures for integration tests

use std::sync::Arc;
use std::time::Duration;

use draftgate::config::{
    InMemoryProviderStore, InMemoryRoutingConfig, InMemorySecretStore, InMemoryUsageSink,
    RoutingConfig,
};
use draftgate::core::providers::{AnthropicProvider, OpenAiProvider, Provider};
use draftgate::{GenerationClient, ModelRegistry, Router, SlidingWindowLimiter};

pub struct Pipeline {
    pub client: GenerationClient,
    pub registry: Arc<ModelRegistry>,
    pub router: Arc<Router>,
    pub usage: Arc<InMemoryUsageSink>,
    pub secrets: Arc<InMemorySecretStore>,
}

/// Pipeline with the OpenAI provider rebased onto a mock server
pub fn openai_pipeline(mock_uri: &str, config: RoutingConfig) -> Pipeline {
    let secrets = Arc::new(InMemorySecretStore::new());
    secrets.set("openai", "sk-test");

    let providers = vec![Arc::new(Provider::OpenAi(
        OpenAiProvider::new(secrets.clone()).with_base_url(mock_uri),
    ))];
    build(providers, secrets, config)
}

/// Pipeline with OpenAI and Anthropic rebased onto two mock servers
pub fn dual_pipeline(openai_uri: &str, anthropic_uri: &str, config: RoutingConfig) -> Pipeline {
    let secrets = Arc::new(InMemorySecretStore::new());
    secrets.set("openai", "sk-test");
    secrets.set("anthropic", "sk-ant-test");

    let providers = vec![
        Arc::new(Provider::OpenAi(
            OpenAiProvider::new(secrets.clone()).with_base_url(openai_uri),
        )),
        Arc::new(Provider::Anthropic(
            AnthropicProvider::new(secrets.clone()).with_base_url(anthropic_uri),
        )),
    ];
    build(providers, secrets, config)
}

fn build(
    providers: Vec<Arc<Provider>>,
    secrets: Arc<InMemorySecretStore>,
    config: RoutingConfig,
) -> Pipeline {
    let store = Arc::new(InMemoryProviderStore::new());
    let registry = Arc::new(ModelRegistry::from_providers(
        providers,
        secrets.clone(),
        store,
    ));
    let router = Arc::new(Router::new(
        registry.clone(),
        Arc::new(InMemoryRoutingConfig::new(config)),
    ));
    let limiter = Arc::new(SlidingWindowLimiter::new(1000));
    let usage = Arc::new(InMemoryUsageSink::new());

    let client = GenerationClient::new(
        router.clone(),
        registry.clone(),
        limiter,
        usage.clone(),
        secrets.clone(),
    )
    .with_retry_policy(2, Duration::from_millis(10));

    Pipeline {
        client,
        registry,
        router,
        usage,
        secrets,
    }
}

/// OpenAI-shaped completion body
pub fn openai_completion(model: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"total_tokens": 42}
    })
}

/// Anthropic-shaped completion body
pub fn anthropic_completion(model: &str, content: &str) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "content": [{"type": "text", "text": content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 30}
    })
}
