//! LLM backend implementations behind a single capability set
//!
//! Each backend family is a flat, independent implementation of
//! [`ChatProvider`]; the [`Provider`] enum gives static dispatch over the
//! closed set of families plus the dynamically configured variant.

pub mod anthropic;
pub mod custom;
pub mod gemini;
pub mod openai;
pub mod openrouter;
pub mod shared;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::core::types::{Message, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier};
use crate::utils::Result;

pub use anthropic::AnthropicProvider;
pub use custom::CustomProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use openrouter::OpenRouterProvider;

/// Capability set every backend family implements.
///
/// One implementation per wire format (OpenAI-compatible, Anthropic-style,
/// Gemini-style) and one generic implementation for operator-configured
/// backends.
#[async_trait]
pub trait ChatProvider: Send + Sync + std::fmt::Debug {
    /// Human-readable provider name
    fn name(&self) -> &str;

    /// Stable provider slug, unique across the registry
    fn slug(&self) -> &str;

    /// Base URL requests are issued against
    fn base_url(&self) -> &str;

    /// Headers for a request, encoding this family's auth convention
    fn build_headers(&self, credential: &str) -> Result<HeaderMap>;

    /// Models this provider offers, with routing metadata
    fn catalog(&self) -> Vec<ModelDescriptor>;

    /// Perform one HTTP completion call
    async fn execute(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> RawResult;

    /// Extract the completion from a successful raw result
    fn parse_response(&self, raw: &RawResult) -> ParsedCompletion;

    /// Human-readable message for a failed raw result
    fn error_message(&self, raw: &RawResult) -> String;
}

/// Dispatch a [`ChatProvider`] method across all enum variants
macro_rules! dispatch_provider {
    ($self:expr, $method:ident $(, $arg:expr)*) => {
        match $self {
            Provider::OpenAi(p) => p.$method($($arg),*),
            Provider::OpenRouter(p) => p.$method($($arg),*),
            Provider::Anthropic(p) => p.$method($($arg),*),
            Provider::Gemini(p) => p.$method($($arg),*),
            Provider::Custom(p) => p.$method($($arg),*),
        }
    };
}

/// Unified provider enum over the built-in families and dynamic backends
#[derive(Debug)]
pub enum Provider {
    OpenAi(OpenAiProvider),
    OpenRouter(OpenRouterProvider),
    Anthropic(AnthropicProvider),
    Gemini(GeminiProvider),
    Custom(CustomProvider),
}

impl Provider {
    pub fn name(&self) -> &str {
        dispatch_provider!(self, name)
    }

    pub fn slug(&self) -> &str {
        dispatch_provider!(self, slug)
    }

    pub fn base_url(&self) -> &str {
        dispatch_provider!(self, base_url)
    }

    pub fn build_headers(&self, credential: &str) -> Result<HeaderMap> {
        dispatch_provider!(self, build_headers, credential)
    }

    pub fn catalog(&self) -> Vec<ModelDescriptor> {
        dispatch_provider!(self, catalog)
    }

    pub async fn execute(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> RawResult {
        match self {
            Provider::OpenAi(p) => p.execute(model, messages, options).await,
            Provider::OpenRouter(p) => p.execute(model, messages, options).await,
            Provider::Anthropic(p) => p.execute(model, messages, options).await,
            Provider::Gemini(p) => p.execute(model, messages, options).await,
            Provider::Custom(p) => p.execute(model, messages, options).await,
        }
    }

    pub fn parse_response(&self, raw: &RawResult) -> ParsedCompletion {
        dispatch_provider!(self, parse_response, raw)
    }

    pub fn error_message(&self, raw: &RawResult) -> String {
        dispatch_provider!(self, error_message, raw)
    }

    /// Access the dynamic variant's extra capabilities, when this is one
    pub fn as_custom(&self) -> Option<&CustomProvider> {
        match self {
            Provider::Custom(p) => Some(p),
            _ => None,
        }
    }
}

/// Catalog entry constructor shared by the built-in providers
pub(crate) fn descriptor(
    provider_slug: &str,
    provider_name: &str,
    slug: &str,
    display_name: &str,
    tier: Tier,
    max_output_tokens: u32,
    cost_per_1000_tokens: f64,
    context_window: u32,
) -> ModelDescriptor {
    ModelDescriptor {
        slug: slug.to_string(),
        display_name: display_name.to_string(),
        tier,
        max_output_tokens,
        cost_per_1000_tokens,
        context_window,
        provider_slug: provider_slug.to_string(),
        provider_name: provider_name.to_string(),
    }
}
