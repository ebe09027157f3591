//! OpenRouter backend, OpenAI-compatible with attribution headers

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;

use crate::config::SecretStore;
use crate::core::providers::{descriptor, shared, ChatProvider};
use crate::core::types::{Message, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier};
use crate::utils::{PipelineError, Result};

const NAME: &str = "OpenRouter";
const SLUG: &str = "openrouter";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

static CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    let d = |slug, name, tier, max_tokens, cost, ctx| {
        descriptor(SLUG, NAME, slug, name, tier, max_tokens, cost, ctx)
    };
    vec![
        d("openai/gpt-5.2", "GPT-5.2 (Frontier)", Tier::Premium, 16384, 0.03, 512_000),
        d("openai/gpt-5.1", "GPT-5.1", Tier::Premium, 16384, 0.02, 512_000),
        d("anthropic/claude-4.5-opus", "Claude 4.5 Opus (Latest Top-Tier)", Tier::Premium, 8192, 0.025, 200_000),
        d("anthropic/claude-4-sonnet", "Claude 4 Sonnet (Creative Writing & Analysis)", Tier::Premium, 8192, 0.012, 200_000),
        d("anthropic/claude-3.5-opus", "Claude 3.5 Opus (Coders)", Tier::Premium, 8192, 0.008, 200_000),
        d("anthropic/claude-3.7-sonnet", "Claude 3.7 Sonnet", Tier::Premium, 8192, 0.005, 200_000),
        d("anthropic/claude-4.5-sonnet", "Claude 4.5 Sonnet", Tier::Premium, 8192, 0.015, 200_000),
        d("anthropic/claude-4.5-haiku", "Claude 4.5 Haiku", Tier::Premium, 8192, 0.001, 200_000),
        d("google/gemini-3", "Gemini 3 (Latest Flagship)", Tier::Premium, 8192, 0.008, 2_097_152),
        d("google/gemini-2.5-pro", "Gemini 2.5 Pro (High Intelligence)", Tier::Premium, 8192, 0.005, 2_097_152),
        d("openai/o3", "o3 (Reasoning)", Tier::Premium, 8192, 0.02, 200_000),
        d("openai/o3-mini", "o3-mini (Reasoning)", Tier::Premium, 8192, 0.006, 200_000),
        d("openai/gpt-4.5-turbo", "GPT-4.5 Turbo", Tier::Premium, 8192, 0.0075, 256_000),
        d("openai/gpt-4o", "GPT-4o (Multimodal)", Tier::Premium, 4096, 0.005, 128_000),
        d("google/gemini-2.0-pro", "Gemini 2.0 Pro", Tier::Premium, 8192, 0.005, 2_097_152),
        d("google/gemini-2.0-flash-exp", "Gemini 2.0 Flash", Tier::Premium, 8192, 0.00015, 1_048_576),
        d("openai/gpt-4o-mini", "GPT-4o Mini", Tier::Standard, 16384, 0.00015, 128_000),
        d("anthropic/claude-3.5-sonnet", "Claude 3.5 Sonnet", Tier::Standard, 4096, 0.003, 200_000),
        d("google/gemini-2.5-flash", "Gemini 2.5 Flash (Faster Model)", Tier::Standard, 8192, 0.0001, 1_048_576),
        d("google/gemini-1.5-pro-002", "Gemini 1.5 Pro (002)", Tier::Standard, 8192, 0.0035, 2_097_152),
        d("meta-llama/llama-3.3-70b-instruct", "Llama 3.3 70B Instruct", Tier::Standard, 8192, 0.00027, 131_072),
        d("google/gemini-1.5-flash-002", "Gemini 1.5 Flash (002)", Tier::Cheap, 8192, 0.000075, 1_048_576),
        d("google/gemini-1.5-flash", "Gemini 1.5 Flash", Tier::Cheap, 8192, 0.000075, 1_000_000),
        d("meta-llama/llama-3.2-3b-instruct", "Llama 3.2 3B Instruct", Tier::Cheap, 131_072, 0.00015, 131_072),
        d("microsoft/phi-3.5-mini-128k-instruct", "Phi-3.5 Mini 128K", Tier::Cheap, 128_000, 0.00015, 128_000),
        d("deepseek/deepseek-reasoner", "DeepSeek Reasoner", Tier::Cheap, 8192, 0.00014, 163_840),
        d("qwen/qwen-2.5-72b-instruct", "Qwen 2.5 72B Instruct", Tier::Cheap, 8192, 0.00027, 131_072),
    ]
});

#[derive(Debug)]
pub struct OpenRouterProvider {
    http: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    base_url: String,
    /// HTTP-Referer attribution header, when the embedder has one
    referer: Option<String>,
    /// X-Title attribution header
    title: Option<String>,
}

impl OpenRouterProvider {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            http: shared::http_client(),
            secrets,
            base_url: DEFAULT_BASE_URL.to_string(),
            referer: None,
            title: None,
        }
    }

    /// Point requests at a different base URL, used against mock servers
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the attribution headers OpenRouter uses for ranking
    pub fn with_attribution(
        mut self,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        self.referer = Some(referer.into());
        self.title = Some(title.into());
        self
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers(&self, credential: &str) -> Result<HeaderMap> {
        let mut headers = shared::json_headers();
        let bearer = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|_| PipelineError::Config("Credential is not a valid header value".into()))?;
        headers.insert(AUTHORIZATION, bearer);
        if let Some(referer) = &self.referer {
            shared::insert_header(&mut headers, "HTTP-Referer", referer)?;
        }
        if let Some(title) = &self.title {
            shared::insert_header(&mut headers, "X-Title", title)?;
        }
        Ok(headers)
    }

    fn catalog(&self) -> Vec<ModelDescriptor> {
        CATALOG.clone()
    }

    async fn execute(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> RawResult {
        let Some(credential) = self.secrets.get_secret(SLUG) else {
            return RawResult::failed(PipelineError::MissingCredential(NAME.into()).to_string());
        };
        let headers = match self.build_headers(&credential) {
            Ok(headers) => headers,
            Err(e) => return RawResult::failed(e.to_string()),
        };

        let mut body = json!({
            "model": model,
            "messages": shared::openai_messages(messages),
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        let url = format!("{}/chat/completions", self.base_url);
        let timeout = options.timeout.unwrap_or(shared::DEFAULT_TIMEOUT);
        shared::post_json(&self.http, &url, headers, &body, timeout).await
    }

    fn parse_response(&self, raw: &RawResult) -> ParsedCompletion {
        shared::parse_openai_response(raw)
    }

    fn error_message(&self, raw: &RawResult) -> String {
        shared::extract_error_message(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InMemorySecretStore;

    #[test]
    fn attribution_headers_are_optional() {
        let secrets = Arc::new(InMemorySecretStore::new());
        let plain = OpenRouterProvider::new(secrets.clone());
        let headers = plain.build_headers("sk-or-test").unwrap();
        assert!(!headers.contains_key("HTTP-Referer"));

        let attributed = OpenRouterProvider::new(secrets)
            .with_attribution("https://example.com", "Example Site");
        let headers = attributed.build_headers("sk-or-test").unwrap();
        assert_eq!(headers["HTTP-Referer"], "https://example.com");
        assert_eq!(headers["X-Title"], "Example Site");
    }

    #[test]
    fn catalog_slugs_are_namespaced() {
        let provider = OpenRouterProvider::new(Arc::new(InMemorySecretStore::new()));
        assert!(provider.catalog().iter().all(|m| m.slug.contains('/')));
    }
}
