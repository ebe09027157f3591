//! OpenAI chat completions backend

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;

use crate::config::SecretStore;
use crate::core::providers::{descriptor, shared, ChatProvider};
use crate::core::types::{Message, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier};
use crate::utils::{PipelineError, Result};

const NAME: &str = "OpenAI";
const SLUG: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

static CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    let d = |slug, name, tier, max_tokens, cost, ctx| {
        descriptor(SLUG, NAME, slug, name, tier, max_tokens, cost, ctx)
    };
    vec![
        d("o3", "o3 (Reasoning)", Tier::Premium, 8192, 0.02, 200_000),
        d("o3-mini", "o3-mini (Reasoning)", Tier::Premium, 8192, 0.006, 200_000),
        d("gpt-4o", "GPT-4o (Multimodal)", Tier::Premium, 4096, 0.005, 128_000),
        d("gpt-4-turbo", "GPT-4 Turbo", Tier::Premium, 4096, 0.01, 128_000),
        d("gpt-4", "GPT-4", Tier::Premium, 4096, 0.03, 8192),
        d("gpt-5.2", "GPT-5.2", Tier::Premium, 4096, 0.015, 128_000),
        d("gpt-4o-mini", "GPT-4o Mini", Tier::Standard, 16384, 0.00015, 128_000),
        d("gpt-3.5-turbo", "GPT-3.5 Turbo", Tier::Standard, 4096, 0.0005, 16_385),
        d("gpt-3.5-turbo-16k", "GPT-3.5 Turbo 16K", Tier::Cheap, 16384, 0.003, 16_385),
    ]
});

#[derive(Debug)]
pub struct OpenAiProvider {
    http: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            http: shared::http_client(),
            secrets,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point requests at a different base URL, used against mock servers
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
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
