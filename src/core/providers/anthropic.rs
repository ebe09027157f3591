//! Anthropic messages backend
//!
//! Differs from the OpenAI-compatible families in three ways: auth is an
//! `x-api-key` header plus a pinned `anthropic-version`, `max_tokens` is
//! mandatory on every request, and system messages are folded into the next
//! user message as a plain-text prefix.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{json, Value};

use crate::config::SecretStore;
use crate::core::providers::{descriptor, shared, ChatProvider};
use crate::core::types::{
    Message, MessageRole, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier,
};
use crate::utils::{PipelineError, Result};

const NAME: &str = "Anthropic";
const SLUG: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const FALLBACK_MAX_TOKENS: u32 = 4096;

static CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    let d = |slug, name, tier, max_tokens, cost, ctx| {
        descriptor(SLUG, NAME, slug, name, tier, max_tokens, cost, ctx)
    };
    vec![
        d("claude-4.5-opus", "Claude 4.5 Opus (Latest Top-Tier)", Tier::Premium, 8192, 0.025, 200_000),
        d("claude-4-sonnet", "Claude 4 Sonnet (Creative Writing & Analysis)", Tier::Premium, 8192, 0.012, 200_000),
        d("claude-3.5-opus", "Claude 3.5 Opus (Coders)", Tier::Premium, 8192, 0.008, 200_000),
        d("claude-3.7-sonnet", "Claude 3.7 Sonnet", Tier::Premium, 8192, 0.005, 200_000),
        d("claude-4.5-sonnet", "Claude 4.5 Sonnet", Tier::Premium, 8192, 0.015, 200_000),
        d("claude-4.5-haiku", "Claude 4.5 Haiku", Tier::Premium, 8192, 0.001, 200_000),
        d("claude-3-opus", "Claude 3 Opus", Tier::Premium, 4096, 0.015, 200_000),
        d("claude-3.5-sonnet", "Claude 3.5 Sonnet", Tier::Standard, 4096, 0.003, 200_000),
        d("claude-3-sonnet", "Claude 3 Sonnet", Tier::Standard, 4096, 0.003, 200_000),
        d("claude-3-haiku", "Claude 3 Haiku", Tier::Cheap, 4096, 0.00025, 200_000),
    ]
});

#[derive(Debug)]
pub struct AnthropicProvider {
    http: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    base_url: String,
}

impl AnthropicProvider {
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

    fn default_max_tokens(&self, model: &str) -> u32 {
        CATALOG
            .iter()
            .find(|m| m.slug == model)
            .map(|m| m.max_output_tokens)
            .unwrap_or(FALLBACK_MAX_TOKENS)
    }
}

/// Fold a conversation into Anthropic's user/assistant-only message array.
///
/// A pending system message is prepended to the next user message; a
/// trailing system message with no following user turn is dropped.
fn format_messages(messages: &[Message]) -> Value {
    let mut formatted = Vec::new();
    let mut pending_system: Option<&str> = None;

    for message in messages {
        match message.role {
            MessageRole::System => pending_system = Some(&message.content),
            MessageRole::Assistant => {
                formatted.push(json!({"role": "assistant", "content": message.content}));
            }
            MessageRole::User => {
                let content = match pending_system.take() {
                    Some(system) => format!("{system}\n\n{}", message.content),
                    None => message.content.clone(),
                };
                formatted.push(json!({"role": "user", "content": content}));
            }
        }
    }

    Value::Array(formatted)
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
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
        let key = HeaderValue::from_str(credential)
            .map_err(|_| PipelineError::Config("Credential is not a valid header value".into()))?;
        headers.insert("x-api-key", key);
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
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
            "max_tokens": options.max_tokens.unwrap_or_else(|| self.default_max_tokens(model)),
            "messages": format_messages(messages),
        });
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }

        let url = format!("{}/messages", self.base_url);
        let timeout = options.timeout.unwrap_or(shared::DEFAULT_TIMEOUT);
        shared::post_json(&self.http, &url, headers, &body, timeout).await
    }

    fn parse_response(&self, raw: &RawResult) -> ParsedCompletion {
        let Some(data) = raw.body.as_ref().filter(|_| raw.success) else {
            return shared::error_completion();
        };

        let usage = data.get("usage");
        let token_field = |field: &str| {
            usage
                .and_then(|u| u.get(field))
                .and_then(|v| v.as_u64())
                .unwrap_or(0)
        };

        ParsedCompletion {
            content: data
                .get("content")
                .and_then(|c| c.get(0))
                .and_then(|b| b.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tokens_used: (token_field("input_tokens") + token_field("output_tokens")) as u32,
            model: data
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            finish_reason: data
                .get("stop_reason")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    fn error_message(&self, raw: &RawResult) -> String {
        shared::extract_error_message(raw)
    }
}
