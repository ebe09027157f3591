//! Google Gemini backend
//!
//! Auth rides in the query string rather than a header, so request URLs are
//! secrets here and every error path must run through redaction before the
//! message leaves the crate.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::config::SecretStore;
use crate::core::providers::{descriptor, shared, ChatProvider};
use crate::core::types::{
    Message, MessageRole, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier,
};
use crate::utils::{PipelineError, Result};

const NAME: &str = "Google Gemini";
const SLUG: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";

static CATALOG: Lazy<Vec<ModelDescriptor>> = Lazy::new(|| {
    let d = |slug, name, tier, max_tokens, cost, ctx| {
        descriptor(SLUG, NAME, slug, name, tier, max_tokens, cost, ctx)
    };
    vec![
        d("gemini-3", "Gemini 3 (Latest Flagship)", Tier::Premium, 8192, 0.008, 2_097_152),
        d("gemini-2.5-pro", "Gemini 2.5 Pro (High Intelligence)", Tier::Premium, 8192, 0.005, 2_097_152),
        d("gemini-2.0-pro", "Gemini 2.0 Pro", Tier::Premium, 8192, 0.005, 2_097_152),
        d("gemini-1.5-pro-002", "Gemini 1.5 Pro (002)", Tier::Premium, 8192, 0.0035, 2_097_152),
        d("gemini-1.5-pro-latest", "Gemini 1.5 Pro (Latest)", Tier::Premium, 8192, 0.0035, 1_048_576),
        d("gemini-1.5-pro", "Gemini 1.5 Pro", Tier::Premium, 8192, 0.0035, 1_048_576),
        d("gemini-2.0-flash-exp", "Gemini 2.0 Flash (Experimental)", Tier::Premium, 8192, 0.00015, 1_048_576),
        d("gemini-2.5-flash", "Gemini 2.5 Flash (Faster Model)", Tier::Standard, 8192, 0.0001, 1_048_576),
        d("gemini-1.5-flash-002", "Gemini 1.5 Flash (002)", Tier::Standard, 8192, 0.00015, 1_048_576),
        d("gemini-2.0-flash-8b", "Gemini 2.0 Flash 8B", Tier::Standard, 8192, 0.000075, 1_048_576),
        d("gemini-1.5-flash", "Gemini 1.5 Flash", Tier::Standard, 8192, 0.00015, 1_048_576),
        d("gemini-pro", "Gemini Pro", Tier::Standard, 2048, 0.0005, 32_768),
        d("gemini-pro-vision", "Gemini Pro Vision", Tier::Standard, 2048, 0.00025, 16_384),
        d("gemini-1.0-pro", "Gemini 1.0 Pro", Tier::Cheap, 2048, 0.0005, 32_768),
    ]
});

#[derive(Debug)]
pub struct GeminiProvider {
    http: reqwest::Client,
    secrets: Arc<dyn SecretStore>,
    base_url: String,
}

impl GeminiProvider {
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

/// Map the conversation into Gemini's contents array, assistant becoming
/// `model` and everything else `user`
fn format_contents(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    MessageRole::Assistant => "model",
                    _ => "user",
                };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect(),
    )
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn slug(&self) -> &str {
        SLUG
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers(&self, _credential: &str) -> Result<reqwest::header::HeaderMap> {
        // Credential travels in the query string, not a header
        Ok(shared::json_headers())
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
            "contents": format_contents(messages),
        });
        let mut generation_config = serde_json::Map::new();
        if let Some(temperature) = options.temperature {
            generation_config.insert("temperature".into(), json!(temperature));
        }
        if let Some(max_tokens) = options.max_tokens {
            generation_config.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if !generation_config.is_empty() {
            body["generationConfig"] = Value::Object(generation_config);
        }

        let url = format!(
            "{}/models/{model}:generateContent?key={credential}",
            self.base_url
        );
        let timeout = options.timeout.unwrap_or(shared::DEFAULT_TIMEOUT);
        shared::post_json(&self.http, &url, headers, &body, timeout).await
    }

    fn parse_response(&self, raw: &RawResult) -> ParsedCompletion {
        let Some(data) = raw.body.as_ref().filter(|_| raw.success) else {
            return shared::error_completion();
        };

        let candidate = data.get("candidates").and_then(|c| c.get(0));

        ParsedCompletion {
            content: candidate
                .and_then(|c| c.get("content"))
                .and_then(|c| c.get("parts"))
                .and_then(|p| p.get(0))
                .and_then(|p| p.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tokens_used: data
                .get("usageMetadata")
                .and_then(|u| u.get("totalTokenCount"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0) as u32,
            model: data
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            finish_reason: candidate
                .and_then(|c| c.get("finishReason"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
        }
    }

    fn error_message(&self, raw: &RawResult) -> String {
        shared::extract_error_message(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_role_maps_to_model() {
        let contents = format_contents(&[Message::user("q"), Message::assistant("a")]);
        let arr = contents.as_array().unwrap();
        assert_eq!(arr[0]["role"], "user");
        assert_eq!(arr[1]["role"], "model");
        assert_eq!(arr[1]["parts"][0]["text"], "a");
    }

    #[test]
    fn system_role_maps_to_user() {
        let contents = format_contents(&[Message::system("rules")]);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn parse_reads_candidate_shape() {
        let provider = GeminiProvider::new(Arc::new(crate::config::InMemorySecretStore::new()));
        let raw = RawResult::ok(
            200,
            json!({
                "candidates": [{
                    "content": {"parts": [{"text": "generated"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"totalTokenCount": 33}
            }),
        );
        let parsed = provider.parse_response(&raw);
        assert_eq!(parsed.content, "generated");
        assert_eq!(parsed.tokens_used, 33);
        assert_eq!(parsed.finish_reason, "STOP");
    }
}
