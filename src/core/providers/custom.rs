//! Operator-configured OpenAI-compatible backends
//!
//! Self-hosted gateways disagree on where the chat endpoint lives, so a
//! request probes a fixed list of paths in order and the first one that
//! answers wins. Model catalogs come from the provider store instead of a
//! built-in table, and can be seeded from the backend's own `/v1/models`
//! listing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use url::Url;

use crate::config::{AuthMode, DynamicModel, ProviderConfig};
use crate::core::providers::{shared, ChatProvider};
use crate::core::types::{
    Message, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier,
};
use crate::utils::{PipelineError, Result};

/// Chat endpoint paths probed in order
const CHAT_ENDPOINTS: [&str; 4] = [
    "/chat/completions",
    "/v1/chat/completions",
    "/api/chat/completions",
    "/v1/completions",
];

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Defaults assigned to discovered models until an operator reclassifies them
const DISCOVERED_TIER: Tier = Tier::Standard;
const DISCOVERED_MAX_TOKENS: u32 = 4096;
const DISCOVERED_CONTEXT_WINDOW: u32 = 8192;

#[derive(Debug)]
pub struct CustomProvider {
    http: reqwest::Client,
    config: ProviderConfig,
    slug: String,
    base_url: String,
    models: Vec<ModelDescriptor>,
}

impl CustomProvider {
    /// Build a provider from operator configuration and its stored catalog.
    ///
    /// `models` carry the `custom_<id>` provider slug assigned by the
    /// registry; the base URL must parse as an absolute http(s) URL.
    pub fn new(config: ProviderConfig, models: Vec<ModelDescriptor>) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&base_url)
            .map_err(|e| PipelineError::Config(format!("Invalid provider base URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::Config(format!(
                "Unsupported provider URL scheme: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            http: shared::http_client(),
            slug: slug_for(config.id),
            base_url,
            config,
            models,
        })
    }

    pub fn provider_id(&self) -> i64 {
        self.config.id
    }

    pub fn has_credential(&self) -> bool {
        !self.config.credential.is_empty()
    }

    /// Raw credential, exposed only so the executor can redact it from
    /// outbound error messages
    pub(crate) fn credential(&self) -> &str {
        &self.config.credential
    }

    /// Issue a one-token probe request against the first catalog model
    pub async fn test_connection(&self) -> RawResult {
        let model = self
            .models
            .first()
            .map(|m| m.slug.clone())
            .unwrap_or_else(|| "gpt-3.5-turbo".to_string());

        let options = RequestOptions {
            max_tokens: Some(10),
            timeout: Some(Duration::from_secs(30)),
            ..RequestOptions::default()
        };
        self.execute(&model, &[Message::user("Hello")], &options).await
    }

    /// List the backend's own models via `GET {base}/v1/models`.
    ///
    /// Rows get conservative routing defaults; `context_length` is honored
    /// when the backend reports it.
    pub async fn discover_models(&self) -> Result<Vec<DynamicModel>> {
        let headers = self.build_headers(&self.config.credential)?;
        let url = format!("{}/v1/models", self.base_url);
        let raw = shared::get_json(&self.http, &url, headers, DISCOVERY_TIMEOUT).await;

        if !raw.success {
            return Err(PipelineError::Http {
                status: raw.status.unwrap_or(0),
                message: self.error_message(&raw),
            });
        }

        let rows = raw
            .body
            .as_ref()
            .and_then(|b| b.get("data"))
            .and_then(|d| d.as_array())
            .ok_or_else(|| PipelineError::Parse("Invalid models response format".into()))?;

        let models = rows
            .iter()
            .filter_map(|row| {
                let id = row.get("id").and_then(|v| v.as_str())?;
                Some(DynamicModel {
                    provider_id: self.config.id,
                    slug: id.to_string(),
                    display_name: id.to_string(),
                    tier: DISCOVERED_TIER,
                    max_output_tokens: DISCOVERED_MAX_TOKENS,
                    cost_per_1000_tokens: 0.0,
                    context_window: row
                        .get("context_length")
                        .and_then(|v| v.as_u64())
                        .map(|v| v as u32)
                        .unwrap_or(DISCOVERED_CONTEXT_WINDOW),
                    enabled: true,
                })
            })
            .collect();

        Ok(models)
    }

    async fn try_endpoint(
        &self,
        url: &str,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> RawResult {
        let headers = match self.build_headers(&self.config.credential) {
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

        let timeout = options.timeout.unwrap_or(shared::DEFAULT_TIMEOUT);
        shared::post_json(&self.http, url, headers, &body, timeout).await
    }
}

/// Registry-wide slug for a dynamic provider id
pub fn slug_for(provider_id: i64) -> String {
    format!("custom_{provider_id}")
}

/// Inverse of [`slug_for`]
pub fn provider_id_for(slug: &str) -> Option<i64> {
    slug.strip_prefix("custom_")?.parse().ok()
}

/// Parse a free-form `Header: value` blob, one header per line.
///
/// Malformed lines are skipped rather than failing the whole request.
fn parse_extra_headers(blob: &str, headers: &mut HeaderMap) {
    for line in blob.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || value.is_empty() {
            continue;
        }
        if shared::insert_header(headers, key, value).is_err() {
            tracing::warn!(header = key, "skipping malformed extra header");
        }
    }
}

#[async_trait]
impl ChatProvider for CustomProvider {
    fn name(&self) -> &str {
        &self.config.display_name
    }

    fn slug(&self) -> &str {
        &self.slug
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers(&self, credential: &str) -> Result<HeaderMap> {
        let mut headers = shared::json_headers();

        match self.config.auth_mode {
            AuthMode::BearerApiKey => {
                if !credential.is_empty() {
                    let bearer = HeaderValue::from_str(&format!("Bearer {credential}")).map_err(
                        |_| PipelineError::Config("Credential is not a valid header value".into()),
                    )?;
                    headers.insert(AUTHORIZATION, bearer);
                }
            }
            AuthMode::CustomHeader => {
                if !credential.is_empty() {
                    let value = HeaderValue::from_str(credential).map_err(|_| {
                        PipelineError::Config("Credential is not a valid header value".into())
                    })?;
                    headers.insert("X-API-Key", value);
                }
            }
        }

        parse_extra_headers(&self.config.extra_headers, &mut headers);

        if let Some(referer) = &self.config.referer {
            shared::insert_header(&mut headers, "HTTP-Referer", referer)?;
        }
        if let Some(title) = &self.config.title {
            shared::insert_header(&mut headers, "X-Title", title)?;
        }

        Ok(headers)
    }

    fn catalog(&self) -> Vec<ModelDescriptor> {
        self.models.clone()
    }

    async fn execute(
        &self,
        model: &str,
        messages: &[Message],
        options: &RequestOptions,
    ) -> RawResult {
        if self.config.credential.is_empty() {
            return RawResult::failed(
                PipelineError::MissingCredential(self.config.display_name.clone()).to_string(),
            );
        }

        let mut last: Option<RawResult> = None;
        for endpoint in CHAT_ENDPOINTS {
            let url = format!("{}{endpoint}", self.base_url);
            let result = self.try_endpoint(&url, model, messages, options).await;
            if result.success {
                return result;
            }
            tracing::debug!(endpoint, "chat endpoint probe failed");
            last = Some(result);
        }

        // Keep status/body/retry_after from the last probe for classification
        match last {
            Some(mut result) => {
                let detail = self.error_message(&result);
                result.error = Some(format!("All endpoints failed. Last error: {detail}"));
                result
            }
            None => RawResult::failed("All endpoints failed"),
        }
    }

    fn parse_response(&self, raw: &RawResult) -> ParsedCompletion {
        shared::parse_openai_response(raw)
    }

    fn error_message(&self, raw: &RawResult) -> String {
        shared::extract_error_message(raw)
    }
}
