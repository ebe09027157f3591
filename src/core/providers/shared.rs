//! HTTP plumbing and response helpers shared by all provider families

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::types::{Message, ParsedCompletion, RawResult};
use crate::utils::{redact, PipelineError, Result};

/// Default per-call HTTP timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Build a reqwest client with sane connection defaults
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

/// Start a header map with the JSON content type every backend expects
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Insert a header from owned strings, rejecting values reqwest cannot carry
pub(crate) fn insert_header(headers: &mut HeaderMap, key: &str, value: &str) -> Result<()> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|e| PipelineError::Config(format!("Invalid header name {key:?}: {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| PipelineError::Config(format!("Invalid header value for {key:?}: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

/// POST a JSON body and fold the outcome into a [`RawResult`].
///
/// Transport failures and timeouts produce `failed` results; non-2xx
/// statuses produce `http_error` results carrying the decoded body (when it
/// is JSON) and any Retry-After hint.
pub(crate) async fn post_json(
    http: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    body: &Value,
    call_timeout: Duration,
) -> RawResult {
    // Gemini carries its credential in the query string, so the URL itself
    // is a secret here
    tracing::debug!(url = %redact(url, &[]), "dispatching provider request");

    let send = http.post(url).headers(headers).json(body).send();
    let response = match timeout(call_timeout, send).await {
        Err(_) => return RawResult::failed("Request timeout"),
        Ok(Err(e)) => return RawResult::failed(format!("Network error: {e}")),
        Ok(Ok(response)) => response,
    };

    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return RawResult::failed(format!("Failed to read response: {e}")),
    };

    if status >= 400 {
        let body = serde_json::from_str::<Value>(&text).ok();
        return RawResult::http_error(status, body, format!("HTTP Error: {status}"), retry_after);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => RawResult::ok(status, value),
        Err(e) => RawResult::failed(format!("JSON decode error: {e}")),
    }
}

/// GET a JSON document, used for model-listing endpoints
pub(crate) async fn get_json(
    http: &reqwest::Client,
    url: &str,
    headers: HeaderMap,
    call_timeout: Duration,
) -> RawResult {
    let send = http.get(url).headers(headers).send();
    let response = match timeout(call_timeout, send).await {
        Err(_) => return RawResult::failed("Request timeout"),
        Ok(Err(e)) => return RawResult::failed(format!("Network error: {e}")),
        Ok(Ok(response)) => response,
    };

    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => return RawResult::failed(format!("Failed to read response: {e}")),
    };

    if status >= 400 {
        let body = serde_json::from_str::<Value>(&text).ok();
        return RawResult::http_error(status, body, format!("HTTP Error: {status}"), None);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => RawResult::ok(status, value),
        Err(e) => RawResult::failed(format!("JSON decode error: {e}")),
    }
}

/// Format a conversation as an OpenAI-style `messages` array
pub(crate) fn openai_messages(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect(),
    )
}

/// Parse an OpenAI-shaped chat completion response.
///
/// Tries `choices[0].message.content` first, then the legacy
/// `choices[0].text` shape some OpenAI-compatible backends still return.
pub(crate) fn parse_openai_response(raw: &RawResult) -> ParsedCompletion {
    let Some(data) = raw.body.as_ref().filter(|_| raw.success) else {
        return error_completion();
    };

    let choice = data.get("choices").and_then(|c| c.get(0));
    let content = choice
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .or_else(|| choice.and_then(|c| c.get("text")).and_then(|v| v.as_str()))
        .unwrap_or_default();

    ParsedCompletion {
        content: content.to_string(),
        tokens_used: data
            .get("usage")
            .and_then(|u| u.get("total_tokens"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        model: data
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        finish_reason: choice
            .and_then(|c| c.get("finish_reason"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
    }
}

/// Placeholder completion returned when parsing a failed result
pub(crate) fn error_completion() -> ParsedCompletion {
    ParsedCompletion {
        content: String::new(),
        tokens_used: 0,
        model: String::new(),
        finish_reason: "error".to_string(),
    }
}

/// Extract a human-readable message from a failed result.
///
/// Looks for the `error.message` / `error.type` fields most backends emit,
/// then the transport-level error string, then a generic fallback.
pub(crate) fn extract_error_message(raw: &RawResult) -> String {
    if raw.success {
        return String::new();
    }

    if let Some(error) = raw.body.as_ref().and_then(|b| b.get("error")) {
        if let Some(message) = error.get("message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
        if let Some(kind) = error.get("type").and_then(|v| v.as_str()) {
            return kind.to_string();
        }
    }

    raw.error.clone().unwrap_or_else(|| "Unknown error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_message_content_shape() {
        let raw = RawResult::ok(
            200,
            json!({
                "model": "gpt-4o-mini",
                "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
                "usage": {"total_tokens": 42}
            }),
        );
        let parsed = parse_openai_response(&raw);
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.tokens_used, 42);
        assert_eq!(parsed.finish_reason, "stop");
    }

    #[test]
    fn falls_back_to_text_shape() {
        let raw = RawResult::ok(
            200,
            json!({"choices": [{"text": "legacy output", "finish_reason": "length"}]}),
        );
        let parsed = parse_openai_response(&raw);
        assert_eq!(parsed.content, "legacy output");
        assert_eq!(parsed.finish_reason, "length");
    }

    #[test]
    fn failed_result_parses_to_error_completion() {
        let raw = RawResult::failed("boom");
        let parsed = parse_openai_response(&raw);
        assert!(parsed.content.is_empty());
        assert_eq!(parsed.finish_reason, "error");
    }

    #[test]
    fn error_message_prefers_body_field() {
        let raw = RawResult::http_error(
            400,
            Some(json!({"error": {"message": "bad model"}})),
            "HTTP Error: 400",
            None,
        );
        assert_eq!(extract_error_message(&raw), "bad model");
    }

    #[test]
    fn error_message_falls_back_to_transport_error() {
        let raw = RawResult::failed("connection refused");
        assert_eq!(extract_error_message(&raw), "connection refused");
    }
}
