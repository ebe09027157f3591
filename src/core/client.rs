//! End-to-end generation client
//!
//! Orchestrates one generation call: route, wait for a rate-limit slot,
//! execute, then recover. Retryable failures back off exponentially (a
//! provider Retry-After hint overrides the formula), fallback-triggering
//! failures re-route once with a fresh attempt budget, and a low-confidence
//! first answer escalates once to a higher tier. A usage record goes to the
//! sink on every outcome, and every outbound error message passes through
//! secret redaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::config::{SecretStore, UsageSink};
use crate::core::rate_limiter::SlidingWindowLimiter;
use crate::core::registry::ModelRegistry;
use crate::core::router::{should_escalate, Router, Selection};
use crate::core::types::{Message, ParsedCompletion, RawResult, RequestOptions, UsageRecord};
use crate::utils::{extract_json, redact, ErrorClass, PipelineError, Result};

const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct GenerationClient {
    router: Arc<Router>,
    registry: Arc<ModelRegistry>,
    limiter: Arc<SlidingWindowLimiter>,
    usage: Arc<dyn UsageSink>,
    secrets: Arc<dyn SecretStore>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl GenerationClient {
    pub fn new(
        router: Arc<Router>,
        registry: Arc<ModelRegistry>,
        limiter: Arc<SlidingWindowLimiter>,
        usage: Arc<dyn UsageSink>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            router,
            registry,
            limiter,
            usage,
            secrets,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    /// Generate plain text from a single prompt
    pub async fn generate_text(&self, prompt: &str, options: RequestOptions) -> Result<String> {
        let options = self.fill_defaults(prompt, options, false);
        let messages = [Message::user(prompt)];
        let completion = self.execute(&messages, &options).await?;
        Ok(completion.content.trim().to_string())
    }

    /// Generate JSON from a single prompt, stripping markdown code fences
    /// before decoding
    pub async fn generate_json(&self, prompt: &str, options: RequestOptions) -> Result<Value> {
        let mut options = self.fill_defaults(prompt, options, true);
        options.expect_json = true;
        let messages = [Message::user(prompt)];
        let completion = self.execute(&messages, &options).await?;
        extract_json(&completion.content)
    }

    /// Run the full resilient pipeline over an arbitrary conversation
    pub async fn execute(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> Result<ParsedCompletion> {
        let mut selection = self
            .router
            .select_model(messages, options)
            .map_err(|e| self.redact_error(e))?;

        let started = std::time::Instant::now();
        let mut attempt: u32 = 0;
        let mut escalated = false;
        let mut fallback_used = false;

        loop {
            self.limiter.acquire().await;

            tracing::debug!(
                model = %selection.model.slug,
                provider = selection.provider.slug(),
                attempt,
                "dispatching generation request"
            );
            let raw = selection
                .provider
                .execute(&selection.model.slug, messages, options)
                .await;

            if raw.success {
                let parsed = selection.provider.parse_response(&raw);
                if parsed.content.is_empty() {
                    let err = PipelineError::Parse("Provider response missing content".into());
                    self.emit_usage(&selection, &parsed, started, Some(&err)).await;
                    return Err(err);
                }

                let complexity = selection.complexity.unwrap_or(0.0);
                if !escalated && attempt == 0 && should_escalate(&parsed.content, complexity) {
                    if let Some(next) = self.router.escalate(&selection.model.slug) {
                        escalated = true;
                        selection = next;
                        continue;
                    }
                }

                self.emit_usage(&selection, &parsed, started, None).await;
                return Ok(parsed);
            }

            let error = self.error_from_raw(&selection, &raw);
            match error.classify() {
                ErrorClass::Retryable if attempt < self.max_retries => {
                    let delay = backoff_delay(self.initial_backoff, attempt, raw.retry_after);
                    tracing::warn!(
                        model = %selection.model.slug,
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                ErrorClass::FallbackTriggering
                    if !fallback_used && self.router.fallback_enabled() =>
                {
                    match self.router.select_fallback(&selection.model.slug) {
                        Ok(next) => {
                            tracing::warn!(
                                from = %selection.model.slug,
                                to = %next.model.slug,
                                error = %error,
                                "re-routing after fallback-triggering failure"
                            );
                            selection = next;
                            fallback_used = true;
                            attempt = 0;
                        }
                        Err(e) => {
                            self.emit_failure(&selection, started, &error).await;
                            return Err(self.redact_error(e));
                        }
                    }
                }
                _ => {
                    self.emit_failure(&selection, started, &error).await;
                    return Err(error);
                }
            }
        }
    }

    fn fill_defaults(
        &self,
        prompt: &str,
        mut options: RequestOptions,
        expect_json: bool,
    ) -> RequestOptions {
        if options.max_tokens.is_none() {
            options.max_tokens = Some(default_max_tokens(prompt.len(), expect_json));
        }
        options
    }

    /// Lift a failed raw result into the typed error taxonomy, redacting
    /// the message on the way out
    fn error_from_raw(&self, selection: &Selection, raw: &RawResult) -> PipelineError {
        let message = self.redact_message(&selection.provider.error_message(raw));
        typed_error(raw, message)
    }

    fn redact_message(&self, message: &str) -> String {
        let mut secrets = Vec::new();
        for provider in self.registry.providers() {
            match provider.as_custom() {
                Some(custom) if custom.has_credential() => {
                    secrets.push(custom.credential().to_string());
                }
                Some(_) => {}
                None => {
                    if let Some(secret) = self.secrets.get_secret(provider.slug()) {
                        secrets.push(secret);
                    }
                }
            }
        }
        redact(message, &secrets)
    }

    fn redact_error(&self, error: PipelineError) -> PipelineError {
        match error {
            PipelineError::Transport(m) => PipelineError::Transport(self.redact_message(&m)),
            PipelineError::Http { status, message } => PipelineError::Http {
                status,
                message: self.redact_message(&message),
            },
            PipelineError::RateLimited { message, retry_after } => PipelineError::RateLimited {
                message: self.redact_message(&message),
                retry_after,
            },
            other => other,
        }
    }

    async fn emit_usage(
        &self,
        selection: &Selection,
        parsed: &ParsedCompletion,
        started: std::time::Instant,
        error: Option<&PipelineError>,
    ) {
        let record = UsageRecord {
            model_slug: selection.model.slug.clone(),
            tokens_used: parsed.tokens_used,
            latency_ms: started.elapsed().as_millis() as u64,
            success: error.is_none(),
            error_message: error.map(|e| e.to_string()),
            cost: self
                .registry
                .calculate_cost(&selection.model.slug, parsed.tokens_used),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.usage.record(&record).await {
            tracing::warn!(error = %e, "failed to write usage record");
        }
    }

    async fn emit_failure(
        &self,
        selection: &Selection,
        started: std::time::Instant,
        error: &PipelineError,
    ) {
        let empty = ParsedCompletion::default();
        self.emit_usage(selection, &empty, started, Some(error)).await;
    }
}

/// Map a failed raw result onto the error taxonomy.
///
/// A status-less failure whose message carries the missing-credential prefix
/// recovers the typed [`PipelineError::MissingCredential`] rather than
/// degrading to a retryable transport error.
pub(crate) fn typed_error(raw: &RawResult, message: String) -> PipelineError {
    use crate::utils::error::MISSING_CREDENTIAL_PREFIX;

    if raw.status.is_none() {
        if let Some(provider) = message.strip_prefix(MISSING_CREDENTIAL_PREFIX) {
            return PipelineError::MissingCredential(provider.to_string());
        }
    }

    match raw.status {
        Some(429) => PipelineError::RateLimited {
            message,
            retry_after: raw.retry_after,
        },
        Some(status) if status >= 400 => PipelineError::Http { status, message },
        _ => PipelineError::Transport(message),
    }
}

/// Delay before retry `attempt`; a provider Retry-After hint wins over the
/// exponential formula
pub(crate) fn backoff_delay(
    initial_backoff: Duration,
    attempt: u32,
    retry_after: Option<u64>,
) -> Duration {
    match retry_after {
        Some(seconds) if seconds > 0 => Duration::from_secs(seconds),
        _ => initial_backoff * 2u32.saturating_pow(attempt),
    }
}

/// Output-token budget when the caller does not set one: a small base for
/// prose, a larger one for structured output, plus prompt-proportional
/// headroom, clamped to sane bounds
pub(crate) fn default_max_tokens(prompt_len: usize, expect_json: bool) -> u32 {
    let base: u32 = if expect_json { 2048 } else { 256 };
    let bonus = (prompt_len / 40) as u32;
    let tokens = base.saturating_add(bonus);
    let (min, max) = if expect_json { (1024, 4096) } else { (64, 512) };
    tokens.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_failures_recover_the_typed_variant() {
        let raw = RawResult::failed(PipelineError::MissingCredential("OpenAI".into()).to_string());
        let message = raw.error.clone().unwrap();
        let err = typed_error(&raw, message);
        assert!(matches!(err, PipelineError::MissingCredential(ref p) if p == "OpenAI"));
        assert_eq!(err.classify(), ErrorClass::FallbackTriggering);
    }

    #[test]
    fn status_bearing_failures_stay_http_errors() {
        let raw = RawResult::http_error(500, None, "HTTP Error: 500", None);
        let err = typed_error(&raw, "HTTP Error: 500".to_string());
        assert!(matches!(err, PipelineError::Http { status: 500, .. }));
    }

    #[test]
    fn retry_after_hint_overrides_backoff_formula() {
        let initial = Duration::from_secs(1);
        assert_eq!(backoff_delay(initial, 0, Some(5)), Duration::from_secs(5));
        assert_eq!(backoff_delay(initial, 3, Some(7)), Duration::from_secs(7));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let initial = Duration::from_secs(1);
        assert_eq!(backoff_delay(initial, 0, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(initial, 1, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(initial, 2, None), Duration::from_secs(4));
        // Zero is treated as an absent hint
        assert_eq!(backoff_delay(initial, 1, Some(0)), Duration::from_secs(2));
    }

    #[test]
    fn token_budget_scales_with_prompt_and_mode() {
        assert_eq!(default_max_tokens(0, false), 256);
        assert_eq!(default_max_tokens(0, true), 2048);
        assert_eq!(default_max_tokens(4000, false), 356);
        // Clamped at the mode ceiling
        assert_eq!(default_max_tokens(1_000_000, false), 512);
        assert_eq!(default_max_tokens(1_000_000, true), 4096);
        // And at the floor
        assert_eq!(default_max_tokens(0, true).max(1024), default_max_tokens(0, true));
    }
}
