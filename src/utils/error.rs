//! Error handling for the generation pipeline
//!
//! Every failure in this crate is a typed return value. Nothing here is
//! allowed to panic the host process.

use thiserror::Error;

use crate::core::types::Tier;

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Display prefix of [`PipelineError::MissingCredential`]; the executor uses
/// it to recover the typed variant from a provider's raw failure message
pub(crate) const MISSING_CREDENTIAL_PREFIX: &str = "Missing API credential for provider: ";

/// Main error type for the generation pipeline
#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    /// No API credential configured for a provider
    #[error("Missing API credential for provider: {0}")]
    MissingCredential(String),

    /// No model passed validation for the computed tier
    #[error("No available models for tier: {tier}")]
    NoModelAvailable { tier: Tier },

    /// Requested model slug is absent from the catalog
    #[error("Model not found: {slug}")]
    ModelNotFound { slug: String },

    /// Model exists but its provider has no credential configured
    #[error("Model {slug} not available. Missing API key for provider: {provider}")]
    ModelUnavailable { slug: String, provider: String },

    /// Network-level failure (DNS, TLS, connect, request timeout)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx HTTP response from a provider
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// HTTP 429 from a provider, optionally carrying a Retry-After hint
    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },

    /// Provider response body did not match any recognized shape
    #[error("Could not parse provider response: {0}")]
    Parse(String),

    /// Caller asked for JSON but the model output is not valid JSON
    #[error("Model returned invalid JSON: {0}")]
    JsonDecode(String),

    /// Fallback selection exhausted every tier
    #[error("No fallback models available")]
    FallbackExhausted,

    /// Invalid provider or client configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Retry/fallback category of a failed provider call.
///
/// Classification is structured first: the typed error variant decides the
/// category where it can. The English substring lists from the upstream
/// providers are kept only as a fallback for messages that arrive untyped,
/// preserving the same behavioral categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry locally with exponential backoff
    Retryable,
    /// Re-route once to a fallback model
    FallbackTriggering,
    /// Propagate to the caller
    Terminal,
}

const RETRYABLE_FRAGMENTS: &[&str] = &["rate limit", "timeout", "connection", "temporary"];

const FALLBACK_FRAGMENTS: &[&str] = &[
    "model not found",
    "model not available",
    "invalid model",
    "access denied",
    "authentication",
];

impl PipelineError {
    /// Classify this error into a retry/fallback category
    pub fn classify(&self) -> ErrorClass {
        match self {
            PipelineError::RateLimited { .. } => ErrorClass::Retryable,
            PipelineError::Http { status, message } => {
                if *status == 429 || *status >= 500 {
                    ErrorClass::Retryable
                } else if matches!(status, 401 | 403 | 404) {
                    ErrorClass::FallbackTriggering
                } else {
                    classify_message(message)
                }
            }
            PipelineError::Transport(message) => match classify_message(message) {
                // A transport failure with no recognizable fragment is still
                // a transient network condition worth one more attempt.
                ErrorClass::Terminal => ErrorClass::Retryable,
                class => class,
            },
            // A missing credential cannot self-heal; the only useful
            // recovery is another provider
            PipelineError::MissingCredential(_)
            | PipelineError::ModelNotFound { .. }
            | PipelineError::ModelUnavailable { .. } => ErrorClass::FallbackTriggering,
            _ => ErrorClass::Terminal,
        }
    }
}

/// Substring-based classification for untyped provider messages
fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    if RETRYABLE_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return ErrorClass::Retryable;
    }

    if FALLBACK_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return ErrorClass::FallbackTriggering;
    }

    ErrorClass::Terminal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = PipelineError::RateLimited {
            message: "slow down".into(),
            retry_after: Some(5),
        };
        assert_eq!(err.classify(), ErrorClass::Retryable);
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = PipelineError::Http {
            status: 503,
            message: "upstream unavailable".into(),
        };
        assert_eq!(err.classify(), ErrorClass::Retryable);
    }

    #[test]
    fn missing_credential_triggers_fallback() {
        let err = PipelineError::MissingCredential("OpenAI".into());
        assert_eq!(err.classify(), ErrorClass::FallbackTriggering);
    }

    #[test]
    fn auth_errors_trigger_fallback() {
        let err = PipelineError::Http {
            status: 401,
            message: "bad key".into(),
        };
        assert_eq!(err.classify(), ErrorClass::FallbackTriggering);
    }

    #[test]
    fn message_fragments_decide_ambiguous_status() {
        let err = PipelineError::Http {
            status: 400,
            message: "Invalid model requested".into(),
        };
        assert_eq!(err.classify(), ErrorClass::FallbackTriggering);

        let err = PipelineError::Http {
            status: 400,
            message: "temporary capacity issue".into(),
        };
        assert_eq!(err.classify(), ErrorClass::Retryable);

        let err = PipelineError::Http {
            status: 400,
            message: "bad request body".into(),
        };
        assert_eq!(err.classify(), ErrorClass::Terminal);
    }

    #[test]
    fn transport_defaults_to_retryable() {
        let err = PipelineError::Transport("error sending request".into());
        assert_eq!(err.classify(), ErrorClass::Retryable);
    }

    #[test]
    fn json_decode_is_terminal() {
        let err = PipelineError::JsonDecode("expected value".into());
        assert_eq!(err.classify(), ErrorClass::Terminal);
    }
}
