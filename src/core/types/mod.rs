//! Shared types for the routing and request pipeline

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse cost/quality bucket used for routing and fallback ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Cheap,
    Standard,
    Premium,
}

impl Tier {
    /// All tiers in ascending cost order
    pub const ASCENDING: [Tier; 3] = [Tier::Cheap, Tier::Standard, Tier::Premium];

    /// All tiers in descending cost order
    pub const DESCENDING: [Tier; 3] = [Tier::Premium, Tier::Standard, Tier::Cheap];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Cheap => "cheap",
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }

    /// Next tier down in cost, if any
    pub fn next_lower(&self) -> Option<Tier> {
        match self {
            Tier::Premium => Some(Tier::Standard),
            Tier::Standard => Some(Tier::Cheap),
            Tier::Cheap => None,
        }
    }

    /// Next tier up in cost, if any
    pub fn next_higher(&self) -> Option<Tier> {
        match self {
            Tier::Cheap => Some(Tier::Standard),
            Tier::Standard => Some(Tier::Premium),
            Tier::Premium => None,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cheap" => Ok(Tier::Cheap),
            "standard" => Ok(Tier::Standard),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// Conversation message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// A single conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request generation options
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Sampling temperature, forwarded verbatim to the provider
    pub temperature: Option<f64>,
    /// Maximum output tokens; a prompt-size heuristic applies when unset
    pub max_tokens: Option<u32>,
    /// Per-call HTTP timeout (default 60s)
    pub timeout: Option<Duration>,
    /// Strip code fences and decode the output as JSON
    pub expect_json: bool,
    /// Bypass tier routing in favor of this provider's configured model
    pub preferred_provider: Option<String>,
}

/// Raw outcome of a single provider HTTP call
#[derive(Debug, Clone)]
pub struct RawResult {
    pub success: bool,
    pub status: Option<u16>,
    pub body: Option<Value>,
    pub error: Option<String>,
    /// Retry-After header value in seconds, when the provider sent one
    pub retry_after: Option<u64>,
}

impl RawResult {
    /// Successful call with a decoded JSON body
    pub fn ok(status: u16, body: Value) -> Self {
        Self {
            success: true,
            status: Some(status),
            body: Some(body),
            error: None,
            retry_after: None,
        }
    }

    /// Failure before any HTTP status was obtained
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            body: None,
            error: Some(error.into()),
            retry_after: None,
        }
    }

    /// Non-2xx HTTP response; body kept when it decoded as JSON
    pub fn http_error(
        status: u16,
        body: Option<Value>,
        error: impl Into<String>,
        retry_after: Option<u64>,
    ) -> Self {
        Self {
            success: false,
            status: Some(status),
            body,
            error: Some(error.into()),
            retry_after,
        }
    }
}

/// Normalized completion extracted from a provider response
#[derive(Debug, Clone, Default)]
pub struct ParsedCompletion {
    pub content: String,
    pub tokens_used: u32,
    pub model: String,
    pub finish_reason: String,
}

/// A model known to the registry, with routing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Stable unique identifier
    pub slug: String,
    pub display_name: String,
    pub tier: Tier,
    pub max_output_tokens: u32,
    pub cost_per_1000_tokens: f64,
    pub context_window: u32,
    pub provider_slug: String,
    pub provider_name: String,
}

/// One generation attempt, emitted to the usage sink after every call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub model_slug: String,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_ordering_matches_cost_order() {
        assert!(Tier::Cheap < Tier::Standard);
        assert!(Tier::Standard < Tier::Premium);
    }

    #[test]
    fn tier_walks_terminate() {
        assert_eq!(Tier::Premium.next_higher(), None);
        assert_eq!(Tier::Cheap.next_lower(), None);
        assert_eq!(Tier::Standard.next_higher(), Some(Tier::Premium));
    }

    #[test]
    fn tier_round_trips_through_strings() {
        for tier in Tier::ASCENDING {
            assert_eq!(tier.as_str().parse::<Tier>(), Ok(tier));
        }
    }
}
