//! # draftgate
//!
//! Resilient multi-provider LLM routing for automated long-form content
//! generation.
//!
//! ## Features
//!
//! - **Multi-Provider**: OpenAI, Anthropic, Google Gemini, OpenRouter, plus
//!   operator-configured OpenAI-compatible backends
//! - **Complexity Routing**: requests are scored and routed to a cheap,
//!   standard, or premium model tier
//! - **Resilient Execution**: sliding-window rate limiting, exponential
//!   backoff with Retry-After support, fallback re-routing, low-confidence
//!   escalation
//! - **Pluggable Collaborators**: secrets, routing configuration, dynamic
//!   provider storage, and usage logging are injectable traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use draftgate::config::{
//!     InMemoryProviderStore, InMemoryRoutingConfig, InMemorySecretStore, NullUsageSink,
//!     RoutingConfig,
//! };
//! use draftgate::{
//!     GenerationClient, ModelRegistry, RequestOptions, Router, SlidingWindowLimiter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let secrets = Arc::new(InMemorySecretStore::new());
//!     secrets.set("openai", std::env::var("OPENAI_API_KEY")?);
//!
//!     let store = Arc::new(InMemoryProviderStore::new());
//!     let registry = Arc::new(ModelRegistry::new(secrets.clone(), store));
//!     let config = Arc::new(InMemoryRoutingConfig::new(RoutingConfig::default()));
//!     let router = Arc::new(Router::new(registry.clone(), config));
//!     let limiter = Arc::new(SlidingWindowLimiter::new(60));
//!
//!     let client = GenerationClient::new(
//!         router,
//!         registry,
//!         limiter,
//!         Arc::new(NullUsageSink),
//!         secrets,
//!     );
//!
//!     let text = client
//!         .generate_text("Write a short intro about sourdough.", RequestOptions::default())
//!         .await?;
//!     println!("{text}");
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod utils;

pub use config::{RoutingConfig, RoutingMode};
pub use core::client::GenerationClient;
pub use core::providers::{ChatProvider, Provider};
pub use core::rate_limiter::{Clock, SlidingWindowLimiter, SystemClock, WindowStore};
pub use core::registry::ModelRegistry;
pub use core::router::{Router, Selection, SelectionMode};
pub use core::types::{
    Message, MessageRole, ModelDescriptor, ParsedCompletion, RawResult, RequestOptions, Tier,
    UsageRecord,
};
pub use utils::{ErrorClass, PipelineError, Result};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
