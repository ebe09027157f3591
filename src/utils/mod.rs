//! Shared utilities: error types, secret redaction, JSON extraction, logging.

pub mod error;
pub mod json;
pub mod logging;
pub mod redact;

pub use error::{ErrorClass, PipelineError, Result};
pub use json::{extract_json, strip_code_fences};
pub use logging::init_logging;
pub use redact::redact;
