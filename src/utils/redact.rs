//! Secret redaction for error messages and logs
//!
//! Provider credentials travel in URLs (`?key=...`) and headers
//! (`Authorization: Bearer ...`). Any message that might reach a log or a
//! returned error must pass through here first.

use once_cell::sync::Lazy;
use regex::Regex;

const MASK: &str = "[REDACTED]";

static KEY_QUERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?&]key=)[^&\s]+").expect("valid redaction pattern"));

static BEARER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(authorization:\s*bearer\s+)\S+").expect("valid redaction pattern"));

/// Redact known secrets and credential-shaped fragments from a message.
///
/// Empty secrets are skipped so a blank configuration entry cannot turn the
/// whole message into mask characters.
pub fn redact(message: &str, secrets: &[String]) -> String {
    let mut out = message.to_string();

    for secret in secrets {
        if !secret.is_empty() {
            out = out.replace(secret.as_str(), MASK);
        }
    }

    out = KEY_QUERY_RE.replace_all(&out, format!("${{1}}{MASK}")).into_owned();
    out = BEARER_RE.replace_all(&out, format!("${{1}}{MASK}")).into_owned();

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_configured_secrets() {
        let secrets = vec!["sk-abc123".to_string()];
        let out = redact("request with sk-abc123 failed", &secrets);
        assert!(!out.contains("sk-abc123"));
        assert!(out.contains(MASK));
    }

    #[test]
    fn removes_key_query_fragments() {
        let out = redact(
            "POST https://host/v1/models/x:generateContent?key=SECRETVALUE failed",
            &[],
        );
        assert!(!out.contains("SECRETVALUE"));
        assert!(out.contains("?key=[REDACTED]"));
    }

    #[test]
    fn removes_bearer_tokens() {
        let out = redact("header Authorization: Bearer sk-deadbeef rejected", &[]);
        assert!(!out.contains("sk-deadbeef"));
    }

    #[test]
    fn ignores_empty_secrets() {
        let secrets = vec![String::new()];
        assert_eq!(redact("plain message", &secrets), "plain message");
    }

    #[test]
    fn handles_ampersand_separated_keys() {
        let out = redact("url?foo=1&key=TOPSECRET&bar=2", &[]);
        assert!(!out.contains("TOPSECRET"));
        assert!(out.contains("&bar=2"));
    }
}
