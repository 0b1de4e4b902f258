//! REST client configuration.
//!
//! Configuration is read from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ESTATE_API_URL | http://localhost:8080 | Backend base URL |
//! | ESTATE_HTTP_TIMEOUT | 30 | Request timeout (seconds) |
//! | ESTATE_SKIP_TLS_VERIFY | false | Accept self-signed certificates |
//! | ESTATE_TOKEN | (none) | Bearer token for the session |
//! | ESTATE_LOGIN | (from token `sub`) | Login shown for the session |

use estate_core::{defaults, Session};

/// Connection settings for [`RestClient`](crate::RestClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Skip TLS verification (for self-signed certs in local environments).
    pub skip_tls_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_URL.to_string(),
            timeout_seconds: defaults::HTTP_TIMEOUT_SECS,
            skip_tls_verify: false,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = Self::default();
        Self {
            base_url: lookup("ESTATE_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(base.base_url),
            timeout_seconds: lookup("ESTATE_HTTP_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
            skip_tls_verify: lookup("ESTATE_SKIP_TLS_VERIFY")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(base.skip_tls_verify),
        }
    }
}

/// Build a session from `ESTATE_TOKEN` / `ESTATE_LOGIN`.
pub fn session_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Session {
    match (lookup("ESTATE_TOKEN"), lookup("ESTATE_LOGIN")) {
        (Some(token), Some(login)) => Session::authenticated(token, login),
        (Some(token), None) => Session::from_token(token),
        _ => Session::new(),
    }
}

/// Build a session from process environment variables.
pub fn session_from_env() -> Session {
    session_from_lookup(|key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("ESTATE_API_URL", "https://estate.example.com/api/"),
            ("ESTATE_HTTP_TIMEOUT", "5"),
            ("ESTATE_SKIP_TLS_VERIFY", "TRUE"),
        ]));
        assert_eq!(config.base_url, "https://estate.example.com/api");
        assert_eq!(config.timeout_seconds, 5);
        assert!(config.skip_tls_verify);
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = ClientConfig::from_lookup(lookup(&[("ESTATE_HTTP_TIMEOUT", "soon")]));
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_session_from_lookup() {
        let session = session_from_lookup(lookup(&[("ESTATE_TOKEN", "t"), ("ESTATE_LOGIN", "bob")]));
        assert_eq!(session.token(), Some("t"));
        assert_eq!(session.login(), Some("bob"));

        let anonymous = session_from_lookup(lookup(&[("ESTATE_LOGIN", "bob")]));
        assert!(!anonymous.is_authenticated());
    }
}
