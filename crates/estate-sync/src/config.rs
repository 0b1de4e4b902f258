//! Push channel configuration.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | ESTATE_WS_URL | ws://localhost:8080/ws/websocket | STOMP-over-WebSocket endpoint |
//! | ESTATE_WS_RECONNECT_SECS | (off) | Delay before reconnecting after a lost connection; 0 disables |
//! | ESTATE_WS_CONNECT_TIMEOUT | 10 | Seconds to wait for CONNECTED |

use std::time::Duration;

use estate_core::defaults;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushConfig {
    pub ws_url: String,
    /// Reconnect after a lost or refused connection. `None` disables reconnecting.
    pub reconnect_delay: Option<Duration>,
    /// How long to wait for CONNECTED after sending CONNECT.
    pub connect_timeout: Duration,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            ws_url: defaults::WS_URL.to_string(),
            reconnect_delay: None,
            connect_timeout: Duration::from_secs(defaults::STOMP_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl PushConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = Some(delay);
        self
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let base = Self::default();
        Self {
            ws_url: lookup("ESTATE_WS_URL").unwrap_or(base.ws_url),
            reconnect_delay: lookup("ESTATE_WS_RECONNECT_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            connect_timeout: lookup("ESTATE_WS_CONNECT_TIMEOUT")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(base.connect_timeout),
        }
    }

    /// `host` header value for CONNECT: the authority part of the URL.
    pub fn host(&self) -> &str {
        let rest = self
            .ws_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.ws_url);
        rest.split(['/', '?']).next().unwrap_or(rest)
    }
}
