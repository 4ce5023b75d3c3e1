//! Session configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration for a STOMP broker on `ws://localhost:8080/chat`.

use crate::{RenderOrder, RetryPolicy, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Which messaging channel the session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// STOMP frames over a WebSocket at a fixed path.
    #[default]
    Stomp,
    /// Raw WebSocket at a path carrying the username.
    WebSocket,
}

impl TransportKind {
    pub fn default_endpoint(self) -> &'static str {
        match self {
            TransportKind::Stomp => "ws://localhost:8080/chat",
            TransportKind::WebSocket => "ws://localhost:10000/chat",
        }
    }

    pub fn default_order(self) -> RenderOrder {
        match self {
            TransportKind::Stomp => RenderOrder::NewestLast,
            TransportKind::WebSocket => RenderOrder::NewestFirst,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stomp => write!(f, "stomp"),
            TransportKind::WebSocket => write!(f, "websocket"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stomp" => Ok(TransportKind::Stomp),
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            _ => Err(UnknownTransport(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown transport '{0}', expected 'stomp' or 'websocket'")]
pub struct UnknownTransport(String);

/// Heart-beat intervals in milliseconds; `0` disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heartbeat {
    pub outgoing_ms: u64,
    pub incoming_ms: u64,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            outgoing_ms: 4000,
            incoming_ms: 4000,
        }
    }
}

/// Broker destinations used by the STOMP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StompDestinations {
    /// Virtual host sent in CONNECT; defaults to the endpoint's host.
    pub host: Option<String>,
    pub subscribe: String,
    pub publish: String,
}

impl Default for StompDestinations {
    fn default() -> Self {
        Self {
            host: None,
            subscribe: "/topic/messages".to_string(),
            publish: "/app/chat".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub endpoint: Option<String>,
    pub transport: TransportKind,
    pub heartbeat: Heartbeat,
    pub retry: RetryPolicy,
    pub leave_grace_ms: u64,
    pub connect_timeout_ms: u64,
    pub history_limit: usize,
    pub order: Option<RenderOrder>,
    pub stomp: StompDestinations,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            transport: TransportKind::default(),
            heartbeat: Heartbeat::default(),
            retry: RetryPolicy::default(),
            leave_grace_ms: 100,
            connect_timeout_ms: 10_000,
            history_limit: 100,
            order: None,
            stomp: StompDestinations::default(),
        }
    }
}

impl SessionConfig {
    pub fn for_transport(transport: TransportKind) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint
            .as_deref()
            .unwrap_or_else(|| self.transport.default_endpoint())
    }

    pub fn order(&self) -> RenderOrder {
        self.order.unwrap_or_else(|| self.transport.default_order())
    }

    pub fn leave_grace(&self) -> Duration {
        Duration::from_millis(self.leave_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// URL to open for `nickname`.
    ///
    /// The raw WebSocket transport appends the nickname as a final,
    /// percent-encoded path segment. The STOMP endpoint is used as is.
    pub fn endpoint_for(&self, nickname: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(self.endpoint())
            .map_err(|e| TransportError::Connect(format!("invalid endpoint: {e}")))?;
        if self.transport == TransportKind::WebSocket {
            url.path_segments_mut()
                .map_err(|()| TransportError::Connect("endpoint cannot carry a path".into()))?
                .pop_if_empty()
                .push(nickname);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.endpoint(), "ws://localhost:8080/chat");
        assert_eq!(config.order(), RenderOrder::NewestLast);
        assert_eq!(config.heartbeat.outgoing_ms, 4000);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"transport":"websocket","retry":{"max_attempts":2},"order":"newest_last"}"#,
        )
        .unwrap();
        assert_eq!(config.transport, TransportKind::WebSocket);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.order(), RenderOrder::NewestLast);
    }

    #[test]
    fn websocket_endpoint_carries_encoded_username() {
        let config = SessionConfig {
            endpoint: Some("ws://localhost:10000/chat/".into()),
            ..SessionConfig::for_transport(TransportKind::WebSocket)
        };
        let url = config.endpoint_for("ann marie").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:10000/chat/ann%20marie");
    }

    #[test]
    fn stomp_endpoint_is_fixed() {
        let config = SessionConfig::default();
        let url = config.endpoint_for("alice").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/chat");
    }

    #[test]
    fn invalid_endpoint_is_a_transport_error() {
        let config = SessionConfig {
            endpoint: Some("not a url".into()),
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.endpoint_for("alice"),
            Err(TransportError::Connect(_))
        ));
    }

    #[test]
    fn transport_parses_from_cli_text() {
        assert_eq!("STOMP".parse::<TransportKind>().unwrap(), TransportKind::Stomp);
        assert_eq!("ws".parse::<TransportKind>().unwrap(), TransportKind::WebSocket);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}
