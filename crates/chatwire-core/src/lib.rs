//! Core types for chatwire.
//!
//! This crate holds everything that does not touch a socket: the chat message
//! model and its wire encodings, the STOMP frame codec, the reconnection
//! policy, the bounded message log and the session configuration. The async
//! transports and the session itself live in `chatwire-client`.

pub mod config;
mod error;
mod history;
mod message;
mod retry;
pub mod stomp;

pub use config::{Heartbeat, SessionConfig, StompDestinations, TransportKind};
pub use error::{ChatError, ProtocolError, TransportError, ValidationError};
pub use history::{MessageLog, RenderOrder};
pub use message::{ChatMessage, SYSTEM_SENDER};
pub use retry::{ReconnectState, Reconnector, RetryDecision, RetryPolicy};

use std::fmt;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No channel handle is held.
    #[default]
    Disconnected,
    /// A channel handle is being established.
    Connecting,
    /// The channel is open and subscribed.
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
